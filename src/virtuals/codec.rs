use tracing::warn;

use crate::config::VirtualConfig;
use crate::core::{DbError, Result, Value};
use crate::query::{Expr, SqlDialect};

/// Packs computed values into one text field and generates the SQL that
/// extracts a single value back out of it.
///
/// The format is `,name1:value1,name2:value2,` with configurable separators.
/// Separators inside values are not escaped, so values containing either
/// separator do not survive extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheCodec {
    field: String,
    column_separator: char,
    value_separator: char,
    names: Vec<String>,
}

impl CacheCodec {
    pub fn new(config: &VirtualConfig, names: Vec<String>) -> Self {
        Self {
            field: config.cache_field.clone(),
            column_separator: config.column_separator,
            value_separator: config.value_separator,
            names,
        }
    }

    /// Name of the packed field
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn encode<'a, I>(&self, values: I) -> String
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        let entries: Vec<String> = values
            .into_iter()
            .map(|(name, value)| {
                let text = value.to_cache_text();
                if text.contains(self.column_separator) || text.contains(self.value_separator) {
                    warn!(
                        attribute = name,
                        value = %text,
                        "packed value contains a separator and will not extract cleanly"
                    );
                }
                format!("{}{}{}", name, self.value_separator, text)
            })
            .collect();

        let sep = self.column_separator.to_string();
        format!("{}{}{}", sep, entries.join(&sep), sep)
    }

    /// Splits a packed string into `(name, text)` pairs. Entries without a
    /// value separator are skipped.
    pub fn decode(&self, packed: &str) -> Vec<(String, String)> {
        packed
            .split(self.column_separator)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| entry.split_once(self.value_separator))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    /// Typed extraction expression for `name` in `dialect`.
    pub fn query_expr(&self, name: &str, dialect: &SqlDialect) -> Result<Expr> {
        if !self.names.iter().any(|declared| declared == name) {
            return Err(DbError::InvalidArgument(format!(
                "'{}' is not a declared virtual attribute",
                name
            )));
        }

        let field = Expr::column(&self.field);
        let marker = format!("{}{}{}", self.column_separator, name, self.value_separator);
        let column_sep = Expr::literal(self.column_separator.to_string());

        match dialect {
            SqlDialect::MySql => {
                let tail = Expr::function(
                    "SUBSTRING_INDEX",
                    vec![field, Expr::literal(marker), Expr::literal(-1i64)],
                );
                Ok(Expr::function(
                    "SUBSTRING_INDEX",
                    vec![tail, column_sep, Expr::literal(1i64)],
                ))
            }
            SqlDialect::PostgreSql => {
                let tail = Expr::function(
                    "SPLIT_PART",
                    vec![field, Expr::literal(marker), Expr::literal(2i64)],
                );
                Ok(Expr::function(
                    "SPLIT_PART",
                    vec![tail, column_sep, Expr::literal(1i64)],
                ))
            }
            SqlDialect::Sqlite => {
                // an absent marker makes the start NULL, and so the whole extraction
                let marker_len = marker.chars().count() as i64;
                let found = Expr::function("INSTR", vec![field.clone(), Expr::literal(marker)]);
                let start = Expr::add(
                    Expr::function("NULLIF", vec![found, Expr::literal(0i64)]),
                    Expr::literal(marker_len),
                );
                let rest = Expr::function("SUBSTR", vec![field.clone(), start.clone()]);
                let len = Expr::sub(
                    Expr::function("INSTR", vec![rest, column_sep]),
                    Expr::literal(1i64),
                );
                Ok(Expr::function("SUBSTR", vec![field, start, len]))
            }
            SqlDialect::Other(driver) => Err(DbError::UnsupportedQueryEngine(driver.clone())),
        }
    }

    /// Engine-native SQL text that extracts the value of `name`.
    pub fn query_expression(&self, name: &str, dialect: &SqlDialect) -> Result<String> {
        Ok(self.query_expr(name, dialect)?.to_string())
    }
}
