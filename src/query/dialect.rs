use std::fmt;

use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};

/// SQL dialect spoken by a record store, identified by its driver name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum SqlDialect {
    #[default]
    MySql,
    PostgreSql,
    Sqlite,
    /// Any driver without a known dialect; carries the driver name.
    Other(String),
}

impl SqlDialect {
    pub fn from_driver(driver: &str) -> Self {
        match driver.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Self::MySql,
            "pgsql" | "postgres" | "postgresql" => Self::PostgreSql,
            "sqlite" | "sqlite3" => Self::Sqlite,
            _ => Self::Other(driver.to_string()),
        }
    }

    pub fn driver_name(&self) -> &str {
        match self {
            Self::MySql => "mysql",
            Self::PostgreSql => "pgsql",
            Self::Sqlite => "sqlite",
            Self::Other(name) => name,
        }
    }

    /// Quotes `text` as a string literal of this dialect. MySQL reads
    /// backslash as an escape inside string literals, so it is doubled there.
    pub fn quote_text(&self, text: &str) -> String {
        let quoted = text.replace('\'', "''");
        match self {
            Self::MySql => format!("'{}'", quoted.replace('\\', "\\\\")),
            _ => format!("'{}'", quoted),
        }
    }

    /// sqlparser dialect used to read raw expressions written for this
    /// driver. Unknown drivers fall back to the generic grammar.
    pub(crate) fn parser_dialect(&self) -> Box<dyn Dialect> {
        match self {
            Self::MySql => Box::new(MySqlDialect {}),
            Self::PostgreSql => Box::new(PostgreSqlDialect {}),
            Self::Sqlite => Box::new(SQLiteDialect {}),
            Self::Other(_) => Box::new(GenericDialect {}),
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.driver_name())
    }
}
