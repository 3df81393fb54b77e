use std::cmp::Ordering;

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::criteria::{Condition, SqlFragment};
use super::dialect::SqlDialect;
use super::parser::parse_expression_cached;
use super::pattern::eval_like;
use crate::core::{AttributeMap, DbError, KEY_COLUMN, RecordKey, Result, Value};

/// Column lookup used while evaluating expressions against one row.
pub trait RowSource {
    fn key(&self) -> Option<RecordKey>;

    fn attribute(&self, name: &str) -> Option<&Value>;

    fn column(&self, name: &str) -> Value {
        if name == KEY_COLUMN
            && let Some(key) = self.key()
        {
            return key.as_value();
        }
        self.attribute(name).cloned().unwrap_or(Value::Null)
    }
}

impl RowSource for AttributeMap {
    fn key(&self) -> Option<RecordKey> {
        None
    }

    fn attribute(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Evaluates expressions and criteria conditions. Raw fragments are parsed
/// in `dialect`.
pub struct Evaluator {
    dialect: SqlDialect,
}

impl Evaluator {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &SqlDialect {
        &self.dialect
    }

    pub fn matches(&self, condition: &Condition, row: &dyn RowSource) -> Result<bool> {
        match condition {
            Condition::Fragment(fragment) => Ok(self.evaluate_fragment(fragment, row)?.as_bool()),
            Condition::Keys(keys) => Ok(row.key().is_some_and(|key| keys.contains(&key))),
            Condition::All(parts) => {
                for part in parts {
                    if !self.matches(part, row)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Any(parts) => {
                for part in parts {
                    if self.matches(part, row)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not(inner) => Ok(!self.matches(inner, row)?),
        }
    }

    pub fn evaluate_fragment(&self, fragment: &SqlFragment, row: &dyn RowSource) -> Result<Value> {
        match fragment {
            SqlFragment::Typed(expr) => self.evaluate(expr, row),
            SqlFragment::Raw(sql) => {
                let expr = parse_expression_cached(&self.dialect, sql)?;
                self.evaluate(&expr, row)
            }
        }
    }

    pub fn evaluate(&self, expr: &Expr, row: &dyn RowSource) -> Result<Value> {
        match expr {
            Expr::Column(name) => Ok(row.column(name)),
            Expr::Literal(val) => Ok(val.clone()),

            Expr::BinaryOp { left, op, right } => match op {
                BinaryOp::And => {
                    let l = self.evaluate(left, row)?.as_bool();
                    Ok(Value::Boolean(l && self.evaluate(right, row)?.as_bool()))
                }
                BinaryOp::Or => {
                    let l = self.evaluate(left, row)?.as_bool();
                    Ok(Value::Boolean(l || self.evaluate(right, row)?.as_bool()))
                }
                op if op.is_comparison() => {
                    let l = self.evaluate(left, row)?;
                    let r = self.evaluate(right, row)?;
                    Ok(Value::Boolean(compare(&l, &r, *op)?))
                }
                op => {
                    let l = self.evaluate(left, row)?;
                    let r = self.evaluate(right, row)?;
                    arithmetic(&l, &r, *op)
                }
            },

            Expr::UnaryOp { op, expr } => {
                let val = self.evaluate(expr, row)?;
                match (op, val) {
                    (UnaryOp::Not, val) => Ok(Value::Boolean(!val.as_bool())),
                    (_, Value::Null) => Ok(Value::Null),
                    (UnaryOp::Minus, Value::Integer(i)) => Ok(Value::Integer(-i)),
                    (UnaryOp::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
                    (UnaryOp::Plus, val) if val.is_numeric() => Ok(val),
                    (_, val) => Err(DbError::TypeMismatch(format!(
                        "Cannot apply {} to {}",
                        op,
                        val.type_name()
                    ))),
                }
            }

            Expr::Like {
                expr,
                pattern,
                negated,
                case_insensitive,
            } => {
                let text = self.evaluate(expr, row)?;
                let pattern = self.evaluate(pattern, row)?;
                // MySQL and SQLite compare LIKE case-insensitively by default
                let case_sensitive = !case_insensitive
                    && !matches!(self.dialect, SqlDialect::MySql | SqlDialect::Sqlite);
                let matched = match (&text, &pattern) {
                    (Value::Null, _) | (_, Value::Null) => return Ok(Value::Boolean(false)),
                    (text, Value::Text(pat)) => {
                        eval_like(&text.to_cache_text(), pat, case_sensitive)?
                    }
                    _ => false,
                };
                Ok(Value::Boolean(matched != *negated))
            }

            Expr::In { expr, list, negated } => {
                let val = self.evaluate(expr, row)?;
                if val.is_null() {
                    return Ok(Value::Boolean(false));
                }
                let mut found = false;
                for item in list {
                    if compare(&val, &self.evaluate(item, row)?, BinaryOp::Eq)? {
                        found = true;
                        break;
                    }
                }
                Ok(Value::Boolean(found != *negated))
            }

            Expr::IsNull { expr, negated } => {
                let val = self.evaluate(expr, row)?;
                Ok(Value::Boolean(val.is_null() != *negated))
            }

            Expr::Function { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg, row)?);
                }
                functions::call(name, &values)
            }
        }
    }
}

/// SQL comparison; NULL on either side never matches.
fn compare(left: &Value, right: &Value, op: BinaryOp) -> Result<bool> {
    let ordering = match (left, right) {
        (Value::Null, _) | (_, Value::Null) => return Ok(false),
        // text against a number compares as text, the way cached values are stored
        (Value::Text(a), b) if b.is_numeric() => a.as_str().cmp(b.to_string().as_str()),
        (a, Value::Text(b)) if a.is_numeric() => a.to_string().as_str().cmp(b.as_str()),
        (a, b) => a.compare(b)?,
    };

    Ok(match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::NotEq => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::LtEq => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::GtEq => ordering != Ordering::Less,
        other => {
            return Err(DbError::ExecutionError(format!(
                "{} is not a comparison operator",
                other
            )));
        }
    })
}

fn arithmetic(left: &Value, right: &Value, op: BinaryOp) -> Result<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    if let (Value::Integer(a), Value::Integer(b)) = (left, right) {
        let result = match op {
            BinaryOp::Add => a.checked_add(*b),
            BinaryOp::Subtract => a.checked_sub(*b),
            BinaryOp::Multiply => a.checked_mul(*b),
            BinaryOp::Divide | BinaryOp::Modulo if *b == 0 => return Ok(Value::Null),
            BinaryOp::Divide => a.checked_div(*b),
            BinaryOp::Modulo => a.checked_rem(*b),
            _ => None,
        };
        return result.map(Value::Integer).ok_or_else(|| {
            DbError::ExecutionError(format!("Integer overflow in {} {} {}", a, op, b))
        });
    }

    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Ok(Value::Float(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            BinaryOp::Divide if b == 0.0 => return Ok(Value::Null),
            BinaryOp::Divide => a / b,
            BinaryOp::Modulo => a % b,
            _ => unreachable!("non-arithmetic operator routed to arithmetic"),
        })),
        _ => Err(DbError::TypeMismatch(format!(
            "Cannot apply {} to {} and {}",
            op,
            left.type_name(),
            right.type_name()
        ))),
    }
}

/// Scalar string functions needed to evaluate search cache extraction in
/// every supported dialect. Positions are 1-based and count characters.
mod functions {
    use crate::core::{DbError, Result, Value};

    pub fn call(name: &str, args: &[Value]) -> Result<Value> {
        if name == "COALESCE" {
            return Ok(args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null));
        }
        if name == "NULLIF" {
            arity(name, args, 2)?;
            return Ok(if !args[1].is_null() && args[0] == args[1] {
                Value::Null
            } else {
                args[0].clone()
            });
        }
        if args.iter().any(Value::is_null) {
            return Ok(Value::Null);
        }

        match name {
            "UPPER" => text_arg(name, args, 1).map(|s| Value::Text(s[0].to_uppercase())),
            "LOWER" => text_arg(name, args, 1).map(|s| Value::Text(s[0].to_lowercase())),
            "LENGTH" | "CHAR_LENGTH" => {
                text_arg(name, args, 1).map(|s| Value::Integer(s[0].chars().count() as i64))
            }
            "CONCAT" => Ok(Value::Text(args.iter().map(Value::to_cache_text).collect())),
            "SUBSTRING" | "SUBSTR" => substring(args),
            "INSTR" => {
                let s = text_arg(name, args, 2)?;
                Ok(Value::Integer(position(&s[0], &s[1])))
            }
            "LOCATE" | "POSITION" => {
                let s = text_arg(name, args, 2)?;
                Ok(Value::Integer(position(&s[1], &s[0])))
            }
            "SUBSTRING_INDEX" => {
                arity(name, args, 3)?;
                let count = int_arg(name, &args[2])?;
                Ok(Value::Text(substring_index(
                    &args[0].to_cache_text(),
                    &args[1].to_cache_text(),
                    count,
                )))
            }
            "SPLIT_PART" => {
                arity(name, args, 3)?;
                let n = int_arg(name, &args[2])?;
                if n == 0 {
                    return Err(DbError::ExecutionError(
                        "SPLIT_PART field position must not be zero".into(),
                    ));
                }
                Ok(Value::Text(split_part(
                    &args[0].to_cache_text(),
                    &args[1].to_cache_text(),
                    n,
                )))
            }
            _ => Err(DbError::UnsupportedOperation(format!(
                "Unknown function: {}",
                name
            ))),
        }
    }

    fn arity(name: &str, args: &[Value], expected: usize) -> Result<()> {
        if args.len() != expected {
            return Err(DbError::ExecutionError(format!(
                "{} expects {} arguments, got {}",
                name,
                expected,
                args.len()
            )));
        }
        Ok(())
    }

    fn text_arg(name: &str, args: &[Value], expected: usize) -> Result<Vec<String>> {
        arity(name, args, expected)?;
        Ok(args.iter().map(Value::to_cache_text).collect())
    }

    fn int_arg(name: &str, value: &Value) -> Result<i64> {
        value.as_i64().ok_or_else(|| {
            DbError::TypeMismatch(format!("{} expects an integer, got {}", name, value.type_name()))
        })
    }

    fn position(haystack: &str, needle: &str) -> i64 {
        match haystack.find(needle) {
            Some(byte_idx) => haystack[..byte_idx].chars().count() as i64 + 1,
            None => 0,
        }
    }

    fn substring(args: &[Value]) -> Result<Value> {
        if args.len() != 2 && args.len() != 3 {
            return Err(DbError::ExecutionError(format!(
                "SUBSTRING expects 2 or 3 arguments, got {}",
                args.len()
            )));
        }
        let chars: Vec<char> = args[0].to_cache_text().chars().collect();
        let total = chars.len() as i64;
        let start = int_arg("SUBSTRING", &args[1])?;

        let begin = if start > 0 {
            start - 1
        } else if start < 0 {
            (total + start).max(0)
        } else {
            return Ok(Value::Text(String::new()));
        };

        let len = match args.get(2) {
            Some(len) => int_arg("SUBSTRING", len)?,
            None => total,
        };
        if len <= 0 || begin >= total {
            return Ok(Value::Text(String::new()));
        }

        let end = begin.saturating_add(len).min(total);
        Ok(Value::Text(chars[begin as usize..end as usize].iter().collect()))
    }

    fn substring_index(s: &str, delim: &str, count: i64) -> String {
        if count == 0 || delim.is_empty() {
            return String::new();
        }
        let positions: Vec<usize> = s.match_indices(delim).map(|(i, _)| i).collect();
        let wanted = count.unsigned_abs() as usize;
        if positions.len() < wanted {
            return s.to_string();
        }
        if count > 0 {
            s[..positions[wanted - 1]].to_string()
        } else {
            s[positions[positions.len() - wanted] + delim.len()..].to_string()
        }
    }

    fn split_part(s: &str, delim: &str, n: i64) -> String {
        let parts: Vec<&str> = if delim.is_empty() {
            vec![s]
        } else {
            s.split(delim).collect()
        };
        let idx = if n > 0 {
            n - 1
        } else {
            parts.len() as i64 + n
        };
        if idx < 0 {
            return String::new();
        }
        parts.get(idx as usize).map(|p| p.to_string()).unwrap_or_default()
    }

}
