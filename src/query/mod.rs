pub mod ast;
pub mod criteria;
pub mod dialect;
pub mod evaluator;
pub mod parser;
pub mod pattern;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use criteria::{Condition, Criteria, JoinOperator, OrderBy, SqlFragment};
pub use dialect::SqlDialect;
pub use evaluator::{Evaluator, RowSource};
pub use parser::{ExpressionParser, parse_expression_cached};
