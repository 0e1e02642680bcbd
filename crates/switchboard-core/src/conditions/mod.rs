//! The condition DSL: a small predicate language that gates segments
//! against caller-supplied context.
//!
//! Attribute references are bracketed (`[tier]`, `[foo][dfs][a]`), literals
//! cover booleans, numbers, strings, regexes (`/…/`), and homogeneous
//! arrays, and the operator set spans logic (`AND OR XOR NAND`), comparison
//! (`== != < <= > >=`), membership (`IN`, `NOT IN`, `CONTAINS`,
//! `NOT CONTAINS`), and regex matching (`=~`, `!~`).
//!
//! ```rust
//! use switchboard_core::conditions::{evaluate, parse};
//! use switchboard_core::AttributeBag;
//!
//! let expr = parse(r#"[tier] == "gold" AND [age] >= 21"#).unwrap();
//! let attributes = AttributeBag::new().set("tier", "gold").set("age", 30.0);
//! assert!(evaluate(&expr, &attributes).unwrap());
//! ```

pub mod eval;
pub mod lexer;
pub mod parser;
pub mod value;

pub use eval::{evaluate, evaluate_with_epsilon};
pub use parser::{parse, BinaryOp, Expr, UnaryOp};
pub use value::{default_epsilon, float_equal, set_default_epsilon, ArrayValue, Value};
