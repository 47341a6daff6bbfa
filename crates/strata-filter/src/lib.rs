//! Typed filter conditions compiled into engine-native predicates.
//!
//! A [`FilterSpec`] is validated against a dataset's columns once by [`compile`],
//! producing a [`CompiledFilter`]. The compiled filter is then lowered either to a
//! parameterized SQL clause ([`sql::to_sql`]) or to a DataFusion expression
//! ([`expr::to_expr`]). Both lowerings select the same rows. Values are never
//! interpolated into SQL text.

mod compile;
mod condition;
pub mod error;
pub mod expr;
pub mod sql;

pub use compile::{
    compile, CompareOp, CompiledFilter, FilterValue, Predicate, TextOp, ValueType,
};
pub use condition::{FilterCondition, FilterLogic, FilterOperator, FilterSpec};
