//! Lowering of a [`CompiledFilter`] into a parameterized SQL predicate.

use crate::compile::{CompareOp, CompiledFilter, FilterValue, Predicate, TextOp};
use crate::condition::FilterLogic;

/// A SQL boolean expression with `?` placeholders and the values bound to them, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlPredicate {
    pub sql: String,
    pub params: Vec<FilterValue>,
}

/// Returns `None` for an empty filter, which selects every row.
pub fn to_sql(filter: &CompiledFilter) -> Option<SqlPredicate> {
    if filter.is_empty() {
        return None;
    }
    let mut params = Vec::with_capacity(filter.predicates.len());
    let clauses = filter
        .predicates
        .iter()
        .map(|p| predicate_sql(p, &mut params))
        .collect::<Vec<_>>();
    let separator = match filter.logic {
        FilterLogic::And => " AND ",
        FilterLogic::Or => " OR ",
    };
    Some(SqlPredicate {
        sql: clauses.join(separator),
        params,
    })
}

fn predicate_sql(predicate: &Predicate, params: &mut Vec<FilterValue>) -> String {
    match predicate {
        Predicate::Compare { column, op, value } => {
            params.push(value.clone());
            format!("({} {} ?)", column.quoted(), compare_symbol(*op))
        }
        Predicate::TextEquals {
            column,
            negated,
            value,
        } => {
            params.push(FilterValue::Text(value.clone()));
            let symbol = if *negated { "<>" } else { "=" };
            format!("({} {symbol} ?)", column.quoted())
        }
        Predicate::TypedEquals {
            column,
            negated,
            value,
            value_type,
        } => {
            params.push(FilterValue::Text(value.clone()));
            let symbol = if *negated { "<>" } else { "=" };
            format!(
                "({} {symbol} CAST(? AS {}))",
                column.quoted(),
                value_type.sql_type()
            )
        }
        Predicate::Text {
            column,
            op,
            negated,
            value,
        } => {
            params.push(FilterValue::Text(value.clone()));
            let function = match op {
                TextOp::Contains => "contains",
                TextOp::StartsWith => "starts_with",
                TextOp::EndsWith => "suffix",
            };
            let call = format!("{function}({}, ?)", column.quoted());
            if *negated {
                format!("(NOT {call})")
            } else {
                format!("({call})")
            }
        }
        Predicate::Null { column, negated } => {
            if *negated {
                format!("({} IS NOT NULL)", column.quoted())
            } else {
                format!("({} IS NULL)", column.quoted())
            }
        }
    }
}

fn compare_symbol(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "=",
        CompareOp::NotEq => "<>",
        CompareOp::Gt => ">",
        CompareOp::GtEq => ">=",
        CompareOp::Lt => "<",
        CompareOp::LtEq => "<=",
    }
}
