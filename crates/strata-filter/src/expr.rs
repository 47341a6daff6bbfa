//! Lowering of a [`CompiledFilter`] into a DataFusion logical expression.

use datafusion::functions::expr_fn::{ends_with, starts_with};
use datafusion::functions::string;
use datafusion::logical_expr::{cast, ident, lit, not, Expr};

use crate::compile::{CompareOp, CompiledFilter, FilterValue, Predicate, TextOp};
use crate::condition::FilterLogic;

/// Returns `None` for an empty filter, which selects every row.
pub fn to_expr(filter: &CompiledFilter) -> Option<Expr> {
    let combine: fn(Expr, Expr) -> Expr = match filter.logic {
        FilterLogic::And => Expr::and,
        FilterLogic::Or => Expr::or,
    };
    filter
        .predicates
        .iter()
        .map(predicate_expr)
        .reduce(combine)
}

fn predicate_expr(predicate: &Predicate) -> Expr {
    match predicate {
        Predicate::Compare { column, op, value } => {
            let left = ident(column.as_str());
            let right = value_expr(value);
            match op {
                CompareOp::Eq => left.eq(right),
                CompareOp::NotEq => left.not_eq(right),
                CompareOp::Gt => left.gt(right),
                CompareOp::GtEq => left.gt_eq(right),
                CompareOp::Lt => left.lt(right),
                CompareOp::LtEq => left.lt_eq(right),
            }
        }
        Predicate::TextEquals {
            column,
            negated,
            value,
        } => {
            let left = ident(column.as_str());
            if *negated {
                left.not_eq(lit(value.as_str()))
            } else {
                left.eq(lit(value.as_str()))
            }
        }
        Predicate::TypedEquals {
            column,
            negated,
            value,
            value_type,
        } => {
            let left = ident(column.as_str());
            let right = cast(lit(value.as_str()), value_type.data_type());
            if *negated {
                left.not_eq(right)
            } else {
                left.eq(right)
            }
        }
        Predicate::Text {
            column,
            op,
            negated,
            value,
        } => {
            let column = ident(column.as_str());
            let value = lit(value.as_str());
            let expr = match op {
                TextOp::Contains => string::contains().call(vec![column, value]),
                TextOp::StartsWith => starts_with(column, value),
                TextOp::EndsWith => ends_with(column, value),
            };
            if *negated {
                not(expr)
            } else {
                expr
            }
        }
        Predicate::Null { column, negated } => {
            if *negated {
                ident(column.as_str()).is_not_null()
            } else {
                ident(column.as_str()).is_null()
            }
        }
    }
}

fn value_expr(value: &FilterValue) -> Expr {
    match value {
        FilterValue::Integer(v) => lit(*v),
        FilterValue::Float(v) => lit(*v),
        FilterValue::Text(v) => lit(v.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use datafusion::arrow::datatypes::DataType;

    use super::*;
    use crate::compile::compile;
    use crate::compile::tests::columns;
    use crate::condition::{FilterCondition, FilterOperator, FilterSpec};

    fn lower(conditions: Vec<FilterCondition>, logic: FilterLogic) -> Option<Expr> {
        let filter = compile(&FilterSpec::new(conditions, logic), &columns()).unwrap();
        to_expr(&filter)
    }

    #[test]
    fn test_conjunction() {
        let expr = lower(
            vec![
                FilterCondition::new("amount", FilterOperator::GreaterThan, "1000"),
                FilterCondition::new("amount", FilterOperator::LessThan, "500"),
            ],
            FilterLogic::And,
        )
        .unwrap();
        assert_eq!(
            expr,
            ident("amount")
                .gt(lit(1000.0_f64))
                .and(ident("amount").lt(lit(500.0_f64)))
        );
    }

    #[test]
    fn test_disjunction_with_text_and_nulls() {
        let expr = lower(
            vec![
                FilterCondition::new("region", FilterOperator::NotContains, "st"),
                FilterCondition::unary("id", FilterOperator::IsNotNull),
            ],
            FilterLogic::Or,
        )
        .unwrap();
        assert_eq!(
            expr,
            not(string::contains().call(vec![ident("region"), lit("st")])).or(ident("id").is_not_null())
        );
    }

    #[test]
    fn test_typed_equality() {
        let expr = lower(
            vec![
                FilterCondition::new("date", FilterOperator::Equals, "2024-01-31"),
                FilterCondition::new("region", FilterOperator::NotEquals, "North"),
            ],
            FilterLogic::And,
        )
        .unwrap();
        assert_eq!(
            expr,
            ident("date")
                .eq(cast(lit("2024-01-31"), DataType::Date32))
                .and(ident("region").not_eq(lit("North")))
        );
    }

    #[test]
    fn test_case_is_preserved_in_column_names() {
        let mut columns = columns();
        columns[0].name = "OrderId".to_string();
        let spec = FilterSpec::new(
            vec![FilterCondition::new("OrderId", FilterOperator::Equals, "7")],
            FilterLogic::And,
        );
        let expr = to_expr(&compile(&spec, &columns).unwrap()).unwrap();
        assert_eq!(expr, ident("OrderId").eq(lit(7_i64)));
    }

    #[test]
    fn test_empty_filter() {
        assert_eq!(lower(vec![], FilterLogic::And), None);
    }
}
