use datafusion::arrow::array::{Array, StringArray};
use datafusion::arrow::compute::{cast_with_options, CastOptions};
use datafusion::arrow::datatypes::{DataType, TimeUnit};
use datafusion::arrow::util::display::array_value_to_string;
use strata_common::identifier::Identifier;
use strata_common::types::{ColumnInfo, ColumnType};

use crate::condition::{FilterCondition, FilterLogic, FilterOperator, FilterSpec};
use crate::error::{FilterError, FilterResult};

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
}

/// The type an equality value is cast to before it is compared with a
/// boolean or temporal column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Boolean,
    Date,
    Timestamp,
}

impl ValueType {
    fn for_column(column_type: ColumnType) -> Option<Self> {
        match column_type {
            ColumnType::Boolean => Some(ValueType::Boolean),
            ColumnType::Date => Some(ValueType::Date),
            ColumnType::Timestamp => Some(ValueType::Timestamp),
            _ => None,
        }
    }

    pub fn sql_type(&self) -> &'static str {
        match self {
            ValueType::Boolean => "BOOLEAN",
            ValueType::Date => "DATE",
            ValueType::Timestamp => "TIMESTAMP",
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            ValueType::Boolean => DataType::Boolean,
            ValueType::Date => DataType::Date32,
            ValueType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        }
    }
}

/// Byte-wise, case-sensitive string predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// A numeric comparison against a numeric column.
    Compare {
        column: Identifier,
        op: CompareOp,
        value: FilterValue,
    },
    /// An exact match against a string column.
    TextEquals {
        column: Identifier,
        negated: bool,
        value: String,
    },
    /// An exact match against a boolean or temporal column. The value is kept in its
    /// canonical text form and cast to `value_type` by the engine.
    TypedEquals {
        column: Identifier,
        negated: bool,
        value: String,
        value_type: ValueType,
    },
    Text {
        column: Identifier,
        op: TextOp,
        negated: bool,
        value: String,
    },
    Null {
        column: Identifier,
        negated: bool,
    },
}

/// A filter validated against a schema, ready to be lowered for either engine.
/// An empty filter selects every row.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    pub predicates: Vec<Predicate>,
    pub logic: FilterLogic,
}

impl CompiledFilter {
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

pub fn compile(spec: &FilterSpec, columns: &[ColumnInfo]) -> FilterResult<CompiledFilter> {
    let predicates = spec
        .conditions
        .iter()
        .map(|condition| compile_condition(condition, columns))
        .collect::<FilterResult<Vec<_>>>()?;
    Ok(CompiledFilter {
        predicates,
        logic: spec.logic,
    })
}

fn compile_condition(
    condition: &FilterCondition,
    columns: &[ColumnInfo],
) -> FilterResult<Predicate> {
    let info = columns
        .iter()
        .find(|c| c.name == condition.column)
        .ok_or_else(|| FilterError::ColumnNotFound(condition.column.clone()))?;
    let column = Identifier::try_new(info.name.as_str())?;
    let op = condition.operator;

    if !op.takes_value() {
        if condition.value.as_ref().is_some_and(|v| !v.is_empty()) {
            return Err(FilterError::invalid(format!(
                "operator {op} does not take a value"
            )));
        }
        return Ok(Predicate::Null {
            column,
            negated: op == FilterOperator::IsNotNull,
        });
    }

    let value = condition
        .value
        .as_deref()
        .ok_or_else(|| FilterError::invalid(format!("operator {op} requires a value")))?;

    match op {
        FilterOperator::Equals | FilterOperator::NotEquals => {
            let negated = op == FilterOperator::NotEquals;
            if info.column_type.is_numeric() {
                Ok(Predicate::Compare {
                    value: numeric_value(value, info)?,
                    column,
                    op: if negated { CompareOp::NotEq } else { CompareOp::Eq },
                })
            } else if info.column_type.is_string() {
                Ok(Predicate::TextEquals {
                    column,
                    negated,
                    value: value.to_string(),
                })
            } else if let Some(value_type) = ValueType::for_column(info.column_type) {
                Ok(Predicate::TypedEquals {
                    value: typed_value(value, value_type, info)?,
                    column,
                    negated,
                    value_type,
                })
            } else {
                Err(FilterError::invalid(format!(
                    "operator {op} is not supported for column {} of type {}",
                    info.name, info.data_type
                )))
            }
        }
        FilterOperator::GreaterThan
        | FilterOperator::GreaterThanOrEqual
        | FilterOperator::LessThan
        | FilterOperator::LessThanOrEqual => {
            if !info.column_type.is_numeric() {
                return Err(FilterError::invalid(format!(
                    "operator {op} requires a numeric column, but {} is {}",
                    info.name, info.data_type
                )));
            }
            let op = match op {
                FilterOperator::GreaterThan => CompareOp::Gt,
                FilterOperator::GreaterThanOrEqual => CompareOp::GtEq,
                FilterOperator::LessThan => CompareOp::Lt,
                _ => CompareOp::LtEq,
            };
            Ok(Predicate::Compare {
                value: numeric_value(value, info)?,
                column,
                op,
            })
        }
        FilterOperator::Contains
        | FilterOperator::NotContains
        | FilterOperator::StartsWith
        | FilterOperator::EndsWith => {
            if !info.column_type.is_string() {
                return Err(FilterError::invalid(format!(
                    "operator {op} requires a string column, but {} is {}",
                    info.name, info.data_type
                )));
            }
            let (op, negated) = match op {
                FilterOperator::Contains => (TextOp::Contains, false),
                FilterOperator::NotContains => (TextOp::Contains, true),
                FilterOperator::StartsWith => (TextOp::StartsWith, false),
                _ => (TextOp::EndsWith, false),
            };
            Ok(Predicate::Text {
                column,
                op,
                negated,
                value: value.to_string(),
            })
        }
        FilterOperator::IsNull | FilterOperator::IsNotNull => Err(FilterError::invalid(format!(
            "operator {op} does not take a value"
        ))),
    }
}

fn numeric_value(value: &str, info: &ColumnInfo) -> FilterResult<FilterValue> {
    let text = value.trim();
    if info.column_type == ColumnType::Integer {
        if let Ok(v) = text.parse::<i64>() {
            return Ok(FilterValue::Integer(v));
        }
    }
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(FilterValue::Float(v)),
        _ => Err(FilterError::invalid(format!(
            "value for numeric column {} is not a number: {value}",
            info.name
        ))),
    }
}

/// Casts the value the way the compute engine would and renders the result back,
/// so that both engines receive the same canonical literal.
fn typed_value(value: &str, value_type: ValueType, info: &ColumnInfo) -> FilterResult<String> {
    let invalid = || {
        FilterError::invalid(format!(
            "value for {} column {} is not valid: {value}",
            value_type.sql_type().to_lowercase(),
            info.name
        ))
    };
    let text = StringArray::from(vec![value.trim()]);
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    let array =
        cast_with_options(&text, &value_type.data_type(), &options).map_err(|_| invalid())?;
    if array.is_null(0) {
        return Err(invalid());
    }
    array_value_to_string(array.as_ref(), 0).map_err(|_| invalid())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn columns() -> Vec<ColumnInfo> {
        [
            ("id", ColumnType::Integer),
            ("region", ColumnType::String),
            ("amount", ColumnType::Float),
            ("date", ColumnType::Date),
            ("bad name", ColumnType::String),
            ("at", ColumnType::Timestamp),
            ("flag", ColumnType::Boolean),
            ("payload", ColumnType::Binary),
        ]
        .into_iter()
        .map(|(name, column_type)| ColumnInfo {
            name: name.to_string(),
            column_type,
            data_type: format!("{column_type:?}"),
        })
        .collect()
    }

    fn compile_one(condition: FilterCondition) -> FilterResult<Predicate> {
        let spec = FilterSpec::new(vec![condition], FilterLogic::And);
        let mut filter = compile(&spec, &columns())?;
        Ok(filter.predicates.remove(0))
    }

    fn id(name: &str) -> Identifier {
        Identifier::try_new(name).unwrap()
    }

    #[test]
    fn test_numeric_comparison() {
        assert_eq!(
            compile_one(FilterCondition::new(
                "amount",
                FilterOperator::GreaterThan,
                "1000"
            ))
            .unwrap(),
            Predicate::Compare {
                column: id("amount"),
                op: CompareOp::Gt,
                value: FilterValue::Float(1000.0),
            }
        );
        assert_eq!(
            compile_one(FilterCondition::new("id", FilterOperator::Equals, " 42 ")).unwrap(),
            Predicate::Compare {
                column: id("id"),
                op: CompareOp::Eq,
                value: FilterValue::Integer(42),
            }
        );
        assert_eq!(
            compile_one(FilterCondition::new("id", FilterOperator::LessThan, "2.5")).unwrap(),
            Predicate::Compare {
                column: id("id"),
                op: CompareOp::Lt,
                value: FilterValue::Float(2.5),
            }
        );
    }

    #[test]
    fn test_string_equality() {
        assert_eq!(
            compile_one(FilterCondition::new(
                "region",
                FilterOperator::NotEquals,
                "North"
            ))
            .unwrap(),
            Predicate::TextEquals {
                column: id("region"),
                negated: true,
                value: "North".to_string(),
            }
        );
    }

    #[test]
    fn test_typed_equality() {
        let typed = |column: &str, value: &str| {
            compile_one(FilterCondition::new(column, FilterOperator::Equals, value))
        };
        assert_eq!(
            compile_one(FilterCondition::new(
                "date",
                FilterOperator::NotEquals,
                "2024-01-01"
            ))
            .unwrap(),
            Predicate::TypedEquals {
                column: id("date"),
                negated: true,
                value: "2024-01-01".to_string(),
                value_type: ValueType::Date,
            }
        );
        for value in ["2024-01-01 10:00:00", "2024-01-01T10:00:00"] {
            assert_eq!(
                typed("at", value).unwrap(),
                Predicate::TypedEquals {
                    column: id("at"),
                    negated: false,
                    value: "2024-01-01T10:00:00".to_string(),
                    value_type: ValueType::Timestamp,
                }
            );
        }
        assert_eq!(
            typed("flag", " TRUE ").unwrap(),
            Predicate::TypedEquals {
                column: id("flag"),
                negated: false,
                value: "true".to_string(),
                value_type: ValueType::Boolean,
            }
        );
        for (column, value) in [("date", "January"), ("at", "10:00"), ("flag", "maybe")] {
            assert!(matches!(
                typed(column, value),
                Err(FilterError::InvalidArgument(_))
            ));
        }
        assert!(matches!(
            typed("payload", "abc"),
            Err(FilterError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_text_operators() {
        assert_eq!(
            compile_one(FilterCondition::new("region", FilterOperator::NotContains, "st")).unwrap(),
            Predicate::Text {
                column: id("region"),
                op: TextOp::Contains,
                negated: true,
                value: "st".to_string(),
            }
        );
        assert!(matches!(
            compile_one(FilterCondition::new("amount", FilterOperator::StartsWith, "1")),
            Err(FilterError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_null_operators() {
        assert_eq!(
            compile_one(FilterCondition::unary("region", FilterOperator::IsNotNull)).unwrap(),
            Predicate::Null {
                column: id("region"),
                negated: true,
            }
        );
        assert!(compile_one(FilterCondition::new("region", FilterOperator::IsNull, "")).is_ok());
        assert!(matches!(
            compile_one(FilterCondition::new("region", FilterOperator::IsNull, "x")),
            Err(FilterError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_invalid_conditions() {
        assert!(matches!(
            compile_one(FilterCondition::new("missing", FilterOperator::Equals, "1")),
            Err(FilterError::ColumnNotFound(_))
        ));
        assert!(matches!(
            compile_one(FilterCondition::new("amount", FilterOperator::GreaterThan, "abc")),
            Err(FilterError::InvalidArgument(_))
        ));
        assert!(matches!(
            compile_one(FilterCondition::new("amount", FilterOperator::Equals, "NaN")),
            Err(FilterError::InvalidArgument(_))
        ));
        assert!(matches!(
            compile_one(FilterCondition::new("region", FilterOperator::GreaterThan, "1")),
            Err(FilterError::InvalidArgument(_))
        ));
        assert!(matches!(
            compile_one(FilterCondition::unary("amount", FilterOperator::Equals)),
            Err(FilterError::InvalidArgument(_))
        ));
        assert!(matches!(
            compile_one(FilterCondition::new("bad name", FilterOperator::Equals, "x")),
            Err(FilterError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_empty_filter() {
        let spec = FilterSpec::new(vec![], FilterLogic::Or);
        assert!(compile(&spec, &columns()).unwrap().is_empty());
    }
}
