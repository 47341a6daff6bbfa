use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FilterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::NotEquals => "not_equals",
            FilterOperator::Contains => "contains",
            FilterOperator::NotContains => "not_contains",
            FilterOperator::StartsWith => "starts_with",
            FilterOperator::EndsWith => "ends_with",
            FilterOperator::GreaterThan => "greater_than",
            FilterOperator::GreaterThanOrEqual => "greater_than_or_equal",
            FilterOperator::LessThan => "less_than",
            FilterOperator::LessThanOrEqual => "less_than_or_equal",
            FilterOperator::IsNull => "is_null",
            FilterOperator::IsNotNull => "is_not_null",
        }
    }

    /// Whether the operator takes a value.
    pub fn takes_value(&self) -> bool {
        !matches!(self, FilterOperator::IsNull | FilterOperator::IsNotNull)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterOperator {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim().to_ascii_lowercase().as_str() {
            "equals" => FilterOperator::Equals,
            "not_equals" => FilterOperator::NotEquals,
            "contains" => FilterOperator::Contains,
            "not_contains" => FilterOperator::NotContains,
            "starts_with" => FilterOperator::StartsWith,
            "ends_with" => FilterOperator::EndsWith,
            "greater_than" => FilterOperator::GreaterThan,
            "greater_than_or_equal" => FilterOperator::GreaterThanOrEqual,
            "less_than" => FilterOperator::LessThan,
            "less_than_or_equal" => FilterOperator::LessThanOrEqual,
            "is_null" => FilterOperator::IsNull,
            "is_not_null" => FilterOperator::IsNotNull,
            _ => return Err(FilterError::invalid(format!("unknown filter operator: {s}"))),
        };
        Ok(op)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterLogic {
    And,
    Or,
}

impl FromStr for FilterLogic {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("and") {
            Ok(FilterLogic::And)
        } else if s.eq_ignore_ascii_case("or") {
            Ok(FilterLogic::Or)
        } else {
            Err(FilterError::invalid(format!(
                "filter logic must be 'and' or 'or': {s}"
            )))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub column: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Option<String>,
}

impl FilterCondition {
    pub fn new(
        column: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            operator,
            value: Some(value.into()),
        }
    }

    pub fn unary(column: impl Into<String>, operator: FilterOperator) -> Self {
        Self {
            column: column.into(),
            operator,
            value: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub conditions: Vec<FilterCondition>,
    pub logic: FilterLogic,
}

impl FilterSpec {
    pub fn new(conditions: Vec<FilterCondition>, logic: FilterLogic) -> Self {
        Self { conditions, logic }
    }
}
