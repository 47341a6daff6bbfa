use datafusion::arrow::datatypes::{DataType, Schema};
use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;

/// The semantic type of a column, independent of the engine that stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    String,
    Boolean,
    Date,
    Timestamp,
    Binary,
    Other,
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    pub fn is_string(&self) -> bool {
        matches!(self, ColumnType::String)
    }
}

impl From<&DataType> for ColumnType {
    fn from(data_type: &DataType) -> Self {
        match data_type {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => ColumnType::Integer,
            DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _) => ColumnType::Float,
            DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => ColumnType::String,
            DataType::Boolean => ColumnType::Boolean,
            DataType::Date32 | DataType::Date64 => ColumnType::Date,
            DataType::Timestamp(_, _) => ColumnType::Timestamp,
            DataType::Binary
            | DataType::LargeBinary
            | DataType::BinaryView
            | DataType::FixedSizeBinary(_) => ColumnType::Binary,
            DataType::Dictionary(_, value) => ColumnType::from(value.as_ref()),
            _ => ColumnType::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: ColumnType,
    /// The engine's own description of the type, for display.
    pub data_type: String,
}

pub fn columns_from_schema(schema: &Schema) -> Vec<ColumnInfo> {
    schema
        .fields()
        .iter()
        .map(|field| ColumnInfo {
            name: field.name().clone(),
            column_type: ColumnType::from(field.data_type()),
            data_type: field.data_type().to_string(),
        })
        .collect()
}

/// One key of a multi-column sort. Nulls always sort last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: Identifier,
    pub descending: bool,
}

/// A rough per-row byte width used for dataset size estimates.
pub fn estimated_width(data_type: &DataType) -> u64 {
    match data_type {
        DataType::Int64
        | DataType::UInt64
        | DataType::Float64
        | DataType::Date64
        | DataType::Timestamp(_, _) => 8,
        DataType::Int32 | DataType::UInt32 | DataType::Float32 | DataType::Date32 => 4,
        DataType::Int16 | DataType::UInt16 | DataType::Float16 => 2,
        DataType::Boolean | DataType::Int8 | DataType::UInt8 => 1,
        DataType::Utf8
        | DataType::LargeUtf8
        | DataType::Utf8View
        | DataType::Binary
        | DataType::LargeBinary
        | DataType::BinaryView => 64,
        _ => 32,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use datafusion::arrow::datatypes::{Field, TimeUnit};

    use super::*;

    #[test]
    fn test_column_types_from_schema() {
        let schema = Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("amount", DataType::Float64, true),
            Field::new("region", DataType::Utf8, true),
            Field::new("active", DataType::Boolean, true),
            Field::new("day", DataType::Date32, true),
            Field::new("at", DataType::Timestamp(TimeUnit::Microsecond, None), true),
            Field::new(
                "tag",
                DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8)),
                true,
            ),
            Field::new(
                "items",
                DataType::List(Arc::new(Field::new("item", DataType::Int32, true))),
                true,
            ),
        ]);
        let types = columns_from_schema(&schema)
            .into_iter()
            .map(|c| c.column_type)
            .collect::<Vec<_>>();
        assert_eq!(
            types,
            vec![
                ColumnType::Integer,
                ColumnType::Float,
                ColumnType::String,
                ColumnType::Boolean,
                ColumnType::Date,
                ColumnType::Timestamp,
                ColumnType::String,
                ColumnType::Other,
            ]
        );
        assert!(ColumnType::Float.is_numeric());
        assert!(!ColumnType::Date.is_numeric());
    }

    #[test]
    fn test_estimated_width() {
        assert_eq!(estimated_width(&DataType::Int64), 8);
        assert_eq!(estimated_width(&DataType::Int32), 4);
        assert_eq!(estimated_width(&DataType::Boolean), 1);
        assert_eq!(estimated_width(&DataType::Utf8), 64);
        assert_eq!(estimated_width(&DataType::Null), 32);
    }
}
