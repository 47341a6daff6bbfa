//! The shape of per-column summary statistics shared by both engines.

use std::sync::{Arc, LazyLock};

use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef};

pub const COLUMN_NAME: &str = "column_name";
pub const COUNT: &str = "count";
pub const NULL_COUNT: &str = "null_count";
pub const MIN: &str = "min";
pub const MAX: &str = "max";
pub const MEAN: &str = "mean";
pub const STD: &str = "std";

static SUMMARY_STATS_SCHEMA: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(Schema::new(vec![
        Field::new(COLUMN_NAME, DataType::Utf8, true),
        Field::new(COUNT, DataType::Int64, true),
        Field::new(NULL_COUNT, DataType::Int64, true),
        Field::new(MIN, DataType::Utf8, true),
        Field::new(MAX, DataType::Utf8, true),
        Field::new(MEAN, DataType::Float64, true),
        Field::new(STD, DataType::Float64, true),
    ]))
});

/// One row per source column: non-null count, null count, min and max rendered as text,
/// and the mean and sample standard deviation for numeric columns.
pub fn summary_stats_schema() -> SchemaRef {
    SUMMARY_STATS_SCHEMA.clone()
}
