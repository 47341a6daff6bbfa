//! SQL text shared by both engines.
//!
//! The generated statements only use syntax accepted by DuckDB and DataFusion alike,
//! and every interpolated name has passed the identifier allow-list.

use std::fmt;
use std::str::FromStr;

use crate::error::{CommonError, CommonResult};
use crate::identifier::Identifier;
use crate::stats;
use crate::types::ColumnInfo;

pub fn filter_query(table: &Identifier, predicate: &str) -> String {
    format!("SELECT * FROM {} WHERE ({predicate})", table.quoted())
}

/// Groups by the given columns in order, with the groups sorted ascending.
pub fn group_by_query(
    table: &Identifier,
    groups: &[Identifier],
    aggregates: &[String],
) -> CommonResult<String> {
    if groups.is_empty() {
        return Err(CommonError::invalid("at least one group column is required"));
    }
    if aggregates.is_empty() {
        return Err(CommonError::invalid("at least one aggregate expression is required"));
    }
    if aggregates.iter().any(|a| a.trim().is_empty()) {
        return Err(CommonError::invalid("aggregate expression must not be empty"));
    }
    let keys = groups.iter().map(|g| g.quoted()).collect::<Vec<_>>();
    let order = keys
        .iter()
        .map(|k| format!("{k} ASC NULLS LAST"))
        .collect::<Vec<_>>();
    Ok(format!(
        "SELECT {}, {} FROM {} GROUP BY {} ORDER BY {}",
        keys.join(", "),
        aggregates.join(", "),
        table.quoted(),
        keys.join(", "),
        order.join(", "),
    ))
}

pub fn calculated_column_query(table: &Identifier, expression: &str, alias: &Identifier) -> String {
    format!(
        "SELECT *, ({expression}) AS {} FROM {}",
        alias.quoted(),
        table.quoted()
    )
}

const POSITION: &str = "__strata_position";
const STATS_ALIAS: &str = "__strata_stats";

/// One query per column, combined with `UNION ALL`, producing rows in column order that match
/// [`stats::summary_stats_schema`]. Returns `None` when there are no columns.
pub fn summary_stats_query(
    table: &Identifier,
    columns: &[ColumnInfo],
) -> CommonResult<Option<String>> {
    let selects = columns
        .iter()
        .enumerate()
        .map(|(position, column)| {
            let name = Identifier::try_new(column.name.as_str())?;
            let c = name.quoted();
            let (mean, std) = if column.column_type.is_numeric() {
                (
                    format!("CAST(AVG({c}) AS DOUBLE)"),
                    format!("CAST(STDDEV_SAMP({c}) AS DOUBLE)"),
                )
            } else {
                (
                    "CAST(NULL AS DOUBLE)".to_string(),
                    "CAST(NULL AS DOUBLE)".to_string(),
                )
            };
            Ok(format!(
                "SELECT CAST('{name}' AS VARCHAR) AS \"{}\", \
                 CAST(COUNT({c}) AS BIGINT) AS \"{}\", \
                 CAST(COUNT(*) - COUNT({c}) AS BIGINT) AS \"{}\", \
                 CAST(MIN({c}) AS VARCHAR) AS \"{}\", \
                 CAST(MAX({c}) AS VARCHAR) AS \"{}\", \
                 {mean} AS \"{}\", {std} AS \"{}\", \
                 CAST({position} AS BIGINT) AS \"{POSITION}\" FROM {}",
                stats::COLUMN_NAME,
                stats::COUNT,
                stats::NULL_COUNT,
                stats::MIN,
                stats::MAX,
                stats::MEAN,
                stats::STD,
                table.quoted(),
            ))
        })
        .collect::<CommonResult<Vec<_>>>()?;
    if selects.is_empty() {
        return Ok(None);
    }
    let outputs = [
        stats::COLUMN_NAME,
        stats::COUNT,
        stats::NULL_COUNT,
        stats::MIN,
        stats::MAX,
        stats::MEAN,
        stats::STD,
    ]
    .map(|name| format!("\"{name}\""))
    .join(", ");
    // Union branches may be produced in any order.
    Ok(Some(format!(
        "SELECT {outputs} FROM ({}) AS \"{STATS_ALIAS}\" ORDER BY \"{POSITION}\"",
        selects.join(" UNION ALL ")
    )))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartAggregate {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl ChartAggregate {
    pub fn requires_numeric(&self) -> bool {
        matches!(self, ChartAggregate::Sum | ChartAggregate::Avg)
    }
}

impl FromStr for ChartAggregate {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "count" => Ok(ChartAggregate::Count),
            "sum" => Ok(ChartAggregate::Sum),
            "avg" | "mean" => Ok(ChartAggregate::Avg),
            "min" => Ok(ChartAggregate::Min),
            "max" => Ok(ChartAggregate::Max),
            _ => Err(CommonError::invalid(format!("unknown aggregate: {s}"))),
        }
    }
}

impl fmt::Display for ChartAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChartAggregate::Count => "count",
            ChartAggregate::Sum => "sum",
            ChartAggregate::Avg => "avg",
            ChartAggregate::Min => "min",
            ChartAggregate::Max => "max",
        };
        f.write_str(name)
    }
}

/// A `(label, value)` aggregation over the groups of one column, largest value first.
#[derive(Debug, Clone)]
pub struct ChartQuery {
    pub group_column: Identifier,
    pub value_column: Option<Identifier>,
    pub aggregate: ChartAggregate,
    pub limit: usize,
}

impl ChartQuery {
    pub fn to_sql(&self, table: &Identifier) -> CommonResult<String> {
        let value = match (self.aggregate, &self.value_column) {
            (ChartAggregate::Count, None) => "COUNT(*)".to_string(),
            (ChartAggregate::Count, Some(c)) => format!("COUNT({})", c.quoted()),
            (ChartAggregate::Sum, Some(c)) => format!("CAST(SUM({}) AS DOUBLE)", c.quoted()),
            (ChartAggregate::Avg, Some(c)) => format!("CAST(AVG({}) AS DOUBLE)", c.quoted()),
            (ChartAggregate::Min, Some(c)) => format!("MIN({})", c.quoted()),
            (ChartAggregate::Max, Some(c)) => format!("MAX({})", c.quoted()),
            (aggregate, None) => {
                return Err(CommonError::invalid(format!(
                    "aggregate {aggregate} requires a value column"
                )))
            }
        };
        let group = self.group_column.quoted();
        Ok(format!(
            "SELECT {group} AS \"label\", {value} AS \"value\" FROM {} \
             GROUP BY {group} \
             ORDER BY \"value\" DESC NULLS LAST, \"label\" ASC NULLS LAST LIMIT {}",
            table.quoted(),
            self.limit,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;

    fn column(name: &str, column_type: ColumnType) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            column_type,
            data_type: String::new(),
        }
    }

    #[test]
    fn test_summary_stats_query() {
        let table = Identifier::try_new("sales").unwrap();
        let sql = summary_stats_query(
            &table,
            &[
                column("amount", ColumnType::Float),
                column("region", ColumnType::String),
            ],
        )
        .unwrap()
        .unwrap();
        assert_eq!(sql.matches("UNION ALL").count(), 1);
        assert!(sql.contains(r#"STDDEV_SAMP("amount")"#));
        assert!(!sql.contains(r#"AVG("region")"#));
        assert!(summary_stats_query(&table, &[]).unwrap().is_none());
        assert!(summary_stats_query(&table, &[column("a b", ColumnType::String)]).is_err());
    }

    #[test]
    fn test_group_by_query() {
        let table = Identifier::try_new("sales").unwrap();
        let region = Identifier::try_new("region").unwrap();
        let aggregates = ["SUM(amount) AS total".to_string()];
        let sql = group_by_query(&table, &[region.clone()], &aggregates).unwrap();
        assert_eq!(
            sql,
            concat!(
                r#"SELECT "region", SUM(amount) AS total FROM "sales" "#,
                r#"GROUP BY "region" ORDER BY "region" ASC NULLS LAST"#
            )
        );
        assert!(group_by_query(&table, &[region.clone()], &[]).is_err());
        assert!(group_by_query(&table, &[], &["COUNT(*)".to_string()]).is_err());
        assert!(group_by_query(&table, &[region], &[" ".to_string()]).is_err());
    }

    #[test]
    fn test_chart_query() {
        let table = Identifier::try_new("sales").unwrap();
        let query = ChartQuery {
            group_column: Identifier::try_new("region").unwrap(),
            value_column: Some(Identifier::try_new("amount").unwrap()),
            aggregate: "SUM".parse().unwrap(),
            limit: 10,
        };
        let sql = query.to_sql(&table).unwrap();
        assert!(sql.starts_with(
            r#"SELECT "region" AS "label", CAST(SUM("amount") AS DOUBLE) AS "value""#
        ));
        assert!(sql.ends_with("LIMIT 10"));

        let query = ChartQuery {
            value_column: None,
            aggregate: ChartAggregate::Max,
            ..query
        };
        assert!(query.to_sql(&table).is_err());
        assert!("median".parse::<ChartAggregate>().is_err());
    }
}
