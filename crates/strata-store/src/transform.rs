//! Derivations that materialize a new table from an existing one.
//! The source table is never modified.

use duckdb::params_from_iter;
use duckdb::types::Value;
use fastrace::local::LocalSpan;
use log::debug;
use strata_common::identifier::Identifier;
use strata_common::query::{
    calculated_column_query, filter_query, group_by_query, summary_stats_query, ChartQuery,
};
use strata_common::stats::summary_stats_schema;
use strata_common::types::SortKey;
use strata_filter::sql::to_sql;
use strata_filter::{CompiledFilter, FilterValue};
use strata_wire::error::WireError;
use strata_wire::{encode_batches, WirePayload};

use crate::error::{StoreError, StoreResult};
use crate::store::DuckStore;

impl DuckStore {
    /// Materializes the result of a single query as a new table.
    pub fn create_table_as(&self, target: &Identifier, query: &str) -> StoreResult<()> {
        let _span = LocalSpan::enter_with_local_parent("DuckStore::create_table_as");
        let sql = format!("CREATE TABLE {} AS {query}", target.quoted());
        debug!("create table: {sql}");
        self.connection().execute(&sql, [])?;
        Ok(())
    }

    pub fn copy_table(&self, source: &Identifier, target: &Identifier) -> StoreResult<()> {
        self.create_table_as(target, &format!("SELECT * FROM {}", source.quoted()))
    }

    /// Sorts with the row id as the final key, so rows with equal keys keep their order.
    pub fn sort(
        &self,
        source: &Identifier,
        target: &Identifier,
        keys: &[SortKey],
    ) -> StoreResult<()> {
        if keys.is_empty() {
            return Err(StoreError::invalid("at least one sort column is required"));
        }
        let order = keys
            .iter()
            .map(|key| {
                let direction = if key.descending { "DESC" } else { "ASC" };
                format!("{} {direction} NULLS LAST", key.column.quoted())
            })
            .collect::<Vec<_>>();
        let query = format!(
            "SELECT * FROM {} ORDER BY {}, rowid",
            source.quoted(),
            order.join(", ")
        );
        self.create_table_as(target, &query)
    }

    pub fn filter_sql(
        &self,
        source: &Identifier,
        target: &Identifier,
        predicate: &str,
    ) -> StoreResult<()> {
        if predicate.trim().is_empty() {
            return Err(StoreError::invalid("filter predicate must not be empty"));
        }
        self.create_table_as(target, &filter_query(source, predicate))
    }

    /// Applies a compiled filter with every value bound as a parameter.
    pub fn filter(
        &self,
        source: &Identifier,
        target: &Identifier,
        filter: &CompiledFilter,
    ) -> StoreResult<()> {
        let _span = LocalSpan::enter_with_local_parent("DuckStore::filter");
        let Some(predicate) = to_sql(filter) else {
            return self.copy_table(source, target);
        };
        let create = format!(
            "CREATE TABLE {} AS SELECT * FROM {} LIMIT 0",
            target.quoted(),
            source.quoted()
        );
        let insert = format!(
            "INSERT INTO {} SELECT * FROM {} WHERE {}",
            target.quoted(),
            source.quoted(),
            predicate.sql
        );
        debug!("filter: {insert} with {} parameters", predicate.params.len());
        self.in_transaction(|conn| {
            conn.execute(&create, [])?;
            conn.execute(&insert, params_from_iter(predicate.params.iter().map(sql_value)))?;
            Ok(())
        })
    }

    pub fn group_by(
        &self,
        source: &Identifier,
        target: &Identifier,
        groups: &[Identifier],
        aggregates: &[String],
    ) -> StoreResult<()> {
        self.create_table_as(target, &group_by_query(source, groups, aggregates)?)
    }

    pub fn add_column(
        &self,
        source: &Identifier,
        target: &Identifier,
        expression: &str,
        alias: &Identifier,
    ) -> StoreResult<()> {
        if expression.trim().is_empty() {
            return Err(StoreError::invalid("column expression must not be empty"));
        }
        self.create_table_as(target, &calculated_column_query(source, expression, alias))
    }

    pub fn summary_stats(&self, table: &Identifier) -> StoreResult<WirePayload> {
        let _span = LocalSpan::enter_with_local_parent("DuckStore::summary_stats");
        match summary_stats_query(table, &self.columns(table)?)? {
            Some(sql) => self.query_to_payload(&sql),
            None => Ok(encode_batches(
                summary_stats_schema(),
                std::iter::empty::<Result<_, WireError>>(),
            )?),
        }
    }

    pub fn chart(&self, table: &Identifier, query: &ChartQuery) -> StoreResult<WirePayload> {
        self.query_to_payload(&query.to_sql(table)?)
    }
}

fn sql_value(value: &FilterValue) -> Value {
    match value {
        FilterValue::Integer(v) => Value::BigInt(*v),
        FilterValue::Float(v) => Value::Double(*v),
        FilterValue::Text(v) => Value::Text(v.clone()),
    }
}
