use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use datafusion::config::CsvOptions;
use datafusion::dataframe::{DataFrame, DataFrameWriteOptions};
use datafusion::execution::context::SQLOptions;
use datafusion::execution::session_state::SessionStateBuilder;
use datafusion::functions_window::expr_fn::row_number;
use datafusion::logical_expr::ident;
use datafusion::datasource::file_format::options::ArrowReadOptions;
use datafusion::prelude::{CsvReadOptions, ParquetReadOptions, SessionConfig, SessionContext};
use fastrace::local::LocalSpan;
use futures::StreamExt;
use log::{debug, info};
use strata_common::config::{ComputeConfig, RuntimeConfig};
use strata_common::format::{ExportFormat, FileFormat};
use strata_common::identifier::Identifier;
use strata_common::query::{
    calculated_column_query, filter_query, group_by_query, summary_stats_query, ChartQuery,
};
use strata_common::runtime::{RuntimeHandle, RuntimeManager};
use strata_common::stats::summary_stats_schema;
use strata_common::types::{columns_from_schema, ColumnInfo, SortKey};
use strata_filter::expr::to_expr;
use strata_filter::CompiledFilter;
use strata_wire::{WireEncoder, WirePayload};

use crate::error::{ComputeError, ComputeResult};

/// The row ordinal column added while sorting, so that equal keys keep their input order.
const ORDINAL_COLUMN: &str = "__strata_ordinal";

/// Plans lazy transforms over scanned files and executes them on a background runtime.
///
/// All methods are synchronous. They must not be called from within an asynchronous task.
pub struct ComputeEngine {
    ctx: SessionContext,
    handle: RuntimeHandle,
    // The runtime must outlive every plan executed through `handle`.
    _runtime: RuntimeManager,
    views: AtomicU64,
}

impl ComputeEngine {
    pub fn try_new(compute: &ComputeConfig, runtime: &RuntimeConfig) -> ComputeResult<Self> {
        let runtime = RuntimeManager::try_new(runtime)?;
        let config = SessionConfig::new()
            .with_target_partitions(compute.target_partitions)
            .with_batch_size(compute.batch_size)
            .with_information_schema(false)
            // Scanning a file in a single partition keeps its row order.
            .set_bool("datafusion.optimizer.repartition_file_scans", false);
        let state = SessionStateBuilder::new()
            .with_config(config)
            .with_default_features()
            .build();
        Ok(Self {
            ctx: SessionContext::new_with_state(state),
            handle: runtime.handle(),
            _runtime: runtime,
            views: AtomicU64::new(0),
        })
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }

    /// Opens a file as a lazy plan. Only the schema is read.
    pub fn scan(&self, path: &Path, format: FileFormat) -> ComputeResult<DataFrame> {
        let _span = LocalSpan::enter_with_local_parent("ComputeEngine::scan");
        if !path.is_file() {
            return Err(ComputeError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file not found: {}", path.display()),
            )));
        }
        let location = path
            .to_str()
            .ok_or_else(|| ComputeError::invalid(format!("invalid path: {}", path.display())))?;
        // The listing table only picks up files with the exact extension.
        let extension = path
            .extension()
            .and_then(|x| x.to_str())
            .map(|x| format!(".{x}"))
            .unwrap_or_default();
        let df = match format {
            FileFormat::Csv | FileFormat::Tsv => {
                let delimiter = format.delimiter().unwrap_or(b',');
                let options = CsvReadOptions::new()
                    .has_header(true)
                    .delimiter(delimiter)
                    .file_extension(&extension);
                self.block_on(self.ctx.read_csv(location, options))?
            }
            FileFormat::Parquet => {
                let options = ParquetReadOptions {
                    file_extension: &extension,
                    ..Default::default()
                };
                self.block_on(self.ctx.read_parquet(location, options))?
            }
            FileFormat::ArrowFile => {
                let options = ArrowReadOptions {
                    file_extension: &extension,
                    ..Default::default()
                };
                self.block_on(self.ctx.read_arrow(location, options))?
            }
            FileFormat::ArrowStream => {
                return Err(ComputeError::unsupported(
                    "the Arrow IPC stream format cannot be scanned lazily, import it instead",
                ))
            }
        };
        info!("scanned {} as {format}", path.display());
        Ok(df)
    }

    pub fn columns(&self, df: &DataFrame) -> Vec<ColumnInfo> {
        columns_from_schema(df.schema().as_arrow())
    }

    /// Counts the rows with one aggregation pass over the plan.
    pub fn count(&self, df: &DataFrame) -> ComputeResult<u64> {
        let _span = LocalSpan::enter_with_local_parent("ComputeEngine::count");
        let count = self.block_on(df.clone().count())?;
        u64::try_from(count).map_err(|e| ComputeError::internal(e.to_string()))
    }

    /// Slices the plan to the window before executing it.
    pub fn chunk(&self, df: &DataFrame, offset: usize, limit: usize) -> ComputeResult<WirePayload> {
        let _span = LocalSpan::enter_with_local_parent("ComputeEngine::chunk");
        self.encode(df.clone().limit(offset, Some(limit))?)
    }

    /// Executes the plan and encodes its output one batch at a time.
    fn encode(&self, df: DataFrame) -> ComputeResult<WirePayload> {
        let mut stream = self.block_on(df.execute_stream())?;
        let mut encoder = WireEncoder::try_new(Vec::new(), stream.schema())?;
        while let Some(batch) = self.block_on(stream.next()) {
            encoder.write(&batch?)?;
        }
        Ok(encoder.into_payload()?)
    }

    /// Sorts by the keys, then by the input position, with nulls last.
    pub fn sort(&self, df: &DataFrame, keys: &[SortKey]) -> ComputeResult<DataFrame> {
        if keys.is_empty() {
            return Err(ComputeError::invalid("at least one sort column is required"));
        }
        let mut order = keys
            .iter()
            .map(|key| ident(key.column.as_str()).sort(!key.descending, false))
            .collect::<Vec<_>>();
        order.push(ident(ORDINAL_COLUMN).sort(true, false));
        let df = df
            .clone()
            .window(vec![row_number().alias(ORDINAL_COLUMN)])?
            .sort(order)?
            .drop_columns(&[ORDINAL_COLUMN])?;
        Ok(df)
    }

    pub fn filter(&self, df: &DataFrame, filter: &CompiledFilter) -> ComputeResult<DataFrame> {
        match to_expr(filter) {
            Some(predicate) => Ok(df.clone().filter(predicate)?),
            None => Ok(df.clone()),
        }
    }

    pub fn filter_sql(&self, df: &DataFrame, predicate: &str) -> ComputeResult<DataFrame> {
        if predicate.trim().is_empty() {
            return Err(ComputeError::invalid("filter predicate must not be empty"));
        }
        self.query_view(df, |view| Ok(filter_query(view, predicate)))
    }

    pub fn group_by(
        &self,
        df: &DataFrame,
        groups: &[Identifier],
        aggregates: &[String],
    ) -> ComputeResult<DataFrame> {
        self.query_view(df, |view| Ok(group_by_query(view, groups, aggregates)?))
    }

    pub fn add_column(
        &self,
        df: &DataFrame,
        expression: &str,
        alias: &Identifier,
    ) -> ComputeResult<DataFrame> {
        if expression.trim().is_empty() {
            return Err(ComputeError::invalid("column expression must not be empty"));
        }
        self.query_view(df, |view| Ok(calculated_column_query(view, expression, alias)))
    }

    pub fn summary_stats(&self, df: &DataFrame) -> ComputeResult<WirePayload> {
        let _span = LocalSpan::enter_with_local_parent("ComputeEngine::summary_stats");
        let columns = self.columns(df);
        if columns.is_empty() {
            return Ok(WireEncoder::try_new(Vec::new(), summary_stats_schema())?.into_payload()?);
        }
        let stats = self.query_view(df, |view| {
            summary_stats_query(view, &columns)?
                .ok_or_else(|| ComputeError::internal("no columns for summary statistics"))
        })?;
        self.encode(stats)
    }

    pub fn chart(&self, df: &DataFrame, query: &ChartQuery) -> ComputeResult<WirePayload> {
        let chart = self.query_view(df, |view| Ok(query.to_sql(view)?))?;
        self.encode(chart)
    }

    /// Writes the plan output directly to a single file.
    pub fn export(&self, df: &DataFrame, path: &Path, format: ExportFormat) -> ComputeResult<()> {
        let _span = LocalSpan::enter_with_local_parent("ComputeEngine::export");
        let location = path
            .to_str()
            .ok_or_else(|| ComputeError::invalid(format!("invalid path: {}", path.display())))?;
        let options = DataFrameWriteOptions::new().with_single_file_output(true);
        match format {
            ExportFormat::Csv => {
                let csv = CsvOptions::default().with_has_header(true);
                self.block_on(df.clone().write_csv(location, options, Some(csv)))?;
            }
            ExportFormat::Parquet => {
                self.block_on(df.clone().write_parquet(location, options, None))?;
            }
        }
        info!("exported plan as {format} to {}", path.display());
        Ok(())
    }

    /// Plans a SQL query against the data frame registered under a temporary name.
    /// The resulting plan keeps a reference to the data frame after the name is removed.
    fn query_view(
        &self,
        df: &DataFrame,
        query: impl FnOnce(&Identifier) -> ComputeResult<String>,
    ) -> ComputeResult<DataFrame> {
        let id = self.views.fetch_add(1, Ordering::Relaxed);
        let view = Identifier::try_new(format!("__strata_view_{id}"))?;
        self.ctx.register_table(view.as_str(), df.clone().into_view())?;
        let result = query(&view).and_then(|sql| {
            debug!("plan: {sql}");
            let options = SQLOptions::new()
                .with_allow_ddl(false)
                .with_allow_dml(false)
                .with_allow_statements(false);
            Ok(self.block_on(self.ctx.sql_with_options(&sql, options))?)
        });
        self.ctx.deregister_table(view.as_str())?;
        result
    }
}
