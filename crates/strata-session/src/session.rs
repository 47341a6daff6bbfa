use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use datafusion::dataframe::DataFrame;
use fastrace::collector::SpanContext;
use fastrace::Span;
use log::{debug, info, warn};
use serde::Serialize;
use strata_common::config::AppConfig;
use strata_common::format::{ExportFormat, FileFormat};
use strata_common::identifier::Identifier;
use strata_common::query::{ChartAggregate, ChartQuery};
use strata_common::types::{ColumnInfo, SortKey};
use strata_compute::error::ComputeError;
use strata_compute::ComputeEngine;
use strata_filter::{compile, FilterCondition, FilterLogic, FilterSpec};
use strata_store::error::StoreError;
use strata_store::DuckStore;
use strata_telemetry::recorder::record_error;
use strata_wire::WirePayload;

use crate::error::{SessionError, SessionResult};
use crate::registry::{DatasetEntry, DatasetKind, DatasetRegistry, Derivation};

/// A snapshot of one dataset's metadata.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetInfo {
    pub name: String,
    pub kind: DatasetKind,
    pub columns: Vec<ColumnInfo>,
    pub row_count: u64,
    /// An estimate for persistent datasets. Transient datasets are not sized.
    pub size_bytes: Option<u64>,
}

/// The backing of a dataset, detached from the registry for the duration of one call.
enum Source {
    Table(Identifier),
    Plan(DataFrame),
}

struct SessionState {
    /// `None` only while a project switch is in progress or after the scratch store failed to open.
    store: Option<DuckStore>,
    registry: DatasetRegistry<DataFrame>,
}

impl SessionState {
    fn store(&self) -> SessionResult<&DuckStore> {
        self.store
            .as_ref()
            .ok_or_else(|| SessionError::internal("no store is available"))
    }

    fn resolve(&self, name: &str) -> SessionResult<(String, Source)> {
        let (registered, entry) = self
            .registry
            .get(name)
            .ok_or_else(|| SessionError::not_found(format!("dataset {name}")))?;
        let source = match entry {
            DatasetEntry::Persistent { table } => Source::Table(table.clone()),
            DatasetEntry::Transient { plan } => Source::Plan(plan.clone()),
        };
        Ok((registered.to_string(), source))
    }
}

/// The single entry point to the dataset engine.
///
/// A session owns the store connection and the dataset registry. Every operation
/// runs inside one exclusive critical section, so a session can be shared between
/// threads behind an [`Arc`](std::sync::Arc). Operations block until the engines finish.
pub struct Session {
    config: AppConfig,
    compute: ComputeEngine,
    state: Mutex<SessionState>,
}

impl Session {
    /// Starts a session without a project, backed by an in-memory scratch store.
    pub fn try_new(config: AppConfig) -> SessionResult<Self> {
        let compute = ComputeEngine::try_new(&config.compute, &config.runtime)?;
        let store = DuckStore::open_in_memory(&config.store)?;
        Ok(Self {
            config,
            compute,
            state: Mutex::new(SessionState {
                store: Some(store),
                registry: DatasetRegistry::new(),
            }),
        })
    }

    /// Starts a session with the configuration from the defaults and the environment.
    pub fn try_default() -> SessionResult<Self> {
        Self::try_new(AppConfig::load()?)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The compute engine, for building plans to pass to [`Session::register_plan`].
    pub fn compute(&self) -> &ComputeEngine {
        &self.compute
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| {
            warn!("recovering session state after a failure in a previous operation");
            self.state.clear_poison();
            e.into_inner()
        })
    }

    fn run<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut SessionState) -> SessionResult<T>,
    ) -> SessionResult<T> {
        let span = Span::root(operation, SpanContext::random());
        let _guard = span.set_local_parent();
        let mut state = self.lock();
        let result = f(&mut state);
        record_error(&span, &result);
        if let Err(e) = &result {
            debug!("{operation} failed: {e}");
        }
        result
    }

    // Projects

    /// Creates a new project file and switches to it.
    pub fn new_project(&self, path: impl AsRef<Path>) -> SessionResult<()> {
        let path = path.as_ref();
        self.run("Session::new_project", |state| {
            if path.exists() {
                return Err(SessionError::already_exists(format!(
                    "project file {}",
                    path.display()
                )));
            }
            ensure_parent_directory(path)?;
            self.switch_project(state, Some(path))?;
            Ok(())
        })
    }

    /// Switches to an existing project file and returns the names of its tables.
    pub fn open_project(&self, path: impl AsRef<Path>) -> SessionResult<Vec<String>> {
        let path = path.as_ref();
        self.run("Session::open_project", |state| {
            if !path.is_file() {
                return Err(SessionError::not_found(format!(
                    "project file {}",
                    path.display()
                )));
            }
            self.switch_project(state, Some(path))?;
            Ok(state.registry.names_of(DatasetKind::Persistent))
        })
    }

    /// Closes the current project and returns to the scratch store.
    pub fn close_project(&self) -> SessionResult<()> {
        self.run("Session::close_project", |state| self.switch_project(state, None))
    }

    pub fn project_path(&self) -> Option<PathBuf> {
        self.lock()
            .store
            .as_ref()
            .and_then(|s| s.path())
            .map(Path::to_path_buf)
    }

    /// Closes the current store before opening the next one, since a database file
    /// can only be opened once per process. Datasets of both kinds are discarded.
    /// If the next store cannot be opened, the session falls back to the scratch store.
    fn switch_project(&self, state: &mut SessionState, path: Option<&Path>) -> SessionResult<()> {
        if let Some(store) = state.store.take() {
            if let Err(e) = store.close() {
                warn!("failed to close store: {e}");
            }
        }
        state.registry.clear();

        let opened = match path {
            Some(path) => DuckStore::open(path, &self.config.store)
                .and_then(|store| Ok((store.list_tables()?, store)))
                .map_err(|e| {
                    SessionError::IoError(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("cannot open project {}: {e}", path.display()),
                    ))
                }),
            None => DuckStore::open_in_memory(&self.config.store)
                .and_then(|store| Ok((store.list_tables()?, store)))
                .map_err(SessionError::from),
        };
        match opened {
            Ok((tables, store)) => {
                state.registry.sync_tables(&tables);
                state.store = Some(store);
                match path {
                    Some(path) => info!(
                        "switched to project {} with {} tables",
                        path.display(),
                        tables.len()
                    ),
                    None => info!("switched to the scratch store"),
                }
                Ok(())
            }
            Err(e) => {
                warn!("falling back to the scratch store: {e}");
                state.store = match DuckStore::open_in_memory(&self.config.store) {
                    Ok(store) => Some(store),
                    Err(scratch) => {
                        warn!("failed to open the scratch store: {scratch}");
                        None
                    }
                };
                Err(e)
            }
        }
    }

    // Datasets

    /// Imports a file into a new persistent dataset and returns its name.
    pub fn import_file(&self, path: impl AsRef<Path>, name: Option<&str>) -> SessionResult<String> {
        let path = path.as_ref();
        self.run("Session::import_file", |state| {
            let format = FileFormat::from_path(path)?;
            ensure_file(path)?;
            let name = match name {
                Some(name) => {
                    if state.registry.contains(name) {
                        return Err(SessionError::already_exists(format!("dataset {name}")));
                    }
                    name.to_string()
                }
                None => state.registry.unique_name(&file_stem(path)),
            };
            let table = Identifier::try_new(name.as_str())?;
            state.store()?.import_file(path, format, &table)?;
            state
                .registry
                .insert(name.clone(), DatasetEntry::Persistent { table })?;
            info!("imported {} as dataset {name}", path.display());
            Ok(name)
        })
    }

    /// Opens a file as a new transient dataset and returns its name. No rows are read.
    pub fn scan_file(&self, path: impl AsRef<Path>) -> SessionResult<String> {
        let path = path.as_ref();
        self.run("Session::scan_file", |state| {
            let format = FileFormat::from_path(path)?;
            ensure_file(path)?;
            let plan = self.compute.scan(path, format)?;
            let name = state.registry.unique_name(&file_stem(path));
            state
                .registry
                .insert(name.clone(), DatasetEntry::Transient { plan })?;
            info!("scanned {} as dataset {name}", path.display());
            Ok(name)
        })
    }

    /// Registers a plan built elsewhere as a transient dataset.
    pub fn register_plan(&self, name: &str, plan: DataFrame) -> SessionResult<()> {
        self.run("Session::register_plan", |state| {
            Identifier::try_new(name)?;
            state
                .registry
                .insert(name, DatasetEntry::Transient { plan })?;
            info!("registered plan as dataset {name}");
            Ok(())
        })
    }

    /// Persistent dataset names followed by transient dataset names.
    pub fn list_datasets(&self) -> Vec<String> {
        self.lock().registry.names()
    }

    /// The tables in the store catalog.
    pub fn list_tables(&self) -> SessionResult<Vec<String>> {
        self.run("Session::list_tables", |state| Ok(state.store()?.list_tables()?))
    }

    pub fn get_row_count(&self, name: &str) -> SessionResult<u64> {
        self.run("Session::get_row_count", |state| {
            let (_, source) = state.resolve(name)?;
            self.row_count(state, &source)
        })
    }

    fn row_count(&self, state: &SessionState, source: &Source) -> SessionResult<u64> {
        match source {
            Source::Table(table) => Ok(state.store()?.row_count(table)?),
            Source::Plan(plan) => Ok(self.compute.count(plan)?),
        }
    }

    fn columns(&self, state: &SessionState, source: &Source) -> SessionResult<Vec<ColumnInfo>> {
        match source {
            Source::Table(table) => Ok(state.store()?.columns(table)?),
            Source::Plan(plan) => Ok(self.compute.columns(plan)),
        }
    }

    pub fn dataset_info(&self, name: &str) -> SessionResult<DatasetInfo> {
        self.run("Session::dataset_info", |state| {
            let (name, source) = state.resolve(name)?;
            let columns = self.columns(state, &source)?;
            let row_count = self.row_count(state, &source)?;
            let (kind, size_bytes) = match &source {
                Source::Table(table) => (
                    DatasetKind::Persistent,
                    Some(state.store()?.estimated_size(table)?),
                ),
                Source::Plan(_) => (DatasetKind::Transient, None),
            };
            Ok(DatasetInfo {
                name,
                kind,
                columns,
                row_count,
                size_bytes,
            })
        })
    }

    /// Returns up to `limit` rows starting at `offset` in the dataset's natural order.
    /// An offset past the end yields an empty result. Without a limit, the configured
    /// default page size applies.
    pub fn get_chunk(
        &self,
        name: &str,
        offset: u64,
        limit: Option<usize>,
    ) -> SessionResult<WirePayload> {
        let limit = limit.unwrap_or(self.config.session.default_page_size);
        self.run("Session::get_chunk", |state| {
            let (_, source) = state.resolve(name)?;
            match source {
                Source::Table(table) => Ok(state.store()?.chunk(&table, offset, limit as u64)?),
                Source::Plan(plan) => {
                    let offset = usize::try_from(offset).map_err(|_| {
                        SessionError::invalid(format!("offset out of range: {offset}"))
                    })?;
                    Ok(self.compute.chunk(&plan, offset, limit)?)
                }
            }
        })
    }

    pub fn get_preview(&self, name: &str, limit: Option<usize>) -> SessionResult<WirePayload> {
        self.get_chunk(name, 0, limit)
    }

    pub fn remove_dataset(&self, name: &str) -> SessionResult<bool> {
        self.run("Session::remove_dataset", |state| {
            let Ok((name, source)) = state.resolve(name) else {
                return Ok(false);
            };
            if let Source::Table(table) = &source {
                state.store()?.drop_table(table)?;
            }
            state.registry.remove(&name);
            info!("removed dataset {name}");
            Ok(true)
        })
    }

    // SQL

    /// Runs a query in the store and keeps its result as a new persistent dataset.
    pub fn execute_sql(&self, sql: &str) -> SessionResult<String> {
        self.run("Session::execute_sql", |state| {
            if sql.trim().is_empty() {
                return Err(SessionError::invalid("SQL must not be empty"));
            }
            let name = state.registry.unique_name("sql_result");
            let table = Identifier::try_new(name.as_str())?;
            state.store()?.create_table_as(&table, sql)?;
            state
                .registry
                .insert(name.clone(), DatasetEntry::Persistent { table })?;
            Ok(name)
        })
    }

    /// Runs a statement in the store and returns its result without keeping it.
    pub fn query_to_ipc(&self, sql: &str) -> SessionResult<WirePayload> {
        self.run("Session::query_to_ipc", |state| {
            if sql.trim().is_empty() {
                return Err(SessionError::invalid("SQL must not be empty"));
            }
            let store = state.store()?;
            let payload = store.query_to_payload(sql)?;
            // The statement may have created or dropped tables.
            let tables = store.list_tables()?;
            state.registry.sync_tables(&tables);
            Ok(payload)
        })
    }

    // Transforms

    pub fn sort_dataset(
        &self,
        name: &str,
        columns: &[&str],
        descending: &[bool],
    ) -> SessionResult<String> {
        self.run("Session::sort_dataset", |state| {
            if columns.is_empty() {
                return Err(SessionError::invalid("at least one sort column is required"));
            }
            if columns.len() != descending.len() {
                return Err(SessionError::invalid(format!(
                    "{} sort columns but {} sort directions",
                    columns.len(),
                    descending.len()
                )));
            }
            let (source_name, source) = state.resolve(name)?;
            let schema = self.columns(state, &source)?;
            let keys = columns
                .iter()
                .zip(descending)
                .map(|(column, descending)| {
                    Ok(SortKey {
                        column: resolve_column(&schema, column)?,
                        descending: *descending,
                    })
                })
                .collect::<SessionResult<Vec<_>>>()?;
            self.derive(
                state,
                &source_name,
                source,
                Derivation::Sorted,
                |store, from, to| store.sort(from, to, &keys),
                |compute, plan| compute.sort(plan, &keys),
            )
        })
    }

    /// Filters with a raw SQL predicate.
    pub fn filter_sql(&self, name: &str, predicate: &str) -> SessionResult<String> {
        self.run("Session::filter_sql", |state| {
            if predicate.trim().is_empty() {
                return Err(SessionError::invalid("filter predicate must not be empty"));
            }
            let (source_name, source) = state.resolve(name)?;
            self.derive(
                state,
                &source_name,
                source,
                Derivation::Filtered,
                |store, from, to| store.filter_sql(from, to, predicate),
                |compute, plan| compute.filter_sql(plan, predicate),
            )
        })
    }

    /// Filters with typed conditions. Values are never spliced into SQL text.
    /// An empty condition list produces an unfiltered copy.
    pub fn filter_structured(
        &self,
        name: &str,
        conditions: &[FilterCondition],
        logic: &str,
    ) -> SessionResult<String> {
        self.run("Session::filter_structured", |state| {
            let logic = logic.parse::<FilterLogic>()?;
            let (source_name, source) = state.resolve(name)?;
            let schema = self.columns(state, &source)?;
            let filter = compile(&FilterSpec::new(conditions.to_vec(), logic), &schema)?;
            let derivation = if filter.is_empty() {
                Derivation::Copied
            } else {
                Derivation::Filtered
            };
            self.derive(
                state,
                &source_name,
                source,
                derivation,
                |store, from, to| store.filter(from, to, &filter),
                |compute, plan| compute.filter(plan, &filter),
            )
        })
    }

    /// Groups by the columns with SQL aggregate expressions such as `SUM(amount) AS total`.
    pub fn group_by(
        &self,
        name: &str,
        group_columns: &[&str],
        aggregates: &[&str],
    ) -> SessionResult<String> {
        self.run("Session::group_by", |state| {
            if group_columns.is_empty() {
                return Err(SessionError::invalid("at least one group column is required"));
            }
            if aggregates.is_empty() {
                return Err(SessionError::invalid("at least one aggregate expression is required"));
            }
            let (source_name, source) = state.resolve(name)?;
            let schema = self.columns(state, &source)?;
            let groups = group_columns
                .iter()
                .map(|c| resolve_column(&schema, c))
                .collect::<SessionResult<Vec<_>>>()?;
            let aggregates = aggregates.iter().map(|a| a.to_string()).collect::<Vec<_>>();
            self.derive(
                state,
                &source_name,
                source,
                Derivation::Grouped,
                |store, from, to| store.group_by(from, to, &groups, &aggregates),
                |compute, plan| compute.group_by(plan, &groups, &aggregates),
            )
        })
    }

    /// Appends a column computed by a SQL expression.
    pub fn add_calculated_column(
        &self,
        name: &str,
        expression: &str,
        alias: &str,
    ) -> SessionResult<String> {
        self.run("Session::add_calculated_column", |state| {
            if expression.trim().is_empty() {
                return Err(SessionError::invalid("column expression must not be empty"));
            }
            let alias = Identifier::try_new(alias)?;
            let (source_name, source) = state.resolve(name)?;
            let schema = self.columns(state, &source)?;
            if schema
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(alias.as_str()))
            {
                return Err(SessionError::already_exists(format!(
                    "column {alias} in dataset {source_name}"
                )));
            }
            self.derive(
                state,
                &source_name,
                source,
                Derivation::Calculated,
                |store, from, to| store.add_column(from, to, expression, &alias),
                |compute, plan| compute.add_column(plan, expression, &alias),
            )
        })
    }

    /// Produces a new dataset of the same kind as the source and registers it last,
    /// so a failed transform leaves the registry unchanged.
    fn derive<S, C>(
        &self,
        state: &mut SessionState,
        source_name: &str,
        source: Source,
        derivation: Derivation,
        on_table: S,
        on_plan: C,
    ) -> SessionResult<String>
    where
        S: FnOnce(&DuckStore, &Identifier, &Identifier) -> Result<(), StoreError>,
        C: FnOnce(&ComputeEngine, &DataFrame) -> Result<DataFrame, ComputeError>,
    {
        let name = state.registry.derived_name(source_name, derivation);
        let entry = match source {
            Source::Table(table) => {
                let target = Identifier::try_new(name.as_str())?;
                on_table(state.store()?, &table, &target)?;
                DatasetEntry::Persistent { table: target }
            }
            Source::Plan(plan) => DatasetEntry::Transient {
                plan: on_plan(&self.compute, &plan)?,
            },
        };
        state.registry.insert(name.clone(), entry)?;
        info!("derived dataset {name} from {source_name}");
        Ok(name)
    }

    // Results

    pub fn summary_stats(&self, name: &str) -> SessionResult<WirePayload> {
        self.run("Session::summary_stats", |state| {
            let (_, source) = state.resolve(name)?;
            match source {
                Source::Table(table) => Ok(state.store()?.summary_stats(&table)?),
                Source::Plan(plan) => Ok(self.compute.summary_stats(&plan)?),
            }
        })
    }

    /// Aggregates one column per group of another, largest value first.
    /// `aggregate` is one of `count`, `sum`, `avg`, `min` or `max`.
    pub fn aggregate_for_chart(
        &self,
        name: &str,
        group_column: &str,
        value_column: Option<&str>,
        aggregate: &str,
        limit: usize,
    ) -> SessionResult<WirePayload> {
        self.run("Session::aggregate_for_chart", |state| {
            let aggregate = aggregate.parse::<ChartAggregate>()?;
            let (_, source) = state.resolve(name)?;
            let schema = self.columns(state, &source)?;
            let group_column = resolve_column(&schema, group_column)?;
            let value_column = value_column
                .map(|c| resolve_column(&schema, c))
                .transpose()?;
            if aggregate.requires_numeric() {
                let numeric = value_column.as_ref().is_some_and(|c| {
                    schema
                        .iter()
                        .any(|info| info.name == c.as_str() && info.column_type.is_numeric())
                });
                if !numeric {
                    return Err(SessionError::invalid(format!(
                        "aggregate {aggregate} requires a numeric value column"
                    )));
                }
            }
            let query = ChartQuery {
                group_column,
                value_column,
                aggregate,
                limit,
            };
            match source {
                Source::Table(table) => Ok(state.store()?.chart(&table, &query)?),
                Source::Plan(plan) => Ok(self.compute.chart(&plan, &query)?),
            }
        })
    }

    pub fn export_csv(&self, name: &str, path: impl AsRef<Path>) -> SessionResult<()> {
        self.export(name, path.as_ref(), ExportFormat::Csv)
    }

    pub fn export_parquet(&self, name: &str, path: impl AsRef<Path>) -> SessionResult<()> {
        self.export(name, path.as_ref(), ExportFormat::Parquet)
    }

    fn export(&self, name: &str, path: &Path, format: ExportFormat) -> SessionResult<()> {
        self.run("Session::export", |state| {
            let (_, source) = state.resolve(name)?;
            ensure_parent_directory(path)?;
            match source {
                Source::Table(table) => state.store()?.export(&table, path, format)?,
                Source::Plan(plan) => self.compute.export(&plan, path, format)?,
            }
            Ok(())
        })
    }
}

fn resolve_column(columns: &[ColumnInfo], name: &str) -> SessionResult<Identifier> {
    let column = columns
        .iter()
        .find(|c| c.name == name)
        .ok_or_else(|| SessionError::not_found(format!("column {name}")))?;
    Ok(Identifier::try_new(column.name.as_str())?)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn ensure_file(path: &Path) -> SessionResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(SessionError::IoError(io::Error::new(
            io::ErrorKind::NotFound,
            format!("file not found: {}", path.display()),
        )))
    }
}

fn ensure_parent_directory(path: &Path) -> SessionResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(SessionError::IoError(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {}", parent.display()),
            )))
        }
        _ => Ok(()),
    }
}
