use std::path::{Path, PathBuf};

use datafusion::arrow::datatypes::SchemaRef;
use duckdb::Connection;
use fastrace::local::LocalSpan;
use log::{debug, info, warn};
use strata_common::config::StoreConfig;
use strata_common::format::ExportFormat;
use strata_common::identifier::{quote_literal, Identifier};
use strata_common::types::{columns_from_schema, estimated_width, ColumnInfo};
use strata_wire::error::WireError;
use strata_wire::{encode_batches, WirePayload};

use crate::error::{StoreError, StoreResult};

pub struct DuckStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl DuckStore {
    /// Opens the database file, creating it if it does not exist.
    pub fn open(path: &Path, config: &StoreConfig) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        configure(&conn, config)?;
        info!("opened store at {}", path.display());
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory(config: &StoreConfig) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        configure(&conn, config)?;
        debug!("opened in-memory scratch store");
        Ok(Self { conn, path: None })
    }

    /// The database file, or `None` for the in-memory scratch store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn close(self) -> StoreResult<()> {
        let path = self.path;
        self.conn.close().map_err(|(_, e)| StoreError::from(e))?;
        if let Some(path) = path {
            info!("closed store at {}", path.display());
        }
        Ok(())
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Runs `f` inside a transaction that is rolled back if `f` fails.
    pub(crate) fn in_transaction<T>(
        &self,
        f: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        match f(&self.conn) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    warn!("failed to roll back transaction: {rollback}");
                }
                Err(e)
            }
        }
    }

    /// The base tables in the catalog, sorted by name.
    pub fn list_tables(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'main' AND table_catalog = current_database() \
             AND table_type = 'BASE TABLE' ORDER BY table_name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    pub fn schema(&self, table: &Identifier) -> StoreResult<SchemaRef> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {} LIMIT 0", table.quoted()))?;
        let batches = stmt.query_arrow([])?;
        Ok(batches.get_schema())
    }

    pub fn columns(&self, table: &Identifier) -> StoreResult<Vec<ColumnInfo>> {
        let schema = self.schema(table)?;
        Ok(columns_from_schema(&schema))
    }

    pub fn row_count(&self, table: &Identifier) -> StoreResult<u64> {
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.quoted()),
            [],
            |row| row.get::<_, i64>(0),
        )?;
        u64::try_from(count).map_err(|e| StoreError::internal(e.to_string()))
    }

    /// An estimate of the table size from its column types and row count.
    pub fn estimated_size(&self, table: &Identifier) -> StoreResult<u64> {
        let row_width: u64 = self
            .schema(table)?
            .fields()
            .iter()
            .map(|f| estimated_width(f.data_type()))
            .sum();
        Ok(self.row_count(table)? * row_width)
    }

    /// Reads a window of rows in insertion order.
    pub fn chunk(&self, table: &Identifier, offset: u64, limit: u64) -> StoreResult<WirePayload> {
        let sql = format!(
            "SELECT * FROM {} LIMIT {limit} OFFSET {offset}",
            table.quoted()
        );
        self.query_to_payload(&sql)
    }

    /// Runs a single statement and encodes its result one batch at a time.
    pub fn query_to_payload(&self, sql: &str) -> StoreResult<WirePayload> {
        let _span = LocalSpan::enter_with_local_parent("DuckStore::query_to_payload");
        debug!("query: {sql}");
        let mut stmt = self.conn.prepare(sql)?;
        let batches = stmt.query_arrow([])?;
        let schema = batches.get_schema();
        Ok(encode_batches(schema, batches.map(Ok::<_, WireError>))?)
    }

    pub fn drop_table(&self, table: &Identifier) -> StoreResult<()> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {}", table.quoted()))?;
        info!("dropped table {table}");
        Ok(())
    }

    pub fn export(&self, table: &Identifier, path: &Path, format: ExportFormat) -> StoreResult<()> {
        let _span = LocalSpan::enter_with_local_parent("DuckStore::export");
        let target = path
            .to_str()
            .ok_or_else(|| StoreError::invalid(format!("invalid path: {}", path.display())))?;
        let options = match format {
            ExportFormat::Csv => "(FORMAT CSV, HEADER TRUE)",
            ExportFormat::Parquet => "(FORMAT PARQUET)",
        };
        let sql = format!(
            "COPY {} TO {} {options}",
            table.quoted(),
            quote_literal(target)
        );
        debug!("export: {sql}");
        self.conn.execute_batch(&sql)?;
        info!("exported table {table} as {format} to {}", path.display());
        Ok(())
    }
}

fn configure(conn: &Connection, config: &StoreConfig) -> StoreResult<()> {
    let mut sql = format!(
        "SET enable_progress_bar = {}; SET preserve_insertion_order = {};",
        config.enable_progress_bar, config.preserve_insertion_order
    );
    if config.threads > 0 {
        sql.push_str(&format!(" SET threads = {};", config.threads));
    }
    if !config.memory_limit.is_empty() {
        sql.push_str(&format!(
            " SET memory_limit = {};",
            quote_literal(&config.memory_limit)
        ));
    }
    conn.execute_batch(&sql)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use strata_common::config::AppConfig;
    use strata_wire::decode;
    use tempfile::NamedTempFile;

    use super::*;

    pub(crate) fn config() -> StoreConfig {
        AppConfig::defaults().unwrap().store
    }

    pub(crate) fn id(name: &str) -> Identifier {
        Identifier::try_new(name).unwrap()
    }

    pub(crate) fn people_csv() -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "name,age,city,score").unwrap();
        writeln!(file, "Alice,30,New York,95.5").unwrap();
        writeln!(file, "Bob,25,San Francisco,88.0").unwrap();
        writeln!(file, "Charlie,35,Chicago,72.3").unwrap();
        writeln!(file, "Diana,28,Boston,91.1").unwrap();
        writeln!(file, "Eve,32,Seattle,85.7").unwrap();
        file
    }

    pub(crate) fn store_with_people() -> (DuckStore, NamedTempFile) {
        let store = DuckStore::open_in_memory(&config()).unwrap();
        let csv = people_csv();
        store
            .import_file(csv.path(), strata_common::format::FileFormat::Csv, &id("people"))
            .unwrap();
        (store, csv)
    }

    #[test]
    fn test_catalog() {
        let (store, _csv) = store_with_people();
        assert_eq!(store.list_tables().unwrap(), vec!["people".to_string()]);

        let columns = store.columns(&id("people")).unwrap();
        let names = columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["name", "age", "city", "score"]);
        assert!(columns[1].column_type.is_numeric());
        assert!(columns[0].column_type.is_string());

        assert_eq!(store.row_count(&id("people")).unwrap(), 5);
        assert!(store.estimated_size(&id("people")).unwrap() > 0);
    }

    #[test]
    fn test_chunks() {
        let (store, _csv) = store_with_people();
        let cases = [(0, 2, 2), (2, 2, 2), (4, 2, 1), (5, 2, 0), (100, 10, 0)];
        for (offset, limit, expected) in cases {
            let payload = store.chunk(&id("people"), offset, limit).unwrap();
            let decoded = decode(payload.as_bytes()).unwrap();
            assert_eq!(decoded.num_rows(), expected, "offset {offset} limit {limit}");
            assert_eq!(decoded.column_names().len(), 4);
        }
    }

    #[test]
    fn test_query_to_payload() {
        let (store, _csv) = store_with_people();
        let payload = store
            .query_to_payload("SELECT name FROM people WHERE age > 28 ORDER BY name")
            .unwrap();
        let decoded = decode(payload.as_bytes()).unwrap();
        assert_eq!(decoded.num_rows(), 3);
        assert_eq!(decoded.column_names(), vec!["name".to_string()]);
        assert!(matches!(
            store.query_to_payload("SELEC nonsense"),
            Err(StoreError::DuckDbError(_))
        ));
    }

    #[test]
    fn test_drop_table() {
        let (store, _csv) = store_with_people();
        store.drop_table(&id("people")).unwrap();
        assert!(store.list_tables().unwrap().is_empty());
        store.drop_table(&id("people")).unwrap();
    }

    #[test]
    fn test_export_csv() {
        let (store, _csv) = store_with_people();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("it's.csv");
        store.export(&id("people"), &out, ExportFormat::Csv).unwrap();
        let content = std::fs::read_to_string(&out).unwrap();
        assert!(content.starts_with("name,age,city,score"));
        assert!(content.contains("Alice"));
        assert_eq!(content.lines().count(), 6);
    }

    #[test]
    fn test_persistent_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.duckdb");
        let csv = people_csv();
        {
            let store = DuckStore::open(&path, &config()).unwrap();
            store
                .import_file(csv.path(), strata_common::format::FileFormat::Csv, &id("people"))
                .unwrap();
            store.close().unwrap();
        }
        let store = DuckStore::open(&path, &config()).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        assert_eq!(store.list_tables().unwrap(), vec!["people".to_string()]);
        assert_eq!(store.row_count(&id("people")).unwrap(), 5);
    }

    #[test]
    fn test_rollback_on_error() {
        let (store, _csv) = store_with_people();
        let result: StoreResult<()> = store.in_transaction(|conn| {
            conn.execute_batch("CREATE TABLE scratch AS SELECT * FROM people")?;
            Err(StoreError::internal("abort"))
        });
        assert!(result.is_err());
        assert_eq!(store.list_tables().unwrap(), vec!["people".to_string()]);
    }
}
