use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use datafusion::arrow::array::RecordBatch;
use datafusion::arrow::compute::cast;
use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use datafusion::arrow::error::ArrowError;
use datafusion::arrow::ipc::reader::{FileReader, StreamReader};
use fastrace::local::LocalSpan;
use log::{debug, info};
use strata_common::format::FileFormat;
use strata_common::identifier::{quote_literal, Identifier};

use crate::error::{StoreError, StoreResult};
use crate::store::DuckStore;

/// DuckDB data chunks hold at most this many rows.
const APPEND_CHUNK_ROWS: usize = 2048;

type BatchIter = Box<dyn Iterator<Item = Result<RecordBatch, ArrowError>>>;

impl DuckStore {
    /// Imports a file into a new table. The table must not exist.
    pub fn import_file(
        &self,
        path: &Path,
        format: FileFormat,
        table: &Identifier,
    ) -> StoreResult<()> {
        let _span = LocalSpan::enter_with_local_parent("DuckStore::import_file");
        if !path.is_file() {
            return Err(StoreError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file not found: {}", path.display()),
            )));
        }
        let source = path
            .to_str()
            .ok_or_else(|| StoreError::invalid(format!("invalid path: {}", path.display())))?;
        match format {
            FileFormat::Csv | FileFormat::Tsv => {
                let delimiter = format
                    .delimiter()
                    .map(|d| char::from(d).to_string())
                    .unwrap_or_default();
                self.create_table_from(
                    table,
                    &format!(
                        "read_csv({}, auto_detect = true, header = true, delim = {})",
                        quote_literal(source),
                        quote_literal(&delimiter)
                    ),
                )?;
            }
            FileFormat::Parquet => {
                self.create_table_from(table, &format!("read_parquet({})", quote_literal(source)))?;
            }
            FileFormat::ArrowFile | FileFormat::ArrowStream => self.import_arrow(path, table)?,
        }
        info!("imported {} as {format} into table {table}", path.display());
        Ok(())
    }

    fn create_table_from(&self, table: &Identifier, reader: &str) -> StoreResult<()> {
        let sql = format!("CREATE TABLE {} AS SELECT * FROM {reader}", table.quoted());
        debug!("import: {sql}");
        self.connection().execute_batch(&sql)?;
        Ok(())
    }

    /// Reads the Arrow IPC file format, or the streaming format as a fallback,
    /// and appends the batches into a new table in one transaction.
    fn import_arrow(&self, path: &Path, table: &Identifier) -> StoreResult<()> {
        let file = File::open(path)?;
        let (schema, batches): (SchemaRef, BatchIter) = match FileReader::try_new(file, None) {
            Ok(reader) => (reader.schema(), Box::new(reader) as BatchIter),
            Err(e) => {
                debug!("not an Arrow IPC file, trying the stream format: {e}");
                let reader = StreamReader::try_new(BufReader::new(File::open(path)?), None)?;
                (reader.schema(), Box::new(reader) as BatchIter)
            }
        };
        let (target, column_types) = storage_schema(&schema)?;
        let columns = target
            .fields()
            .iter()
            .zip(column_types)
            .map(|(field, column_type)| {
                Identifier::try_new(field.name().as_str())
                    .map(|name| format!("{} {column_type}", name.quoted()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let ddl = format!("CREATE TABLE {} ({})", table.quoted(), columns.join(", "));
        debug!("import: {ddl}");

        self.in_transaction(|conn| {
            conn.execute_batch(&ddl)?;
            let mut appender = conn.appender(table.as_str())?;
            for batch in batches {
                let batch = normalize_batch(batch?, &target)?;
                let mut offset = 0;
                while offset < batch.num_rows() {
                    let length = APPEND_CHUNK_ROWS.min(batch.num_rows() - offset);
                    appender.append_record_batch(batch.slice(offset, length))?;
                    offset += length;
                }
            }
            appender.flush()?;
            Ok(())
        })
    }
}

/// Maps each field to a type the appender accepts, together with the DuckDB column type.
fn storage_schema(schema: &Schema) -> StoreResult<(SchemaRef, Vec<String>)> {
    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut column_types = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let (data_type, column_type) = storage_type(field.data_type()).ok_or_else(|| {
            StoreError::unsupported(format!(
                "unsupported Arrow type for column {}: {}",
                field.name(),
                field.data_type()
            ))
        })?;
        fields.push(Field::new(field.name(), data_type, true));
        column_types.push(column_type);
    }
    Ok((Arc::new(Schema::new(fields)), column_types))
}

fn storage_type(data_type: &DataType) -> Option<(DataType, String)> {
    let (target, column_type) = match data_type {
        DataType::Boolean => (DataType::Boolean, "BOOLEAN".to_string()),
        DataType::Int8 => (DataType::Int8, "TINYINT".to_string()),
        DataType::Int16 => (DataType::Int16, "SMALLINT".to_string()),
        DataType::Int32 => (DataType::Int32, "INTEGER".to_string()),
        DataType::Int64 => (DataType::Int64, "BIGINT".to_string()),
        DataType::UInt8 => (DataType::UInt8, "UTINYINT".to_string()),
        DataType::UInt16 => (DataType::UInt16, "USMALLINT".to_string()),
        DataType::UInt32 => (DataType::UInt32, "UINTEGER".to_string()),
        DataType::UInt64 => (DataType::UInt64, "UBIGINT".to_string()),
        DataType::Float16 | DataType::Float32 => (DataType::Float32, "FLOAT".to_string()),
        DataType::Float64 => (DataType::Float64, "DOUBLE".to_string()),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => {
            (DataType::Utf8, "VARCHAR".to_string())
        }
        DataType::Binary | DataType::LargeBinary | DataType::BinaryView => {
            (DataType::Binary, "BLOB".to_string())
        }
        DataType::Date32 | DataType::Date64 => (DataType::Date32, "DATE".to_string()),
        DataType::Timestamp(_, None) => (
            DataType::Timestamp(TimeUnit::Microsecond, None),
            "TIMESTAMP".to_string(),
        ),
        DataType::Timestamp(_, Some(tz)) => (
            DataType::Timestamp(TimeUnit::Microsecond, Some(tz.clone())),
            "TIMESTAMPTZ".to_string(),
        ),
        DataType::Decimal128(precision, scale) => (
            DataType::Decimal128(*precision, *scale),
            format!("DECIMAL({precision}, {scale})"),
        ),
        DataType::Dictionary(_, value) => return storage_type(value),
        _ => return None,
    };
    Some((target, column_type))
}

fn normalize_batch(batch: RecordBatch, target: &SchemaRef) -> StoreResult<RecordBatch> {
    let columns = batch
        .columns()
        .iter()
        .zip(target.fields())
        .map(|(array, field)| {
            if array.data_type() == field.data_type() {
                Ok(array.clone())
            } else {
                cast(array, field.data_type())
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RecordBatch::try_new(target.clone(), columns)?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use datafusion::arrow::array::{Float64Array, Int64Array, LargeStringArray};
    use datafusion::arrow::ipc::writer::{FileWriter, StreamWriter};
    use tempfile::NamedTempFile;

    use super::*;
    use crate::store::tests::{config, id};

    fn sample_batch(start: i64, len: usize) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("region", DataType::LargeUtf8, true),
            Field::new("amount", DataType::Float64, true),
        ]));
        let ids = (start..start + len as i64).collect::<Vec<_>>();
        let regions = ids.iter().map(|i| format!("r{}", i % 4)).collect::<Vec<_>>();
        let amounts = ids.iter().map(|i| *i as f64 / 2.0).collect::<Vec<_>>();
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(LargeStringArray::from(regions)),
                Arc::new(Float64Array::from(amounts)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_import_arrow_file() {
        let file = NamedTempFile::with_suffix(".arrow").unwrap();
        let batches = [sample_batch(0, 3000), sample_batch(3000, 10)];
        {
            let mut writer =
                FileWriter::try_new(file.reopen().unwrap(), &batches[0].schema()).unwrap();
            for batch in &batches {
                writer.write(batch).unwrap();
            }
            writer.finish().unwrap();
        }
        let store = DuckStore::open_in_memory(&config()).unwrap();
        store
            .import_file(file.path(), FileFormat::ArrowFile, &id("events"))
            .unwrap();
        assert_eq!(store.row_count(&id("events")).unwrap(), 3010);
        let schema = store.schema(&id("events")).unwrap();
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
        let last: i64 = store
            .connection()
            .query_row("SELECT id FROM events LIMIT 1 OFFSET 3009", [], |row| row.get(0))
            .unwrap();
        assert_eq!(last, 3009);
    }

    #[test]
    fn test_import_arrow_stream() {
        let file = NamedTempFile::with_suffix(".arrows").unwrap();
        {
            let batch = sample_batch(0, 5);
            let mut writer =
                StreamWriter::try_new(file.reopen().unwrap(), &batch.schema()).unwrap();
            writer.write(&batch).unwrap();
            writer.finish().unwrap();
        }
        let store = DuckStore::open_in_memory(&config()).unwrap();
        store
            .import_file(file.path(), FileFormat::ArrowStream, &id("events"))
            .unwrap();
        assert_eq!(store.row_count(&id("events")).unwrap(), 5);
    }

    #[test]
    fn test_import_tsv() {
        let mut file = NamedTempFile::with_suffix(".tsv").unwrap();
        writeln!(file, "name\tscore").unwrap();
        writeln!(file, "a, b\t1.5").unwrap();
        writeln!(file, "c\t2.5").unwrap();
        let store = DuckStore::open_in_memory(&config()).unwrap();
        store.import_file(file.path(), FileFormat::Tsv, &id("scores")).unwrap();
        let columns = store.columns(&id("scores")).unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(store.row_count(&id("scores")).unwrap(), 2);
    }

    #[test]
    fn test_import_missing_file() {
        let store = DuckStore::open_in_memory(&config()).unwrap();
        let result = store.import_file(Path::new("/nonexistent/x.csv"), FileFormat::Csv, &id("x"));
        assert!(matches!(result, Err(StoreError::IoError(_))));
    }

    #[test]
    fn test_import_existing_table() {
        let (store, csv) = crate::store::tests::store_with_people();
        let result = store.import_file(csv.path(), FileFormat::Csv, &id("people"));
        assert!(matches!(result, Err(StoreError::DuckDbError(_))));
    }

    #[test]
    fn test_storage_types() {
        assert_eq!(
            storage_type(&DataType::Utf8View),
            Some((DataType::Utf8, "VARCHAR".to_string()))
        );
        assert_eq!(
            storage_type(&DataType::Decimal128(10, 2)).map(|(_, t)| t),
            Some("DECIMAL(10, 2)".to_string())
        );
        assert_eq!(storage_type(&DataType::Null), None);
    }
}
