use std::io::{Cursor, Write};

use datafusion::arrow::array::RecordBatch;
use datafusion::arrow::datatypes::{Schema, SchemaRef};
use datafusion::arrow::ipc::reader::StreamReader;
use datafusion::arrow::ipc::writer::StreamWriter;
use log::debug;

use crate::error::{WireError, WireResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WireStats {
    pub num_rows: usize,
    pub num_batches: usize,
}

/// Writes record batches to an Arrow IPC stream, one message per batch.
pub struct WireEncoder<W: Write> {
    writer: StreamWriter<W>,
    schema: SchemaRef,
    stats: WireStats,
}

impl<W: Write> WireEncoder<W> {
    /// Writes the schema message immediately, so an encoder finished without
    /// any batches still produces a valid, empty stream.
    pub fn try_new(sink: W, schema: SchemaRef) -> WireResult<Self> {
        let writer = StreamWriter::try_new(sink, &schema)?;
        Ok(Self {
            writer,
            schema,
            stats: WireStats::default(),
        })
    }

    pub fn write(&mut self, batch: &RecordBatch) -> WireResult<()> {
        if batch.num_rows() == 0 {
            return Ok(());
        }
        if batch.num_columns() != self.schema.fields().len() {
            return Err(WireError::SchemaMismatch(format!(
                "expected {} columns, got {}",
                self.schema.fields().len(),
                batch.num_columns()
            )));
        }
        self.writer.write(batch)?;
        self.stats.num_rows += batch.num_rows();
        self.stats.num_batches += 1;
        Ok(())
    }

    pub fn finish(mut self) -> WireResult<(W, WireStats)> {
        self.writer.finish()?;
        let sink = self.writer.into_inner()?;
        Ok((sink, self.stats))
    }
}

impl WireEncoder<Vec<u8>> {
    pub fn into_payload(self) -> WireResult<WirePayload> {
        let (bytes, stats) = self.finish()?;
        debug!(
            "encoded {} rows in {} batches ({} bytes)",
            stats.num_rows,
            stats.num_batches,
            bytes.len()
        );
        Ok(WirePayload { bytes, stats })
    }
}

/// An encoded result held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirePayload {
    bytes: Vec<u8>,
    stats: WireStats,
}

impl WirePayload {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn num_rows(&self) -> usize {
        self.stats.num_rows
    }

    pub fn num_batches(&self) -> usize {
        self.stats.num_batches
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl AsRef<[u8]> for WirePayload {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Encodes a sequence of batches as they are produced.
/// Only one batch from the source is held at a time; the first error aborts the encoding.
pub fn encode_batches<I, E>(schema: SchemaRef, batches: I) -> WireResult<WirePayload>
where
    I: IntoIterator<Item = Result<RecordBatch, E>>,
    WireError: From<E>,
{
    let mut encoder = WireEncoder::try_new(Vec::new(), schema)?;
    for batch in batches {
        encoder.write(&batch?)?;
    }
    encoder.into_payload()
}

#[derive(Debug, Clone)]
pub struct DecodedBatches {
    pub schema: SchemaRef,
    pub batches: Vec<RecordBatch>,
}

impl DecodedBatches {
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn column_names(&self) -> Vec<String> {
        column_names(&self.schema)
    }
}

fn column_names(schema: &Schema) -> Vec<String> {
    schema.fields().iter().map(|f| f.name().clone()).collect()
}

/// Reads an Arrow IPC stream back into memory.
pub fn decode(bytes: &[u8]) -> WireResult<DecodedBatches> {
    let reader = StreamReader::try_new(Cursor::new(bytes), None)?;
    let schema = reader.schema();
    let batches = reader.collect::<Result<Vec<_>, _>>()?;
    Ok(DecodedBatches { schema, batches })
}
