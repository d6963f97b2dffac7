use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use sqlx::{postgres::PgPoolCopyExt, PgPool};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::metrics_consts::{ROWS_WRITTEN, WRITE_FAILURES};
use crate::types::CompletedEvent;

pub const DEFAULT_TABLE: &str = "rsync_events";

const COLUMNS: [&str; 11] = [
    "timestamp",
    "sentbytes",
    "receivedbytes",
    "totalbytes",
    "module",
    "user",
    "endtime",
    "geohash",
    "hosthash",
    "hostname",
    "clientip",
];

const COPY_NULL: &str = r"\N";

// Rough size of one encoded row, to avoid too many buffer reallocations
const ESTIMATED_RECORD_SIZE: usize = 160;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("{0:?} is not a valid table name")]
    InvalidTableName(String),
    #[error("failed to encode {0} column: {1}")]
    CSVError(&'static str, csv::Error),
    #[error("failed to flush row buffer: {0}")]
    FlushError(#[from] std::io::Error),
    #[error("bulk copy failed with: {0}")]
    CopyError(#[from] sqlx::Error),
}

/// Destination of a `COPY ... FROM STDIN` statement.
#[async_trait]
pub trait CopySink {
    /// Streams `data` into the statement, returning the number of rows copied.
    async fn copy_in(&self, statement: &str, data: &[u8]) -> Result<u64, sqlx::Error>;
}

#[async_trait]
impl CopySink for PgPool {
    async fn copy_in(&self, statement: &str, data: &[u8]) -> Result<u64, sqlx::Error> {
        let mut stream = self.copy_in_raw(statement).await?;
        stream.send(data).await?;
        stream.finish().await
    }
}

pub type CopySinkRef = Arc<dyn CopySink + Send + Sync>;

/// Loads completed events into Postgres with a single COPY per call.
pub struct BulkWriter {
    sink: CopySinkRef,
    statement: String,
    persist_hostnames: bool,
}

impl BulkWriter {
    pub fn new(
        sink: CopySinkRef,
        table: &str,
        persist_hostnames: bool,
    ) -> Result<Self, WriteError> {
        if !is_valid_table_name(table) {
            return Err(WriteError::InvalidTableName(table.to_string()));
        }

        let columns = COLUMNS
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let statement = format!(
            r"COPY {table} ({columns}) FROM STDIN WITH (FORMAT csv, DELIMITER E'\t', NULL '{COPY_NULL}')"
        );

        Ok(Self {
            sink,
            statement,
            persist_hostnames,
        })
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Writes the events, logging and swallowing any failure. Returns the number
    /// of rows written, which is 0 both for an empty batch and for a failed one.
    pub async fn write(&self, events: &[CompletedEvent]) -> u64 {
        match self.try_write(events).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(events = events.len(), "failed to bulk load rsync events: {}", e);
                counter!(WRITE_FAILURES).increment(1);
                0
            }
        }
    }

    /// Like `write`, but hands the failure back to the caller.
    pub async fn try_write(&self, events: &[CompletedEvent]) -> Result<u64, WriteError> {
        if events.is_empty() {
            debug!("no rsync events to write");
            return Ok(0);
        }

        let buffer = self.encode(events)?;
        let rows = self.sink.copy_in(&self.statement, &buffer).await?;

        info!(rows, "bulk loaded rsync events");
        counter!(ROWS_WRITTEN).increment(rows);
        Ok(rows)
    }

    /// Tab-delimited rows in the column order of the COPY statement.
    pub fn encode(&self, events: &[CompletedEvent]) -> Result<Vec<u8>, WriteError> {
        let buffer = Vec::with_capacity(events.len() * ESTIMATED_RECORD_SIZE);
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .delimiter(b'\t')
            .from_writer(buffer);

        for event in events {
            let hostname = if self.persist_hostnames {
                event.hostname.as_str()
            } else {
                COPY_NULL
            };
            let row: [(&'static str, &str); 11] = [
                ("timestamp", event.timestamp.as_str()),
                ("sentbytes", event.sentbytes.as_str()),
                ("receivedbytes", event.receivedbytes.as_str()),
                ("totalbytes", event.totalbytes.as_str()),
                ("module", event.module.as_str()),
                ("user", event.user.as_str()),
                ("endtime", event.endtime.as_str()),
                ("geohash", event.geohash.as_str()),
                ("hosthash", event.hosthash.as_str()),
                ("hostname", hostname),
                ("clientip", event.clientip.as_str()),
            ];

            for (column, value) in row {
                csv_writer
                    .write_field(value)
                    .map_err(|e| WriteError::CSVError(column, e))?;
            }
            csv_writer
                .write_record(None::<&[u8]>)
                .map_err(|e| WriteError::CSVError("csv_row", e))?; // terminate row
        }

        csv_writer
            .into_inner()
            .map_err(|e| WriteError::FlushError(e.into_error()))
    }
}

fn is_valid_table_name(table: &str) -> bool {
    !table.is_empty()
        && table.split('.').all(|part| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !part.starts_with(|c: char| c.is_ascii_digit())
        })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::types::Direction;

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(String, Vec<u8>)>>,
        fail: bool,
    }

    #[async_trait]
    impl CopySink for RecordingSink {
        async fn copy_in(&self, statement: &str, data: &[u8]) -> Result<u64, sqlx::Error> {
            self.calls
                .lock()
                .unwrap()
                .push((statement.to_string(), data.to_vec()));
            if self.fail {
                return Err(sqlx::Error::PoolTimedOut);
            }
            Ok(data.iter().filter(|b| **b == b'\n').count() as u64)
        }
    }

    fn event(hostname: &str, user: &str) -> CompletedEvent {
        CompletedEvent {
            timestamp: "2023-01-05 12:00:00".to_string(),
            endtime: "2023-01-05 12:03:10".to_string(),
            pid: "42".to_string(),
            direction: Direction::Download,
            module: "pub".to_string(),
            directory: "iso".to_string(),
            user: user.to_string(),
            hostname: hostname.to_string(),
            clientip: "1.2.3.4".to_string(),
            sentbytes: "100".to_string(),
            receivedbytes: "50".to_string(),
            totalbytes: "1000".to_string(),
            geohash: "u173zt5p3u1v".to_string(),
            city: "Amsterdam".to_string(),
            hosthash: "abcdefghij".to_string(),
        }
    }

    #[test]
    fn test_statement_lists_columns_in_order() {
        let writer = BulkWriter::new(Arc::new(RecordingSink::default()), "rsync_events", false)
            .unwrap();

        assert_eq!(
            writer.statement(),
            "COPY rsync_events (\"timestamp\", \"sentbytes\", \"receivedbytes\", \"totalbytes\", \
             \"module\", \"user\", \"endtime\", \"geohash\", \"hosthash\", \"hostname\", \"clientip\") \
             FROM STDIN WITH (FORMAT csv, DELIMITER E'\\t', NULL '\\N')"
        );
    }

    #[test]
    fn test_invalid_table_names_are_rejected() {
        for table in ["", "rsync events", "events; drop table x", "1events", "a..b"] {
            let result = BulkWriter::new(Arc::new(RecordingSink::default()), table, false);
            assert!(
                matches!(result, Err(WriteError::InvalidTableName(_))),
                "table: {table:?}"
            );
        }
        assert!(BulkWriter::new(Arc::new(RecordingSink::default()), "stats.rsync_events", false).is_ok());
    }

    #[test]
    fn test_encode_rows() {
        let writer = BulkWriter::new(Arc::new(RecordingSink::default()), DEFAULT_TABLE, true)
            .unwrap();

        let encoded = writer.encode(&[event("client.example.org", "alice")]).unwrap();

        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            "2023-01-05 12:00:00\t100\t50\t1000\tpub\talice\t2023-01-05 12:03:10\t\
             u173zt5p3u1v\tabcdefghij\tclient.example.org\t1.2.3.4\n"
        );
    }

    #[test]
    fn test_encode_hides_hostnames_unless_persisted() {
        let writer = BulkWriter::new(Arc::new(RecordingSink::default()), DEFAULT_TABLE, false)
            .unwrap();

        let encoded = String::from_utf8(writer.encode(&[event("client.example.org", "")]).unwrap())
            .unwrap();

        assert!(!encoded.contains("client.example.org"));
        let fields: Vec<&str> = encoded.trim_end_matches('\n').split('\t').collect();
        assert_eq!(fields.len(), COLUMNS.len());
        assert_eq!(fields[5], "");
        assert_eq!(fields[9], COPY_NULL);
    }

    #[test]
    fn test_encode_quotes_awkward_values() {
        let writer = BulkWriter::new(Arc::new(RecordingSink::default()), DEFAULT_TABLE, true)
            .unwrap();

        let encoded = String::from_utf8(writer.encode(&[event("odd\thost", "bob\"s")]).unwrap())
            .unwrap();

        assert!(encoded.contains("\"odd\thost\""));
        assert!(encoded.contains("\"bob\"\"s\""));
    }

    #[tokio::test]
    async fn test_empty_batch_skips_database() {
        let sink = Arc::new(RecordingSink::default());
        let writer = BulkWriter::new(sink.clone(), DEFAULT_TABLE, false).unwrap();

        assert_eq!(writer.write(&[]).await, 0);
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_issues_single_copy() {
        let sink = Arc::new(RecordingSink::default());
        let writer = BulkWriter::new(sink.clone(), DEFAULT_TABLE, false).unwrap();

        let rows = writer
            .write(&[event("a.example.org", "a"), event("b.example.org", "b")])
            .await;

        assert_eq!(rows, 2);
        let calls = sink.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, writer.statement());
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });
        let writer = BulkWriter::new(sink.clone(), DEFAULT_TABLE, false).unwrap();
        let events = [event("a.example.org", "a")];

        assert_eq!(writer.write(&events).await, 0);
        assert!(matches!(
            writer.try_write(&events).await,
            Err(WriteError::CopyError(_))
        ));
        assert_eq!(sink.calls.lock().unwrap().len(), 2);
    }
}
