// JSON-lines output sink

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use pulse_engine::sink::{stamped, tail};
use pulse_engine::{ColorRecord, CommitReceipt, OutputSink, ProcessingType, PulseError};

use crate::error::IoError;

/// Appends one JSON record per line. The file is created on first append;
/// reading a file that does not exist yet yields no records.
pub struct JsonLinesSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_batch(&self, records: &[ColorRecord]) -> Result<(), IoError> {
        let _guard = self.write_lock.lock();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| IoError::file(parent, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| IoError::file(&self.path, e))?;
        let mut writer = BufWriter::new(file);

        for record in records {
            serde_json::to_writer(&mut writer, record).map_err(|e| IoError::Json {
                path: self.path.clone(),
                line: None,
                message: e.to_string(),
            })?;
            writer
                .write_all(b"\n")
                .map_err(|e| IoError::file(&self.path, e))?;
        }
        writer.flush().map_err(|e| IoError::file(&self.path, e))
    }

    fn read_records(&self) -> Result<Vec<ColorRecord>, IoError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(IoError::file(&self.path, e)),
        };

        let mut records = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| IoError::file(&self.path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| IoError::Json {
                path: self.path.clone(),
                line: Some(idx + 1),
                message: e.to_string(),
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

impl OutputSink for JsonLinesSink {
    fn append(
        &self,
        records: &[ColorRecord],
        processing_type: ProcessingType,
    ) -> Result<CommitReceipt, PulseError> {
        let committed_at = Utc::now();
        let batch = stamped(records, processing_type, committed_at);
        self.write_batch(&batch)
            .map_err(|e| PulseError::Sink(e.to_string()))?;

        log::info!(
            "appended {} {processing_type} record(s) to {}",
            batch.len(),
            self.path.display()
        );
        Ok(CommitReceipt {
            processing_type,
            records_written: batch.len(),
            committed_at,
        })
    }

    fn read_all(&self, limit: Option<usize>) -> Result<Vec<ColorRecord>, PulseError> {
        let records = self
            .read_records()
            .map_err(|e| PulseError::Sink(e.to_string()))?;
        Ok(tail(records, limit))
    }
}
