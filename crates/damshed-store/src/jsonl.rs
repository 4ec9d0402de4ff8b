//! Durable results store as a JSON-lines file.
//!
//! The first line is a header naming the tracked variables. Every further
//! line holds one `{dam_id, values}` record and is flushed as soon as it is
//! written, so an interrupted run keeps everything it computed. When an id
//! occurs on several lines the last one wins; `"values": null` marks the
//! dam's statistics as stale.
//!
//! A final line cut off mid-write is dropped on open and the file truncated
//! back to the last complete line. Malformed lines anywhere else are an error.

use damshed_core::error::{DamshedError, Result};
use damshed_core::models::{DamId, StatisticsRecord, TrackedVariables};
use damshed_core::ports::ResultsStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    variables: TrackedVariables,
}

#[derive(Debug, Serialize, Deserialize)]
struct Line {
    dam_id: DamId,
    values: Option<Vec<f64>>,
}

/// Results store backed by an append-only JSON-lines file
#[derive(Debug)]
pub struct JsonLinesResultsStore {
    path: PathBuf,
    variables: TrackedVariables,
    records: BTreeMap<DamId, StatisticsRecord>,
    written: HashSet<DamId>,
    file: File,
}

impl JsonLinesResultsStore {
    /// Open an existing store or create a new one for the given variables.
    ///
    /// An existing file must have been written for exactly the same ordered
    /// variable list, otherwise `StoreIncompatible` is returned.
    pub fn open(path: impl Into<PathBuf>, variables: TrackedVariables) -> Result<Self> {
        let path = path.into();

        let existing = if path.is_file() {
            Self::repair_tail(&path, fs::read_to_string(&path)?)?
        } else {
            String::new()
        };

        let records = if existing.trim().is_empty() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let header = serde_json::to_string(&Header { variables: variables.clone() })
                .map_err(|e| DamshedError::Serialization(e.to_string()))?;
            fs::write(&path, format!("{}\n", header))?;
            BTreeMap::new()
        } else {
            Self::parse(&path, &existing, &variables)?
        };

        let file = OpenOptions::new().append(true).open(&path)?;

        tracing::debug!(path = %path.display(), records = records.len(), "Opened results store");

        Ok(Self { path, variables, records, written: HashSet::new(), file })
    }

    /// Drop a torn final line, or terminate a complete one so appends start on a new line
    fn repair_tail(path: &Path, content: String) -> Result<String> {
        if content.is_empty() || content.ends_with('\n') {
            return Ok(content);
        }
        // A file without any newline is a torn header; strict parsing reports it
        let Some(end) = content.rfind('\n') else {
            return Ok(content);
        };

        let tail = &content[end + 1..];
        if tail.trim().is_empty() || serde_json::from_str::<Line>(tail).is_ok() {
            let mut file = OpenOptions::new().append(true).open(path)?;
            writeln!(file)?;
            return Ok(format!("{}\n", content));
        }

        tracing::warn!(
            path = %path.display(),
            bytes = tail.len(),
            "Dropping incomplete last line of results store"
        );
        let keep = end + 1;
        OpenOptions::new().write(true).open(path)?.set_len(keep as u64)?;
        let mut content = content;
        content.truncate(keep);
        Ok(content)
    }

    fn parse(
        path: &Path,
        content: &str,
        variables: &TrackedVariables,
    ) -> Result<BTreeMap<DamId, StatisticsRecord>> {
        let incompatible = |reason: String| DamshedError::StoreIncompatible {
            path: path.to_path_buf(),
            reason,
        };

        let mut lines = content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

        let (_, header_line) = lines
            .next()
            .ok_or_else(|| incompatible("missing header line".to_string()))?;
        let header: Header = serde_json::from_str(header_line)
            .map_err(|e| incompatible(format!("unreadable header: {}", e)))?;
        if &header.variables != variables {
            return Err(incompatible(format!(
                "store tracks [{}] but the run tracks [{}]",
                header.variables.names().join(", "),
                variables.names().join(", ")
            )));
        }

        let mut records = BTreeMap::new();
        for (number, raw) in lines {
            let line: Line = serde_json::from_str(raw)
                .map_err(|e| incompatible(format!("line {}: {}", number + 1, e)))?;
            let Some(values) = line.values else {
                records.remove(&line.dam_id);
                continue;
            };
            let record = StatisticsRecord::from_values(line.dam_id.as_str(), values, variables)
                .map_err(|e| incompatible(format!("line {}: {}", number + 1, e)))?;
            records.insert(line.dam_id, record);
        }

        Ok(records)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&mut self, line: &Line) -> Result<()> {
        let line = serde_json::to_string(line).map_err(|e| DamshedError::Serialization(e.to_string()))?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(())
    }
}

impl ResultsStore for JsonLinesResultsStore {
    fn variables(&self) -> &TrackedVariables {
        &self.variables
    }

    fn insert(&mut self, dam_id: &DamId, record: StatisticsRecord) -> Result<()> {
        if record.len() != self.variables.record_len() {
            return Err(DamshedError::ShapeMismatch {
                dam_id: dam_id.to_string(),
                expected: self.variables.record_len(),
                actual: record.len(),
            });
        }
        if record.values().iter().any(|v| !v.is_finite()) {
            return Err(DamshedError::Serialization(format!(
                "record for dam {} contains non-finite values",
                dam_id
            )));
        }
        if self.written.contains(dam_id) {
            return Err(DamshedError::DuplicateKey { dam_id: dam_id.to_string() });
        }

        self.append(&Line {
            dam_id: dam_id.clone(),
            values: Some(record.values().to_vec()),
        })?;

        self.written.insert(dam_id.clone());
        self.records.insert(dam_id.clone(), record);
        Ok(())
    }

    fn invalidate(&mut self, dam_id: &DamId) -> Result<bool> {
        if !self.records.contains_key(dam_id) {
            return Ok(false);
        }
        self.append(&Line { dam_id: dam_id.clone(), values: None })?;

        self.written.remove(dam_id);
        self.records.remove(dam_id);
        Ok(true)
    }

    fn get(&self, dam_id: &DamId) -> Option<&StatisticsRecord> {
        self.records.get(dam_id)
    }

    fn ids(&self) -> Vec<DamId> {
        self.records.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
