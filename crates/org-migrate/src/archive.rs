//! Archive codec: a zip container of JSON table dumps.
//!
//! Each entry is a self-describing record
//! `{ "table": ..., "columns": [...], "rows": [[...], ...] }` named after
//! the file it was exported to (e.g. `cp_owner.json`). Column order and row
//! order are preserved exactly; creation-ordered pool/entitlement chains
//! depend on it. Binary values appear as base64 text (see [`crate::value`]).
//!
//! Entry absence is part of the protocol: the depth-indexed
//! pool/entitlement sequence ends at the first missing entry, so the reader
//! exposes a typed [`ArchiveReader::try_read_entry`] rather than overloading
//! a not-found error.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{MigrateError, Result};

/// One exported table: ordered columns and positionally aligned rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDump {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl TableDump {
    /// Structural validation shared by both ends of the codec.
    ///
    /// Enforces: non-empty table name, unique column names, and
    /// `len(row) == len(columns)` for every row.
    pub fn validate(&self, entry: &str) -> Result<()> {
        if self.table.is_empty() {
            return Err(MigrateError::malformed(entry, "missing table name"));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.as_str()) {
                return Err(MigrateError::malformed(
                    entry,
                    format!("duplicate column: {}", column),
                ));
            }
        }

        for (idx, row) in self.rows.iter().enumerate() {
            if row.len() != self.columns.len() {
                return Err(MigrateError::malformed(
                    entry,
                    format!(
                        "row {} has {} values for {} columns",
                        idx,
                        row.len(),
                        self.columns.len()
                    ),
                ));
            }
        }

        Ok(())
    }
}

/// Writes table dumps into a new compressed archive.
pub struct ArchiveWriter {
    zip: ZipWriter<File>,
    written: HashSet<String>,
}

impl ArchiveWriter {
    /// Create an archive at `path`, truncating any existing file.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            zip: ZipWriter::new(file),
            written: HashSet::new(),
        })
    }

    /// Serialize one dump as a named entry. Each name may be written
    /// exactly once per archive.
    pub fn write_entry(&mut self, name: &str, dump: &TableDump) -> Result<()> {
        dump.validate(name)?;

        if !self.written.insert(name.to_string()) {
            return Err(MigrateError::malformed(name, "entry written twice"));
        }

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip.start_file(name, options)?;
        let payload = serde_json::to_vec(dump)?;
        self.zip.write_all(&payload)?;

        debug!(entry = name, rows = dump.rows.len(), table = %dump.table, "exported entry");
        Ok(())
    }

    /// Finish the archive, flushing the central directory.
    pub fn finish(self) -> Result<()> {
        self.zip.finish()?;
        Ok(())
    }
}

/// Reads table dumps out of an existing archive.
pub struct ArchiveReader {
    zip: ZipArchive<File>,
}

impl ArchiveReader {
    /// Open an archive for reading.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            zip: ZipArchive::new(file)?,
        })
    }

    /// Read a named entry, `Ok(None)` when absent.
    ///
    /// Absence here is a protocol signal, not corruption; the recursive
    /// chain import loops until the first missing pool entry.
    pub fn try_read_entry(&mut self, name: &str) -> Result<Option<TableDump>> {
        let mut raw = Vec::new();
        match self.zip.by_name(name) {
            Ok(mut entry) => {
                entry.read_to_end(&mut raw)?;
            }
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let dump: TableDump = serde_json::from_slice(&raw)
            .map_err(|e| MigrateError::malformed(name, e.to_string()))?;
        dump.validate(name)?;
        Ok(Some(dump))
    }

    /// Read a named entry that must exist.
    pub fn read_entry(&mut self, name: &str) -> Result<TableDump> {
        self.try_read_entry(name)?
            .ok_or_else(|| MigrateError::EntryMissing(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_dump() -> TableDump {
        TableDump {
            table: "cp_owner".into(),
            columns: vec!["id".into(), "account".into()],
            rows: vec![vec![json!("o1"), json!("acme")]],
        }
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.zip");

        let mut writer = ArchiveWriter::create(&path).unwrap();
        writer.write_entry("cp_owner.json", &sample_dump()).unwrap();
        writer.finish().unwrap();

        let mut reader = ArchiveReader::open(&path).unwrap();
        let dump = reader.read_entry("cp_owner.json").unwrap();
        assert_eq!(dump.table, "cp_owner");
        assert_eq!(dump.columns, vec!["id", "account"]);
        assert_eq!(dump.rows, vec![vec![json!("o1"), json!("acme")]]);
    }

    #[test]
    fn test_absent_entry_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.zip");

        let mut writer = ArchiveWriter::create(&path).unwrap();
        writer.write_entry("cp_pool-0.json", &sample_dump()).unwrap();
        writer.finish().unwrap();

        let mut reader = ArchiveReader::open(&path).unwrap();
        assert!(reader.try_read_entry("cp_pool-1.json").unwrap().is_none());
        assert!(matches!(
            reader.read_entry("cp_pool-1.json"),
            Err(MigrateError::EntryMissing(_))
        ));
    }

    #[test]
    fn test_duplicate_entry_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.zip");

        let mut writer = ArchiveWriter::create(&path).unwrap();
        writer.write_entry("cp_owner.json", &sample_dump()).unwrap();
        let err = writer.write_entry("cp_owner.json", &sample_dump()).unwrap_err();
        assert!(matches!(err, MigrateError::MalformedEntry { .. }));
    }

    #[test]
    fn test_ragged_row_rejected() {
        let dump = TableDump {
            table: "cp_pool".into(),
            columns: vec!["id".into(), "owner_id".into()],
            rows: vec![vec![json!("p1")]],
        };
        assert!(dump.validate("cp_pool-0.json").is_err());
    }

    #[test]
    fn test_missing_table_name_rejected() {
        let dump = TableDump {
            table: String::new(),
            columns: vec![],
            rows: vec![],
        };
        assert!(dump.validate("broken.json").is_err());
    }

    #[test]
    fn test_row_order_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.zip");

        let rows: Vec<Vec<Value>> = (0..50).map(|i| vec![json!(i)]).collect();
        let dump = TableDump {
            table: "cp_entitlement".into(),
            columns: vec!["id".into()],
            rows: rows.clone(),
        };

        let mut writer = ArchiveWriter::create(&path).unwrap();
        writer.write_entry("cp_entitlement-0.json", &dump).unwrap();
        writer.finish().unwrap();

        let mut reader = ArchiveReader::open(&path).unwrap();
        let back = reader.read_entry("cp_entitlement-0.json").unwrap();
        assert_eq!(back.rows, rows);
    }
}
