//! Per-collection change log. Every mutation is appended as one JSON line
//! and synced before it is applied in memory; opening the store replays the
//! log over the last snapshot and folds it back in.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::warn;

use trawl_core::storage::ChunkRecord;
use trawl_core::Result;

use crate::store::storage;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum Entry {
    Upsert { records: Vec<ChunkRecord> },
    DeleteDocument { document_id: String },
}

pub(crate) struct Journal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
}

pub(crate) struct JournalWriter {
    file: BufWriter<File>,
    len: u64,
}

impl Journal {
    /// Opens `path` for appending, creating it when missing.
    pub fn open(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path).map_err(storage)?;
        let len = file.metadata().map_err(storage)?.len();
        Ok(Self { path, writer: Mutex::new(JournalWriter { file: BufWriter::new(file), len }) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Held across one append-then-apply step so memory follows log order.
    pub fn lock(&self) -> MutexGuard<'_, JournalWriter> {
        self.writer.lock()
    }
}

impl JournalWriter {
    pub fn append(&mut self, entry: &Entry) -> Result<()> {
        let mut line = serde_json::to_vec(entry).map_err(storage)?;
        line.push(b'\n');
        self.file.write_all(&line).map_err(storage)?;
        self.file.flush().map_err(storage)?;
        self.file.get_ref().sync_data().map_err(storage)?;
        self.len += line.len() as u64;
        Ok(())
    }

    /// Bytes currently in the log.
    pub fn bytes(&self) -> u64 {
        self.len
    }

    /// Empties the log once its entries are part of a snapshot.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.flush().map_err(storage)?;
        let file = self.file.get_ref();
        file.set_len(0).map_err(storage)?;
        file.sync_data().map_err(storage)?;
        self.len = 0;
        Ok(())
    }
}

/// Entries logged at `path`, oldest first. A line that does not parse ends
/// the replay: it is the tail of an interrupted append.
pub(crate) fn replay(path: &Path) -> Result<Vec<Entry>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(storage(e)),
    };
    let mut entries = Vec::new();
    for (n, line) in BufReader::new(file).split(b'\n').enumerate() {
        let line = line.map_err(storage)?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(path = %path.display(), line = n + 1, error = %e, "journal cut short, stopping replay");
                break;
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn replay_stops_at_a_torn_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.log");
        let journal = Journal::open(path.clone()).unwrap();
        {
            let mut log = journal.lock();
            log.append(&Entry::DeleteDocument { document_id: "a".into() }).unwrap();
            log.append(&Entry::DeleteDocument { document_id: "b".into() }).unwrap();
            assert_eq!(log.bytes(), fs::metadata(&path).unwrap().len());
        }
        let mut raw = fs::read(&path).unwrap();
        raw.extend_from_slice(b"{\"op\":\"delete_doc");
        fs::write(&path, raw).unwrap();

        let entries = replay(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(&entries[1], Entry::DeleteDocument { document_id } if document_id == "b"));

        journal.lock().truncate().unwrap();
        assert!(replay(&path).unwrap().is_empty());
        assert!(replay(&dir.path().join("missing.log")).unwrap().is_empty());
    }
}
