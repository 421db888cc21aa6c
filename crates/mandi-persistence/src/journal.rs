//! Append-only JSON Lines journal.
//!
//! Each line is one complete JSON entry, written in append mode and flushed
//! immediately. A torn write only damages the last line; replay skips lines
//! that do not parse.

use crate::error::PersistenceResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// JSON Lines journal of `T` entries.
pub struct JsonLinesJournal<T> {
    path: PathBuf,
    writer: BufWriter<File>,
    entries_written: usize,
    _entry: PhantomData<fn(T)>,
}

impl<T> JsonLinesJournal<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Open (or create) the journal at `path` in append mode.
    pub fn open(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), "Opened journal (append mode)");

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            entries_written: 0,
            _entry: PhantomData,
        })
    }

    /// Read every intact entry in file order. A missing file yields no entries.
    pub fn replay(path: impl AsRef<Path>) -> PersistenceResult<Vec<T>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        let mut skipped = 0usize;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    skipped += 1;
                    warn!(path = %path.display(), line = line_no + 1, ?e, "Skipping corrupt journal line");
                }
            }
        }

        info!(
            path = %path.display(),
            entries = entries.len(),
            skipped,
            "Replayed journal"
        );
        Ok(entries)
    }

    /// Append one entry and flush it to disk.
    pub fn append(&mut self, entry: &T) -> PersistenceResult<()> {
        let json = serde_json::to_string(entry)?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        self.entries_written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries_written(&self) -> usize {
        self.entries_written
    }
}

impl<T> Drop for JsonLinesJournal<T> {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!(?e, "Failed to flush journal on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        id: u32,
        name: String,
    }

    fn entry(id: u32) -> Entry {
        Entry {
            id,
            name: format!("entry_{id}"),
        }
    }

    #[test]
    fn test_append_and_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entries.jsonl");

        let mut journal = JsonLinesJournal::<Entry>::open(&path).unwrap();
        for i in 0..3 {
            journal.append(&entry(i)).unwrap();
        }
        assert_eq!(journal.entries_written(), 3);
        drop(journal);

        let replayed = JsonLinesJournal::<Entry>::replay(&path).unwrap();
        assert_eq!(replayed, vec![entry(0), entry(1), entry(2)]);
    }

    #[test]
    fn test_reopen_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entries.jsonl");

        {
            let mut journal = JsonLinesJournal::<Entry>::open(&path).unwrap();
            journal.append(&entry(1)).unwrap();
        }
        {
            let mut journal = JsonLinesJournal::<Entry>::open(&path).unwrap();
            journal.append(&entry(2)).unwrap();
        }

        let replayed = JsonLinesJournal::<Entry>::replay(&path).unwrap();
        assert_eq!(replayed.len(), 2, "second open must not truncate");
    }

    #[test]
    fn test_replay_skips_corrupt_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entries.jsonl");
        std::fs::write(
            &path,
            "{\"id\":1,\"name\":\"a\"}\n{\"id\":2,\"na\n\n{\"id\":3,\"name\":\"c\"}\n",
        )
        .unwrap();

        let replayed = JsonLinesJournal::<Entry>::replay(&path).unwrap();
        assert_eq!(replayed.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_replay_missing_file() {
        let dir = TempDir::new().unwrap();
        let replayed = JsonLinesJournal::<Entry>::replay(dir.path().join("none.jsonl")).unwrap();
        assert!(replayed.is_empty());
    }
}
