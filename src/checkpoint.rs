//! Periodic and final persistence of the result set.
//!
//! Every write serializes the whole set, writes it to a sibling temp file,
//! syncs it and renames it over the destination, so a reader only ever sees
//! a complete JSON document.

use crate::accumulator::ResultAccumulator;
use crate::error::Result;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Writes snapshots of a [`ResultAccumulator`] to one destination file
#[derive(Debug)]
pub struct CheckpointWriter {
    path: PathBuf,
    interval: Duration,
    accumulator: ResultAccumulator,
    /// Time of the last write; the lock also serializes writers
    last: Mutex<Instant>,
    writes: AtomicUsize,
}

impl CheckpointWriter {
    /// Create a writer; the interval is measured from construction
    pub fn new(path: impl Into<PathBuf>, interval: Duration, accumulator: ResultAccumulator) -> Self {
        Self {
            path: path.into(),
            interval,
            accumulator,
            last: Mutex::new(Instant::now()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Destination file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of snapshots written so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Write a snapshot if at least one interval passed since the last one
    ///
    /// Returns `Some(records)` when a snapshot was written.
    pub async fn maybe_checkpoint(&self, now: Instant) -> Result<Option<usize>> {
        let mut last = self.last.lock().await;
        if now.saturating_duration_since(*last) < self.interval {
            return Ok(None);
        }

        let records = self.write_snapshot().await?;
        *last = now;
        Ok(Some(records))
    }

    /// Unconditionally write the final snapshot; an empty set writes `[]`
    pub async fn final_checkpoint(&self) -> Result<usize> {
        let mut last = self.last.lock().await;
        let records = self.write_snapshot().await?;
        *last = Instant::now();
        Ok(records)
    }

    async fn write_snapshot(&self) -> Result<usize> {
        let snapshot = self.accumulator.snapshot().await;
        let bytes = to_pretty_json(&snapshot)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = temp_path_for(&self.path);
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, &self.path).await?;

        self.writes.fetch_add(1, Ordering::SeqCst);
        tracing::info!(path = %self.path.display(), records = snapshot.len(), "checkpoint written");
        Ok(snapshot.len())
    }
}

/// JSON with 4-space indentation; non-ASCII text is written as-is
fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut serializer)?;
    Ok(buf)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::subject;
    use serde_json::{Value, json};

    fn read_array(path: &Path) -> Vec<Value> {
        let raw = std::fs::read_to_string(path).unwrap();
        serde_json::from_str::<Vec<Value>>(&raw).unwrap()
    }

    #[tokio::test]
    async fn nothing_written_before_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let writer = CheckpointWriter::new(&path, Duration::from_secs(300), ResultAccumulator::new());

        assert_eq!(writer.maybe_checkpoint(Instant::now()).await.unwrap(), None);
        assert!(!path.exists());
        assert_eq!(writer.writes(), 0);
    }

    #[tokio::test]
    async fn writes_full_snapshot_once_interval_elapses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let acc = ResultAccumulator::new();
        let writer = CheckpointWriter::new(&path, Duration::from_secs(300), acc.clone());

        acc.absorb(&subject("1"), vec![json!({"case": "a"})]).await;
        let later = Instant::now() + Duration::from_secs(301);

        assert_eq!(writer.maybe_checkpoint(later).await.unwrap(), Some(1));
        let written = read_array(&path);
        assert_eq!(written.len(), 1);
        assert_eq!(written[0]["person_id"], "1");

        // The interval restarts from the last write
        assert_eq!(
            writer.maybe_checkpoint(later + Duration::from_secs(10)).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn final_checkpoint_of_empty_set_is_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let writer = CheckpointWriter::new(&path, Duration::from_secs(300), ResultAccumulator::new());

        assert_eq!(writer.final_checkpoint().await.unwrap(), 0);
        assert!(read_array(&path).is_empty());
        assert_eq!(writer.writes(), 1);
    }

    #[tokio::test]
    async fn replaces_previous_snapshot_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let acc = ResultAccumulator::new();
        let writer = CheckpointWriter::new(&path, Duration::ZERO, acc.clone());

        acc.absorb(&subject("1"), vec![json!({"n": 1})]).await;
        writer.maybe_checkpoint(Instant::now()).await.unwrap();
        let first = read_array(&path).len();

        acc.absorb(&subject("2"), vec![json!({"n": 2}), json!({"n": 3})]).await;
        writer.final_checkpoint().await.unwrap();
        let second = read_array(&path).len();

        assert_eq!((first, second), (1, 3));
        assert!(!temp_path_for(&path).exists());
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("nested").join("results.json");
        let writer = CheckpointWriter::new(&path, Duration::ZERO, ResultAccumulator::new());

        writer.final_checkpoint().await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn output_is_indented_and_keeps_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        let acc = ResultAccumulator::new();
        let writer = CheckpointWriter::new(&path, Duration::ZERO, acc.clone());

        let mut s = subject("1");
        s.family_name = "Соколов".to_string();
        acc.absorb(&s, vec![json!({"notary": "Петрова"})]).await;
        writer.final_checkpoint().await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("Соколов"));
        assert!(raw.contains("\n        \"notary\": \"Петрова\""));
    }

    #[test]
    fn temp_path_is_a_sibling() {
        let path = Path::new("/data/results.json");
        assert_eq!(temp_path_for(path), PathBuf::from("/data/results.json.tmp"));
    }
}
