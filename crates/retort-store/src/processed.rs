//! Append-only set of processed comment identifiers.
//!
//! [`ProcessedStore`] answers membership queries from memory and appends each
//! newly processed identifier to the backing file before returning, so the
//! set survives restarts. The file is never rewritten or truncated.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, instrument};

use crate::error::{StoreError, StoreResult};

/// Durable set of comment identifiers that already received a reply.
///
/// Membership checks never touch the disk: the whole file is read once by
/// [`ProcessedStore::open`] and every [`ProcessedStore::record`] updates the
/// in-memory set as well as the file.
#[derive(Debug)]
pub struct ProcessedStore {
    path: PathBuf,
    ids: HashSet<String>,
}

impl ProcessedStore {
    /// Load the store backed by `path`.
    ///
    /// A missing file is not an error: it means nothing has been processed
    /// yet, and the file is created on the first [`record`](Self::record).
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let load_path = path.clone();
        let ids = tokio::task::spawn_blocking(move || load_ids(&load_path)).await??;

        info!(path = %path.display(), count = ids.len(), "processed markers loaded");
        Ok(Self { path, ids })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `id` has been recorded, either in a previous run or this one.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number of distinct identifiers known to the store.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether `id` can be stored as a single record.
    pub fn accepts(id: &str) -> bool {
        validate_id(id).is_ok()
    }

    /// Durably append `id`, returning `true` if it was not already present.
    ///
    /// Recording an identifier twice is a no-op. The identifier joins the
    /// in-memory set before the append is attempted and stays there if the
    /// append fails; the error is still returned.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn record(&mut self, id: &str) -> StoreResult<bool> {
        validate_id(id)?;

        if !self.ids.insert(id.to_owned()) {
            debug!("comment already recorded");
            return Ok(false);
        }

        let line = format!(
            "{id}\t{}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_line(&path, &line)).await??;

        debug!("processed marker appended");
        Ok(true)
    }
}

// ── file format ──────────────────────────────────────────────────────

/// Extract the identifier from one record, or `None` for blank and
/// comment lines. Anything after the first tab is diagnostic only.
fn parse_line(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let id = line.split('\t').next().unwrap_or(line).trim();
    (!id.is_empty()).then_some(id)
}

/// Identifiers must fit on one line and survive the tab-separated format.
fn validate_id(id: &str) -> StoreResult<()> {
    if id.is_empty()
        || id.trim() != id
        || id.contains(['\t', '\n', '\r'])
        || id.starts_with('#')
    {
        return Err(StoreError::InvalidId(id.to_owned()));
    }
    Ok(())
}

fn load_ids(path: &Path) -> StoreResult<HashSet<String>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no processed-marker file yet");
            return Ok(HashSet::new());
        }
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    Ok(content
        .lines()
        .filter_map(parse_line)
        .map(str::to_owned)
        .collect())
}

fn append_line(path: &Path, line: &str) -> StoreResult<()> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut file = OpenOptions::new()
        .read(true)
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;

    // A torn or hand-written last record must not swallow the new one.
    if !ends_with_newline(&mut file).map_err(io_err)? {
        file.write_all(b"\n").map_err(io_err)?;
    }
    file.write_all(line.as_bytes()).map_err(io_err)?;
    file.sync_data().map_err(io_err)?;
    Ok(())
}

/// `true` for an empty file or one whose last byte is `\n`.
fn ends_with_newline(file: &mut std::fs::File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_line_accepts_bare_and_timestamped_records() {
        assert_eq!(parse_line("10"), Some("10"));
        assert_eq!(parse_line("11\t2026-01-01T00:00:00Z"), Some("11"));
        assert_eq!(parse_line("  12  \r"), Some("12"));
    }

    #[test]
    fn parse_line_skips_blank_and_comment_lines() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("# written by retort"), None);
        assert_eq!(parse_line("\t2026-01-01T00:00:00Z"), None);
    }

    #[test]
    fn validate_id_rejects_unstorable_ids() {
        assert!(validate_id("1790000000000000001").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id(" 10").is_err());
        assert!(validate_id("1\t2").is_err());
        assert!(validate_id("1\n2").is_err());
        assert!(validate_id("#10").is_err());
        assert!(ProcessedStore::accepts("10"));
        assert!(!ProcessedStore::accepts("1 0\n"));
    }

    #[tokio::test]
    async fn open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProcessedStore::open(dir.path().join("absent.txt"))
            .await
            .unwrap();

        assert!(store.is_empty());
        assert!(!store.contains("10"));
        assert!(!dir.path().join("absent.txt").exists());
    }

    #[tokio::test]
    async fn record_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/data/processed.txt");
        let mut store = ProcessedStore::open(&path).await.unwrap();

        assert!(store.record("42").await.unwrap());
        assert!(path.exists());
        assert!(store.contains("42"));
    }

    #[tokio::test]
    async fn duplicate_record_writes_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.txt");
        let mut store = ProcessedStore::open(&path).await.unwrap();

        assert!(store.record("7").await.unwrap());
        assert!(!store.record("7").await.unwrap());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.starts_with("7\t"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn record_after_unterminated_last_line_keeps_both_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.txt");
        std::fs::write(&path, "10\n11").unwrap();

        let mut store = ProcessedStore::open(&path).await.unwrap();
        assert!(store.record("12").await.unwrap());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("10\n11\n12\t"));

        let reopened = ProcessedStore::open(&path).await.unwrap();
        for id in ["10", "11", "12"] {
            assert!(reopened.contains(id), "missing {id}");
        }
        assert_eq!(reopened.len(), 3);
    }

    #[test]
    fn ends_with_newline_checks_last_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        let open = |p: &Path| OpenOptions::new().read(true).open(p).unwrap();

        std::fs::write(&path, "").unwrap();
        assert!(ends_with_newline(&mut open(&path)).unwrap());
        std::fs::write(&path, "10\n").unwrap();
        assert!(ends_with_newline(&mut open(&path)).unwrap());
        std::fs::write(&path, "10\n11").unwrap();
        assert!(!ends_with_newline(&mut open(&path)).unwrap());
    }

    #[tokio::test]
    async fn record_rejects_invalid_id_without_touching_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ProcessedStore::open(dir.path().join("p.txt")).await.unwrap();

        let err = store.record("bad\nid").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidId(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unreadable_path_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be read as a file.
        let err = ProcessedStore::open(dir.path()).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
