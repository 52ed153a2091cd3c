//! Snapshot Store: the on-disk JSON document tree and its git history.
//!
//! This module handles:
//! - Fixed directory layout and URL-safe entity file names
//! - Atomic document writes (temp file in the same directory, then rename)
//! - Sync metadata (`db.json`) and forward-only layout upgrades
//! - Checkpointing into git and reporting per-file deltas between revisions

pub mod git;
pub mod path;

pub use git::{ChangeMode, ChangedFile, Git, GitIdentity};
pub use path::{entity_path, path_id, url_safe_id};

use crate::error::{OfftracError, Result};
use crate::model::SnapshotMetadata;
use path::{
    GITIGNORE_FILE, IGNORES, METADATA_FILE, MIN_SNAPSHOT_VERSION, SNAPSHOT_VERSION, index_files,
    literal_ignore, snapshot_dirs,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::ser::{Formatter, PrettyFormatter};
use std::cell::RefCell;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File-based snapshot of the tracker, versioned with git.
#[derive(Debug)]
pub struct SnapshotStore {
    root: PathBuf,
    git: Git,
    metadata: SnapshotMetadata,
    head: RefCell<Option<String>>,
    index_file: Option<String>,
}

impl SnapshotStore {
    /// Create a handle for the snapshot rooted at `git.root()`.
    ///
    /// Nothing is touched on disk until `init`.
    #[must_use]
    pub fn new(git: Git) -> Self {
        Self {
            root: git.root().to_path_buf(),
            git,
            metadata: SnapshotMetadata::default(),
            head: RefCell::new(None),
            index_file: None,
        }
    }

    /// Keep the relational index at `path` out of git and out of cleanup.
    ///
    /// A relative `path` is taken from the root. An absolute one outside the
    /// root needs no protection and is ignored.
    #[must_use]
    pub fn with_index_file(mut self, path: &Path) -> Self {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.root).ok()
        } else {
            Some(path)
        };
        self.index_file = relative
            .map(|rel| {
                rel.components()
                    .map(|part| part.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .filter(|rel| !rel.is_empty());
        self
    }

    fn ignore_patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = IGNORES.iter().map(ToString::to_string).collect();
        if let Some(index) = &self.index_file {
            patterns.extend(index_files(index).iter().map(|file| literal_ignore(file)));
        }
        patterns
    }

    /// Whether an untracked entry is (or contains) the index or its sidecars.
    fn holds_index(&self, untracked: &str) -> bool {
        let Some(index) = &self.index_file else {
            return false;
        };
        let entry = untracked.trim_end_matches('/');
        let is_dir = untracked.ends_with('/');
        index_files(index)
            .iter()
            .any(|file| file == entry || (is_dir && file.starts_with(untracked)))
    }

    /// Bring the snapshot to a known-clean state.
    ///
    /// Creates missing directories, initializes git, discards uncommitted
    /// and untracked changes, ensures the ignore rules, loads and upgrades
    /// metadata, and checkpoints the result.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedSnapshotVersion` for layouts older than the
    /// minimum, or any git/I/O failure.
    pub fn init(&mut self) -> Result<()> {
        for dir in snapshot_dirs() {
            fs::create_dir_all(self.path_join(&dir))?;
        }
        self.git.init()?;
        self.cleanup()?;
        self.ensure_gitignore()?;
        self.read_metadata()?;
        self.upgrade()?;
        self.checkpoint()?;
        debug!(root = %self.root.display(), "Snapshot initialized");
        Ok(())
    }

    fn cleanup(&self) -> Result<()> {
        if self.git.has_head()? {
            self.git.reset_hard()?;
        }
        for untracked in self.git.untracked()? {
            if self.holds_index(&untracked) {
                continue;
            }
            let target = self.path_join(untracked.trim_end_matches('/'));
            debug!(path = %target.display(), "Removing untracked path");
            if target.is_dir() {
                fs::remove_dir_all(&target)?;
            } else {
                remove_if_exists(&target)?;
            }
        }
        // Fixed directories may have been removed with their untracked contents.
        for dir in snapshot_dirs() {
            fs::create_dir_all(self.path_join(&dir))?;
        }
        Ok(())
    }

    fn ensure_gitignore(&self) -> Result<()> {
        let path = self.path_join(GITIGNORE_FILE);
        let existing = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };
        let mut missing: Vec<String> = self
            .ignore_patterns()
            .into_iter()
            .filter(|pattern| !existing.lines().any(|line| line == pattern.as_str()))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort_unstable();
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        if !existing.is_empty() && !existing.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        for pattern in missing {
            writeln!(file, "{pattern}")?;
        }
        Ok(())
    }

    fn read_metadata(&mut self) -> Result<()> {
        let path = self.path_join(METADATA_FILE);
        self.metadata = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => SnapshotMetadata::default(),
            Err(err) => return Err(err.into()),
        };
        Ok(())
    }

    /// Persist `db.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_metadata(&self) -> Result<()> {
        self.write(METADATA_FILE, &self.metadata)
    }

    fn upgrade(&mut self) -> Result<()> {
        loop {
            let found = self.metadata.version.unwrap_or(SNAPSHOT_VERSION);
            if found < MIN_SNAPSHOT_VERSION {
                return Err(OfftracError::UnsupportedSnapshotVersion {
                    found,
                    minimum: MIN_SNAPSHOT_VERSION,
                });
            }
            if found > SNAPSHOT_VERSION {
                return Err(OfftracError::FutureSnapshotVersion {
                    found,
                    current: SNAPSHOT_VERSION,
                });
            }
            if self.metadata.version == Some(SNAPSHOT_VERSION) {
                return Ok(());
            }
            // Every supported layout below the current one has an upgrade step
            // here; version 2 is both the minimum and the current layout.
            info!(from = ?self.metadata.version, to = SNAPSHOT_VERSION, "Upgrading snapshot metadata");
            self.metadata.version = Some(SNAPSHOT_VERSION);
            self.write_metadata()?;
        }
    }

    /// Stage everything and commit with the watermark as the message.
    ///
    /// Returns `false` when there was nothing to commit.
    ///
    /// # Errors
    ///
    /// Returns an error if staging or committing fails for any other reason.
    pub fn checkpoint(&mut self) -> Result<bool> {
        self.head.replace(None);
        self.git.add_all()?;
        let committed = self.git.commit_all(self.recent())?;
        if committed {
            debug!(message = self.recent(), "Checkpoint committed");
        }
        Ok(committed)
    }

    /// Head revision, cached until the next checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if git cannot resolve HEAD.
    pub fn current_revision(&self) -> Result<String> {
        if let Some(head) = self.head.borrow().as_ref() {
            return Ok(head.clone());
        }
        let head = self.git.rev_parse_head()?;
        self.head.replace(Some(head.clone()));
        Ok(head)
    }

    /// Documents changed between `since` and HEAD.
    ///
    /// # Errors
    ///
    /// Returns an error if git fails (for example, `since` is unknown).
    pub fn changed_files(&self, since: &str) -> Result<Vec<ChangedFile>> {
        self.git.diff_name_status(since)
    }

    /// Atomically write a document at a root-relative path.
    ///
    /// The document is serialized with sorted keys and one-space indent into
    /// `.<name>` next to the target, synced, then renamed over the target.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub fn write<T: Serialize + ?Sized>(&self, relative: &str, document: &T) -> Result<()> {
        write_document(&self.path_join(relative), document)
    }

    /// Write an entity document as `<dir>/<url-safe-id>.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn write_entity<T: Serialize + ?Sized>(&self, dir: &str, id: &str, document: &T) -> Result<()> {
        self.write(&entity_path(dir, id), document)
    }

    /// Delete every document in a directory.
    ///
    /// Returns the number of removed documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or a file removed.
    pub fn nuke(&self, dir: &str) -> Result<usize> {
        let documents = self.list_documents(dir)?;
        for relative in &documents {
            fs::remove_file(self.path_join(relative))?;
        }
        debug!(dir, removed = documents.len(), "Cleared directory");
        Ok(documents.len())
    }

    /// Root-relative paths of the documents in a directory, sorted.
    ///
    /// Hidden files (including in-flight temp files) are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn list_documents(&self, dir: &str) -> Result<Vec<String>> {
        let full = self.path_join(dir);
        let entries = match fs::read_dir(&full) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut documents = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !name.ends_with(".json") {
                continue;
            }
            documents.push(format!("{dir}/{name}"));
        }
        documents.sort();
        Ok(documents)
    }

    /// Read a document as raw JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or not JSON.
    pub fn load_json(&self, relative: &str) -> Result<Value> {
        self.load(relative)
    }

    /// Read a document into a typed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or does not match `T`.
    pub fn load<T: DeserializeOwned>(&self, relative: &str) -> Result<T> {
        let contents = fs::read_to_string(self.path_join(relative))?;
        serde_json::from_str(&contents)
            .map_err(|err| OfftracError::invalid_document(relative, err.to_string()))
    }

    #[must_use]
    pub fn path_join(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub const fn metadata(&self) -> &SnapshotMetadata {
        &self.metadata
    }

    /// Current watermark.
    #[must_use]
    pub fn recent(&self) -> &str {
        self.metadata.recent()
    }

    pub fn set_recent(&mut self, recent: impl Into<String>) {
        self.metadata.recent = Some(recent.into());
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Atomically write `document` to `target`.
///
/// # Errors
///
/// Returns an error if serialization or any file operation fails. On
/// failure before the rename the previous target content is untouched.
pub fn write_document<T: Serialize + ?Sized>(target: &Path, document: &T) -> Result<()> {
    let parent = target.parent().ok_or_else(|| {
        OfftracError::Config(format!("Invalid document path: {}", target.display()))
    })?;
    let name = target
        .file_name()
        .ok_or_else(|| OfftracError::Config(format!("Invalid document path: {}", target.display())))?
        .to_string_lossy();
    let temp_path = parent.join(format!(".{name}"));

    // Going through `Value` sorts object keys.
    let value = serde_json::to_value(document)?;
    let bytes = to_snapshot_bytes(&value)?;

    let result = write_then_rename(&temp_path, target, &bytes);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn write_then_rename(temp_path: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    let file = File::create(temp_path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(bytes)?;
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| OfftracError::Io(e.into_error()))?
        .sync_all()?;
    fs::rename(temp_path, target)?;
    Ok(())
}

/// Serialize a value in the stable snapshot layout.
///
/// One-space indent and `,`/`:` separators with no space after the colon.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_snapshot_bytes(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SnapshotFormatter::new());
    value.serialize(&mut serializer)?;
    Ok(out)
}

/// Pretty formatter with compact key separators.
struct SnapshotFormatter {
    inner: PrettyFormatter<'static>,
}

impl SnapshotFormatter {
    fn new() -> Self {
        Self {
            inner: PrettyFormatter::with_indent(b" "),
        }
    }
}

impl Formatter for SnapshotFormatter {
    fn begin_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_array(writer)
    }

    fn end_array<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.begin_object(writer)
    }

    fn end_object<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.inner.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b":")
    }

    fn end_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.inner.end_object_value(writer)
    }
}
