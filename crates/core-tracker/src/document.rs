//! Host document contract plus a file-backed implementation.
//!
//! The tracker never owns its document. It keeps a `Weak` handle and every
//! access either yields a live document or `TrackerError::ReferenceExpired`.
//! What kind of document it is gets decided by matching on [`DocumentKind`],
//! never by probing for capabilities.

use anyhow::{Context, Result};
use core_text::Buffer;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// File metadata for a file-backed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: PathBuf,
    /// Version-control type (`"git"`, ...) when the file is under version control.
    pub scc_type: Option<String>,
}

impl FileDescriptor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            scc_type: None,
        }
    }

    pub fn with_scc(mut self, scc_type: impl Into<String>) -> Self {
        self.scc_type = Some(scc_type.into());
        self
    }

    pub fn base_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn dir_name(&self) -> PathBuf {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentKind {
    FileBacked(FileDescriptor),
    /// Shared editing session; the reference is whatever was last stored with
    /// `ChangeTracker::store_collab_state`.
    Collaborative,
    /// Neither file-backed nor collaborative: nothing to compare against.
    Scratch,
}

/// Buffer/document collaborator.
pub trait Document: Send + Sync {
    fn display_name(&self) -> String;

    fn kind(&self) -> DocumentKind;

    /// Whether the buffer has unsaved modifications relative to disk.
    fn is_dirty(&self) -> bool;

    /// Current buffer contents, or `None` when the view has gone away.
    fn buffer(&self) -> Option<Buffer>;

    /// Blocking read of the saved content. Called on a background worker.
    fn read_on_disk(&self) -> std::io::Result<Vec<u8>> {
        match self.kind() {
            DocumentKind::FileBacked(file) => std::fs::read(&file.path),
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "document is not file-backed",
            )),
        }
    }
}

/// In-memory document used by the CLI and by tests.
pub struct FileDocument {
    name: String,
    kind: RwLock<DocumentKind>,
    buffer: RwLock<Buffer>,
    dirty: AtomicBool,
    view_open: AtomicBool,
}

impl FileDocument {
    fn build(name: String, kind: DocumentKind, text: &str, dirty: bool) -> Result<Self> {
        Ok(Self {
            buffer: RwLock::new(Buffer::from_str(name.clone(), text)?),
            name,
            kind: RwLock::new(kind),
            dirty: AtomicBool::new(dirty),
            view_open: AtomicBool::new(true),
        })
    }

    /// Open `path` with its saved content as the buffer (clean).
    pub fn open(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::with_text(FileDescriptor::new(path), &text, false)
    }

    /// Bind `file` with an explicit buffer text and dirty flag.
    pub fn with_text(file: FileDescriptor, text: &str, dirty: bool) -> Result<Self> {
        let name = file.base_name();
        Self::build(name, DocumentKind::FileBacked(file), text, dirty)
    }

    pub fn collaborative(name: impl Into<String>, text: &str) -> Result<Self> {
        Self::build(name.into(), DocumentKind::Collaborative, text, true)
    }

    pub fn scratch(name: impl Into<String>, text: &str) -> Result<Self> {
        Self::build(name.into(), DocumentKind::Scratch, text, true)
    }

    /// Replace the whole buffer; marks the document dirty.
    pub fn set_text(&self, text: &str) -> Result<()> {
        *self.buffer.write() = Buffer::from_str(self.name.clone(), text)?;
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Apply `edit` to the buffer; marks the document dirty.
    pub fn edit<R>(&self, edit: impl FnOnce(&mut Buffer) -> R) -> R {
        let out = edit(&mut self.buffer.write());
        self.dirty.store(true, Ordering::Release);
        out
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    pub fn set_scc_type(&self, scc_type: Option<String>) {
        if let DocumentKind::FileBacked(file) = &mut *self.kind.write() {
            file.scc_type = scc_type;
        }
    }

    /// Write the buffer back to its file and mark the document clean.
    pub fn save(&self) -> Result<()> {
        let DocumentKind::FileBacked(file) = self.kind() else {
            anyhow::bail!("{} has no file to save to", self.name);
        };
        let text = self.buffer.read().text();
        std::fs::write(&file.path, text.as_bytes())
            .with_context(|| format!("writing {}", file.path.display()))?;
        self.dirty.store(false, Ordering::Release);
        Ok(())
    }

    /// Simulate the editor view closing; subsequent `buffer()` calls yield `None`.
    pub fn close_view(&self) {
        self.view_open.store(false, Ordering::Release);
    }
}

impl Document for FileDocument {
    fn display_name(&self) -> String {
        match &*self.kind.read() {
            DocumentKind::FileBacked(file) => file.path.display().to_string(),
            _ => self.name.clone(),
        }
    }

    fn kind(&self) -> DocumentKind {
        self.kind.read().clone()
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn buffer(&self) -> Option<Buffer> {
        if !self.view_open.load(Ordering::Acquire) {
            return None;
        }
        Some(self.buffer.read().clone())
    }
}
