#![allow(dead_code)]

use core_events::{ChangeHandler, DeliveryContext, HandlerRef};
use core_index::{ChangeSummary, DiffEngine, SimilarDiff};
use core_text::Buffer;
use core_tracker::{
    CatCallback, CatHandle, ChangeTracker, Document, DocumentKind, FileDescriptor,
    TrackerSettings, VcsRegistry, VcsService,
};
use crossbeam_channel::{Receiver, Sender};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Changes(ChangeSummary),
    Error(String),
}

/// Handler that records every delivery and the thread it arrived on.
pub struct Recorder {
    seen: Mutex<Vec<Seen>>,
    threads: Mutex<Vec<Option<String>>>,
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
            tx,
            rx,
        })
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.seen()
            .into_iter()
            .filter_map(|s| match s {
                Seen::Error(m) => Some(m),
                Seen::Changes(_) => None,
            })
            .collect()
    }

    pub fn changes(&self) -> Vec<ChangeSummary> {
        self.seen()
            .into_iter()
            .filter_map(|s| match s {
                Seen::Changes(c) => Some(c),
                Seen::Error(_) => None,
            })
            .collect()
    }

    pub fn threads(&self) -> Vec<Option<String>> {
        self.threads.lock().unwrap().clone()
    }

    pub fn wait(&self) -> bool {
        self.rx.recv_timeout(WAIT).is_ok()
    }

    fn record(&self, seen: Seen) {
        self.threads
            .lock()
            .unwrap()
            .push(std::thread::current().name().map(str::to_string));
        self.seen.lock().unwrap().push(seen);
        let _ = self.tx.send(());
    }
}

impl ChangeHandler for Recorder {
    fn on_error(&self, message: &str) {
        self.record(Seen::Error(message.to_string()));
    }

    fn mark_changes(
        &self,
        deleted: &[usize],
        inserted: &[usize],
        modified: &[usize],
    ) -> anyhow::Result<()> {
        self.record(Seen::Changes(ChangeSummary {
            deleted: deleted.to_vec(),
            inserted: inserted.to_vec(),
            modified: modified.to_vec(),
        }));
        Ok(())
    }
}

pub fn summary(deleted: &[usize], inserted: &[usize], modified: &[usize]) -> ChangeSummary {
    ChangeSummary {
        deleted: deleted.to_vec(),
        inserted: inserted.to_vec(),
        modified: modified.to_vec(),
    }
}

/// File-backed document whose on-disk read blocks until the test releases it.
pub struct BlockingDoc {
    kind: Mutex<DocumentKind>,
    text: Mutex<String>,
    dirty: AtomicBool,
    view_open: AtomicBool,
    release: Receiver<Vec<u8>>,
    pub reads: AtomicUsize,
}

impl BlockingDoc {
    pub fn new(current: &str, dirty: bool) -> (Arc<Self>, Sender<Vec<u8>>) {
        Self::with_kind(
            DocumentKind::FileBacked(FileDescriptor::new("dir/file.txt")),
            current,
            dirty,
        )
    }

    pub fn with_kind(kind: DocumentKind, current: &str, dirty: bool) -> (Arc<Self>, Sender<Vec<u8>>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let doc = Arc::new(Self {
            kind: Mutex::new(kind),
            text: Mutex::new(current.to_string()),
            dirty: AtomicBool::new(dirty),
            view_open: AtomicBool::new(true),
            release: rx,
            reads: AtomicUsize::new(0),
        });
        (doc, tx)
    }

    pub fn set_text(&self, text: &str) {
        *self.text.lock().unwrap() = text.to_string();
    }

    pub fn close_view(&self) {
        self.view_open.store(false, Ordering::SeqCst);
    }
}

impl Document for BlockingDoc {
    fn display_name(&self) -> String {
        "dir/file.txt".to_string()
    }

    fn kind(&self) -> DocumentKind {
        self.kind.lock().unwrap().clone()
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    fn buffer(&self) -> Option<Buffer> {
        if !self.view_open.load(Ordering::SeqCst) {
            return None;
        }
        Buffer::from_str("file.txt", &self.text.lock().unwrap()).ok()
    }

    fn read_on_disk(&self) -> std::io::Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.release
            .recv_timeout(WAIT)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "never released"))
    }
}

struct ScriptedCat {
    callback: Option<CatCallback>,
    stopped: Arc<AtomicBool>,
    file_name: String,
}

struct ScriptedHandle(Arc<AtomicBool>);

impl CatHandle for ScriptedHandle {
    fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// VCS service whose requests complete only when the test says so.
#[derive(Default)]
pub struct ScriptedVcs {
    cats: Mutex<Vec<ScriptedCat>>,
}

impl ScriptedVcs {
    pub fn calls(&self) -> usize {
        self.cats.lock().unwrap().len()
    }

    pub fn stopped(&self, idx: usize) -> bool {
        self.cats.lock().unwrap()[idx].stopped.load(Ordering::SeqCst)
    }

    pub fn file_name(&self, idx: usize) -> String {
        self.cats.lock().unwrap()[idx].file_name.clone()
    }

    /// Run request `idx`'s callback on the calling thread. The callback is taken
    /// out first so a re-issue from inside it can register a new request.
    pub fn complete(&self, idx: usize, code: i32, message: &str) {
        let callback = self.cats.lock().unwrap()[idx].callback.take();
        if let Some(cb) = callback {
            cb(code, message.to_string());
        }
    }
}

impl VcsService for ScriptedVcs {
    fn cat(
        &self,
        file_name: &str,
        _dir_name: &Path,
        _revision: &str,
        callback: CatCallback,
    ) -> Box<dyn CatHandle> {
        let stopped = Arc::new(AtomicBool::new(false));
        self.cats.lock().unwrap().push(ScriptedCat {
            callback: Some(callback),
            stopped: stopped.clone(),
            file_name: file_name.to_string(),
        });
        Box::new(ScriptedHandle(stopped))
    }
}

pub fn fast_settings() -> TrackerSettings {
    TrackerSettings {
        reissue_delay: Duration::from_millis(1),
        ..TrackerSettings::default()
    }
}

pub struct Harness {
    pub ctx: DeliveryContext,
    pub tracker: ChangeTracker,
    pub recorder: Arc<Recorder>,
    pub handler: HandlerRef,
}

impl Harness {
    pub fn new(doc: Weak<dyn Document>, vcs: VcsRegistry) -> Self {
        Self::with_engine(doc, vcs, Arc::new(SimilarDiff::default()))
    }

    pub fn with_engine(
        doc: Weak<dyn Document>,
        vcs: VcsRegistry,
        engine: Arc<dyn DiffEngine>,
    ) -> Self {
        let ctx = DeliveryContext::spawn().unwrap();
        let tracker = ChangeTracker::builder(doc, ctx.sink())
            .settings(fast_settings())
            .engine(engine)
            .vcs(vcs)
            .build();
        let recorder = Recorder::new();
        let handler: HandlerRef = recorder.clone();
        Self {
            ctx,
            tracker,
            recorder,
            handler,
        }
    }

    pub fn flush(&self) {
        assert!(self.ctx.flush(WAIT), "delivery context did not drain");
    }
}

pub fn scripted_registry() -> (VcsRegistry, Arc<ScriptedVcs>) {
    let vcs = Arc::new(ScriptedVcs::default());
    let registry = VcsRegistry::new();
    registry.register("git", vcs.clone());
    (registry, vcs)
}

pub fn weak(doc: &Arc<impl Document + 'static>) -> Weak<dyn Document> {
    let strong: Arc<dyn Document> = doc.clone();
    Arc::downgrade(&strong)
}
