//! Version-control content source.
//!
//! A service answers `cat(file_name, dir_name, revision, callback)` with a
//! stoppable handle and calls `callback(result_code, message)` at most once,
//! from whatever thread it likes. A zero result code means `message` holds the
//! file contents; anything else means `message` describes the failure.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, warn};

pub type CatCallback = Box<dyn FnOnce(i32, String) + Send + 'static>;

/// In-flight external request.
pub trait CatHandle: Send + Sync {
    /// Ask the service to abandon the request. The callback must not run after
    /// this returns unless it was already running.
    fn stop(&self);
}

pub trait VcsService: Send + Sync {
    fn cat(
        &self,
        file_name: &str,
        dir_name: &Path,
        revision: &str,
        callback: CatCallback,
    ) -> Box<dyn CatHandle>;
}

/// Services keyed by version-control type (`"git"`, ...).
#[derive(Clone, Default)]
pub struct VcsRegistry {
    services: Arc<RwLock<HashMap<String, Arc<dyn VcsService>>>>,
}

impl VcsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in git backend.
    pub fn with_git() -> Self {
        let registry = Self::new();
        registry.register("git", Arc::new(GitService::default()));
        registry
    }

    pub fn register(&self, scc_type: impl Into<String>, service: Arc<dyn VcsService>) {
        self.services.write().insert(scc_type.into(), service);
    }

    pub fn get(&self, scc_type: &str) -> Option<Arc<dyn VcsService>> {
        self.services.read().get(scc_type).cloned()
    }
}

/// Stop flag shared between a handle and the thread serving it.
#[derive(Debug, Default, Clone)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl CatHandle for StopFlag {
    fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// `git show <rev>:./<name>` run from the file's directory.
#[derive(Debug, Clone)]
pub struct GitService {
    program: PathBuf,
}

impl Default for GitService {
    fn default() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }
}

impl GitService {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn show(&self, file_name: &str, dir_name: &Path, revision: &str) -> (i32, String) {
        let rev = if revision.is_empty() { "HEAD" } else { revision };
        let output = Command::new(&self.program)
            .arg("-C")
            .arg(dir_name)
            .arg("show")
            .arg(format!("{rev}:./{file_name}"))
            .output();
        match output {
            Ok(out) if out.status.success() => {
                (0, String::from_utf8_lossy(&out.stdout).into_owned())
            }
            Ok(out) => (
                out.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&out.stderr).trim().to_string(),
            ),
            Err(e) => (-1, e.to_string()),
        }
    }
}

impl VcsService for GitService {
    fn cat(
        &self,
        file_name: &str,
        dir_name: &Path,
        revision: &str,
        callback: CatCallback,
    ) -> Box<dyn CatHandle> {
        let stop = StopFlag::default();
        let worker_stop = stop.clone();
        let service = self.clone();
        let (file_name, dir_name, revision) =
            (file_name.to_string(), dir_name.to_path_buf(), revision.to_string());
        let spawned = thread::Builder::new()
            .name("changetrack-git-cat".to_string())
            .spawn(move || {
                let (code, message) = service.show(&file_name, &dir_name, &revision);
                if worker_stop.is_stopped() {
                    debug!(target: "tracker.scc", file = %file_name, "git_cat_stopped");
                    return;
                }
                callback(code, message);
            });
        if let Err(e) = spawned {
            // The callback went down with the closure; the tracker's timeout recovers.
            warn!(target: "tracker.scc", error = %e, "git_cat_spawn_failed");
        }
        Box::new(stop)
    }
}
