//! changetrack entrypoint: diff one file against its saved or committed
//! version and print the change margin.
use anyhow::{Context, Result, bail};
use clap::Parser;
use core_config::load_from;
use core_events::{DeliveryContext, HandlerRef};
use core_index::{DiffAlgorithm, SimilarDiff};
use core_tracker::{
    ChangeKind, ChangeTracker, Document, FileDescriptor, FileDocument, MarginHandler,
    TrackerSettings, VcsRegistry, to_unified,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once, Weak};
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

mod gutter;

const LOG_FILE_NAME: &str = "changetrack.log";

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "changetrack", version, about = "Line-level change tracker")]
struct Args {
    /// File whose saved (or committed) content is the reference.
    pub path: PathBuf,
    /// Use this file's content as the unsaved buffer instead of `path` itself.
    #[arg(long = "buffer")]
    pub buffer: Option<PathBuf>,
    /// Compare against the last git commit instead of the file on disk.
    #[arg(long = "vcs")]
    pub vcs: bool,
    /// Optional configuration file path (overrides discovery of `changetrack.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Show the change touching this (one-based) line.
    #[arg(long = "line")]
    pub line: Option<usize>,
    /// Change kind for `--line` (insert | delete | replace); defaults to the marker shown there.
    #[arg(long = "kind", requires = "line")]
    pub kind: Option<ChangeKind>,
    /// Print every hunk after the margin.
    #[arg(long = "hunks")]
    pub hunks: bool,
}

fn configure_logging() -> Option<WorkerGuard> {
    let log_dir = Path::new(".");
    let log_path = log_dir.join(LOG_FILE_NAME);
    if log_path.exists() {
        let _ = std::fs::remove_file(&log_path);
    }
    let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE_NAME);
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
        .ok()
        .map(|_| guard)
}

fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            tracing::error!(target: "runtime.panic", ?info, "panic");
            default_panic(info);
        }));
    });
}

fn open_document(args: &Args) -> Result<Arc<FileDocument>> {
    let mut file = FileDescriptor::new(args.path.clone());
    if args.vcs {
        file = file.with_scc("git");
    }
    let doc = match &args.buffer {
        Some(buffer_path) => {
            let text = std::fs::read_to_string(buffer_path)
                .with_context(|| format!("reading {}", buffer_path.display()))?;
            FileDocument::with_text(file, &text, true)?
        }
        None => {
            let text = std::fs::read_to_string(&args.path)
                .with_context(|| format!("reading {}", args.path.display()))?;
            FileDocument::with_text(file, &text, false)?
        }
    };
    Ok(Arc::new(doc))
}

fn main() -> Result<()> {
    let _log_guard = configure_logging();
    install_panic_hook();
    info!(target: "runtime", "startup");

    let args = Args::parse();
    let config = load_from(args.config.clone())?;
    let settings = TrackerSettings::from_config(&config);
    let algorithm = config
        .diff_algorithm()
        .parse::<DiffAlgorithm>()
        .unwrap_or_else(|e| {
            warn!(target: "config", error = %e, "diff_algorithm_fallback");
            DiffAlgorithm::default()
        });

    let doc: Arc<dyn Document> = open_document(&args)?;
    let weak: Weak<dyn Document> = Arc::downgrade(&doc);
    let delivery = DeliveryContext::spawn().context("starting delivery thread")?;
    let tracker = ChangeTracker::builder(weak, delivery.sink())
        .settings(settings)
        .engine(Arc::new(SimilarDiff::new(algorithm)))
        .vcs(VcsRegistry::with_git())
        .build();
    let margin = Arc::new(MarginHandler::new());
    let handler: HandlerRef = margin.clone();

    info!(
        target: "runtime.startup",
        path = %args.path.display(),
        vcs = args.vcs,
        buffer_override = args.buffer.is_some(),
        ?algorithm,
        "bootstrap_complete"
    );

    tracker.update(&handler);
    if !settings.enabled {
        println!("change tracking is disabled");
        return Ok(());
    }
    if !margin.wait_for_update(settings.request_timeout + Duration::from_secs(1)) {
        bail!("no change report within {:?}", settings.request_timeout);
    }
    if let Some(message) = margin.last_error() {
        bail!("{message}");
    }

    let Some(buffer) = doc.buffer() else {
        bail!("buffer unavailable");
    };
    let model = margin.model();
    print!("{}", gutter::render(&buffer, &model));

    if let Some(line) = args.line {
        let line = line.saturating_sub(1);
        let kind = args.kind.or_else(|| model.active_kind(line));
        let change = tracker.query(Some(line), kind);
        if change.is_empty() {
            println!("no change at line {}", line + 1);
        } else {
            print!("{}", to_unified(&change));
        }
    }

    if args.hunks {
        for start in model.change_starts() {
            let change = tracker.query(Some(start), model.active_kind(start));
            print!("{}", to_unified(&change));
        }
    }

    tracker.finalize();
    info!(target: "runtime", "shutdown");
    Ok(())
}
