//! Configuration loading and parsing.
//!
//! Parses `changetrack.toml` (or an override path provided by the binary).
//! Every key is optional; absent keys take the defaults the tracker has always
//! used (60 s fetch timeout, 500 ms re-issue pause, 500 ms update debounce).
//! Unknown fields are ignored and a file that fails to parse falls back to
//! defaults so a bad config never prevents tracking.

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "changetrack.toml";

#[derive(Debug, Deserialize, Clone)]
pub struct TrackerSection {
    #[serde(default = "TrackerSection::default_enabled")]
    pub enabled: bool,
    #[serde(default = "TrackerSection::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "TrackerSection::default_reissue_delay_ms")]
    pub reissue_delay_ms: u64,
    #[serde(default = "TrackerSection::default_update_delay_ms")]
    pub update_delay_ms: u64,
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            request_timeout_secs: Self::default_request_timeout_secs(),
            reissue_delay_ms: Self::default_reissue_delay_ms(),
            update_delay_ms: Self::default_update_delay_ms(),
        }
    }
}

impl TrackerSection {
    const fn default_enabled() -> bool {
        true
    }
    const fn default_request_timeout_secs() -> u64 {
        60
    }
    const fn default_reissue_delay_ms() -> u64 {
        500
    }
    const fn default_update_delay_ms() -> u64 {
        500
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiffSection {
    #[serde(default = "DiffSection::default_algorithm")]
    pub algorithm: String,
}

impl Default for DiffSection {
    fn default() -> Self {
        Self {
            algorithm: Self::default_algorithm(),
        }
    }
}

impl DiffSection {
    fn default_algorithm() -> String {
        "myers".to_string()
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub tracker: TrackerSection,
    #[serde(default)]
    pub diff: DiffSection,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub raw: Option<String>, // raw file text, when one was read
    pub file: ConfigFile,    // parsed (or default) data
}

/// Best-effort config path following platform conventions (XDG / AppData Roaming).
pub fn discover() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("changetrack").join(CONFIG_FILE_NAME);
    }
    PathBuf::from(CONFIG_FILE_NAME)
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let Ok(content) = fs::read_to_string(&path) else {
        return Ok(Config::default());
    };
    match toml::from_str::<ConfigFile>(&content) {
        Ok(file) => {
            let mut cfg = Config {
                raw: Some(content),
                file,
            };
            cfg.apply_limits();
            Ok(cfg)
        }
        Err(e) => {
            warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed");
            Ok(Config::default())
        }
    }
}

impl Config {
    /// Clamp values the tracker cannot honor. A zero timeout would expire every
    /// pending fetch on the next request, so it is raised to one second.
    pub fn apply_limits(&mut self) {
        let raw = self.file.tracker.request_timeout_secs;
        if raw == 0 {
            self.file.tracker.request_timeout_secs = 1;
            info!(target: "config", raw, clamped = 1u64, "request_timeout_clamped");
        }
    }

    pub fn enabled(&self) -> bool {
        self.file.tracker.enabled
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.file.tracker.request_timeout_secs)
    }

    pub fn reissue_delay(&self) -> Duration {
        Duration::from_millis(self.file.tracker.reissue_delay_ms)
    }

    pub fn update_delay(&self) -> Duration {
        Duration::from_millis(self.file.tracker.update_delay_ms)
    }

    pub fn diff_algorithm(&self) -> &str {
        &self.file.diff.algorithm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex, MutexGuard};
    use tracing::Level;
    use tracing::subscriber::with_default;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct BufferWriter {
        inner: Arc<Mutex<Vec<u8>>>,
    }

    impl BufferWriter {
        fn new() -> (Self, Arc<Mutex<Vec<u8>>>) {
            let buf = Arc::new(Mutex::new(Vec::new()));
            (Self { inner: buf.clone() }, buf)
        }
    }

    struct LockedWriter<'a> {
        guard: MutexGuard<'a, Vec<u8>>,
    }

    impl<'a> Write for LockedWriter<'a> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.guard.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for BufferWriter {
        type Writer = LockedWriter<'a>;

        fn make_writer(&'a self) -> Self::Writer {
            LockedWriter {
                guard: self.inner.lock().expect("log buffer poisoned"),
            }
        }
    }

    #[test]
    fn default_config_when_missing_file() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_hopefully__.toml"))).unwrap();
        assert!(cfg.enabled());
        assert_eq!(cfg.request_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.reissue_delay(), Duration::from_millis(500));
        assert_eq!(cfg.update_delay(), Duration::from_millis(500));
        assert_eq!(cfg.diff_algorithm(), "myers");
    }

    #[test]
    fn parses_tracker_and_diff_sections() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "[tracker]\nenabled = false\nrequest_timeout_secs = 5\nreissue_delay_ms = 10\n\
             [diff]\nalgorithm = \"patience\"\n",
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert!(!cfg.enabled());
        assert_eq!(cfg.request_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.reissue_delay(), Duration::from_millis(10));
        assert_eq!(cfg.update_delay(), Duration::from_millis(500)); // untouched default
        assert_eq!(cfg.diff_algorithm(), "patience");
    }

    #[test]
    fn parse_error_falls_back_to_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[tracker\nenabled = ").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert!(cfg.raw.is_none());
        assert_eq!(cfg.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn zero_timeout_is_clamped_and_logged() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[tracker]\nrequest_timeout_secs = 0\n").unwrap();
        let (writer, buffer) = BufferWriter::new();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_target(true)
            .with_ansi(false)
            .without_time()
            .with_writer(writer)
            .finish();

        let cfg = with_default(subscriber, || {
            load_from(Some(tmp.path().to_path_buf())).unwrap()
        });

        let log_output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(log_output.contains("INFO config:"));
        assert!(log_output.contains("request_timeout_clamped"));
        assert_eq!(cfg.request_timeout(), Duration::from_secs(1));
    }
}
