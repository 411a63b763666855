use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

pub const DEFAULT_LOG_NAME: &str = "native_app_error.log";

/// Append-only free-text diagnostic sink. The browser never sees these
/// lines; they are the only place per-request failures are distinguishable.
///
/// The file is opened per event: single writer, no handle held across
/// requests.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default sink beside the running executable, falling back to the
    /// working directory when the executable path cannot be resolved.
    pub fn beside_executable() -> Self {
        let dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(dir.join(DEFAULT_LOG_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one newline-terminated line. Best-effort: a failing sink is
    /// reported on stderr and never takes the process down.
    pub fn append(&self, message: &str) {
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{message}"));
        if let Err(e) = result {
            warn!("could not write to {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_file_and_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = ErrorLog::new(dir.path().join(DEFAULT_LOG_NAME));
        assert!(!log.path().exists());

        log.append("Error checking example.com: connect timed out");
        log.append("Main loop error: input closed inside a frame payload");

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            content,
            "Error checking example.com: connect timed out\n\
             Main loop error: input closed inside a frame payload\n"
        );
    }

    #[test]
    fn unwritable_path_is_swallowed() {
        let log = ErrorLog::new("/nonexistent-dir/zwatch/native_app_error.log");
        log.append("dropped on the floor");
    }
}
