//! Processing progress reporting.
//!
//! The processor notifies a [`ProcessingListener`] of every upload state
//! change and of every new aggregate processed-file set. In the dashboard
//! the listener is the UI; the CLI uses the stderr reporters below so stdout
//! stays parseable for scripts.

use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;

use crate::models::{ProcessedFile, UploadStatus, UploadedFile};

/// Receives processor notifications. Called from the store task, in the
/// order the changes were applied.
pub trait ProcessingListener: Send + Sync {
    fn on_file_updated(&self, file: &UploadedFile);

    /// Called with the full aggregate set whenever it changes.
    fn on_processed_changed(&self, files: Arc<[ProcessedFile]>);
}

/// Human-friendly progress on stderr: "report.pdf  processing  50%".
pub struct StderrProgress;

impl ProcessingListener for StderrProgress {
    fn on_file_updated(&self, file: &UploadedFile) {
        let line = match (&file.status, &file.error) {
            (UploadStatus::Error, Some(err)) => format!("{}  error  {}\n", file.name, err),
            (status, _) => format!(
                "{}  {}  {}%  ({} bytes)\n",
                file.name,
                status_label(*status),
                file.progress,
                format_number(file.size)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }

    fn on_processed_changed(&self, files: Arc<[ProcessedFile]>) {
        let _ = writeln!(
            std::io::stderr().lock(),
            "processed documents: {}",
            format_number(files.len() as u64)
        );
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProcessingListener for JsonProgress {
    fn on_file_updated(&self, file: &UploadedFile) {
        let obj = serde_json::json!({
            "event": "file",
            "id": file.id,
            "name": file.name,
            "status": file.status,
            "progress": file.progress,
            "error": file.error,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
        }
    }

    fn on_processed_changed(&self, files: Arc<[ProcessedFile]>) {
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        let obj = serde_json::json!({
            "event": "processed",
            "count": files.len(),
            "names": names,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
        }
    }
}

/// No-op listener when progress is disabled.
pub struct NoProgress;

impl ProcessingListener for NoProgress {
    fn on_file_updated(&self, _file: &UploadedFile) {}
    fn on_processed_changed(&self, _files: Arc<[ProcessedFile]>) {}
}

fn status_label(status: UploadStatus) -> &'static str {
    match status {
        UploadStatus::Uploading => "uploading",
        UploadStatus::Processing => "processing",
        UploadStatus::Completed => "completed",
        UploadStatus::Error => "error",
    }
}

/// Groups digits in threes: `10485760` → `"10,485,760"`.
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Where processor notifications go when running from the CLI.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human-readable lines if stderr is a terminal, nothing otherwise.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            Self::Human
        } else {
            Self::Off
        }
    }

    pub fn listener(self) -> Arc<dyn ProcessingListener> {
        match self {
            Self::Off => Arc::new(NoProgress),
            Self::Human => Arc::new(StderrProgress),
            Self::Json => Arc::new(JsonProgress),
        }
    }
}

/// Parses `auto`, `human`, `json` or `off`; `auto` resolves via
/// [`ProgressMode::default_for_tty`].
impl FromStr for ProgressMode {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::default_for_tty()),
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "off" | "none" => Ok(Self::Off),
            other => Err(format!(
                "unknown progress mode '{}'; expected auto, human, json or off",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_are_grouped() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(512), "512");
        assert_eq!(format_number(51_200), "51,200");
        assert_eq!(format_number(10_485_760), "10,485,760");
    }

    #[test]
    fn progress_mode_from_str() {
        assert_eq!("JSON".parse::<ProgressMode>(), Ok(ProgressMode::Json));
        assert_eq!("off".parse::<ProgressMode>(), Ok(ProgressMode::Off));
        assert!("loud".parse::<ProgressMode>().unwrap_err().contains("unknown progress mode"));
    }

    #[test]
    fn status_labels_match_wire_names() {
        for status in [
            UploadStatus::Uploading,
            UploadStatus::Processing,
            UploadStatus::Completed,
            UploadStatus::Error,
        ] {
            let wire = serde_json::to_value(status).unwrap();
            assert_eq!(wire, status_label(status));
        }
    }
}
