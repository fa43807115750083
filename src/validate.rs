//! Upload policy checks.
//!
//! Runs before any byte of a file is read. The size limit is checked first,
//! so an oversized file is reported as oversized whatever its type.

use crate::error::ValidationError;

const MIB: u64 = 1024 * 1024;

/// Name, size and declared media type of a file, as reported by the browser
/// or file system before reading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
    pub media_type: String,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, size: u64, media_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            media_type: media_type.into(),
        }
    }

    /// Lowercased final extension including the dot (`"report.PDF"` → `".pdf"`).
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.name)
    }
}

pub(crate) fn extension_of(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(format!(".{}", ext.to_ascii_lowercase()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    max_bytes: u64,
    allowed_extensions: Vec<String>,
}

impl UploadPolicy {
    pub fn new(max_bytes: u64, allowed_extensions: Vec<String>) -> Self {
        Self {
            max_bytes,
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn allowed_extensions(&self) -> &[String] {
        &self.allowed_extensions
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        crate::config::UploadConfig::default().policy()
    }
}

pub fn validate_file(file: &FileDescriptor, policy: &UploadPolicy) -> Result<(), ValidationError> {
    if file.size > policy.max_bytes {
        return Err(ValidationError::TooLarge {
            size: file.size,
            limit_mb: policy.max_bytes.div_ceil(MIB),
        });
    }

    let extension = file.extension();
    let allowed = extension
        .as_ref()
        .is_some_and(|ext| policy.allowed_extensions.iter().any(|a| a == ext));
    if !allowed {
        return Err(ValidationError::UnsupportedType {
            extension,
            allowed: policy.allowed_extensions.join(", "),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(name: &str, size: u64) -> Result<(), ValidationError> {
        validate_file(
            &FileDescriptor::new(name, size, "application/octet-stream"),
            &UploadPolicy::default(),
        )
    }

    #[test]
    fn accepts_every_allowed_extension() {
        for name in ["a.pdf", "b.csv", "c.txt", "d.docx", "e.doc", "F.TXT"] {
            assert!(check(name, 1024).is_ok(), "{} should be accepted", name);
        }
    }

    #[test]
    fn oversized_rejected_regardless_of_extension() {
        for name in ["big.txt", "big.exe", "noext"] {
            let err = check(name, 12 * MIB).unwrap_err();
            assert!(
                err.to_string().contains("10MB limit"),
                "unexpected message: {}",
                err
            );
        }
    }

    #[test]
    fn exactly_at_limit_is_accepted() {
        assert!(check("edge.txt", 10 * MIB).is_ok());
        assert!(check("edge.txt", 10 * MIB + 1).is_err());
    }

    #[test]
    fn unsupported_extension_rejected_within_size() {
        let err = check("script.exe", 10).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedType { .. }));
        assert_eq!(
            err.to_string(),
            "File type not supported. Allowed types: .pdf, .csv, .txt, .docx, .doc"
        );
    }

    #[test]
    fn missing_extension_rejected() {
        assert!(check("README", 10).is_err());
        assert!(check(".txt", 10).is_err());
        assert!(check("trailing.", 10).is_err());
    }

    #[test]
    fn extension_uses_last_dot() {
        let file = FileDescriptor::new("archive.tar.PDF", 1, "");
        assert_eq!(file.extension().as_deref(), Some(".pdf"));
    }

    #[test]
    fn deterministic() {
        let file = FileDescriptor::new("x.csv", 100, "text/csv");
        let policy = UploadPolicy::default();
        assert_eq!(validate_file(&file, &policy), validate_file(&file, &policy));
    }
}
