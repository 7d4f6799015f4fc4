//! # Attachment Storage
//!
//! Files uploaded with a record are written under a local root:
//!
//! ```text
//! <root>/<kind>/<lineage>/v<version>/<unix-ts>_<sanitized-name>
//! ```
//!
//! Every component is built from validated or sanitized input, so a stored
//! path can never leave the root. Each file's BLAKE3 digest is kept in its
//! [`AttachmentRef`] and checked again when the file is read back.

use crate::primitives::{ALLOWED_EXTENSIONS, MAX_ATTACHMENT_SIZE, MAX_FIELD_NAME_LENGTH};
use crate::{AttachmentRef, LedgerError, LineageId, RecordKind, Timestamp, Version};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

/// Longest sanitized filename kept on disk (before the timestamp prefix).
const MAX_STORED_NAME: usize = 100;

/// A file submitted with a create or amend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Record field the file belongs to (`loading_plan`, `crew_list`, ...).
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(field: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Reject empty or oversized files and disallowed extensions.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.field.trim().is_empty() || self.field.len() > MAX_FIELD_NAME_LENGTH {
            return Err(LedgerError::InvalidInput(format!(
                "attachment field name must be 1..={} characters",
                MAX_FIELD_NAME_LENGTH
            )));
        }
        if self.bytes.is_empty() {
            return Err(LedgerError::InvalidInput(format!(
                "attachment '{}' is empty",
                self.field
            )));
        }
        if self.bytes.len() > MAX_ATTACHMENT_SIZE {
            return Err(LedgerError::InvalidInput(format!(
                "attachment '{}' is {} bytes, limit is {}",
                self.field,
                self.bytes.len(),
                MAX_ATTACHMENT_SIZE
            )));
        }
        match extension_of(&self.file_name) {
            Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
            Some(ext) => Err(LedgerError::InvalidInput(format!(
                "file type '.{}' is not allowed",
                ext
            ))),
            None => Err(LedgerError::InvalidInput(format!(
                "attachment '{}' has no file extension",
                self.file_name
            ))),
        }
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Best-effort MIME type from a filename's extension.
#[must_use]
pub fn content_type_for(file_name: &str) -> &'static str {
    match extension_of(file_name).as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("csv") => "text/csv",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Reduce a filename to `[A-Za-z0-9._-]`.
#[must_use]
pub fn sanitize_file_name(file_name: &str) -> String {
    // Browsers on Windows sometimes send the full client path.
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    let mut name: String = trimmed.chars().rev().take(MAX_STORED_NAME).collect();
    name = name.chars().rev().collect();
    if name.is_empty() {
        "file".to_string()
    } else {
        name
    }
}

/// Local directory tree holding attachment files.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate and write one upload for a record version.
    pub fn save(
        &self,
        kind: &RecordKind,
        lineage: LineageId,
        version: Version,
        upload: &Upload,
        at: Timestamp,
    ) -> Result<AttachmentRef, LedgerError> {
        upload.validate()?;

        let dir_rel = format!("{}/{}/v{}", kind.as_str(), lineage.0, version);
        let dir = self.resolve(&dir_rel)?;
        fs::create_dir_all(&dir)
            .map_err(|e| LedgerError::Io(format!("cannot create '{}': {}", dir.display(), e)))?;

        let base = format!("{}_{}", at.0, sanitize_file_name(&upload.file_name));
        let (file_name, mut file) = Self::create_unique(&dir, &base)?;
        file.write_all(&upload.bytes)
            .and_then(|()| file.sync_all())
            .map_err(|e| LedgerError::Io(format!("cannot write '{}': {}", file_name, e)))?;

        Ok(AttachmentRef {
            original_name: upload.file_name.clone(),
            stored_path: format!("{}/{}", dir_rel, file_name),
            size: upload.bytes.len() as u64,
            content_type: content_type_for(&upload.file_name).to_string(),
            digest: blake3::hash(&upload.bytes).to_hex().to_string(),
            uploaded_at: at,
        })
    }

    /// Read a stored file back. `Ok(None)` if the file is gone.
    pub fn read(&self, attachment: &AttachmentRef) -> Result<Option<Vec<u8>>, LedgerError> {
        let path = self.resolve(&attachment.stored_path)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(LedgerError::Io(format!(
                    "cannot read '{}': {}",
                    path.display(),
                    e
                )));
            }
        };
        let digest = blake3::hash(&bytes).to_hex().to_string();
        if digest != attachment.digest {
            return Err(LedgerError::InvariantViolation(format!(
                "attachment '{}' does not match its recorded digest",
                attachment.stored_path
            )));
        }
        Ok(Some(bytes))
    }

    /// Delete a stored file; a missing file is not an error.
    pub fn remove(&self, attachment: &AttachmentRef) -> Result<(), LedgerError> {
        let path = self.resolve(&attachment.stored_path)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LedgerError::Io(format!(
                "cannot remove '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    /// Join a `/`-separated relative path onto the root, refusing anything
    /// that is not a plain name component.
    fn resolve(&self, relative: &str) -> Result<PathBuf, LedgerError> {
        let mut path = self.root.clone();
        for part in relative.split('/') {
            let mut components = Path::new(part).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(name)), None) => path.push(name),
                _ => {
                    return Err(LedgerError::InvalidInput(format!(
                        "illegal attachment path '{}'",
                        relative
                    )));
                }
            }
        }
        Ok(path)
    }

    fn create_unique(dir: &Path, base: &str) -> Result<(String, fs::File), LedgerError> {
        let (stem, ext) = match base.rsplit_once('.') {
            Some((s, e)) => (s.to_string(), format!(".{}", e)),
            None => (base.to_string(), String::new()),
        };
        for attempt in 0u32..1000 {
            let name = if attempt == 0 {
                base.to_string()
            } else {
                format!("{}-{}{}", stem, attempt, ext)
            };
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(dir.join(&name))
            {
                Ok(file) => return Ok((name, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(LedgerError::Io(format!(
                        "cannot create '{}': {}",
                        name, e
                    )));
                }
            }
        }
        Err(LedgerError::Io(format!(
            "no free filename for '{}' in '{}'",
            base,
            dir.display()
        )))
    }
}
