use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::config::StoreConfig;
use crate::error::CmsError;
use crate::storage::atomic_write;

const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAttachment {
    pub file_name: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub size: u64,
    /// Public path under which the web layer serves the file.
    pub url: String,
}

/// PDF uploads kept under `<content-dir>/uploads`.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    dir: PathBuf,
    max_bytes: u64,
}

impl AttachmentStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            dir: config.uploads_dir(),
            max_bytes: config.max_upload_bytes,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn store_pdf(&self, original_name: &str, bytes: &[u8]) -> crate::Result<StoredAttachment> {
        if bytes.is_empty() {
            return Err(CmsError::Attachment("upload is empty".to_string()));
        }
        if bytes.len() as u64 > self.max_bytes {
            return Err(CmsError::Attachment(format!(
                "upload is {} bytes, limit is {}",
                bytes.len(),
                self.max_bytes
            )));
        }
        if !bytes.starts_with(PDF_MAGIC) {
            return Err(CmsError::Attachment("only PDF files are accepted".to_string()));
        }

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| CmsError::FileSystem(format!("create {}: {}", self.dir.display(), e)))?;

        let file_name = format!(
            "{}-{}",
            Utc::now().format("%Y%m%d%H%M%S%3f"),
            sanitize_file_name(original_name)
        );
        let path = self.dir.join(&file_name);
        atomic_write(&path, bytes)?;

        info!(file = %file_name, size = bytes.len(), "Stored PDF upload");
        Ok(StoredAttachment {
            url: format!("/uploads/{file_name}"),
            file_name,
            path,
            size: bytes.len() as u64,
        })
    }

    /// Deletes an upload by its stored file name. Returns `false` when it
    /// did not exist.
    pub fn remove(&self, file_name: &str) -> crate::Result<bool> {
        if file_name.is_empty()
            || file_name.contains(['/', '\\'])
            || file_name.starts_with('.')
        {
            return Err(CmsError::Attachment(format!("invalid upload name '{file_name}'")));
        }

        match std::fs::remove_file(self.dir.join(file_name)) {
            Ok(()) => {
                info!(file = %file_name, "Removed upload");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CmsError::FileSystem(format!("remove {file_name}: {e}"))),
        }
    }
}

/// Reduces a client-supplied name to `[A-Za-z0-9._-]`, without any
/// directory part, ending in `.pdf`.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();

    let mut cleaned = String::with_capacity(base.len());
    for ch in base.chars() {
        let ch = if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            ch
        } else {
            '-'
        };
        if ch == '-' && cleaned.ends_with('-') {
            continue;
        }
        cleaned.push(ch);
    }

    let cleaned = cleaned.trim_start_matches(['.', '-']).to_string();
    let stem = if cleaned.is_empty() { "document".to_string() } else { cleaned };
    if stem.to_ascii_lowercase().ends_with(".pdf") {
        stem
    } else {
        format!("{stem}.pdf")
    }
}
