use std::path::{Path, PathBuf};

use crate::error::CmsError;

pub const DEFAULT_MAX_BACKUPS: usize = 10;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// Where content lives on disk and how much history is retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory holding `<collection>.json` files.
    pub content_dir: PathBuf,
    /// Directory holding `<collection>.json.<timestamp>.bak` files.
    pub backup_dir: PathBuf,
    /// Backup artifacts kept per collection file.
    pub max_backups: usize,
    /// Largest accepted PDF upload.
    pub max_upload_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::with_content_dir(Self::data_dir())
    }
}

impl StoreConfig {
    /// Config rooted at `content_dir` with backups in `content_dir/backups`.
    pub fn with_content_dir(content_dir: impl AsRef<Path>) -> Self {
        let content_dir = content_dir.as_ref().to_path_buf();
        Self {
            backup_dir: content_dir.join("backups"),
            content_dir,
            max_backups: DEFAULT_MAX_BACKUPS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    /// Reads `CMS_CONTENT_DIR`, `CMS_BACKUP_DIR`, `CMS_MAX_BACKUPS` and
    /// `CMS_MAX_UPLOAD_BYTES`, falling back to defaults for unset variables.
    pub fn from_env() -> crate::Result<Self> {
        let mut config = match std::env::var("CMS_CONTENT_DIR") {
            Ok(dir) if !dir.trim().is_empty() => Self::with_content_dir(dir),
            _ => Self::default(),
        };

        if let Ok(dir) = std::env::var("CMS_BACKUP_DIR") {
            if !dir.trim().is_empty() {
                config.backup_dir = PathBuf::from(dir);
            }
        }
        if let Ok(raw) = std::env::var("CMS_MAX_BACKUPS") {
            config.max_backups = parse_number("CMS_MAX_BACKUPS", &raw)?;
        }
        if let Ok(raw) = std::env::var("CMS_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = parse_number("CMS_MAX_UPLOAD_BYTES", &raw)?;
        }

        Ok(config)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.content_dir.join("uploads")
    }

    fn data_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            std::env::var("LOCALAPPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("cms-store")
                .join("content")
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("Library/Application Support/cms-store/content")
        } else {
            std::env::var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".local/share/cms-store/content")
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> crate::Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| CmsError::Configuration(format!("{key} must be a number, got '{raw}'")))
}
