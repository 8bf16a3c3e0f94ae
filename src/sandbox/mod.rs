//! Path-confined filesystem access for a UI session.
//!
//! Every filesystem operation a session performs — directory listings,
//! bounded file reads, the ACP `fs/*` callbacks, and the change watcher —
//! is rooted at the session working directory. [`resolve`] is the single
//! gate: a path is accepted iff its normalized absolute form is the root or
//! strictly under it, and symlinks that resolve outside the root are
//! rejected.

pub mod watcher;

use std::path::{Component, Path, PathBuf};

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// Maximum bytes of text returned by [`read_file`].
pub const TEXT_CAP_BYTES: usize = 100 * 1024;

/// Maximum image size returned inline as base64.
pub const IMAGE_CAP_BYTES: u64 = 1024 * 1024;

/// Marker appended when text content is cut at [`TEXT_CAP_BYTES`].
pub const TRUNCATION_MARKER: &str = "\n… [truncated]";

/// Directory and file names excluded from listings and watch events.
pub const IGNORED_NAMES: &[&str] = &[
    "node_modules",
    ".git",
    "dist",
    "build",
    ".next",
    "coverage",
    ".acp-proxy",
    ".ds_store",
    "thumbs.db",
    "bun.lockb",
    "package-lock.json",
];

/// Returns `true` when `name` must not appear in listings or watch batches:
/// hidden entries, the closed metadata set, and `*.lock` files.
#[must_use]
pub fn is_ignored_name(name: &str) -> bool {
    if name.starts_with('.') {
        return true;
    }
    let lower = name.to_ascii_lowercase();
    if IGNORED_NAMES.contains(&lower.as_str()) {
        return true;
    }
    Path::new(&lower)
        .extension()
        .is_some_and(|ext| ext == "lock")
}

/// Resolve `candidate` against the sandbox root `root`.
///
/// Relative paths are normalized component-by-component (`..` may not climb
/// above the root); absolute paths are accepted only when they already lie
/// within the root. When the resolved path exists, it is canonicalized and
/// re-checked so a symlink cannot smuggle the access outside the sandbox.
///
/// # Errors
///
/// Returns [`AppError::PathViolation`] on any escape attempt.
pub fn resolve(root: &Path, candidate: impl AsRef<Path>) -> Result<PathBuf> {
    let root = root
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("sandbox root invalid: {err}")))?;
    let candidate = candidate.as_ref();

    let absolute = if candidate.is_absolute() {
        if !candidate.starts_with(&root) {
            return Err(AppError::PathViolation("path outside sandbox".into()));
        }
        candidate.to_path_buf()
    } else {
        let mut normalized = PathBuf::new();
        for component in candidate.components() {
            match component {
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(AppError::PathViolation(
                            "path attempts to escape sandbox".into(),
                        ));
                    }
                }
                Component::CurDir => {}
                Component::RootDir | Component::Prefix(_) => {
                    return Err(AppError::PathViolation("path outside sandbox".into()));
                }
                Component::Normal(part) => normalized.push(part),
            }
        }
        root.join(normalized)
    };

    if absolute.exists() {
        let canonical = absolute
            .canonicalize()
            .map_err(|err| AppError::PathViolation(format!("cannot resolve path: {err}")))?;
        if !canonical.starts_with(&root) {
            return Err(AppError::PathViolation(
                "symlink target escapes sandbox".into(),
            ));
        }
        Ok(canonical)
    } else {
        Ok(absolute)
    }
}

// ── Directory listing ─────────────────────────────────────────────────────────

/// Entry kind in a directory listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Dir,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntryInfo {
    /// File or directory name.
    pub name: String,
    /// Path relative to the sandbox root, `/`-separated.
    #[serde(rename = "relPath")]
    pub rel_path: String,
    /// Entry kind.
    pub kind: EntryKind,
    /// File size in bytes; absent for directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Modification time, milliseconds since the Unix epoch.
    pub mtime: u64,
}

/// List the children of `rel_path` under `root`.
///
/// Hidden entries, VCS/build metadata, and lock files are excluded; output
/// is sorted directories-first, then case-insensitive lexicographic.
///
/// # Errors
///
/// Returns [`AppError::PathViolation`] on escapes and [`AppError::Io`] on
/// read failures.
pub async fn list_dir(root: &Path, rel_path: &str) -> Result<Vec<DirEntryInfo>> {
    let dir = resolve(root, rel_path)?;
    let canonical_root = root
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("sandbox root invalid: {err}")))?;

    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(&dir).await?;
    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_ignored_name(&name) {
            continue;
        }
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        let kind = if meta.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };
        let rel = entry
            .path()
            .strip_prefix(&canonical_root)
            .map_or_else(|_| name.clone(), |p| p.to_string_lossy().replace('\\', "/"));
        entries.push(DirEntryInfo {
            name,
            rel_path: rel,
            kind,
            size: (kind == EntryKind::File).then(|| meta.len()),
            mtime: mtime_millis(&meta),
        });
    }

    entries.sort_by(|a, b| {
        let rank = |k: EntryKind| u8::from(k != EntryKind::Dir);
        rank(a.kind)
            .cmp(&rank(b.kind))
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });

    Ok(entries)
}

fn mtime_millis(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .and_then(|d| u64::try_from(d.as_millis()).ok())
        .unwrap_or(0)
}

// ── Bounded reads ─────────────────────────────────────────────────────────────

/// Content of a bounded file read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContent {
    /// Text content, base64 image data, or a binary stub.
    pub content: String,
    /// Size of the file on disk.
    pub size: u64,
    /// Whether `content` is not plain text.
    pub binary: bool,
    /// Whether the content was cut at a cap.
    pub truncated: bool,
    /// MIME type for inline images.
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

const BINARY_EXTS: &[&str] = &[
    "exe", "dll", "so", "dylib", "bin", "o", "a", "class", "jar", "zip", "tar", "gz", "bz2",
    "xz", "7z", "rar", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "woff", "woff2",
    "ttf", "eot", "otf", "mp3", "mp4", "avi", "mov", "mkv", "wav", "flac", "sqlite", "db",
    "wasm",
];

const IMAGE_EXTS: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("ico", "image/x-icon"),
    ("svg", "image/svg+xml"),
];

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Read `rel_path` under `root`, classified by extension.
///
/// Known-binary extensions return a stub; known-image extensions up to
/// [`IMAGE_CAP_BYTES`] return base64 content with a MIME type; everything
/// else is treated as text capped at [`TEXT_CAP_BYTES`] with a trailing
/// [`TRUNCATION_MARKER`].
///
/// # Errors
///
/// Returns [`AppError::PathViolation`] on escapes and [`AppError::Io`] on
/// read failures.
pub async fn read_file(root: &Path, rel_path: &str) -> Result<FileContent> {
    let path = resolve(root, rel_path)?;
    let meta = tokio::fs::metadata(&path).await?;
    let size = meta.len();
    let ext = extension_of(&path);

    if BINARY_EXTS.contains(&ext.as_str()) {
        return Ok(FileContent {
            content: format!("[Binary file: {size} bytes]"),
            size,
            binary: true,
            truncated: false,
            mime_type: None,
        });
    }

    if let Some((_, mime)) = IMAGE_EXTS.iter().find(|(e, _)| *e == ext) {
        if size > IMAGE_CAP_BYTES {
            return Ok(FileContent {
                content: format!("[Binary file: {size} bytes]"),
                size,
                binary: true,
                truncated: true,
                mime_type: Some((*mime).to_owned()),
            });
        }
        let bytes = tokio::fs::read(&path).await?;
        return Ok(FileContent {
            content: base64::engine::general_purpose::STANDARD.encode(bytes),
            size,
            binary: true,
            truncated: false,
            mime_type: Some((*mime).to_owned()),
        });
    }

    let bytes = tokio::fs::read(&path).await?;
    let text = String::from_utf8_lossy(&bytes);
    if text.len() > TEXT_CAP_BYTES {
        let mut cut = TEXT_CAP_BYTES;
        while cut > 0 && !text.is_char_boundary(cut) {
            cut -= 1;
        }
        let mut content = text[..cut].to_owned();
        content.push_str(TRUNCATION_MARKER);
        return Ok(FileContent {
            content,
            size,
            binary: false,
            truncated: true,
            mime_type: None,
        });
    }

    Ok(FileContent {
        content: text.into_owned(),
        size,
        binary: false,
        truncated: false,
        mime_type: None,
    })
}

// ── ACP fs callbacks ──────────────────────────────────────────────────────────

/// Read a text file for the agent's `fs/readTextFile` callback.
///
/// `line` (1-based) and `limit` select a window of lines when present.
///
/// # Errors
///
/// Returns [`AppError::PathViolation`] on escapes and [`AppError::Io`] on
/// read failures.
pub async fn read_text_for_agent(
    root: &Path,
    path: &str,
    line: Option<u64>,
    limit: Option<u64>,
) -> Result<String> {
    let resolved = resolve(root, path)?;
    let text = tokio::fs::read_to_string(&resolved).await?;

    match (line, limit) {
        (None, None) => Ok(text),
        (start, count) => {
            let skip = start.map_or(0, |l| l.saturating_sub(1));
            let lines = text.lines().skip(usize::try_from(skip).unwrap_or(0));
            let selected: Vec<&str> = match count {
                Some(n) => lines.take(usize::try_from(n).unwrap_or(usize::MAX)).collect(),
                None => lines.collect(),
            };
            Ok(selected.join("\n"))
        }
    }
}

/// Write a text file for the agent's `fs/writeTextFile` callback.
///
/// Parent directories are created as needed.
///
/// # Errors
///
/// Returns [`AppError::PathViolation`] on escapes and [`AppError::Io`] on
/// write failures.
pub async fn write_text_for_agent(root: &Path, path: &str, content: &str) -> Result<()> {
    let resolved = resolve(root, path)?;
    if let Some(parent) = resolved.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&resolved, content).await?;
    Ok(())
}
