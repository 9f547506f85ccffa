//! Directory listings for `GET /file-system`.

use std::cmp::Ordering;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use mpvrc_proto::platform;
use mpvrc_proto::protocol::{FileSystemEntry, FileSystemListing};

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("path {0:?} must be absolute")]
    NotAbsolute(String),
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Lexically normalise `path`: drop `.` segments and resolve `..` against the
/// preceding segment.  `..` never climbs above a root.  An empty result
/// means "no path".
pub fn clean(path: &str) -> PathBuf {
    let mut out = PathBuf::new();
    for component in Path::new(path).components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                out.push(component.as_os_str())
            }
            Component::CurDir => {}
            Component::ParentDir => {
                let at_root = out.parent().is_none() && out.has_root();
                let ends_in_parent = matches!(out.components().next_back(), Some(Component::ParentDir));
                if out.as_os_str().is_empty() || ends_in_parent {
                    out.push("..");
                } else if !at_root {
                    out.pop();
                }
            }
        }
    }
    out
}

/// List the directory named by `path`, or its parent when `parent_of` is set.
/// An empty (or `.`) path lists the filesystem roots.
pub async fn list(path: &str, parent_of: bool, show_hidden: bool) -> Result<FileSystemListing, ListingError> {
    let mut target = clean(path);
    if parent_of {
        target = match target.parent() {
            Some(parent) => parent.to_path_buf(),
            None => target,
        };
    }

    if target.as_os_str().is_empty() {
        return Ok(roots());
    }
    if !target.is_absolute() {
        return Err(ListingError::NotAbsolute(target.display().to_string()));
    }

    let display = target.display().to_string();
    let io_err = |source| ListingError::Io {
        path: display.clone(),
        source,
    };

    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(&target).await.map_err(io_err)?;
    while let Some(entry) = dir.next_entry().await.map_err(io_err)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        if !show_hidden && is_hidden(&name, &path).await {
            continue;
        }
        // Follow symlinks so linked directories stay browsable.
        let is_dir = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.is_dir(),
            Err(_) => entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false),
        };
        entries.push(FileSystemEntry {
            name,
            path: path.display().to_string(),
            is_dir,
        });
    }
    debug!("fs: {} entries in {}", entries.len(), target.display());

    entries.sort_by(compare_entries);
    for entry in entries.iter_mut().filter(|e| e.is_dir) {
        entry.name = format!("[{}]", entry.name);
    }

    let up = FileSystemEntry {
        name: "..".to_string(),
        path: target
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        is_dir: true,
    };
    entries.insert(0, up);

    Ok(FileSystemListing {
        path: display,
        entries,
    })
}

fn roots() -> FileSystemListing {
    let entries = platform::filesystem_roots()
        .into_iter()
        .map(|root| {
            let name = root.display().to_string();
            FileSystemEntry {
                path: name.clone(),
                name,
                is_dir: true,
            }
        })
        .collect();
    FileSystemListing {
        path: String::new(),
        entries,
    }
}

/// Directories first, then case-insensitive by name.
fn compare_entries(a: &FileSystemEntry, b: &FileSystemEntry) -> Ordering {
    b.is_dir
        .cmp(&a.is_dir)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
}

#[cfg(unix)]
async fn is_hidden(name: &str, _path: &Path) -> bool {
    name.starts_with('.')
}

#[cfg(windows)]
async fn is_hidden(name: &str, path: &Path) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    if name.starts_with('.') {
        return true;
    }
    tokio::fs::symlink_metadata(path)
        .await
        .map(|m| m.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0)
        .unwrap_or(false)
}
