//! File moves and cleanup for intermediates.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::MediaResult;

/// EXDEV on Linux and macOS.
const CROSS_DEVICE_ERRNO: i32 = 18;

/// Rename `src` to `dst`, copying across filesystems when needed.
///
/// The cross-device path copies to `<dst>.partial` first and renames it
/// into place, so `dst` never holds a half-written file.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());

    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_ERRNO) => {
            debug!(src = %src.display(), dst = %dst.display(), "Cross-device move, copying");
            let partial = partial_path(dst);
            if let Err(e) = fs::copy(src, &partial).await {
                let _ = fs::remove_file(&partial).await;
                return Err(e.into());
            }
            if let Err(e) = fs::rename(&partial, dst).await {
                let _ = fs::remove_file(&partial).await;
                return Err(e.into());
            }
            remove_quietly(src).await;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Delete a file, logging instead of failing. Missing files are fine.
pub async fn remove_quietly(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed intermediate"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove intermediate"),
    }
}

/// `<dir>/<stem><suffix>.<ext>` next to `path`.
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    path.with_file_name(name)
}

fn partial_path(dst: &Path) -> PathBuf {
    let mut name = dst.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    dst.with_file_name(name)
}
