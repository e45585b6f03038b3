//! Run-scoped temp file & directory tracking.
use log::warn;
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{LazyLock, Mutex},
};

static TEMP_FILES: LazyLock<Mutex<HashSet<PathBuf>>> = LazyLock::new(<_>::default);
static TEMP_DIRS: LazyLock<Mutex<HashSet<PathBuf>>> = LazyLock::new(<_>::default);

/// Add a file as temporary so it can be deleted later.
pub fn add(file: impl Into<PathBuf>) {
    TEMP_FILES.lock().unwrap().insert(file.into());
}

/// Remove a previously added file so that it won't be deleted later,
/// if it hasn't already.
pub fn unadd(file: &Path) -> bool {
    TEMP_FILES.lock().unwrap().remove(file)
}

/// Add a directory tree as temporary, e.g. an archive extraction dir.
pub fn add_dir(dir: impl Into<PathBuf>) {
    TEMP_DIRS.lock().unwrap().insert(dir.into());
}

/// Delete all added temporary files & directories. Best effort, delete
/// failures are warnings.
pub async fn clean() {
    for file in std::mem::take(&mut *TEMP_FILES.lock().unwrap()) {
        if let Err(err) = tokio::fs::remove_file(&file).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("could not remove temp file {}: {err}", file.display());
            }
        }
    }
    for dir in std::mem::take(&mut *TEMP_DIRS.lock().unwrap()) {
        if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("could not remove temp dir {}: {err}", dir.display());
            }
        }
    }
}
