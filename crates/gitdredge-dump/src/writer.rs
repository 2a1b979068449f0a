use std::path::{Component, Path, PathBuf};

use fs_err::tokio as fs;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::item::Item;

/// Consumes the save channel and mirrors every item under the dump root.
/// A single writer serializes all filesystem writes. Returns how many items
/// landed on disk.
pub(crate) async fn run(root: PathBuf, mut items: mpsc::Receiver<Item>) -> usize {
    let mut saved = 0;
    while let Some(item) = items.recv().await {
        match save(&root, &item).await {
            Ok(()) => saved += 1,
            Err(err) => warn!("[{}]: {err}", item.path),
        }
    }
    saved
}

async fn save(root: &Path, item: &Item) -> std::io::Result<()> {
    let Some(relative) = safe_relative_path(&item.path) else {
        return Err(std::io::Error::other("path escapes the dump directory"));
    };
    let target = root.join(relative);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(&target, &item.data).await?;
    debug!("saved {} ({} bytes)", item.path, item.data.len());
    Ok(())
}

/// Remote paths are attacker-controlled; only plain relative components may
/// touch the filesystem.
pub(crate) fn safe_relative_path(path: &str) -> Option<PathBuf> {
    if path.is_empty() {
        return None;
    }
    let path = Path::new(path);
    path.components()
        .all(|component| matches!(component, Component::Normal(_)))
        .then(|| path.to_path_buf())
}
