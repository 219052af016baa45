use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a", "flac", "ogg", "aac"];
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff", "webp"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];

/// Case-insensitive extension check.
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// File stem as an owned string, used for job names and companion lookup.
pub fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Files in `folder` with one of `extensions`, sorted by path.
///
/// A missing or unreadable folder is an error here; callers that treat a
/// missing folder as "no assets" use [`list_matching`].
pub fn read_matching(folder: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, extensions) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub fn list_matching(folder: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    read_matching(folder, extensions).unwrap_or_default()
}

/// Same-named companion of `name` in `folder`. Extensions are tried in the
/// order given.
pub fn find_companion(folder: &Path, name: &str, extensions: &[&str]) -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = list_matching(folder, extensions)
        .into_iter()
        .filter(|p| stem(p) == name)
        .collect();

    extensions.iter().find_map(|ext| {
        candidates
            .iter()
            .find(|p| has_extension(p, &[*ext]))
            .cloned()
    })
}

/// Uniform random pick from `folder`. `None` when the folder is missing or
/// holds no matching file.
pub fn pick_visual_asset<R: Rng + ?Sized>(
    folder: &Path,
    extensions: &[&str],
    rng: &mut R,
) -> Option<PathBuf> {
    list_matching(folder, extensions).choose(rng).cloned()
}

// ---------------------------------------------------------------------------
// AssetHistory
// ---------------------------------------------------------------------------

/// No-repeat selection: an asset is not picked again until every eligible
/// asset has been used once.
#[derive(Debug, Clone, Default)]
pub struct AssetHistory {
    used: HashSet<PathBuf>,
}

impl AssetHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pick<R: Rng + ?Sized>(
        &mut self,
        folder: &Path,
        extensions: &[&str],
        rng: &mut R,
    ) -> Option<PathBuf> {
        self.pick_from(&list_matching(folder, extensions), rng)
    }

    pub fn pick_from<R: Rng + ?Sized>(
        &mut self,
        candidates: &[PathBuf],
        rng: &mut R,
    ) -> Option<PathBuf> {
        if candidates.is_empty() {
            return None;
        }

        let mut fresh: Vec<&PathBuf> = candidates
            .iter()
            .filter(|p| !self.used.contains(*p))
            .collect();
        if fresh.is_empty() {
            self.used.clear();
            fresh = candidates.iter().collect();
        }

        let choice = fresh.choose(rng).map(|p| (*p).clone())?;
        self.used.insert(choice.clone());
        Some(choice)
    }

    pub fn used(&self) -> usize {
        self.used.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
