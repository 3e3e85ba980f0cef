//! Local video files and the titles they are published under.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;
use walkdir::WalkDir;

pub const DEFAULT_EXTENSIONS: &[&str] = &["mp4"];

/// Media files found directly inside a set of root directories.
#[derive(Debug, Clone, Default)]
pub struct VideoRepo {
    pub roots: Vec<PathBuf>,
    pub title_to_path: BTreeMap<String, PathBuf>,
}

impl VideoRepo {
    /// Scans each root (not recursively) for files with one of `extensions`.
    /// When two roots yield the same title the later root wins.
    pub fn scan(roots: &[PathBuf], extensions: &[String]) -> Result<Self> {
        let mut title_to_path = BTreeMap::new();
        for root in roots {
            for entry in WalkDir::new(root)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
            {
                let entry = entry.with_context(|| format!("Scanning {}", root.display()))?;
                if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
                    continue;
                }
                let Some(title) = title_from_path(entry.path()) else {
                    continue;
                };
                title_to_path.insert(title, entry.into_path());
            }
        }
        info!(files = title_to_path.len(), roots = roots.len(), "scanned local videos");
        Ok(Self {
            roots: roots.to_vec(),
            title_to_path,
        })
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.title_to_path.keys().map(String::as_str)
    }

    pub fn path_for(&self, title: &str) -> Option<&Path> {
        self.title_to_path.get(title).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.title_to_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.title_to_path.is_empty()
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

/// `RIGSS_01_001.mp4` is published as `RIGSS 01 001`.
pub fn title_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    Some(stem.replace('_', " "))
}
