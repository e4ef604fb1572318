//! Sorted discovery of dataset files below a root directory.

use log::{debug, warn};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Configuration for file discovery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// File extension to keep, without the leading dot.
    pub extension: String,
    /// Path components containing this marker are skipped with everything
    /// below them.
    pub quarantine_marker: Option<String>,
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Follow symbolic links while walking.
    pub follow_links: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            extension: "h5".to_string(),
            quarantine_marker: Some("quarantine".to_string()),
            recursive: true,
            follow_links: true,
        }
    }
}

impl DiscoveryConfig {
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Set the quarantine marker; `None` disables exclusion.
    #[must_use]
    pub fn with_quarantine_marker(mut self, marker: Option<String>) -> Self {
        self.quarantine_marker = marker;
        self
    }

    #[must_use]
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    #[must_use]
    pub fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    fn is_quarantined(&self, root: &Path, path: &Path) -> bool {
        let Some(marker) = self.quarantine_marker.as_deref() else {
            return false;
        };
        if marker.is_empty() {
            return false;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        relative
            .components()
            .any(|c| c.as_os_str().to_string_lossy().contains(marker))
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension() == Some(OsStr::new(&self.extension))
    }
}

/// Lists the dataset files below `root` in lexicographic path order.
///
/// Entries that cannot be visited (dangling links, permission errors) are
/// logged and skipped. A root that does not exist yields an empty list.
#[must_use]
pub fn list_files(root: &Path, config: &DiscoveryConfig) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(root).follow_links(config.follow_links);
    if !config.recursive {
        walker = walker.max_depth(1);
    }

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_entry(|entry: &DirEntry| !config.is_quarantined(root, entry.path()))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("skipping unreadable entry below {}: {err}", root.display());
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && config.has_extension(entry.path()))
        .map(DirEntry::into_path)
        .collect();

    files.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
    debug!("found {} files below {}", files.len(), root.display());
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    fn names(root: &Path, files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn lists_sorted_h5_files_recursively() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("b.h5"));
        touch(&root.join("a.h5"));
        touch(&root.join("notes.txt"));
        touch(&root.join("sub/c.h5"));

        let files = list_files(root, &DiscoveryConfig::default());
        assert_eq!(names(root, &files), vec!["a.h5", "b.h5", "sub/c.h5"]);
    }

    #[test]
    fn quarantined_paths_are_excluded() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("good.h5"));
        touch(&root.join("quarantine/bad.h5"));
        touch(&root.join("old_quarantined_runs/bad.h5"));
        touch(&root.join("quarantine_me.h5"));

        let files = list_files(root, &DiscoveryConfig::default());
        assert_eq!(names(root, &files), vec!["good.h5"]);

        let config = DiscoveryConfig::default().with_quarantine_marker(None);
        assert_eq!(list_files(root, &config).len(), 4);
    }

    #[test]
    fn marker_in_root_path_does_not_hide_everything() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("quarantine_area");
        touch(&root.join("x.h5"));

        let files = list_files(&root, &DiscoveryConfig::default());
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn non_recursive_lists_top_level_only() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("top.h5"));
        touch(&root.join("nested/deep.h5"));

        let config = DiscoveryConfig::default().with_recursive(false);
        assert_eq!(names(root, &list_files(root, &config)), vec!["top.h5"]);
    }

    #[test]
    fn custom_extension() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a.hdf5"));
        touch(&root.join("b.h5"));

        let config = DiscoveryConfig::default().with_extension("hdf5");
        assert_eq!(names(root, &list_files(root, &config)), vec!["a.hdf5"]);
    }

    #[test]
    fn missing_root_yields_nothing() {
        let dir = tempdir().unwrap();
        let files = list_files(&dir.path().join("absent"), &DiscoveryConfig::default());
        assert!(files.is_empty());
    }
}
