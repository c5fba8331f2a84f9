//! Recursive discovery of schema definition files.

use std::fs;
use std::path::{Path, PathBuf};

use globset::{GlobSet, GlobSetBuilder};
use tracing::{debug, warn};

use crate::error::{Result, ValidationError};

/// Walks a schema directory tree and yields schema files in a stable order.
#[derive(Debug, Clone)]
pub struct SchemaDiscovery {
    /// File extensions to include, lowercase
    extensions: Vec<String>,
    /// Exclude patterns set
    exclude_set: Option<GlobSet>,
    /// Maximum depth for directory traversal (None = unlimited)
    max_depth: Option<usize>,
    /// Follow symbolic links
    follow_symlinks: bool,
}

impl SchemaDiscovery {
    pub fn new() -> Self {
        Self {
            extensions: vec!["xsd".to_string()],
            exclude_set: None,
            max_depth: None,
            follow_symlinks: false,
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions.into_iter().map(|e| e.to_lowercase()).collect();
        self
    }

    /// Skip files matching any of the given glob patterns.
    pub fn with_exclude_patterns(mut self, patterns: &[String]) -> Result<Self> {
        if patterns.is_empty() {
            self.exclude_set = None;
            return Ok(self);
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = globset::GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    ValidationError::Config(format!("Invalid glob pattern '{}': {}", pattern, e))
                })?;
            builder.add(glob);
        }

        self.exclude_set = Some(builder.build().map_err(|e| {
            ValidationError::Config(format!("Failed to build exclude glob set: {}", e))
        })?);
        Ok(self)
    }

    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Enumerate schema files under `root`, sorted by path.
    ///
    /// A missing or unreadable root is an error; unreadable entries below it
    /// are logged and skipped.
    pub fn discover(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let metadata = fs::metadata(root).map_err(|e| ValidationError::FileSystemTraversal {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut files = Vec::new();
        if metadata.is_file() {
            if self.should_process(root) {
                files.push(root.to_path_buf());
            }
            return Ok(files);
        }

        self.walk(root, 0, &mut files)?;
        files.sort();

        debug!(root = %root.display(), count = files.len(), "Discovered schema files");
        Ok(files)
    }

    fn walk(&self, dir: &Path, depth: usize, files: &mut Vec<PathBuf>) -> Result<()> {
        let entries = fs::read_dir(dir).map_err(|e| ValidationError::FileSystemTraversal {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();

            if path.is_symlink() && !self.follow_symlinks {
                continue;
            }

            if path.is_dir() {
                if self.max_depth.is_some_and(|max| depth >= max) {
                    continue;
                }
                if let Err(e) = self.walk(&path, depth + 1, files) {
                    warn!(dir = %path.display(), error = %e, "Skipping unreadable directory");
                }
            } else if self.should_process(&path) {
                files.push(path);
            }
        }

        Ok(())
    }

    /// Check if a file should be processed based on extension and excludes
    pub fn should_process(&self, path: &Path) -> bool {
        let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        if !self.extensions.contains(&extension.to_lowercase()) {
            return false;
        }

        if let Some(exclude_set) = &self.exclude_set
            && exclude_set.is_match(path)
        {
            return false;
        }

        true
    }
}

impl Default for SchemaDiscovery {
    fn default() -> Self {
        Self::new()
    }
}
