//! Finding image files to feed into a bulk scrub.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ProcessingConfig;

/// Walks files and directories for images with a supported extension.
pub struct FileDiscovery {
    config: ProcessingConfig,
}

/// An image file found on disk.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub size: u64,
}

impl FileDiscovery {
    pub fn new(config: ProcessingConfig) -> Self {
        Self { config }
    }

    /// Collect supported files from every input, in a stable order.
    ///
    /// Files are sorted by path within each input and inputs keep the order
    /// they were given in. Anything under `exclude` is skipped, so a bulk run
    /// writing into a subdirectory of its input never picks up its own output.
    pub fn discover_all(&self, inputs: &[PathBuf], exclude: Option<&Path>) -> Vec<DiscoveredFile> {
        let exclude = exclude.and_then(|p| p.canonicalize().ok());
        let mut files = Vec::new();

        for input in inputs {
            let mut found = self.discover(input);
            if let Some(exclude) = &exclude {
                found.retain(|f| {
                    f.path
                        .canonicalize()
                        .map(|p| !p.starts_with(exclude))
                        .unwrap_or(true)
                });
            }
            if found.is_empty() {
                tracing::warn!("No supported images found at {:?}", input);
            }
            files.extend(found);
        }
        files
    }

    /// Supported files at one path: the path itself, or everything below it.
    pub fn discover(&self, path: &Path) -> Vec<DiscoveredFile> {
        if path.is_file() {
            return match std::fs::metadata(path) {
                Ok(meta) if self.is_supported(path) => vec![DiscoveredFile {
                    path: path.to_path_buf(),
                    size: meta.len(),
                }],
                _ => vec![],
            };
        }

        let mut files: Vec<DiscoveredFile> = WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && self.is_supported(e.path()))
            .filter_map(|e| {
                let size = e.metadata().ok()?.len();
                Some(DiscoveredFile {
                    path: e.into_path(),
                    size,
                })
            })
            .collect();

        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    fn is_supported(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                self.config
                    .supported_formats
                    .iter()
                    .any(|fmt| fmt.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    pub fn total_size(files: &[DiscoveredFile]) -> u64 {
        files.iter().map(|f| f.size).sum()
    }
}
