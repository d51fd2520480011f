//! Drop-directory scanner.

use std::path::{Path, PathBuf};

use log::{debug, info};
use walkdir::WalkDir;

use crate::config::schema::IntakeConfig;
use crate::error::IntakeError;
use crate::extractor::ExtractorRegistry;

use super::{FilenameFilter, IntakeItem};

/// One-shot scanner over a drop directory. Top level only; subdirectories
/// and hidden files are skipped.
pub struct DirectoryScanner {
    directory: PathBuf,
    filter: FilenameFilter,
}

impl DirectoryScanner {
    pub fn new<P: AsRef<Path>>(
        directory: P,
        include: &[String],
        exclude: &[String],
    ) -> Result<Self, IntakeError> {
        Ok(Self {
            directory: directory.as_ref().to_path_buf(),
            filter: FilenameFilter::compile(include, exclude)?,
        })
    }

    /// Builds a scanner from config; `None` when no drop directory is set.
    pub fn from_config(config: &IntakeConfig) -> Result<Option<Self>, IntakeError> {
        match &config.directory {
            Some(dir) => Ok(Some(Self::new(dir, &config.include, &config.exclude)?)),
            None => Ok(None),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Scans once, returning every supported document that passes the
    /// filename filters. MIME types come from the file extension.
    pub fn scan(&self, registry: &ExtractorRegistry) -> Result<Vec<IntakeItem>, IntakeError> {
        let mut items = Vec::new();

        for entry in WalkDir::new(&self.directory).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| IntakeError::ScanFailed {
                path: self.directory.clone(),
                source: e,
            })?;
            let path = entry.path();

            if path.is_dir() {
                continue;
            }
            let file_name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if file_name.starts_with('.') {
                continue;
            }
            if !self.filter.matches(&file_name) {
                debug!("Skipping {} (filename filter)", file_name);
                continue;
            }

            let mime_type = match mime_guess::from_path(path).first() {
                Some(mime) => mime.to_string(),
                None => {
                    debug!("Skipping {} (unknown extension)", file_name);
                    continue;
                }
            };
            if !registry.supports(&mime_type) {
                debug!("Skipping {} (unsupported type {})", file_name, mime_type);
                continue;
            }

            let bytes = std::fs::read(path).map_err(|e| IntakeError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;

            items.push(IntakeItem {
                file_name,
                mime_type,
                bytes,
                mail: None,
            });
        }

        info!(
            "Scanned {} documents in {}",
            items.len(),
            self.directory.display()
        );
        Ok(items)
    }
}
