//! Reads a source directory into [`Document`]s.
//!
//! Files are dispatched on extension to a [`DocumentFormat`]. A file that
//! cannot be read or parsed is recorded in the [`LoadReport`] and skipped;
//! it never aborts the rest of the directory.

mod formats;

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::domain::Document;

pub use formats::DocumentFormat;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path} as {format}: {message}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub loaded_files: usize,
    pub skipped: Vec<SkippedFile>,
}

impl LoadReport {
    fn skip(&mut self, path: &Path, error: &LoadError) {
        tracing::warn!(path = %path.display(), error = %error, "skipping file");
        self.skipped.push(SkippedFile {
            path: path.to_path_buf(),
            reason: error.to_string(),
        });
    }
}

/// Loads one file with the parser chosen by its extension.
pub fn load_file(path: &Path) -> Result<Vec<Document>, LoadError> {
    let format = DocumentFormat::from_path(path)?;
    let bytes = std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    format.parse(path, &bytes)
}

/// Loads every file under `dir`, recursively, in path order. A missing or
/// empty directory yields an empty report.
pub fn load_directory(dir: &Path) -> LoadReport {
    let mut report = LoadReport::default();
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "source directory not found");
        return report;
    }

    let files: Vec<PathBuf> = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();

    let supported: Vec<&str> = DocumentFormat::ALL.iter().map(|f| f.name()).collect();
    tracing::info!(dir = %dir.display(), files = files.len(), ?supported, "loading documents");

    for (index, path) in files.iter().enumerate() {
        match load_file(path) {
            Ok(documents) => {
                tracing::info!(
                    file = index + 1,
                    total = files.len(),
                    path = %path.display(),
                    documents = documents.len(),
                    "loaded file"
                );
                report.loaded_files += 1;
                report.documents.extend(documents);
            }
            Err(e) => report.skip(path, &e),
        }
    }

    if report.documents.is_empty() {
        tracing::warn!(dir = %dir.display(), "no documents were loaded");
    } else {
        tracing::info!(
            documents = report.documents.len(),
            files = report.loaded_files,
            skipped = report.skipped.len(),
            "documents loaded"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let report = load_directory(&dir.path().join("absent"));
        assert!(report.documents.is_empty());
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_bad_files_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/b.md"), "# Beta\n\nbody").unwrap();
        fs::write(dir.path().join("broken.pdf"), b"not a pdf").unwrap();
        fs::write(dir.path().join("bad.txt"), [0xffu8, 0xfe, 0xfd]).unwrap();
        fs::write(dir.path().join("sheet.xlsx"), b"zip").unwrap();

        let report = load_directory(dir.path());

        let texts: Vec<&str> = report.documents.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["alpha", "Beta\n\nbody"]);
        assert_eq!(report.loaded_files, 2);

        let mut skipped: Vec<String> = report
            .skipped
            .iter()
            .map(|s| s.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        skipped.sort();
        assert_eq!(skipped, vec!["bad.txt", "broken.pdf", "sheet.xlsx"]);
    }

    #[test]
    fn test_load_file_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        fs::write(&path, b"png").unwrap();
        assert!(matches!(load_file(&path), Err(LoadError::UnsupportedFormat(_))));
    }
}
