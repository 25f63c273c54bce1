//! Discovers candidate folders in the input directory.
//!
//! Only immediate subdirectories are considered, in sorted-name order. A
//! folder qualifies when it holds at least one image and exactly one
//! document named `<document_stem>.{txt,docx,md}`. Everything else is
//! reported as skipped and never reaches the pipeline. The scan keeps no
//! state between runs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::AppConfig;
use crate::folder::Folder;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff"];
const DOCUMENT_EXTENSIONS: &[&str] = &["txt", "docx", "md"];

/// Why a folder was left out of the pending set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationProblem {
    #[error("no image files")]
    NoImages,
    #[error("no document file")]
    NoDocument,
    #[error("{0} document files, expected one")]
    MultipleDocuments(usize),
}

#[derive(Debug, Clone)]
pub struct SkippedFolder {
    pub name: String,
    pub path: PathBuf,
    pub problems: Vec<ValidationProblem>,
}

#[derive(Debug, Default)]
pub struct ScanReport {
    /// Valid folders in processing order.
    pub folders: Vec<Folder>,
    pub skipped: Vec<SkippedFolder>,
}

pub struct FolderScanner {
    document_stem: String,
    exclude_names: Vec<String>,
    exclude_paths: Vec<PathBuf>,
}

impl FolderScanner {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            document_stem: config.scan.document_stem.clone(),
            exclude_names: config.scan.exclude.clone(),
            exclude_paths: vec![
                config.paths.output_dir.clone(),
                config.paths.processed_dir.clone(),
            ],
        }
    }

    /// List and validate the subdirectories of `input_dir`.
    pub fn scan(&self, input_dir: &Path) -> io::Result<ScanReport> {
        let mut candidates = Vec::new();
        for entry in fs::read_dir(input_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.is_ignored(&name, &entry.path()) {
                continue;
            }
            candidates.push((name, entry.path()));
        }
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        let mut report = ScanReport::default();
        for (name, path) in candidates {
            match self.validate(&path)? {
                Ok((images, document)) => {
                    report.folders.push(Folder::new(name, path, images, document));
                }
                Err(problems) => {
                    tracing::warn!(
                        folder = %name,
                        problems = %problems.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
                        "skipping folder with invalid structure"
                    );
                    report.skipped.push(SkippedFolder {
                        name,
                        path,
                        problems,
                    });
                }
            }
        }
        Ok(report)
    }

    fn is_ignored(&self, name: &str, path: &Path) -> bool {
        if name.starts_with('.') || self.exclude_names.iter().any(|n| n == name) {
            return true;
        }
        let path = normalize(path);
        self.exclude_paths.iter().any(|p| normalize(p) == path)
    }

    fn validate(&self, dir: &Path) -> io::Result<Result<(Vec<PathBuf>, PathBuf), Vec<ValidationProblem>>> {
        let mut images = Vec::new();
        let mut documents = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
                continue;
            };
            if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                images.push(path);
            } else if DOCUMENT_EXTENSIONS.contains(&ext.as_str())
                && path.file_stem().is_some_and(|s| s.to_string_lossy() == self.document_stem)
            {
                documents.push(path);
            }
        }
        images.sort();
        documents.sort();

        let mut problems = Vec::new();
        if images.is_empty() {
            problems.push(ValidationProblem::NoImages);
        }
        match documents.len() {
            0 => problems.push(ValidationProblem::NoDocument),
            1 => {}
            n => problems.push(ValidationProblem::MultipleDocuments(n)),
        }

        if problems.is_empty() {
            let document = documents.remove(0);
            Ok(Ok((images, document)))
        } else {
            Ok(Err(problems))
        }
    }
}

/// Canonical form when the path exists, the path itself otherwise.
fn normalize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_folder(root: &Path, name: &str, files: &[&str]) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for file in files {
            fs::write(dir.join(file), b"x").unwrap();
        }
    }

    fn scanner_for(root: &Path) -> FolderScanner {
        let mut config = AppConfig::default();
        config.paths.input_dir = root.to_path_buf();
        config.paths.output_dir = root.join("新生成文件");
        config.paths.processed_dir = root.join("已处理文件");
        FolderScanner::new(&config)
    }

    #[test]
    fn returns_valid_folders_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        make_folder(dir.path(), "Beta", &["1.jpg", "正文.txt"]);
        make_folder(dir.path(), "Alpha", &["b.PNG", "a.jpeg", "正文.md"]);
        make_folder(dir.path(), "Charlie", &["x.bmp", "正文.docx"]);

        let report = scanner_for(dir.path()).scan(dir.path()).unwrap();
        let names: Vec<_> = report.folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta", "Charlie"]);
        assert!(report.skipped.is_empty());

        let alpha = &report.folders[0];
        assert_eq!(
            alpha.images,
            vec![dir.path().join("Alpha/a.jpeg"), dir.path().join("Alpha/b.PNG")]
        );
        assert_eq!(alpha.document, dir.path().join("Alpha/正文.md"));
    }

    #[test]
    fn folder_without_document_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        make_folder(dir.path(), "Delta", &["1.jpg", "2.jpg"]);

        let report = scanner_for(dir.path()).scan(dir.path()).unwrap();
        assert!(report.folders.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].name, "Delta");
        assert_eq!(report.skipped[0].problems, vec![ValidationProblem::NoDocument]);
    }

    #[test]
    fn folder_without_images_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        make_folder(dir.path(), "Echo", &["正文.txt", "notes.txt"]);

        let report = scanner_for(dir.path()).scan(dir.path()).unwrap();
        assert!(report.folders.is_empty());
        assert_eq!(report.skipped[0].problems, vec![ValidationProblem::NoImages]);
    }

    #[test]
    fn multiple_documents_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        make_folder(dir.path(), "Foxtrot", &["1.jpg", "正文.txt", "正文.md"]);

        let report = scanner_for(dir.path()).scan(dir.path()).unwrap();
        assert_eq!(
            report.skipped[0].problems,
            vec![ValidationProblem::MultipleDocuments(2)]
        );
    }

    #[test]
    fn documents_with_other_names_are_not_recognized() {
        let dir = tempfile::tempdir().unwrap();
        make_folder(dir.path(), "Golf", &["1.jpg", "draft.txt"]);

        let report = scanner_for(dir.path()).scan(dir.path()).unwrap();
        assert_eq!(report.skipped[0].problems, vec![ValidationProblem::NoDocument]);
    }

    #[test]
    fn ignores_hidden_excluded_and_output_dirs() {
        let dir = tempfile::tempdir().unwrap();
        make_folder(dir.path(), ".git", &["1.jpg", "正文.txt"]);
        make_folder(dir.path(), "新生成文件", &["1.jpg", "正文.txt"]);
        make_folder(dir.path(), "已处理文件", &[]);
        make_folder(dir.path(), "配置与提示词", &["prompt.txt"]);
        make_folder(dir.path(), "Hotel", &["1.jpg", "正文.txt"]);
        fs::write(dir.path().join("stray.jpg"), b"x").unwrap();

        let mut config = AppConfig::default();
        config.paths.output_dir = dir.path().join("新生成文件");
        config.paths.processed_dir = dir.path().join("已处理文件");
        config.scan.exclude = vec!["配置与提示词".to_string()];
        let report = FolderScanner::new(&config).scan(dir.path()).unwrap();

        let names: Vec<_> = report.folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Hotel"]);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn default_config_ignores_helper_dirs() {
        let dir = tempfile::tempdir().unwrap();
        make_folder(dir.path(), "配置与提示词", &["rewrite.txt"]);
        make_folder(dir.path(), "__pycache__", &["x.pyc"]);
        make_folder(dir.path(), "Juliet", &["1.jpg", "正文.txt"]);

        let report = scanner_for(dir.path()).scan(dir.path()).unwrap();
        let names: Vec<_> = report.folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Juliet"]);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn nested_files_are_not_considered() {
        let dir = tempfile::tempdir().unwrap();
        make_folder(dir.path(), "India", &["正文.txt"]);
        make_folder(&dir.path().join("India"), "sub", &["1.jpg"]);

        let report = scanner_for(dir.path()).scan(dir.path()).unwrap();
        assert_eq!(report.skipped[0].problems, vec![ValidationProblem::NoImages]);
    }

    #[test]
    fn missing_input_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scanner_for(dir.path()).scan(&dir.path().join("nope")).is_err());
    }
}
