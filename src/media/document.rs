use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::DocumentReader;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse DOCX {}: {message}", .path.display())]
    Docx { path: PathBuf, message: String },

    #[error("cannot detect text encoding of {}", .path.display())]
    Encoding { path: PathBuf },

    #[error("unsupported document type: {0}")]
    Unsupported(String),

    #[error("document has no text")]
    Empty,
}

/// Reads `.txt`, `.md` and `.docx` documents from disk.
#[derive(Debug, Clone, Default)]
pub struct FsDocumentReader;

impl DocumentReader for FsDocumentReader {
    fn read(&self, path: &Path) -> Result<String, DocumentError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let text = match ext.as_str() {
            "txt" | "md" => {
                let bytes = std::fs::read(path).map_err(|source| DocumentError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                decode_text(&bytes, path)?
            }
            "docx" => read_docx(path)?,
            other => return Err(DocumentError::Unsupported(other.to_string())),
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(DocumentError::Empty);
        }

        tracing::debug!(path = %path.display(), chars = text.chars().count(), "document read");
        Ok(text.to_string())
    }
}

/// UTF-8 (optional BOM), else GBK, else Big5, taking the first that
/// decodes without errors. GBK covers GB2312. CRLF becomes LF.
fn decode_text(bytes: &[u8], path: &Path) -> Result<String, DocumentError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => [encoding_rs::GBK, encoding_rs::BIG5]
            .into_iter()
            .find_map(|encoding| {
                let text = encoding.decode_without_bom_handling_and_without_replacement(bytes)?;
                if has_private_use(&text) {
                    return None;
                }
                tracing::debug!(path = %path.display(), encoding = encoding.name(), "decoded legacy encoding");
                Some(text.into_owned())
            })
            .ok_or_else(|| DocumentError::Encoding {
                path: path.to_path_buf(),
            })?,
    };
    Ok(text.replace("\r\n", "\n"))
}

/// GBK user-defined rows decode to the private use area; real text never
/// lands there, Big5 bytes read as GBK often do.
fn has_private_use(text: &str) -> bool {
    text.chars().any(|c| ('\u{E000}'..='\u{F8FF}').contains(&c))
}

fn read_docx(path: &Path) -> Result<String, DocumentError> {
    let bytes = std::fs::read(path).map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let doc = docx_rs::read_docx(&bytes).map_err(|e| DocumentError::Docx {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut paragraphs = Vec::new();
    for child in &doc.document.children {
        if let docx_rs::DocumentChild::Paragraph(para) = child {
            let mut line = String::new();
            for p_child in &para.children {
                match p_child {
                    docx_rs::ParagraphChild::Run(run) => push_run_text(run, &mut line),
                    docx_rs::ParagraphChild::Hyperlink(link) => {
                        for inner in &link.children {
                            if let docx_rs::ParagraphChild::Run(run) = inner {
                                push_run_text(run, &mut line);
                            }
                        }
                    }
                    _ => {}
                }
            }
            if !line.trim().is_empty() {
                paragraphs.push(line);
            }
        }
    }

    Ok(paragraphs.join("\n"))
}

fn push_run_text(run: &docx_rs::Run, out: &mut String) {
    for run_child in &run.children {
        if let docx_rs::RunChild::Text(text) = run_child {
            out.push_str(&text.text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_txt_with_bom_and_crlf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("正文.txt");
        std::fs::write(&path, b"\xEF\xBB\xBF  first line\r\nsecond line\r\n\r\n").unwrap();

        let text = FsDocumentReader.read(&path).unwrap();
        assert_eq!(text, "first line\nsecond line");
    }

    #[test]
    fn reads_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("正文.MD");
        std::fs::write(&path, "# 标题\n\n内容").unwrap();

        assert_eq!(FsDocumentReader.read(&path).unwrap(), "# 标题\n\n内容");
    }

    #[test]
    fn gbk_text_is_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("正文.txt");
        let (bytes, _, unmappable) = encoding_rs::GBK.encode("春天的野餐\r\n记录");
        assert!(!unmappable);
        std::fs::write(&path, &bytes).unwrap();

        assert_eq!(FsDocumentReader.read(&path).unwrap(), "春天的野餐\n记录");
    }

    #[test]
    fn big5_text_is_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("正文.txt");
        let (bytes, _, unmappable) = encoding_rs::BIG5.encode("一丁七乃九了二人");
        assert!(!unmappable);
        std::fs::write(&path, &bytes).unwrap();

        assert_eq!(FsDocumentReader.read(&path).unwrap(), "一丁七乃九了二人");
    }

    #[test]
    fn undecodable_bytes_are_an_encoding_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("正文.txt");
        std::fs::write(&path, b"ok \xFF\xFE text").unwrap();

        assert!(matches!(
            FsDocumentReader.read(&path),
            Err(DocumentError::Encoding { .. })
        ));
    }

    #[test]
    fn blank_document_is_empty_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("正文.txt");
        std::fs::write(&path, " \n\t\n").unwrap();

        assert!(matches!(FsDocumentReader.read(&path), Err(DocumentError::Empty)));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsDocumentReader.read(&dir.path().join("正文.txt")).unwrap_err();
        assert!(matches!(err, DocumentError::Io { .. }));
    }

    #[test]
    fn unsupported_extension() {
        let err = FsDocumentReader.read(Path::new("notes.pdf")).unwrap_err();
        assert!(matches!(err, DocumentError::Unsupported(ext) if ext == "pdf"));
    }

    #[test]
    fn reads_docx_paragraphs() {
        use docx_rs::{Docx, Paragraph, Run};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("正文.docx");
        let file = std::fs::File::create(&path).unwrap();
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("第一段")))
            .add_paragraph(Paragraph::new())
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text("second "))
                    .add_run(Run::new().add_text("paragraph")),
            )
            .build()
            .pack(file)
            .unwrap();

        let text = FsDocumentReader.read(&path).unwrap();
        assert_eq!(text, "第一段\nsecond paragraph");
    }

    #[test]
    fn corrupt_docx_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("正文.docx");
        std::fs::write(&path, b"PK not really a zip").unwrap();

        assert!(matches!(
            FsDocumentReader.read(&path),
            Err(DocumentError::Docx { .. })
        ));
    }
}
