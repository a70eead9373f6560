//! Document loading: turns uploaded bytes into plain-text sections.

use crate::errors::AppError;

/// Plain text from one page of a PDF, or a whole text/markdown file.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSection {
    pub page: Option<u32>,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
    Markdown,
}

impl DocumentKind {
    /// Detects the kind from a file name's extension (case-insensitive).
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let ext = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Text),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "txt",
            Self::Markdown => "md",
        }
    }
}

/// Extracts text sections from raw document bytes, picking the parser by
/// file extension.
///
/// PDF extraction is CPU-bound; call this from `spawn_blocking`.
pub fn load_document(file_name: &str, bytes: &[u8]) -> Result<Vec<LoadedSection>, AppError> {
    let kind = DocumentKind::from_file_name(file_name).ok_or_else(|| {
        AppError::Validation(format!("unsupported file type: {file_name}"))
    })?;
    let sections = match kind {
        DocumentKind::Pdf => {
            let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
                AppError::UnprocessableEntity(format!("Could not read PDF: {e}"))
            })?;
            split_pages(&text)
        }
        DocumentKind::Text | DocumentKind::Markdown => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            vec![LoadedSection {
                page: None,
                content: text,
            }]
        }
    };

    let sections: Vec<LoadedSection> = sections
        .into_iter()
        .filter(|s| !s.content.trim().is_empty())
        .collect();

    if sections.is_empty() {
        return Err(AppError::UnprocessableEntity(
            "Document contains no extractable text".into(),
        ));
    }
    Ok(sections)
}

/// Pages in extracted PDF text are separated by form feeds.
fn split_pages(text: &str) -> Vec<LoadedSection> {
    text.split('\u{c}')
        .enumerate()
        .map(|(i, page)| LoadedSection {
            page: Some(i as u32 + 1),
            content: page.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_file_name() {
        assert_eq!(DocumentKind::from_file_name("Notes.PDF"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_file_name("a.b.md"), Some(DocumentKind::Markdown));
        assert_eq!(DocumentKind::from_file_name("plain.txt"), Some(DocumentKind::Text));
        assert_eq!(DocumentKind::from_file_name("slides.pptx"), None);
        assert_eq!(DocumentKind::from_file_name("README"), None);
    }

    #[test]
    fn test_text_loads_as_single_section() {
        let sections = load_document("notes.txt", "hello\nworld".as_bytes()).unwrap();
        assert_eq!(
            sections,
            vec![LoadedSection {
                page: None,
                content: "hello\nworld".into()
            }]
        );
    }

    #[test]
    fn test_invalid_utf8_is_replaced_not_rejected() {
        let sections = load_document("notes.md", &[b'o', b'k', 0xff]).unwrap();
        assert!(sections[0].content.starts_with("ok"));
    }

    #[test]
    fn test_blank_document_rejected() {
        let err = load_document("blank.txt", b"  \n\t ").unwrap_err();
        assert!(matches!(err, AppError::UnprocessableEntity(_)));
    }

    #[test]
    fn test_garbage_pdf_rejected() {
        let err = load_document("broken.pdf", b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, AppError::UnprocessableEntity(_)));
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let err = load_document("deck.pptx", b"PK").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_split_pages_numbers_from_one() {
        let pages = split_pages("first\u{c}second\u{c}");
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].page, Some(1));
        assert_eq!(pages[1].content, "second");
    }
}
