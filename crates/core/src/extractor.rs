use crate::error::IndexError;
use crate::models::FileKind;
use lopdf::Document;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IndexError>;
}

/// Turns a file into raw text according to its kind.
///
/// `Ok(None)` means the kind carries no text; the caller still tracks the
/// file. Errors are per-file and never abort a walk.
pub trait TextExtractor {
    fn extract(&self, path: &Path, kind: FileKind) -> Result<Option<String>, IndexError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IndexError> {
        let document = Document::load(path).map_err(|error| IndexError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IndexError::PdfParse(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        Ok(pages)
    }
}

pub struct FileTextExtractor<P = LopdfExtractor> {
    pdf: P,
}

impl Default for FileTextExtractor {
    fn default() -> Self {
        Self {
            pdf: LopdfExtractor,
        }
    }
}

impl<P: PdfExtractor> FileTextExtractor<P> {
    pub fn with_pdf_extractor(pdf: P) -> Self {
        Self { pdf }
    }
}

impl<P: PdfExtractor> TextExtractor for FileTextExtractor<P> {
    fn extract(&self, path: &Path, kind: FileKind) -> Result<Option<String>, IndexError> {
        match kind {
            FileKind::Pdf => {
                let pages = self.pdf.extract_pages(path)?;
                Ok(Some(join_pages(&pages)))
            }
            FileKind::PlainText => read_utf8(path).map(Some),
            FileKind::Unsupported => Ok(None),
        }
    }
}

pub fn extract_text(path: &Path, kind: FileKind) -> Result<Option<String>, IndexError> {
    FileTextExtractor::default().extract(path, kind)
}

fn join_pages(pages: &[PageText]) -> String {
    let mut ordered = pages.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|page| page.number);
    ordered
        .into_iter()
        .map(|page| page.text.trim())
        .collect::<Vec<_>>()
        .join("\n")
}

fn read_utf8(path: &Path) -> Result<String, IndexError> {
    let bytes = std::fs::read(path)?;
    String::from_utf8(bytes)
        .map_err(|error| IndexError::Encoding(format!("{}: {error}", path.display())))
}
