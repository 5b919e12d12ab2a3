pub mod types;
pub mod extractor;
pub mod pdf;

pub use extractor::extract_text;
pub use types::{HttpOcrProvider, MockOcrProvider, OcrProvider};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("OCR provider error (status {status}): {body}")]
    OcrProvider { status: u16, body: String },

    #[error("OCR provider connection failed: {0}")]
    OcrConnection(String),

    #[error("OCR response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Malformed archive: {0}")]
    Archive(String),

    #[error("Malformed PDF: {0}")]
    Pdf(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
