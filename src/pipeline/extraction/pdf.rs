use lopdf::Document;

use super::ExtractionError;

/// Hosted OCR backends reject documents beyond this page count, so larger
/// PDFs are split into sub-documents before submission.
pub const PAGE_CEILING: usize = 30;

pub fn page_count(bytes: &[u8]) -> Result<usize, ExtractionError> {
    let doc = Document::load_mem(bytes).map_err(|e| ExtractionError::Pdf(e.to_string()))?;
    Ok(doc.get_pages().len())
}

/// Split a PDF into sub-documents of at most `max_pages` pages each,
/// preserving page order. A PDF at or under the ceiling is returned
/// whole, untouched.
pub fn split_pdf(bytes: &[u8], max_pages: usize) -> Result<Vec<Vec<u8>>, ExtractionError> {
    let total = page_count(bytes)?;
    if total <= max_pages {
        return Ok(vec![bytes.to_vec()]);
    }

    let mut parts = Vec::new();
    let mut start = 1u32; // lopdf page numbers are 1-based

    while (start as usize) <= total {
        let end = ((start as usize + max_pages - 1).min(total)) as u32;

        let mut doc =
            Document::load_mem(bytes).map_err(|e| ExtractionError::Pdf(e.to_string()))?;
        let delete: Vec<u32> = (1..=total as u32)
            .filter(|p| *p < start || *p > end)
            .collect();
        doc.delete_pages(&delete);
        doc.prune_objects();

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|e| ExtractionError::Pdf(e.to_string()))?;
        parts.push(out);

        start = end + 1;
    }

    Ok(parts)
}
