use std::io::Read;

use regex::Regex;

use super::pdf::{split_pdf, PAGE_CEILING};
use super::types::OcrProvider;
use super::ExtractionError;

/// Convert uploaded bytes into normalized plain text, dispatching on the
/// declared MIME type.
///
/// Unsupported types yield empty text; deciding whether empty output is
/// terminal for the material belongs to the lifecycle controller.
pub fn extract_text(
    bytes: &[u8],
    mime_type: &str,
    ocr: &dyn OcrProvider,
) -> Result<String, ExtractionError> {
    let mime = mime_type
        .split(';')
        .next()
        .unwrap_or(mime_type)
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "text/plain" | "text/markdown" | "text/csv" => {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        "text/html" | "application/xhtml+xml" => {
            Ok(strip_html(&String::from_utf8_lossy(bytes)))
        }
        "application/rtf" | "text/rtf" => Ok(strip_rtf(&String::from_utf8_lossy(bytes))),
        "application/pdf" => extract_pdf(bytes, ocr),
        m if m.starts_with("image/") => ocr.recognize(bytes, &mime),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
            extract_zip_parts(bytes, |name| name == "word/document.xml")
        }
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
            extract_zip_parts(bytes, |name| {
                name.starts_with("ppt/slides/slide") && name.ends_with(".xml")
            })
        }
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
            extract_zip_parts(bytes, |name| {
                name == "xl/sharedStrings.xml"
                    || (name.starts_with("xl/worksheets/") && name.ends_with(".xml"))
            })
        }
        "application/vnd.oasis.opendocument.text"
        | "application/vnd.oasis.opendocument.presentation"
        | "application/vnd.oasis.opendocument.spreadsheet" => {
            extract_zip_parts(bytes, |name| name == "content.xml")
        }
        other => {
            tracing::debug!(mime_type = other, "Unsupported MIME type — empty extraction");
            Ok(String::new())
        }
    }
}

/// Route a PDF through the OCR provider, splitting documents over the
/// page ceiling and concatenating the extracted parts in order.
fn extract_pdf(bytes: &[u8], ocr: &dyn OcrProvider) -> Result<String, ExtractionError> {
    let parts = split_pdf(bytes, PAGE_CEILING)?;
    if parts.len() > 1 {
        tracing::info!(parts = parts.len(), "PDF over page ceiling — split for OCR");
    }

    let mut texts = Vec::with_capacity(parts.len());
    for part in &parts {
        texts.push(ocr.recognize(part, "application/pdf")?);
    }
    Ok(texts.join("\n"))
}

/// Locate embedded XML parts by filename convention and strip their tags.
fn extract_zip_parts(
    bytes: &[u8],
    wanted: impl Fn(&str) -> bool,
) -> Result<String, ExtractionError> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive =
        zip::ZipArchive::new(cursor).map_err(|e| ExtractionError::Archive(e.to_string()))?;

    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| wanted(n))
        .map(String::from)
        .collect();
    names.sort_by_key(|n| part_sort_key(n));

    let mut texts = Vec::with_capacity(names.len());
    for name in &names {
        let mut file = archive
            .by_name(name)
            .map_err(|e| ExtractionError::Archive(e.to_string()))?;
        let mut xml = String::new();
        file.read_to_string(&mut xml)?;
        texts.push(strip_xml_tags(&xml));
    }
    Ok(texts.join("\n"))
}

/// Numbered parts sort by their trailing index, so slide10 follows
/// slide2 instead of slide1.
fn part_sort_key(name: &str) -> (String, u64) {
    let stem = name.strip_suffix(".xml").unwrap_or(name);
    let split = stem
        .rfind(|c: char| !c.is_ascii_digit())
        .map_or(0, |i| i + 1);
    let number = stem[split..].parse().unwrap_or(0);
    (stem[..split].to_string(), number)
}

/// Strip HTML down to text: script/style bodies removed, tags removed,
/// common entities decoded.
pub fn strip_html(html: &str) -> String {
    let no_scripts = Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)>")
        .unwrap()
        .replace_all(html, " ");
    let no_comments = Regex::new(r"(?s)<!--.*?-->")
        .unwrap()
        .replace_all(&no_scripts, " ");
    let with_breaks = Regex::new(r"(?i)<(br|/p|/div|/li|/h[1-6]|/tr)[^>]*>")
        .unwrap()
        .replace_all(&no_comments, "\n");
    let no_tags = Regex::new(r"<[^>]+>")
        .unwrap()
        .replace_all(&with_breaks, " ");
    decode_entities(&no_tags)
}

fn strip_xml_tags(xml: &str) -> String {
    // Word/ODF run boundaries become spaces so words do not fuse.
    let no_tags = Regex::new(r"<[^>]+>").unwrap().replace_all(xml, " ");
    decode_entities(&no_tags)
}

fn decode_entities(text: &str) -> String {
    let mut out = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'");
    // Numeric references, decimal only.
    let numeric = Regex::new(r"&#(\d+);").unwrap();
    out = numeric
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            caps[1]
                .parse::<u32>()
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_default()
        })
        .into_owned();
    // Ampersand last so freshly decoded text is not re-decoded.
    out = out.replace("&amp;", "&");
    collapse_spaces(&out)
}

/// Strip RTF control words, hex escapes, and group braces.
pub fn strip_rtf(rtf: &str) -> String {
    let para_breaks = Regex::new(r"\\par[d]?\b")
        .unwrap()
        .replace_all(rtf, "\n");
    let no_hex = Regex::new(r"\\'[0-9a-fA-F]{2}")
        .unwrap()
        .replace_all(&para_breaks, " ");
    let no_controls = Regex::new(r"\\[a-zA-Z]+-?\d* ?")
        .unwrap()
        .replace_all(&no_hex, "");
    let no_braces = no_controls.replace(['{', '}'], " ");
    collapse_spaces(&no_braces)
}

fn collapse_spaces(text: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect();
    lines.join("\n")
}
