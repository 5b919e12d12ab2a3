use serde::{Deserialize, Serialize};

use super::ExtractionError;

/// Document-understanding provider: turns scanned bytes (PDF pages,
/// images) into plain text. Hosted OCR backends implement this; the
/// extractor never touches pixels itself.
pub trait OcrProvider {
    fn recognize(&self, bytes: &[u8], mime_type: &str) -> Result<String, ExtractionError>;
}

/// HTTP OCR provider client.
///
/// Posts `{mime_type, content: base64}` and expects `{text}` back. The
/// request timeout is the provider's whole budget; a timed-out call is a
/// failed call.
pub struct HttpOcrProvider {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct OcrRequest<'a> {
    mime_type: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct OcrResponse {
    text: String,
}

impl HttpOcrProvider {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

impl OcrProvider for HttpOcrProvider {
    fn recognize(&self, bytes: &[u8], mime_type: &str) -> Result<String, ExtractionError> {
        use base64::Engine;

        let url = format!("{}/v1/recognize", self.base_url);
        let body = OcrRequest {
            mime_type,
            content: base64::engine::general_purpose::STANDARD.encode(bytes),
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_connect() {
                ExtractionError::OcrConnection(self.base_url.clone())
            } else {
                ExtractionError::OcrConnection(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ExtractionError::OcrProvider {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OcrResponse = response
            .json()
            .map_err(|e| ExtractionError::ResponseParsing(e.to_string()))?;
        Ok(parsed.text)
    }
}

/// Mock OCR provider for testing — returns a configurable text, and
/// records how many calls it served.
pub struct MockOcrProvider {
    response: String,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockOcrProvider {
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl OcrProvider for MockOcrProvider {
    fn recognize(&self, _bytes: &[u8], _mime_type: &str) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(self.response.clone())
    }
}
