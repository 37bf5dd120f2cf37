//! Google Input Tools Backend
//!
//! Implements BackendStrategy against the Google Input Tools endpoint.
//!
//! A typical answer looks like
//! `["SUCCESS",[["nihao",["你好","拟好"],[],{...}]]]`; the first candidate
//! follows the `","["` marker.

use super::{endpoint, response_text, BackendError};
use crate::domain::entities::TransportRequest;
use crate::domain::ports::BackendStrategy;
use crate::domain::value_objects::BackendKind;
use url::Url;

/// Public Google endpoint.
pub const GOOGLE_BASE_URL: &str = "https://www.google.com";

const REQUEST_PATH: &str = "/inputtools/request";
const RESULT_MARKER: &str = "\",[\"";

/// Google Input Tools strategy.
#[derive(Debug, Clone)]
pub struct GoogleBackend {
    endpoint: Url,
}

impl GoogleBackend {
    /// Create a strategy talking to `base_url` (scheme + host, no path).
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        Ok(Self {
            endpoint: endpoint(base_url, REQUEST_PATH)?,
        })
    }
}

impl BackendStrategy for GoogleBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Google
    }

    fn prepare_request(&self, key: &str) -> TransportRequest {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("ime", "pinyin")
            .append_pair("text", key);
        TransportRequest::get(url)
    }

    fn parse_response(&self, body: &[u8]) -> String {
        response_text::string_after(body, RESULT_MARKER)
    }
}
