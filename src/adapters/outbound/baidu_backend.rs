//! Baidu Online IME Backend
//!
//! Implements BackendStrategy against the Baidu `olime` endpoint, which
//! answers with `{"0":[[["你好",5,{...}]]],"1":"ni'hao",...}`.

use super::{endpoint, response_text, BackendError};
use crate::domain::entities::TransportRequest;
use crate::domain::ports::BackendStrategy;
use crate::domain::value_objects::BackendKind;
use url::Url;

/// Public Baidu endpoint.
pub const BAIDU_BASE_URL: &str = "https://olime.baidu.com";

const REQUEST_PATH: &str = "/py";
const RESULT_MARKER: &str = "[[[\"";

/// Baidu online IME strategy.
#[derive(Debug, Clone)]
pub struct BaiduBackend {
    endpoint: Url,
}

impl BaiduBackend {
    /// Create a strategy talking to `base_url` (scheme + host, no path).
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        Ok(Self {
            endpoint: endpoint(base_url, REQUEST_PATH)?,
        })
    }
}

impl BackendStrategy for BaiduBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Baidu
    }

    fn prepare_request(&self, key: &str) -> TransportRequest {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("rn", "0")
            .append_pair("pn", "1")
            .append_pair("ol", "1")
            .append_pair("py", key);
        TransportRequest::get(url)
    }

    fn parse_response(&self, body: &[u8]) -> String {
        response_text::string_after(body, RESULT_MARKER)
    }
}
