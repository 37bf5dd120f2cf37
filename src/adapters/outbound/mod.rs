mod baidu_backend;
mod google_backend;
mod response_text;

pub use baidu_backend::{BaiduBackend, BAIDU_BASE_URL};
pub use google_backend::{GoogleBackend, GOOGLE_BASE_URL};

/// Errors raised while constructing a backend strategy.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("invalid backend url `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Join a base URL and an absolute endpoint path.
fn endpoint(base_url: &str, path: &str) -> Result<url::Url, BackendError> {
    let full = format!("{}{}", base_url.trim_end_matches('/'), path);
    url::Url::parse(&full).map_err(|source| BackendError::InvalidUrl { url: full, source })
}
