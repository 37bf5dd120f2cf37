//! Domain Entities - Lookup requests and their outcomes
//!
//! These types travel between the lookup service, the backend strategies
//! and the fetch engine. They carry no behaviour beyond classification.

use std::fmt;

/// Transport parameters for a single remote lookup.
///
/// Built by a [`BackendStrategy`](crate::domain::ports::BackendStrategy)
/// on the caller thread and executed by the fetch engine on its worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    /// Fully encoded URL for the HTTP GET
    pub url: String,
}

impl TransportRequest {
    /// Create a GET request for the given URL.
    pub fn get(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Outcome of the network transfer attached to a request slot.
///
/// The fetch engine never raises errors across the thread boundary; every
/// transfer ends with one of these values recorded on its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferStatus {
    /// No transfer has run for this slot yet
    #[default]
    NotStarted,
    /// The server answered with this HTTP status code
    Http(u16),
    /// The per-request deadline expired
    Timeout,
    /// The connection could not be established
    ConnectFailed,
    /// The response body exceeded the configured buffer limit
    Overflow,
    /// Any other transport-level error (TLS, protocol, broken body)
    TransportError,
    /// The engine was torn down before the transfer completed
    Cancelled,
}

impl TransferStatus {
    /// True for a 2xx HTTP response.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Http(code) if (200..300).contains(code))
    }

    /// True when the transfer ran and failed at the transport level.
    ///
    /// These are the only outcomes that count as evidence of an unhealthy
    /// backend. `NotStarted` and `Cancelled` never reached the network.
    pub fn is_transport_failure(&self) -> bool {
        match self {
            Self::Http(_) => !self.is_success(),
            Self::Timeout | Self::ConnectFailed | Self::Overflow | Self::TransportError => true,
            Self::NotStarted | Self::Cancelled => false,
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not-started"),
            Self::Http(code) => write!(f, "http {}", code),
            Self::Timeout => write!(f, "timeout"),
            Self::ConnectFailed => write!(f, "connect-failed"),
            Self::Overflow => write!(f, "overflow"),
            Self::TransportError => write!(f, "transport-error"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
