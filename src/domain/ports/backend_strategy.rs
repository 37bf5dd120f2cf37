//! Backend Strategy Port
//!
//! Defines the interface a remote lookup provider must implement.
//! Implementations live in `adapters::outbound`.

use crate::domain::entities::TransportRequest;
use crate::domain::value_objects::BackendKind;

/// Provider-specific request builder and response parser.
///
/// This is an outbound port. The lookup service asks the active strategy
/// to describe the HTTP request for a pinyin key, and later hands it the
/// raw response bytes collected by the fetch engine. Strategies hold no
/// per-request state, so one instance serves every in-flight lookup.
pub trait BackendStrategy: Send + Sync {
    /// Which provider this strategy talks to.
    fn kind(&self) -> BackendKind;

    /// Build the transport parameters for looking up `key`.
    fn prepare_request(&self, key: &str) -> TransportRequest;

    /// Extract the replacement text from a raw response body.
    ///
    /// Returns an empty string when the body does not contain a usable
    /// result. Must never panic on malformed or truncated input.
    fn parse_response(&self, body: &[u8]) -> String;
}
