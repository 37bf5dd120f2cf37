//! Adapters Layer
//!
//! Inbound adapters drive the lookup service; outbound adapters implement
//! the domain ports against real providers.

pub mod inbound;
pub mod outbound;
