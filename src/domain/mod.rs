//! Domain Layer
//!
//! Lookup vocabulary shared by every other layer. No I/O lives here.

pub mod entities;
pub mod ports;
pub mod value_objects;

pub use entities::{TransferStatus, TransportRequest};
pub use ports::BackendStrategy;
pub use value_objects::{BackendKind, Hotkey, HotkeyError};
