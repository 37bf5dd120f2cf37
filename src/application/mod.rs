pub mod lookup_service;

pub use lookup_service::{LookupOptions, LookupService, LookupStats};
