mod backend_strategy;

pub use backend_strategy::BackendStrategy;
