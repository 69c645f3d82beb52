pub mod api;
pub mod metrics;
pub mod session;
pub mod state;
