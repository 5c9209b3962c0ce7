// ngctl-core: Pure types, errors, config, utilities
// No internal ngctl dependencies; this is the foundation crate.

pub mod config;
pub mod error;
pub mod node;
pub mod request;
pub mod stack;
pub mod state;
pub mod time;

pub use error::ReconcileError;
