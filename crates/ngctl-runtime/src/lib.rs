// ngctl-runtime: Reconciliation engine, external adapters, state persistence
// Depends on ngctl-core

pub mod cancel;
pub mod membership;
pub mod mock;
pub mod poller;
pub mod reconciler;
pub mod shell;
pub mod stack;
pub mod store;
pub mod templates;
pub mod tracker;

pub use reconciler::{Outcome, ReconcileReport, Reconciler};
