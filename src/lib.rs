//! # ngctl: node-group lifecycle reconciler
//!
//! Facade crate that re-exports the ngctl workspace crates so consumers
//! can depend on a single `ngctl` library.
//!
//! ## Crate breakdown
//!
//! | Module | Crate | Purpose |
//! |--------|-------|---------|
//! | [`core`] | ngctl-core | Request, stack and state types, errors, config |
//! | [`runtime`] | ngctl-runtime | Poller, stack provisioner, membership verifier, reconciler |
//! | [`cli`] | ngctl-cli | Clap commands, logging, terminal UI |

pub use ngctl_cli as cli;
pub use ngctl_core as core;
pub use ngctl_runtime as runtime;
