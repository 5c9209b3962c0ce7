// ngctl-cli: Clap commands, logging, UI
// Depends on ngctl-core, ngctl-runtime

pub mod commands;
pub mod logging;
pub mod output;
pub mod ui;

pub use commands::run;
