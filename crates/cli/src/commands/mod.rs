//! Command implementations.

mod run;
mod validate;

pub use run::run_sink;
pub use validate::run_validate;
