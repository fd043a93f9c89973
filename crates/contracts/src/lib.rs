//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace: the sink
//! configuration, source records with their completion callbacks, the batch
//! transport capability and the error taxonomy.
//! Business crates depend on this crate only, reverse dependencies are prohibited.

mod batch_config;
mod error;
mod record;
mod transport;

pub use batch_config::*;
pub use error::*;
pub use record::*;
pub use transport::*;
