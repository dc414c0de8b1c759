//! Fuel-optimal continuous descent planning with STA waypoint spacing analysis.
//!
//! The workspace crates are re-exported here so front-ends and tests can reach the whole
//! stack through one dependency; [`pipeline`] chains them into a full run.

pub mod pipeline;

pub use cda_config as config;
pub use cda_core::{grid, units};
pub use cda_dynamics as dynamics;
pub use cda_export as export;
pub use cda_nlp as nlp;
pub use cda_spacing as spacing;
pub use cda_trajectory as trajectory;

/// Returns the version of the library for smoke tests.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
