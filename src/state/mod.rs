//! Persisted deployment state.
//!
//! Existing instances, agent reports, held addresses and published DNS
//! records survive between runs in a JSON state file.

mod local;
mod store;
mod types;

pub use local::LocalStateStore;
pub use store::StateStore;
pub use types::{DeploymentState, STATE_VERSION, StateHistoryEntry, StateOperation};
