//! Health checks for engine connections
//!
//! [`probe_reachability`] and [`check_liveness`] gate connection creation
//! and pool maintenance and fail with typed
//! [`QuarryError`](quarry_core::QuarryError)s. Probe latencies are
//! classified with [`HealthStatus`].

mod probe;
mod status;


pub use probe::{LIVENESS_QUERY, check_liveness, probe_reachability};
pub use status::{HealthStatus, HealthThresholds};
