//! Podstop Core - termination coordinator for a clustered application server
//!
//! Decides how the local server in a terminating pod is stopped: detect
//! whether a partitioned data grid is part of the domain, wait until no
//! grid service is endangered, issue the stop, and fall back to a forced
//! kill over the local node manager when the primary channel is unusable.

pub mod client;
pub mod coordinator;
pub mod credentials;
pub mod error;
pub mod fallback;
pub mod identity;
pub mod logging;
pub mod pacing;
pub mod safety;
pub mod topology;

// Re-exports for convenience
pub use client::{HaStatus, LocalKiller, ManagementConnector, ManagementSession, ServiceId};
pub use coordinator::{
    Coordinator, EXIT_CANCELLED, EXIT_TOTAL_FAILURE, Outcome, RunContext, RunReport, StopPlan,
};
pub use credentials::{Credentials, materialize_key};
pub use error::{AttemptError, Cancelled, ManagementError, Step};
pub use identity::{
    ConnectionTarget, Endpoints, ServerIdentity, ShutdownMode, ShutdownRequest, TargetScope,
};
pub use logging::init_logging;
pub use pacing::{Intervals, Pacer, ShutdownToken, SleepPacer};
pub use safety::{SafetyPoller, SafetyReport};
pub use topology::{ClusterTopology, detect, detect_file};
