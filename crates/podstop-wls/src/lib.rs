//! Podstop WLS - management channel clients
//!
//! Concrete implementations of the two channels the coordinator drives:
//! the REST management API of the admin or local server, and the plain
//! text protocol of the local node manager.

pub mod nodemanager;
pub mod rest;
pub mod runtime;

pub use nodemanager::{NodeManagerKiller, NodeManagerSettings};
pub use rest::{HttpSettings, RestConnector, RestSession};
