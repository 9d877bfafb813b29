//! Interfaces to the two management channels
//!
//! The primary channel (connect / query health / stop) and the local
//! node manager channel (kill) fail independently and share no state.

use crate::error::ManagementError;
use crate::identity::{ConnectionTarget, ServerIdentity, ShutdownRequest};

/// One partitioned data-grid service, as returned by the wildcard query
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceId {
    pub cluster: String,
    pub service: String,
}

impl ServiceId {
    pub fn new(cluster: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            service: service.into(),
        }
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.cluster, self.service)
    }
}

/// Partition-assignment health of one service
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HaStatus {
    /// Not ENDANGERED (NODE-SAFE, MACHINE-SAFE, ...). Carries the raw label.
    Safe(String),
    /// A partition lacks its backup copy
    Endangered,
    /// Attribute absent
    Unknown,
}

impl HaStatus {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Self::Unknown,
            Some(s) if s.eq_ignore_ascii_case("ENDANGERED") => Self::Endangered,
            Some(s) => Self::Safe(s.to_string()),
        }
    }

    pub fn is_endangered(&self) -> bool {
        matches!(self, Self::Endangered)
    }
}

impl std::fmt::Display for HaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Safe(label) => f.write_str(label),
            Self::Endangered => f.write_str("ENDANGERED"),
            Self::Unknown => f.write_str("UNKNOWN"),
        }
    }
}

/// Opens sessions on the primary management channel.
pub trait ManagementConnector {
    type Session: ManagementSession;

    fn connect(&self, target: &ConnectionTarget) -> Result<Self::Session, ManagementError>;
}

/// A live session on the primary management channel.
pub trait ManagementSession {
    /// Every partition-assignment health object for every service.
    fn partition_services(&self) -> Result<Vec<ServiceId>, ManagementError>;

    fn ha_status(&self, service: &ServiceId) -> Result<HaStatus, ManagementError>;

    /// Stop `server_name`. Returns once the server has acknowledged.
    fn shutdown_server(
        &self,
        server_name: &str,
        request: &ShutdownRequest,
    ) -> Result<(), ManagementError>;
}

/// Last-resort channel: a local daemon that can kill the server process.
pub trait LocalKiller {
    fn kill(&self, server: &ServerIdentity) -> Result<(), ManagementError>;
}
