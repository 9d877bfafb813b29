//! Server identity, stop request and connection target

use std::path::PathBuf;

/// Which server this pod runs. Fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    pub domain_name: String,
    pub domain_home: PathBuf,
    pub server_name: String,
    pub is_admin_server: bool,
}

impl ServerIdentity {
    pub fn new(
        domain_name: impl Into<String>,
        domain_home: impl Into<PathBuf>,
        server_name: impl Into<String>,
        admin_server_name: &str,
    ) -> Self {
        let server_name = server_name.into();
        Self {
            is_admin_server: server_name == admin_server_name,
            domain_name: domain_name.into(),
            domain_home: domain_home.into(),
            server_name,
        }
    }
}

/// Configured shutdown mode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownMode {
    Graceful,
    Forced,
}

impl ShutdownMode {
    /// `forced` in any case selects forced; everything else is graceful.
    pub fn from_name(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("forced") {
            Self::Forced
        } else {
            Self::Graceful
        }
    }
}

impl std::fmt::Display for ShutdownMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Graceful => "graceful",
            Self::Forced => "forced",
        })
    }
}

/// Arguments for the stop call on the primary channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownRequest {
    pub force: bool,
    pub timeout_secs: u64,
    pub ignore_sessions: bool,
    pub wait_for_all_sessions: bool,
}

impl ShutdownRequest {
    pub fn new(
        mode: ShutdownMode,
        timeout_secs: u64,
        ignore_sessions: bool,
        wait_for_all_sessions: bool,
    ) -> Self {
        Self {
            force: mode == ShutdownMode::Forced,
            timeout_secs,
            ignore_sessions,
            wait_for_all_sessions,
        }
    }

    pub fn forced(self) -> Self {
        Self {
            force: true,
            ..self
        }
    }
}

/// Addresses of the two candidate endpoints on the primary channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Protocol for both endpoints (t3, t3s, http, https)
    pub protocol: String,
    pub admin_host: String,
    pub admin_port: u16,
    /// Service name resolving to this pod
    pub local_host: String,
    pub local_port: u16,
}

impl Endpoints {
    pub fn admin_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.admin_host, self.admin_port)
    }

    pub fn local_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.local_host, self.local_port)
    }
}

/// Which runtime tree the session addresses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetScope {
    /// Admin server; federated view over every member of the domain
    Domain,
    /// The local server only
    LocalServer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub url: String,
    pub scope: TargetScope,
    /// Materialized credential artifact
    pub credentials: PathBuf,
}
