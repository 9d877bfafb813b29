//! Primary channel over the REST management API.
//!
//! Uses async reqwest on the shared runtime but presents the sync
//! [`ManagementConnector`] / [`ManagementSession`] interface the
//! coordinator drives.

use std::time::Duration;

use podstop_core::{
    ConnectionTarget, Credentials, HaStatus, ManagementConnector, ManagementError,
    ManagementSession, ServiceId, ShutdownRequest, TargetScope,
};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::runtime::SHARED_RUNTIME;

const WLS_ROOT: [&str; 3] = ["management", "weblogic", "latest"];
const GRID_ROOT: [&str; 4] = ["management", "coherence", "latest", "clusters"];

/// Service types that own partitions and therefore report HA status
const PARTITIONED_TYPES: [&str; 3] = ["DistributedCache", "FederatedCache", "PagedTopic"];

/// Longest error body echoed into a log line
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    /// Per-request timeout; a stop call adds its own drain timeout on top
    pub request_timeout: Duration,
    /// Accept self-signed certificates (demo identity stores)
    pub insecure_tls: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            insecure_tls: false,
        }
    }
}

pub struct RestConnector {
    client: reqwest::Client,
    settings: HttpSettings,
}

impl RestConnector {
    pub fn new(settings: HttpSettings) -> Result<Self, ManagementError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .danger_accept_invalid_certs(settings.insecure_tls)
            .build()
            .map_err(|e| ManagementError::Connect(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }
}

impl ManagementConnector for RestConnector {
    type Session = RestSession;

    fn connect(&self, target: &ConnectionTarget) -> Result<RestSession, ManagementError> {
        let credentials = Credentials::load(&target.credentials)
            .map_err(|e| ManagementError::Connect(format!("{e:#}")))?;
        let session = RestSession {
            client: self.client.clone(),
            base: rest_base(&target.url)?,
            scope: target.scope,
            credentials,
            request_timeout: self.settings.request_timeout,
        };

        // Any server answers its own runtime; a 2xx proves reachability and auth
        let url = session.endpoint(&WLS_ROOT, &["serverRuntime"], &[
            ("links", "none"),
            ("fields", "name,state"),
        ])?;
        let runtime: ServerRuntime = session.get_json(url)?;
        log::debug!(
            "Session open on {} ({}, state {})",
            session.base,
            runtime.name.as_deref().unwrap_or("?"),
            runtime.state.as_deref().unwrap_or("?")
        );
        Ok(session)
    }
}

#[derive(Debug)]
pub struct RestSession {
    client: reqwest::Client,
    base: Url,
    scope: TargetScope,
    credentials: Credentials,
    request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ServerRuntime {
    name: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Items<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterItem {
    cluster_name: String,
}

#[derive(Debug, Deserialize)]
struct ServiceItem {
    name: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PartitionInfo {
    #[serde(rename = "HAStatus", alias = "haStatus", alias = "statusHA", default)]
    ha_status: Option<String>,
    #[serde(default)]
    items: Vec<PartitionInfo>,
}

impl PartitionInfo {
    /// Status on the object itself, else on its first listed member.
    fn status(&self) -> Option<&str> {
        self.ha_status
            .as_deref()
            .or_else(|| self.items.iter().find_map(|i| i.ha_status.as_deref()))
    }
}

impl ManagementSession for RestSession {
    fn partition_services(&self) -> Result<Vec<ServiceId>, ManagementError> {
        let url = self.endpoint(&GRID_ROOT, &[], &[("links", "none")])?;
        let clusters: Items<ClusterItem> = match self.get_json(url) {
            Ok(v) => v,
            // Grid management not published yet (member still joining)
            Err(ManagementError::Http {
                status: Some(404), ..
            }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut found = Vec::new();
        for cluster in clusters.items {
            let url = self.endpoint(&GRID_ROOT, &[cluster.cluster_name.as_str(), "services"], &[
                ("links", "none"),
                ("fields", "name,type"),
            ])?;
            let services: Items<ServiceItem> = self.get_json(url)?;
            found.extend(
                services
                    .items
                    .into_iter()
                    .filter(|s| is_partitioned(s.kind.as_deref()))
                    .map(|s| ServiceId::new(cluster.cluster_name.clone(), s.name)),
            );
        }
        Ok(found)
    }

    fn ha_status(&self, service: &ServiceId) -> Result<HaStatus, ManagementError> {
        let url = self.endpoint(
            &GRID_ROOT,
            &[
                service.cluster.as_str(),
                "services",
                service.service.as_str(),
                "partition",
            ],
            &[("links", "none")],
        )?;
        let info: PartitionInfo = self.get_json(url)?;
        Ok(HaStatus::parse(info.status()))
    }

    fn shutdown_server(
        &self,
        server_name: &str,
        request: &ShutdownRequest,
    ) -> Result<(), ManagementError> {
        let operation = if request.force {
            "forceShutdown"
        } else {
            "shutdown"
        };
        let url = match self.scope {
            TargetScope::Domain => self.endpoint(
                &WLS_ROOT,
                &[
                    "domainRuntime",
                    "serverLifeCycleRuntimes",
                    server_name,
                    operation,
                ],
                &[],
            )?,
            TargetScope::LocalServer => {
                self.endpoint(&WLS_ROOT, &["serverRuntime", operation], &[])?
            }
        };

        let body = if request.force {
            serde_json::json!({})
        } else {
            serde_json::json!({
                "timeout": request.timeout_secs,
                "ignoreSessions": request.ignore_sessions,
                "waitForAllSessions": request.wait_for_all_sessions,
            })
        };
        let body = serde_json::to_vec(&body)
            .map_err(|e| ManagementError::Protocol(format!("cannot encode request: {e}")))?;

        // The call blocks while sessions drain
        let timeout = self.request_timeout + Duration::from_secs(request.timeout_secs);
        self.send(Method::POST, url, Some(body), timeout)?;
        Ok(())
    }
}

impl RestSession {
    fn endpoint(
        &self,
        root: &[&str],
        segments: &[&str],
        query: &[(&str, &str)],
    ) -> Result<Url, ManagementError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ManagementError::Protocol(format!("{} cannot carry a path", self.base)))?
            .pop_if_empty()
            .extend(root)
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ManagementError> {
        let body = self.send(Method::GET, url.clone(), None, self.request_timeout)?;
        serde_json::from_slice(&body)
            .map_err(|e| ManagementError::Protocol(format!("unexpected response from {url}: {e}")))
    }

    fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
        timeout: Duration,
    ) -> Result<Vec<u8>, ManagementError> {
        log::debug!("{method} {url}");
        let mut request = self
            .client
            .request(method, url)
            .timeout(timeout)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header("X-Requested-By", "podstop")
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        SHARED_RUNTIME.block_on(async move {
            let response = request.send().await.map_err(|e| from_reqwest(&e))?;
            let status = response.status();
            let bytes = response.bytes().await.map_err(|e| from_reqwest(&e))?;
            if status.is_success() {
                Ok(bytes.to_vec())
            } else {
                Err(http_error(status, &bytes))
            }
        })
    }
}

/// Map a `protocol://host:port` target onto an HTTP(S) base URL.
fn rest_base(target: &str) -> Result<Url, ManagementError> {
    let (protocol, rest) = target
        .split_once("://")
        .ok_or_else(|| ManagementError::Connect(format!("malformed target URL {target:?}")))?;
    let scheme = match protocol.to_ascii_lowercase().as_str() {
        "t3" | "http" => "http",
        "t3s" | "https" => "https",
        other => {
            return Err(ManagementError::Connect(format!(
                "unsupported protocol {other:?} in {target:?}"
            )));
        }
    };
    Url::parse(&format!("{scheme}://{rest}/"))
        .map_err(|e| ManagementError::Connect(format!("malformed target URL {target:?}: {e}")))
}

fn is_partitioned(kind: Option<&str>) -> bool {
    kind.is_some_and(|k| PARTITIONED_TYPES.contains(&k))
}

fn from_reqwest(e: &reqwest::Error) -> ManagementError {
    if e.is_connect() {
        ManagementError::Connect(e.to_string())
    } else {
        ManagementError::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

fn http_error(status: StatusCode, body: &[u8]) -> ManagementError {
    let text = String::from_utf8_lossy(body);
    let message = match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.into_owned(),
    };
    ManagementError::Http {
        status: Some(status.as_u16()),
        message,
    }
}
