//! Shutdown state machine
//!
//! SELECT_TARGET → CONNECT → AWAIT_SAFETY (grid only) → GRACEFUL_STOP → DONE.
//! A failed attempt loops back to CONNECT while a data grid exists and its
//! safety has never been confirmed; otherwise the graceful path is given up
//! and the node manager kill is tried once.

use std::process::ExitCode;

use crate::client::{LocalKiller, ManagementConnector, ManagementSession};
use crate::error::{AttemptError, Step};
use crate::fallback;
use crate::identity::{ConnectionTarget, Endpoints, ServerIdentity, ShutdownRequest, TargetScope};
use crate::pacing::{Intervals, Pacer};
use crate::safety::{SafetyPoller, SafetyReport};
use crate::topology::ClusterTopology;

/// Exit status when even the fallback kill failed
pub const EXIT_TOTAL_FAILURE: u8 = 2;
/// Exit status after an internal shutdown request
pub const EXIT_CANCELLED: u8 = 130;

/// Where to connect and what to ask for. Decided once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopPlan {
    pub target: ConnectionTarget,
    pub request: ShutdownRequest,
}

impl StopPlan {
    /// With a data grid, go through the admin server: its runtime view is
    /// federated across the domain, so grid health is visible wherever the
    /// health objects currently live. Stopping the admin server itself is
    /// always forced there, since its grid view is gone after a graceful
    /// restart.
    pub fn select(
        identity: &ServerIdentity,
        topology: ClusterTopology,
        endpoints: &Endpoints,
        request: ShutdownRequest,
        credentials: &std::path::Path,
    ) -> Self {
        if topology.has_distributed_data_grid {
            let request = if identity.is_admin_server {
                request.forced()
            } else {
                request
            };
            Self {
                target: ConnectionTarget {
                    url: endpoints.admin_url(),
                    scope: TargetScope::Domain,
                    credentials: credentials.to_path_buf(),
                },
                request,
            }
        } else {
            Self {
                target: ConnectionTarget {
                    url: endpoints.local_url(),
                    scope: TargetScope::LocalServer,
                    credentials: credentials.to_path_buf(),
                },
                request,
            }
        }
    }
}

/// Mutable state of one run, threaded through every transition.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub stay_in_retry_loop: bool,
    /// Set at most once, never cleared
    pub grid_confirmed_safe: bool,
    pub attempts: u32,
    pub safety_confirmations: u32,
    /// What the most recent successful safety wait observed
    pub last_safety: Option<SafetyReport>,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            stay_in_retry_loop: true,
            ..Self::default()
        }
    }

    pub fn confirm_safe(&mut self, report: SafetyReport) {
        self.grid_confirmed_safe = true;
        self.safety_confirmations += 1;
        self.last_safety = Some(report);
    }

    /// A failure is only retried while the grid might still be unsafe.
    pub fn should_retry(&self, topology: ClusterTopology) -> bool {
        topology.has_distributed_data_grid && !self.grid_confirmed_safe
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Graceful (or configured forced) stop acknowledged
    Stopped,
    /// Primary path abandoned; node manager killed the server
    Killed,
    /// Both paths failed
    Failed,
    /// Internal shutdown request
    Cancelled,
}

impl Outcome {
    /// Process exit status: 0 whenever the server ends up stopped.
    pub fn status(self) -> u8 {
        match self {
            Self::Stopped | Self::Killed => 0,
            Self::Failed => EXIT_TOTAL_FAILURE,
            Self::Cancelled => EXIT_CANCELLED,
        }
    }

    pub fn exit_code(self) -> ExitCode {
        ExitCode::from(self.status())
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Stopped => "stopped",
            Self::Killed => "killed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: Outcome,
    pub attempts: u32,
    pub safety_confirmations: u32,
    pub fallback_invoked: bool,
    /// `None` without a data grid, or when safety was never confirmed
    pub safety: Option<SafetyReport>,
}

pub struct Coordinator<'a, C, K, P> {
    identity: &'a ServerIdentity,
    topology: ClusterTopology,
    plan: StopPlan,
    connector: &'a C,
    killer: &'a K,
    pacer: &'a P,
    intervals: Intervals,
}

impl<'a, C, K, P> Coordinator<'a, C, K, P>
where
    C: ManagementConnector,
    K: LocalKiller,
    P: Pacer,
{
    pub fn new(
        identity: &'a ServerIdentity,
        topology: ClusterTopology,
        plan: StopPlan,
        connector: &'a C,
        killer: &'a K,
        pacer: &'a P,
        intervals: Intervals,
    ) -> Self {
        Self {
            identity,
            topology,
            plan,
            connector,
            killer,
            pacer,
            intervals,
        }
    }

    pub fn run(&self) -> RunReport {
        let mut ctx = RunContext::new();
        let outcome = self.drive(&mut ctx);
        log::info!(
            "Shutdown of {} finished: {outcome} after {} attempt(s)",
            self.identity.server_name,
            ctx.attempts
        );
        RunReport {
            outcome,
            attempts: ctx.attempts,
            safety_confirmations: ctx.safety_confirmations,
            fallback_invoked: matches!(outcome, Outcome::Killed | Outcome::Failed),
            safety: ctx.last_safety,
        }
    }

    fn drive(&self, ctx: &mut RunContext) -> Outcome {
        if self.topology.has_distributed_data_grid {
            log::info!("Data grid is part of this domain");
        } else {
            log::info!("No data grid in this domain");
        }

        while ctx.stay_in_retry_loop {
            ctx.stay_in_retry_loop = false;
            if self.pacer.checkpoint().is_err() {
                return Outcome::Cancelled;
            }
            ctx.attempts += 1;

            match self.attempt(ctx) {
                Ok(()) => return Outcome::Stopped,
                Err(AttemptError::Cancelled) => {
                    log::warn!("Shutdown request received, abandoning stop attempt");
                    return Outcome::Cancelled;
                }
                Err(AttemptError::Failed { step, source }) => {
                    let kind = if source.is_transient() {
                        "transient"
                    } else {
                        "non-transient"
                    };
                    log::error!(
                        "Stop attempt {} failed in {step} ({kind}): {source}",
                        ctx.attempts
                    );
                    log::debug!("{source:?}");

                    if ctx.should_retry(self.topology) {
                        log::info!("Data grid not confirmed safe, sleeping before reconnect...");
                        if self.pacer.pause(self.intervals.reconnect).is_err() {
                            return Outcome::Cancelled;
                        }
                        ctx.stay_in_retry_loop = true;
                    }
                }
            }
        }

        self.fallback()
    }

    /// CONNECT → AWAIT_SAFETY → GRACEFUL_STOP on a fresh session.
    fn attempt(&self, ctx: &mut RunContext) -> Result<(), AttemptError> {
        let target = &self.plan.target;
        log::info!("Connecting to {}", target.url);
        let session = self
            .connector
            .connect(target)
            .map_err(AttemptError::at(Step::Connect))?;
        log::info!("Connected to {}", target.url);

        if self.topology.has_distributed_data_grid {
            let report =
                SafetyPoller::new(self.pacer, self.intervals).wait_until_cluster_safe(&session)?;
            log::info!(
                "Data grid safe after {} pass(es), {} endangered, {} query failure(s)",
                report.passes,
                report.endangered_observations,
                report.query_failures
            );
            ctx.confirm_safe(report);
        }

        self.graceful_stop(&session)
    }

    fn graceful_stop<S: ManagementSession>(&self, session: &S) -> Result<(), AttemptError> {
        let request = &self.plan.request;
        log::info!(
            "Stopping server {} (force = {}, timeout = {}s)",
            self.identity.server_name,
            request.force,
            request.timeout_secs
        );
        session
            .shutdown_server(&self.identity.server_name, request)
            .map_err(AttemptError::at(Step::GracefulStop))?;
        log::info!("Server {} stopped", self.identity.server_name);
        Ok(())
    }

    fn fallback(&self) -> Outcome {
        match fallback::kill_locally(self.killer, self.identity) {
            Ok(()) => Outcome::Killed,
            Err(_) => Outcome::Failed,
        }
    }
}
