//! Wait until no data-grid service is endangered
//!
//! Partition-assignment health objects can migrate between members while
//! the grid rebalances, so any query failure restarts from a fresh
//! enumeration instead of retrying the object that failed.

use crate::client::{HaStatus, ManagementSession, ServiceId};
use crate::error::{Cancelled, ManagementError};
use crate::pacing::{Intervals, Pacer};

/// What the wait observed before returning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SafetyReport {
    /// Services confirmed in the final pass
    pub services: usize,
    /// Enumeration passes started, including the final one
    pub passes: u32,
    /// ENDANGERED observations across all passes
    pub endangered_observations: u32,
    /// Query failures that forced a re-enumeration
    pub query_failures: u32,
}

enum Sweep {
    /// Every enumerated service is non-endangered
    Safe(usize),
    /// Query returned nothing yet
    Unavailable,
}

enum SweepError {
    Query(ServiceIdOrAll, ManagementError),
    Cancelled,
}

/// Which query failed, for the log line
enum ServiceIdOrAll {
    All,
    One(ServiceId),
}

impl From<Cancelled> for SweepError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

pub struct SafetyPoller<'a, P: Pacer> {
    pacer: &'a P,
    intervals: Intervals,
}

impl<'a, P: Pacer> SafetyPoller<'a, P> {
    pub fn new(pacer: &'a P, intervals: Intervals) -> Self {
        Self { pacer, intervals }
    }

    /// Block until every service in one enumeration pass is non-endangered.
    ///
    /// No internal timeout: only cancellation (or the process being
    /// killed) ends an unsafe wait.
    pub fn wait_until_cluster_safe<S: ManagementSession>(
        &self,
        session: &S,
    ) -> Result<SafetyReport, Cancelled> {
        log::info!("Querying partition-assignment health for all data-grid services");
        let mut report = SafetyReport::default();
        let mut warned_unavailable = false;

        loop {
            self.pacer.checkpoint()?;
            report.passes += 1;

            match self.sweep(session, &mut report) {
                Ok(Sweep::Safe(services)) => {
                    report.services = services;
                    log::info!("All {services} data-grid service(s) are safe to shut down");
                    return Ok(report);
                }
                Ok(Sweep::Unavailable) => {
                    if !warned_unavailable {
                        log::info!("Waiting until data-grid health objects are available...");
                        warned_unavailable = true;
                    }
                    self.pacer.pause(self.intervals.unavailable)?;
                }
                Err(SweepError::Query(which, e)) => {
                    report.query_failures += 1;
                    match which {
                        ServiceIdOrAll::All => {
                            log::warn!("Enumerating data-grid services failed, retrying: {e}")
                        }
                        ServiceIdOrAll::One(id) => {
                            log::warn!("Checking health of service {id} failed, retrying: {e}")
                        }
                    }
                    log::debug!("{e:?}");
                    self.pacer.pause(self.intervals.query_error)?;
                }
                Err(SweepError::Cancelled) => return Err(Cancelled),
            }
        }
    }

    fn sweep<S: ManagementSession>(
        &self,
        session: &S,
        report: &mut SafetyReport,
    ) -> Result<Sweep, SweepError> {
        let services = session
            .partition_services()
            .map_err(|e| SweepError::Query(ServiceIdOrAll::All, e))?;
        if services.is_empty() {
            return Ok(Sweep::Unavailable);
        }

        log::info!("Data-grid service count: {}", services.len());
        for id in &services {
            self.wait_for_service(session, id, report)?;
        }
        Ok(Sweep::Safe(services.len()))
    }

    /// Poll one service until it stops reporting ENDANGERED.
    fn wait_for_service<S: ManagementSession>(
        &self,
        session: &S,
        id: &ServiceId,
        report: &mut SafetyReport,
    ) -> Result<(), SweepError> {
        log::info!("Checking data-grid service {id}");
        loop {
            self.pacer.checkpoint()?;
            let status = session
                .ha_status(id)
                .map_err(|e| SweepError::Query(ServiceIdOrAll::One(id.clone()), e))?;
            match status {
                HaStatus::Unknown => {
                    log::info!("No HA status reported for {id}, treating as safe");
                    return Ok(());
                }
                HaStatus::Safe(label) => {
                    log::info!("HA status of {id} is {label}");
                    return Ok(());
                }
                HaStatus::Endangered => {
                    report.endangered_observations += 1;
                    log::info!("HA status of {id} is ENDANGERED, waiting until it is safe...");
                    self.pacer.pause(self.intervals.endangered)?;
                }
            }
        }
    }
}
