//! End-to-end runs of the coordinator against in-memory channels
//!
//! The pacer never sleeps; it records every pause and can simulate the
//! grace period expiring by cancelling after a fixed number of pauses.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use podstop_core::{
    Cancelled, ClusterTopology, ConnectionTarget, Coordinator, Endpoints, HaStatus, Intervals,
    LocalKiller, ManagementConnector, ManagementError, ManagementSession, Outcome, Pacer,
    SafetyReport, ServerIdentity, ServiceId, ShutdownMode, ShutdownRequest, StopPlan, TargetScope,
    detect,
};

/// Scripted answers; the last one repeats forever.
struct Script<T>(RefCell<VecDeque<Result<T, String>>>);

impl<T: Clone> Script<T> {
    fn new(items: Vec<Result<T, String>>) -> Self {
        Self(RefCell::new(items.into()))
    }

    fn next(&self) -> Result<T, ManagementError> {
        let mut q = self.0.borrow_mut();
        let item = if q.len() > 1 {
            q.pop_front().unwrap()
        } else {
            q.front().cloned().expect("script exhausted")
        };
        item.map_err(ManagementError::Connect)
    }
}

struct Grid {
    connects: Script<()>,
    enumerations: Script<Vec<ServiceId>>,
    statuses: Script<HaStatus>,
    shutdowns: Script<()>,
    connect_calls: Cell<u32>,
    shutdown_calls: RefCell<Vec<(String, ShutdownRequest)>>,
    targets: RefCell<Vec<TargetScope>>,
}

impl Grid {
    fn new(
        connects: Vec<Result<(), String>>,
        enumerations: Vec<Result<Vec<ServiceId>, String>>,
        statuses: Vec<Result<HaStatus, String>>,
        shutdowns: Vec<Result<(), String>>,
    ) -> Rc<Self> {
        Rc::new(Self {
            connects: Script::new(connects),
            enumerations: Script::new(enumerations),
            statuses: Script::new(statuses),
            shutdowns: Script::new(shutdowns),
            connect_calls: Cell::new(0),
            shutdown_calls: RefCell::new(Vec::new()),
            targets: RefCell::new(Vec::new()),
        })
    }
}

struct FakeConnector(Rc<Grid>);
struct FakeSession(Rc<Grid>);

impl ManagementConnector for FakeConnector {
    type Session = FakeSession;

    fn connect(&self, target: &ConnectionTarget) -> Result<FakeSession, ManagementError> {
        self.0.connect_calls.set(self.0.connect_calls.get() + 1);
        self.0.targets.borrow_mut().push(target.scope);
        self.0.connects.next()?;
        Ok(FakeSession(self.0.clone()))
    }
}

impl ManagementSession for FakeSession {
    fn partition_services(&self) -> Result<Vec<ServiceId>, ManagementError> {
        self.0.enumerations.next()
    }

    fn ha_status(&self, _service: &ServiceId) -> Result<HaStatus, ManagementError> {
        self.0.statuses.next()
    }

    fn shutdown_server(
        &self,
        server_name: &str,
        request: &ShutdownRequest,
    ) -> Result<(), ManagementError> {
        self.0
            .shutdown_calls
            .borrow_mut()
            .push((server_name.to_string(), *request));
        self.0.shutdowns.next()
    }
}

struct FakeKiller {
    calls: Cell<u32>,
    succeed: bool,
}

impl FakeKiller {
    fn new(succeed: bool) -> Self {
        Self {
            calls: Cell::new(0),
            succeed,
        }
    }
}

impl LocalKiller for FakeKiller {
    fn kill(&self, _server: &ServerIdentity) -> Result<(), ManagementError> {
        self.calls.set(self.calls.get() + 1);
        if self.succeed {
            Ok(())
        } else {
            Err(ManagementError::Connect("node manager down".into()))
        }
    }
}

/// Records pauses; once `limit` is reached every call reports cancellation.
struct Deadline {
    pauses: RefCell<Vec<Duration>>,
    limit: usize,
}

impl Deadline {
    fn never() -> Self {
        Self::after(usize::MAX)
    }

    fn after(limit: usize) -> Self {
        Self {
            pauses: RefCell::new(Vec::new()),
            limit,
        }
    }
}

impl Pacer for Deadline {
    fn pause(&self, duration: Duration) -> Result<(), Cancelled> {
        self.pauses.borrow_mut().push(duration);
        self.checkpoint()
    }

    fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.pauses.borrow().len() >= self.limit {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

const GRID: ClusterTopology = ClusterTopology {
    has_distributed_data_grid: true,
};
const NO_GRID: ClusterTopology = ClusterTopology {
    has_distributed_data_grid: false,
};

fn endpoints() -> Endpoints {
    Endpoints {
        protocol: "t3".into(),
        admin_host: "sample-domain1-admin-server".into(),
        admin_port: 7001,
        local_host: "sample-domain1-managed-server1".into(),
        local_port: 8001,
    }
}

fn managed() -> ServerIdentity {
    ServerIdentity::new("domain1", "/u01/domains/domain1", "managed-server1", "admin-server")
}

fn admin() -> ServerIdentity {
    ServerIdentity::new("domain1", "/u01/domains/domain1", "admin-server", "admin-server")
}

fn services() -> Vec<ServiceId> {
    vec![
        ServiceId::new("cluster1", "DistributedCache"),
        ServiceId::new("cluster1", "FederatedCache"),
    ]
}

fn node_safe() -> Result<HaStatus, String> {
    Ok(HaStatus::Safe("NODE-SAFE".into()))
}

fn run(
    identity: &ServerIdentity,
    topology: ClusterTopology,
    mode: ShutdownMode,
    grid: &Rc<Grid>,
    killer: &FakeKiller,
    pacer: &Deadline,
) -> podstop_core::RunReport {
    let request = ShutdownRequest::new(mode, 30, false, false);
    let plan = StopPlan::select(
        identity,
        topology,
        &endpoints(),
        request,
        Path::new("/tmp/userKeyNodeManager.secure.bin"),
    );
    let connector = FakeConnector(grid.clone());
    Coordinator::new(
        identity,
        topology,
        plan,
        &connector,
        killer,
        pacer,
        Intervals::default(),
    )
    .run()
}

#[test]
fn no_grid_graceful_stop_first_try() {
    let grid = Grid::new(vec![Ok(())], vec![Ok(vec![])], vec![node_safe()], vec![Ok(())]);
    let killer = FakeKiller::new(true);
    let pacer = Deadline::never();

    let report = run(&managed(), NO_GRID, ShutdownMode::Graceful, &grid, &killer, &pacer);

    assert_eq!(report.outcome, Outcome::Stopped);
    assert_eq!(report.outcome.status(), 0);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.safety_confirmations, 0);
    assert!(!report.fallback_invoked);
    assert_eq!(killer.calls.get(), 0);
    assert_eq!(*grid.targets.borrow(), vec![TargetScope::LocalServer]);
    assert_eq!(report.safety, None);

    let calls = grid.shutdown_calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "managed-server1");
    assert!(!calls[0].1.force);
}

#[test]
fn grid_transient_query_failures_then_safe() {
    let grid = Grid::new(
        vec![Ok(())],
        vec![
            Err("bean not registered".into()),
            Err("RPC timeout".into()),
            Ok(services()),
        ],
        vec![node_safe()],
        vec![Ok(())],
    );
    let killer = FakeKiller::new(true);
    let pacer = Deadline::never();

    let report = run(&managed(), GRID, ShutdownMode::Graceful, &grid, &killer, &pacer);

    assert_eq!(report.outcome, Outcome::Stopped);
    assert_eq!(report.safety_confirmations, 1);
    assert_eq!(report.attempts, 1);
    assert!(!report.fallback_invoked);
    assert_eq!(killer.calls.get(), 0);
    assert_eq!(*grid.targets.borrow(), vec![TargetScope::Domain]);
    assert_eq!(
        *pacer.pauses.borrow(),
        vec![Duration::from_secs(10), Duration::from_secs(10)]
    );
    assert_eq!(
        report.safety,
        Some(SafetyReport {
            services: 2,
            passes: 3,
            endangered_observations: 0,
            query_failures: 2,
        })
    );
}

#[test]
fn grid_never_safe_stays_in_retry_loop_until_killed() {
    let grid = Grid::new(
        vec![Ok(())],
        vec![Ok(services())],
        vec![Ok(HaStatus::Endangered)],
        vec![Ok(())],
    );
    let killer = FakeKiller::new(true);
    let pacer = Deadline::after(200);

    let report = run(&managed(), GRID, ShutdownMode::Graceful, &grid, &killer, &pacer);

    assert_eq!(report.outcome, Outcome::Cancelled);
    assert_eq!(report.safety_confirmations, 0);
    assert!(!report.fallback_invoked);
    assert_eq!(killer.calls.get(), 0);
    assert!(grid.shutdown_calls.borrow().is_empty());
}

#[test]
fn grid_unbounded_connect_failures_never_fall_back() {
    let grid = Grid::new(
        vec![Err("connection refused".into())],
        vec![Ok(services())],
        vec![node_safe()],
        vec![Ok(())],
    );
    let killer = FakeKiller::new(true);
    let pacer = Deadline::after(500);

    let report = run(&managed(), GRID, ShutdownMode::Graceful, &grid, &killer, &pacer);

    assert_eq!(report.outcome, Outcome::Cancelled);
    assert_eq!(grid.connect_calls.get(), 500);
    assert_eq!(report.attempts, 500);
    assert_eq!(killer.calls.get(), 0);
    assert!(
        pacer
            .pauses
            .borrow()
            .iter()
            .all(|d| *d == Duration::from_secs(10))
    );
}

#[test]
fn grid_connect_recovers_after_failures() {
    let grid = Grid::new(
        vec![Err("refused".into()), Err("refused".into()), Ok(())],
        vec![Ok(services())],
        vec![node_safe()],
        vec![Ok(())],
    );
    let killer = FakeKiller::new(true);
    let pacer = Deadline::never();

    let report = run(&managed(), GRID, ShutdownMode::Graceful, &grid, &killer, &pacer);

    assert_eq!(report.outcome, Outcome::Stopped);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.safety_confirmations, 1);
}

#[test]
fn grid_stop_failure_after_safety_escalates_immediately() {
    let grid = Grid::new(
        vec![Ok(())],
        vec![Ok(services())],
        vec![node_safe()],
        vec![Err("server refused shutdown".into())],
    );
    let killer = FakeKiller::new(true);
    let pacer = Deadline::never();

    let report = run(&managed(), GRID, ShutdownMode::Graceful, &grid, &killer, &pacer);

    assert_eq!(report.outcome, Outcome::Killed);
    assert_eq!(report.outcome.status(), 0);
    assert_eq!(report.attempts, 1);
    assert_eq!(grid.connect_calls.get(), 1);
    assert_eq!(report.safety_confirmations, 1);
    assert!(report.fallback_invoked);
    assert_eq!(killer.calls.get(), 1);
    assert!(pacer.pauses.borrow().is_empty());
}

#[test]
fn grid_admin_server_is_forced() {
    let grid = Grid::new(vec![Ok(())], vec![Ok(services())], vec![node_safe()], vec![Ok(())]);
    let killer = FakeKiller::new(true);
    let pacer = Deadline::never();

    let report = run(&admin(), GRID, ShutdownMode::Graceful, &grid, &killer, &pacer);

    assert_eq!(report.outcome, Outcome::Stopped);
    let calls = grid.shutdown_calls.borrow();
    assert_eq!(calls[0].0, "admin-server");
    assert!(calls[0].1.force);
}

#[test]
fn no_grid_failures_fall_back_once_and_succeed() {
    let grid = Grid::new(
        vec![Err("connection refused".into())],
        vec![Ok(vec![])],
        vec![node_safe()],
        vec![Err("unreachable".into())],
    );
    let killer = FakeKiller::new(true);
    let pacer = Deadline::never();

    let report = run(&managed(), NO_GRID, ShutdownMode::Graceful, &grid, &killer, &pacer);

    assert_eq!(report.outcome, Outcome::Killed);
    assert_eq!(report.outcome.status(), 0);
    assert_eq!(report.attempts, 1);
    assert_eq!(killer.calls.get(), 1);
    assert!(pacer.pauses.borrow().is_empty());
}

#[test]
fn no_grid_fallback_failure_exits_with_failure_code() {
    let grid = Grid::new(
        vec![Ok(())],
        vec![Ok(vec![])],
        vec![node_safe()],
        vec![Err("unreachable".into())],
    );
    let killer = FakeKiller::new(false);
    let pacer = Deadline::never();

    let report = run(&managed(), NO_GRID, ShutdownMode::Graceful, &grid, &killer, &pacer);

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(report.outcome.status(), 2);
    assert!(report.fallback_invoked);
    assert_eq!(killer.calls.get(), 1);
    assert_eq!(grid.shutdown_calls.borrow().len(), 1);
}

#[test]
fn cancel_before_first_attempt() {
    let grid = Grid::new(vec![Ok(())], vec![Ok(services())], vec![node_safe()], vec![Ok(())]);
    let killer = FakeKiller::new(true);
    let pacer = Deadline::after(0);

    let report = run(&managed(), NO_GRID, ShutdownMode::Graceful, &grid, &killer, &pacer);

    assert_eq!(report.outcome, Outcome::Cancelled);
    assert_eq!(report.attempts, 0);
    assert_eq!(grid.connect_calls.get(), 0);
    assert_eq!(killer.calls.get(), 0);
}

/// Grid-positive configurations whose only content is not a child element
/// or text still take the drain-first path through the admin server.
#[test]
fn unusual_grid_content_takes_drain_path() {
    let configs = [
        "<domain><coherence-cluster-system-resource><!--CoherenceCluster--></coherence-cluster-system-resource></domain>",
        "<domain><coherence-cluster-system-resource><?wls grid?></coherence-cluster-system-resource></domain>",
        r#"<domain><coherence-cluster-system-resource name="c"/></domain>"#,
        "<domain><server></domain><coherence-cluster-system-resource/>",
    ];

    for config in configs {
        let topology = ClusterTopology {
            has_distributed_data_grid: detect(config),
        };
        let grid = Grid::new(vec![Ok(())], vec![Ok(services())], vec![node_safe()], vec![Ok(())]);
        let killer = FakeKiller::new(true);
        let pacer = Deadline::never();

        let report = run(&managed(), topology, ShutdownMode::Graceful, &grid, &killer, &pacer);

        assert!(topology.has_distributed_data_grid, "{config}");
        assert_eq!(report.outcome, Outcome::Stopped);
        assert_eq!(report.safety_confirmations, 1, "{config}");
        assert_eq!(*grid.targets.borrow(), vec![TargetScope::Domain]);
    }
}
