//! Stop subcommand - stop the local server before the pod is terminated
//!
//! Called from the pod's preStop hook. The orchestrator kills the pod when
//! this returns or when the grace period expires, whichever comes first.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args};
use podstop_core::{
    ClusterTopology, Coordinator, Endpoints, LocalKiller, Outcome, ServerIdentity, ShutdownMode,
    ShutdownRequest, ShutdownToken, SleepPacer, StopPlan, fallback, materialize_key,
};
use podstop_wls::{NodeManagerKiller, RestConnector};

use crate::EXIT_CONFIG;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct StopArgs {
    /// Domain UID (used in log lines only)
    #[arg(long, env = "DOMAIN_UID")]
    pub domain_uid: String,

    /// Name of the admin server
    #[arg(long, env = "ADMIN_NAME")]
    pub admin_name: String,

    /// Name of the server running in this pod
    #[arg(long, env = "SERVER_NAME")]
    pub server_name: String,

    #[arg(long, env = "DOMAIN_NAME")]
    pub domain_name: String,

    #[arg(long, env = "DOMAIN_HOME")]
    pub domain_home: PathBuf,

    /// Service name resolving to this pod
    #[arg(long, env = "SERVICE_NAME")]
    pub service_name: String,

    /// Local administration port
    #[arg(long, env = "SHUTDOWN_PORT_ARG")]
    pub local_port: u16,

    /// Management protocol (t3, t3s, http, https)
    #[arg(long, env = "SHUTDOWN_PROTOCOL_ARG")]
    pub protocol: String,

    /// Seconds the server may spend draining work
    #[arg(long, env = "SHUTDOWN_TIMEOUT_ARG")]
    pub timeout: u64,

    #[arg(
        long,
        env = "SHUTDOWN_IGNORE_SESSIONS_ARG",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub ignore_sessions: bool,

    #[arg(
        long,
        env = "SHUTDOWN_WAIT_FOR_ALL_SESSIONS_ARG",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub wait_for_all_sessions: bool,

    /// Graceful or Forced
    #[arg(long, env = "SHUTDOWN_TYPE_ARG")]
    pub shutdown_type: String,

    #[arg(long, env = "ADMIN_PORT")]
    pub admin_port: u16,

    /// Service name of the admin server
    #[arg(long, env = "AS_SERVICE_NAME")]
    pub admin_host: String,
}

impl StopArgs {
    fn identity(&self) -> ServerIdentity {
        ServerIdentity::new(
            self.domain_name.as_str(),
            self.domain_home.as_path(),
            self.server_name.as_str(),
            &self.admin_name,
        )
    }

    fn endpoints(&self) -> Endpoints {
        Endpoints {
            protocol: self.protocol.clone(),
            admin_host: self.admin_host.clone(),
            admin_port: self.admin_port,
            local_host: self.service_name.clone(),
            local_port: self.local_port,
        }
    }

    fn request(&self) -> ShutdownRequest {
        ShutdownRequest::new(
            ShutdownMode::from_name(&self.shutdown_type),
            self.timeout,
            self.ignore_sessions,
            self.wait_for_all_sessions,
        )
    }
}

pub fn run(args: StopArgs, config: &Config, token: ShutdownToken) -> ExitCode {
    log::info!(
        "Stopping server {} of domain {} (uid {}, mode {})",
        args.server_name,
        args.domain_name,
        args.domain_uid,
        ShutdownMode::from_name(&args.shutdown_type)
    );

    let paths = &config.paths;
    if let Err(e) = materialize_key(&paths.secret_file, &paths.key_file) {
        log::error!("Credential setup failed: {e:#}");
        return ExitCode::from(EXIT_CONFIG);
    }

    let identity = args.identity();
    let killer = NodeManagerKiller::new(config.node_manager.settings(), paths.key_file.clone());

    let connector = match RestConnector::new(config.http.settings()) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Management client unavailable: {e}");
            return kill_without_management(&killer, &identity).exit_code();
        }
    };

    let topology = ClusterTopology::from_domain_home(&identity.domain_home);
    let plan = StopPlan::select(
        &identity,
        topology,
        &args.endpoints(),
        args.request(),
        &paths.key_file,
    );
    let pacer = SleepPacer::new(token);

    let report = Coordinator::new(
        &identity,
        topology,
        plan,
        &connector,
        &killer,
        &pacer,
        config.intervals.intervals(),
    )
    .run();
    report.outcome.exit_code()
}

/// Primary channel unusable from the start: one node manager kill, no retry.
fn kill_without_management<K: LocalKiller>(killer: &K, identity: &ServerIdentity) -> Outcome {
    match fallback::kill_locally(killer, identity) {
        Ok(()) => Outcome::Killed,
        Err(_) => Outcome::Failed,
    }
}
