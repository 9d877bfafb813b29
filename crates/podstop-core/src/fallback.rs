//! Last-resort forced kill through the local node manager

use crate::client::LocalKiller;
use crate::error::ManagementError;
use crate::identity::ServerIdentity;

/// Kill `server` over the node manager channel. No retries.
pub fn kill_locally<K: LocalKiller>(
    killer: &K,
    server: &ServerIdentity,
) -> Result<(), ManagementError> {
    log::info!(
        "Attempting to kill server {} using the node manager",
        server.server_name
    );
    match killer.kill(server) {
        Ok(()) => {
            log::info!("Killed server {} using the node manager", server.server_name);
            Ok(())
        }
        Err(e) => {
            log::error!(
                "Failed to kill server {} using the node manager: {e}",
                server.server_name
            );
            log::debug!("{e:?}");
            Err(e)
        }
    }
}
