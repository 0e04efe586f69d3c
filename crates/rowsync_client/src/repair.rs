//! Repair: replace the local database with a server snapshot.
//!
//! The rescue path for a client whose synchronization state is corrupted
//! beyond merging. Every tracked table is cleared and reloaded from the
//! snapshot, the journal is discarded, and `last_known_version` is reset
//! to the server's latest version.

use crate::error::{ClientError, ClientResult};
use crate::register;
use crate::transport::Transport;
use rowsync_core::{journal, Context, VersionId};
use rowsync_store::{RelationalStore, StoreTx};
use tracing::{info, warn};

/// Fetches the server snapshot and replaces the local store wholesale.
///
/// Returns the version the client was reset to.
pub fn repair<S: RelationalStore, T: Transport>(
    ctx: &Context<S>,
    transport: &T,
) -> ClientResult<VersionId> {
    // Registration must exist: the reset version is stored on the node row.
    ctx.with_read(|view| register::require_node(view))?;
    let snapshot = transport.repair()?;
    let registry = ctx.registry();

    ctx.with_untracked_transaction(|tx| {
        for content_type in registry.ids() {
            tx.clear(content_type)?;
        }
        journal::clear(tx)?;

        for (reference, row) in snapshot.payloads.iter() {
            if !registry.contains(&reference.content_type) {
                warn!(
                    content_type = %reference.content_type,
                    "snapshot row for untracked content type ignored"
                );
                continue;
            }
            tx.insert(&reference.content_type, row.clone())?;
        }

        register::set_last_known_version(tx, snapshot.latest_version)?;
        Ok::<_, ClientError>(())
    })?;

    info!(version = snapshot.latest_version, "local database repaired");
    Ok(snapshot.latest_version)
}
