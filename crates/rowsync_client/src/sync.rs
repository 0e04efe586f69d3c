//! The canonical client synchronization loop.

use crate::error::{ClientError, ClientResult};
use crate::pull::{pull, MergeReport};
use crate::push::{push, PushReport};
use crate::transport::Transport;
use rowsync_core::Context;
use rowsync_store::RelationalStore;
use tracing::debug;

/// Options for [`synchronize`].
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Maximum number of push attempts before giving up.
    pub max_push_attempts: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_push_attempts: 3,
        }
    }
}

/// Outcome of a full synchronization cycle.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// The final accepted push.
    pub push: PushReport,
    /// Merges performed along the way (one per rejected push).
    pub merges: Vec<MergeReport>,
    /// Push attempts made.
    pub attempts: u32,
}

/// Runs the canonical loop: push; on rejection pull (the merge runs
/// inside) and push again, up to the configured number of attempts.
///
/// An unsolvable unique-constraint conflict stops the loop and surfaces
/// the entries; every other error propagates unchanged.
pub fn synchronize<S: RelationalStore, T: Transport>(
    ctx: &Context<S>,
    transport: &T,
    options: SyncOptions,
) -> ClientResult<SyncReport> {
    let mut merges = Vec::new();

    for attempt in 1..=options.max_push_attempts {
        match push(ctx, transport) {
            Ok(report) => {
                return Ok(SyncReport {
                    push: report,
                    merges,
                    attempts: attempt,
                });
            }
            Err(ClientError::PushRejected { detail }) => {
                debug!(attempt, detail = %detail, "push rejected; pulling");
                merges.push(pull(ctx, transport)?);
            }
            Err(other) => return Err(other),
        }
    }

    Err(ClientError::RetriesExhausted {
        attempts: options.max_push_attempts,
    })
}
