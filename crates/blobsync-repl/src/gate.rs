//! Idempotency gate: skip transfers the destination already holds.
//!
//! The check is size-only. A same-size object left behind by an earlier,
//! corrupted write would be reported as already replicated; this is an
//! accepted limitation. Correctness comes from the destination's atomic
//! commit, not from this gate.

use tracing::{debug, warn};

use crate::error::ReplError;
use crate::event::ReplicationRequest;
use crate::store::DestinationStore;

/// Whether the transfer for `request` can be skipped.
///
/// Returns `true` only if the destination has an object under the same key
/// whose size equals `request.size_hint`. A missing hint or a failing
/// existence check both yield `false`.
pub async fn should_skip(request: &ReplicationRequest, destination: &dyn DestinationStore) -> bool {
    let Some(expected) = request.size_hint else {
        debug!(key = %request.object_key, "no size hint; not skipping");
        return false;
    };

    match destination.stat(&request.object_key).await {
        Ok(Some(stat)) => {
            let same = stat.size == expected;
            debug!(
                key = %request.object_key,
                destination_size = stat.size,
                source_size = expected,
                same,
                "destination object exists"
            );
            same
        }
        Ok(None) => false,
        Err(e) => {
            let err = ReplError::IdempotencyCheckFailed {
                key: request.object_key.clone(),
                msg: e.to_string(),
            };
            warn!(error = %err, "proceeding with transfer");
            false
        }
    }
}
