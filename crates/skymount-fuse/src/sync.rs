//! Change-synchronization loop.
//!
//! One background task per mount: an initial full listing that seeds the
//! container, then a steady loop polling the provider's change feed at the
//! configured interval. SIGUSR1 (relayed by the host through
//! [`FsState::request_refresh`]) forces a full refresh between ticks, and
//! a cancellation token ends the task on unmount.
//!
//! Every error in this module is logged and swallowed; the filesystem
//! keeps serving the previous state and the loop tries again next tick.
//!
//! [`FsState::request_refresh`]: crate::filesystem::FsState::request_refresh

use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use crate::filesystem::FsState;

/// Attempts at the full listing before giving up until the next tick.
const MAX_LIST_ATTEMPTS: u32 = 5;

/// First retry delay; doubled after every failed listing attempt.
const INITIAL_LIST_BACKOFF: Duration = Duration::from_millis(500);

/// Task body spawned by `CloudFs::start`.
pub async fn run(state: Arc<FsState>) {
    if full_refresh(&state).await {
        info!(entries = state.entry_count(), "initial listing loaded");
    }

    loop {
        tokio::select! {
            _ = state.shutdown_token().cancelled() => {
                debug!("synchronization task stopping");
                break;
            }
            _ = state.refresh_requested().notified() => {
                debug!("immediate refresh requested");
                full_refresh(&state).await;
            }
            _ = tokio::time::sleep(state.refresh_interval()) => {
                poll_changes(&state).await;
            }
        }
    }
}

/// List the provider and swap in a fresh container.
///
/// Entries whose file id is already known keep their inode (the kernel
/// holds references to them); only never-seen files get new numbers.
/// Listing failures retry with exponential backoff up to
/// [`MAX_LIST_ATTEMPTS`]; on final failure the previous container stays
/// live and `false` is returned.
pub async fn full_refresh(state: &FsState) -> bool {
    let backend = state.backend();

    let mut files = None;
    let mut backoff = INITIAL_LIST_BACKOFF;
    for attempt in 1..=MAX_LIST_ATTEMPTS {
        match backend.list_all().await {
            Ok(list) => {
                files = Some(list);
                break;
            }
            Err(err) => {
                warn!(attempt, error = %err, "full listing failed");
                if attempt < MAX_LIST_ATTEMPTS {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
    let Some(files) = files else {
        warn!("giving up on full refresh until the next poll tick");
        return false;
    };

    let old = state.container();
    let fresh = state.new_container();

    // Two passes: first copy forward the inodes of files we already know,
    // then register the rest so new files never steal a retained inode.
    let mut unseen = Vec::new();
    for file in files {
        match old.find_by_id(&file.id) {
            Some(existing) => {
                fresh.register_at(file, existing.inode());
            }
            None => unseen.push(file),
        }
    }
    for file in unseen {
        fresh.register(file);
    }

    debug!(entries = fresh.len(), "container refreshed");
    state.swap_container(Arc::new(fresh));
    true
}

/// Apply one round of provider changes to the live container.
pub async fn poll_changes(state: &FsState) {
    let changes = match state.backend().changes().await {
        Ok(changes) => changes,
        Err(err) => {
            warn!(error = %err, "change poll failed");
            return;
        }
    };
    if changes.is_empty() {
        return;
    }

    let container = state.container();
    for change in changes {
        if change.remove {
            if let Some(entry) = container.find_by_id(&change.id) {
                debug!(id = %change.id, inode = entry.inode(), "change: removed");
                container.remove(&entry);
            }
            continue;
        }
        let Some(file) = change.file else {
            continue;
        };
        match container.find_by_id(&change.id) {
            Some(existing) => {
                // Re-register under the same inode so the kernel's view
                // stays stable; this re-runs collision disambiguation
                // against the current sibling set.
                let inode = existing.inode();
                container.remove(&existing);
                container.register_at(file, inode);
                debug!(id = %change.id, inode, "change: replaced");
            }
            None => {
                let entry = container.register(file);
                debug!(id = %change.id, inode = entry.inode(), "change: new entry");
            }
        }
    }
}
