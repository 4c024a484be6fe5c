//! Reactive ingest: watch directory trees and re-index changed files.
//!
//! File events are debounced per path — editors fire bursts of writes on
//! save, and a half-written file embeds garbage. A path is re-indexed only
//! after it has been quiet for the debounce window, then the index is
//! flushed so a crash never loses the update.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::Context;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use sift_core::{AddOutcome, CancelToken, Index, IndexError};

/// Per-path quiet window before a change is re-indexed.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// Poll interval for the debounce loop; bounds cancellation latency.
const TICK: Duration = Duration::from_millis(50);

/// Watches `roots` and re-indexes supported files on create/write until the
/// token fires. Blocks the calling thread.
pub fn run(index: &Index, roots: &[PathBuf], token: &CancelToken) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel::<PathBuf>();

    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    for path in event.paths {
                        let _ = tx.send(path);
                    }
                }
            }
            Err(e) => warn!("watch error: {e}"),
        })
        .context("create file watcher")?;

    for root in roots {
        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("watch {}", root.display()))?;
    }

    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
    loop {
        if token.is_cancelled() {
            return Ok(());
        }

        match rx.recv_timeout(TICK) {
            Ok(path) => {
                // Rapid saves reset the timer; only the quiet file embeds.
                pending.insert(path, Instant::now());
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(()),
        }

        let now = Instant::now();
        let due: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) >= DEBOUNCE)
            .map(|(path, _)| path.clone())
            .collect();

        for path in due {
            pending.remove(&path);
            if !path.is_file() {
                continue;
            }
            match index.add_file(token, &path) {
                Ok(AddOutcome::Added) => {
                    eprintln!("[watch] re-indexed {}", path.display());
                    if let Err(e) = index.flush() {
                        warn!("flush after {}: {e}", path.display());
                    }
                }
                Ok(AddOutcome::Skipped) => {
                    debug!("[watch] skipped {}", path.display());
                }
                Err(IndexError::Cancelled) => return Ok(()),
                Err(e) => warn!("[watch] {}: {e}", path.display()),
            }
        }
    }
}
