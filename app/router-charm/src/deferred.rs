use std::{
    future::Future,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use log::info;
use router_charm_core::charm::{error::CharmError, CharmEvent, EventOutcome};
use thiserror::Error;

pub const DEFERRED_EVENTS_FILE: &str = ".deferred-events.json";

#[derive(Debug, Error)]
pub enum DeferredStoreError {
    #[error("Couldn't access the deferred events file! Reason: {}", .0)]
    Io(std::io::Error),
    #[error("Deferred events file is corrupted! Reason: {}", .0)]
    Format(serde_json::Error),
}

/// Events that couldn't be handled yet, kept on disk between hook invocations.
pub struct DeferredEvents {
    path: PathBuf,
}

impl DeferredEvents {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(DEFERRED_EVENTS_FILE),
        }
    }

    pub async fn load(&self) -> Result<Vec<CharmEvent>, DeferredStoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => serde_json::from_slice(&raw).map_err(DeferredStoreError::Format),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(DeferredStoreError::Io(err)),
        }
    }

    /// An empty queue removes the file.
    pub async fn save(&self, events: &[CharmEvent]) -> Result<(), DeferredStoreError> {
        if events.is_empty() {
            return match tokio::fs::remove_file(&self.path).await {
                Err(err) if err.kind() != ErrorKind::NotFound => Err(DeferredStoreError::Io(err)),
                _ => Ok(()),
            };
        }

        let encoded = serde_json::to_vec_pretty(events).map_err(DeferredStoreError::Format)?;

        tokio::fs::write(&self.path, encoded)
            .await
            .map_err(DeferredStoreError::Io)
    }
}

#[derive(Debug, Default)]
pub struct DrainResult {
    /// Events to persist for the next invocation.
    pub pending: Vec<CharmEvent>,
    pub failure: Option<CharmError>,
}

/// Re-dispatches deferred events in order, then the delivered one.
///
/// A failure stops the run: the failed deferred event and everything after it
/// stay queued. The delivered event is never queued on failure since the
/// agent re-delivers the hook itself.
pub async fn drain<F, Fut>(
    deferred: Vec<CharmEvent>,
    delivered: Option<CharmEvent>,
    mut dispatch: F,
) -> DrainResult
where
    F: FnMut(CharmEvent) -> Fut,
    Fut: Future<Output = (CharmEvent, EventOutcome)>,
{
    let mut result = DrainResult::default();
    let mut deferred = deferred.into_iter();

    while let Some(event) = deferred.next() {
        info!("Re-emitting deferred '{}' event", event.name());

        match dispatch(event).await {
            (_, EventOutcome::Completed) => {}
            (event, EventOutcome::Deferred) => queue(&mut result.pending, event),
            (event, EventOutcome::Failed(err)) => {
                queue(&mut result.pending, event);
                deferred.for_each(|event| queue(&mut result.pending, event));
                result.failure = Some(err);
                return result;
            }
        }
    }

    if let Some(event) = delivered {
        match dispatch(event).await {
            (_, EventOutcome::Completed) => {}
            (event, EventOutcome::Deferred) => queue(&mut result.pending, event),
            (_, EventOutcome::Failed(err)) => result.failure = Some(err),
        }
    }

    result
}

fn queue(pending: &mut Vec<CharmEvent>, event: CharmEvent) {
    if !pending.contains(&event) {
        pending.push(event);
    }
}
