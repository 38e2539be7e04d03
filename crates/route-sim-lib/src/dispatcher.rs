//! Simulation loop: fan-in from position sources into one publisher
//!
//! Sources are scanned round-robin with non-blocking reads. When a whole scan comes up
//! empty the dispatcher parks on all open sources at once instead of spinning, publishes
//! whichever sample arrives first and resumes scanning after that source. The first
//! publish failure stops every source and ends the run.

use crate::{Position, PositionPublisher, PositionSource, PublishError, TryNext};
use futures::FutureExt;
use futures::future::select_all;
use tokio_util::sync::CancellationToken;

/// Counters of a finished run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Positions accepted by the publisher
    pub published: u64,
}

/// A publish failure, tagged with the device whose sample failed
#[derive(Debug, thiserror::Error)]
#[error("Failed to publish position of device '{device}': {source}")]
pub struct DispatchError {
    pub device: String,
    #[source]
    pub source: PublishError,
}

pub struct Dispatcher<P> {
    sources: Vec<PositionSource>,
    publisher: P,
    cancel: CancellationToken,
}

impl<P: PositionPublisher> Dispatcher<P> {
    pub fn new(sources: Vec<PositionSource>, publisher: P, cancel: CancellationToken) -> Self {
        Self {
            sources,
            publisher,
            cancel,
        }
    }

    pub fn publisher_mut(&mut self) -> &mut P {
        &mut self.publisher
    }

    pub fn into_publisher(self) -> P {
        self.publisher
    }

    /// Forward samples until every source closes, the token is cancelled, or a publish fails
    ///
    /// Sources are stopped before returning, whatever the outcome.
    pub async fn run(&mut self) -> Result<DispatchStats, DispatchError> {
        let result = self.dispatch().await;
        for source in &self.sources {
            source.stop();
        }

        match &result {
            Ok(stats) => tracing::info!(published = stats.published, "Dispatcher finished"),
            Err(e) => tracing::error!(device = %e.device, error = %e.source, "Dispatcher stopped"),
        }
        result
    }

    async fn dispatch(&mut self) -> Result<DispatchStats, DispatchError> {
        let count = self.sources.len();
        let mut open = vec![true; count];
        let mut stats = DispatchStats::default();
        // Index the next scan starts from
        let mut start = 0;

        tracing::info!(sources = count, "Dispatcher started");
        while open.contains(&true) && !self.cancel.is_cancelled() {
            let mut published_in_scan = false;

            for step in 0..count {
                if self.cancel.is_cancelled() {
                    break;
                }
                let index = (start + step) % count;
                if !open[index] {
                    continue;
                }
                match self.sources[index].try_next() {
                    TryNext::Ready(position) => {
                        self.forward(index, position, &mut stats).await?;
                        published_in_scan = true;
                    }
                    TryNext::Empty => {}
                    TryNext::Closed => {
                        tracing::debug!(device = %self.sources[index].device_id(), "Source closed");
                        open[index] = false;
                    }
                }
            }

            if published_in_scan || self.cancel.is_cancelled() {
                continue;
            }

            // Nothing ready anywhere: wait for the first source to produce or close. Waits are
            // listed from `start` so simultaneous wakeups resolve in round-robin order.
            let woken = {
                let (before, from_start) = self.sources.split_at_mut(start);
                let waits: Vec<_> = from_start
                    .iter_mut()
                    .enumerate()
                    .map(|(offset, source)| (start + offset, source))
                    .chain(before.iter_mut().enumerate())
                    .filter(|(index, _)| open[*index])
                    .map(|(index, source)| async move { (index, source.next().await) }.boxed())
                    .collect();
                if waits.is_empty() {
                    break;
                }

                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => None,
                    (woken, _, _) = select_all(waits) => Some(woken),
                }
            };

            match woken {
                None => break,
                Some((index, Some(position))) => {
                    self.forward(index, position, &mut stats).await?;
                    start = (index + 1) % count;
                }
                Some((index, None)) => {
                    tracing::debug!(device = %self.sources[index].device_id(), "Source closed");
                    open[index] = false;
                }
            }
        }

        Ok(stats)
    }

    async fn forward(
        &mut self,
        index: usize,
        position: Position,
        stats: &mut DispatchStats,
    ) -> Result<(), DispatchError> {
        #[cfg(feature = "profiling")]
        profiling::scope!("dispatcher::forward");
        match self.publisher.publish(&position).await {
            Ok(()) => {
                stats.published += 1;
                Ok(())
            }
            Err(source) => Err(DispatchError {
                device: self.sources[index].device_id().to_string(),
                source,
            }),
        }
    }
}
