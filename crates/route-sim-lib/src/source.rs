//! Periodic position emitters
//!
//! A [`PositionSource`] owns one background task that samples a [`Device`] on every tick
//! and hands the position over through a single-slot channel. The device is only sampled
//! once the slot is free, so a consumer that falls behind blocks the emitter: samples are
//! never dropped, at most one is outstanding, and the emission rate lags the ticks.

use crate::{Device, Position, Result, SimError};
use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Outcome of a non-blocking read from a [`PositionSource`]
#[derive(Debug)]
pub enum TryNext {
    /// A sample was waiting
    Ready(Position),
    /// Nothing ready yet
    Empty,
    /// The emitter has stopped and every sample has been consumed
    Closed,
}

/// A live, non-restartable stream of positions sampled from one device
pub struct PositionSource {
    device_id: String,
    rx: mpsc::Receiver<Position>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PositionSource {
    /// Sample `device` every `period`, starting one period from now
    ///
    /// Must be called from within a tokio runtime. The emitter stops when `cancel` (or the
    /// source itself) is cancelled, or when the source is dropped.
    pub fn new<D>(device: D, period: Duration, cancel: CancellationToken) -> Result<Self>
    where
        D: Device + 'static,
    {
        if period.is_zero() {
            return Err(SimError::InvalidConfig(format!(
                "device '{}': sampling period must be greater than zero",
                device.info().id()
            )));
        }

        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        // A blocked handoff delays the following ticks rather than bursting them.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let ticks = futures::stream::unfold(interval, |mut interval| async move {
            interval.tick().await;
            Some(((), interval))
        });

        Ok(Self::with_ticks(device, ticks, cancel))
    }

    /// Sample `device` once per item of `ticks`
    ///
    /// The emitter also stops when the tick stream ends. Must be called from within a
    /// tokio runtime.
    pub fn with_ticks<D, S>(device: D, ticks: S, cancel: CancellationToken) -> Self
    where
        D: Device + 'static,
        S: Stream + Send + 'static,
        S::Item: Send,
    {
        let (tx, rx) = mpsc::channel(1);
        let device_id = device.info().id().to_string();
        let cancel = cancel.child_token();
        let task = tokio::spawn(emit(device, ticks, tx, cancel.clone()));

        tracing::debug!(device = %device_id, "Position source started");
        Self {
            device_id,
            rx,
            cancel,
            task,
        }
    }

    #[inline]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Take the waiting sample, if any, without blocking
    pub fn try_next(&mut self) -> TryNext {
        match self.rx.try_recv() {
            Ok(position) => TryNext::Ready(position),
            Err(TryRecvError::Empty) => TryNext::Empty,
            Err(TryRecvError::Disconnected) => TryNext::Closed,
        }
    }

    /// Wait for the next sample; `None` once the emitter has stopped
    pub async fn next(&mut self) -> Option<Position> {
        self.rx.recv().await
    }

    /// Stop the emitter; samples already handed over can still be read
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the source has been told to stop
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the emitter task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PositionSource {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn emit<D, S>(
    mut device: D,
    ticks: S,
    tx: mpsc::Sender<Position>,
    cancel: CancellationToken,
) where
    D: Device,
    S: Stream,
{
    let mut ticks = std::pin::pin!(ticks);
    let mut emitted: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            tick = ticks.next() => {
                if tick.is_none() {
                    break;
                }
            }
        }

        // Sample only once the slot is free
        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = tx.reserve() => match permit {
                Ok(permit) => permit,
                // Consumer gone
                Err(_) => break,
            },
        };
        permit.send(device.current_position());
        emitted += 1;
    }

    tracing::debug!(device = %device.info().id(), emitted, "Position source stopped");
}
