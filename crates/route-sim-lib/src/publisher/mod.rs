//! Position publishers
//!
//! A [`PositionPublisher`] receives every sampled position, one at a time. The dispatcher
//! never calls `publish` concurrently, so implementations may keep plain mutable state.

mod fanout;
pub mod format;
mod subscribers;

pub use fanout::{FanoutConfig, FanoutPublisher};
pub use subscribers::OverflowPolicy;

use crate::Position;
use async_trait::async_trait;
use std::io::Write;
use tracing::Level;

/// Errors raised while delivering positions
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Reached the configured limit of {limit} positions")]
    LimitReached { limit: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize position: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Broadcast server is no longer running")]
    ServerStopped,

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Sink for sampled positions
#[async_trait]
pub trait PositionPublisher: Send {
    async fn publish(&mut self, position: &Position) -> Result<(), PublishError>;

    /// Flush buffered output and release resources
    async fn close(&mut self) -> Result<(), PublishError> {
        Ok(())
    }
}

#[async_trait]
impl<P: PositionPublisher + ?Sized> PositionPublisher for Box<P> {
    async fn publish(&mut self, position: &Position) -> Result<(), PublishError> {
        (**self).publish(position).await
    }

    async fn close(&mut self) -> Result<(), PublishError> {
        (**self).close().await
    }
}

/// Emits every position as a `tracing` event
#[derive(Clone, Copy, Debug)]
pub struct LogPublisher {
    level: Level,
}

impl LogPublisher {
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl Default for LogPublisher {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

#[async_trait]
impl PositionPublisher for LogPublisher {
    async fn publish(&mut self, position: &Position) -> Result<(), PublishError> {
        let feature = format::geojson_string(position)?;
        let device = position.device_id();
        // The level of a tracing event must be known at compile time
        match self.level {
            Level::ERROR => tracing::error!(device, "{feature}"),
            Level::WARN => tracing::warn!(device, "{feature}"),
            Level::INFO => tracing::info!(device, "{feature}"),
            Level::DEBUG => tracing::debug!(device, "{feature}"),
            _ => tracing::trace!(device, "{feature}"),
        }
        Ok(())
    }
}

/// Writes one GeoJSON feature per line
pub struct NdjsonPublisher<W> {
    writer: W,
}

impl<W: Write + Send> NdjsonPublisher<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: Write + Send> PositionPublisher for NdjsonPublisher<W> {
    async fn publish(&mut self, position: &Position) -> Result<(), PublishError> {
        serde_json::to_writer(&mut self.writer, &format::geojson_feature(position))?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PublishError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Forwards to an inner publisher until `limit` positions have gone through
///
/// The publish after the last allowed one fails with [`PublishError::LimitReached`],
/// which stops the dispatcher.
pub struct LimitedPublisher<P> {
    inner: P,
    limit: u64,
    published: u64,
}

impl<P: PositionPublisher> LimitedPublisher<P> {
    pub fn new(inner: P, limit: u64) -> Self {
        Self {
            inner,
            limit,
            published: 0,
        }
    }

    #[inline]
    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

#[async_trait]
impl<P: PositionPublisher> PositionPublisher for LimitedPublisher<P> {
    async fn publish(&mut self, position: &Position) -> Result<(), PublishError> {
        if self.published >= self.limit {
            tracing::info!(limit = self.limit, "Reached desired positions count");
            return Err(PublishError::LimitReached { limit: self.limit });
        }
        self.inner.publish(position).await?;
        self.published += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PublishError> {
        self.inner.close().await
    }
}
