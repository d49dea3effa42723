//! Client-side resource synchronizer.
//!
//! Turns a watch stream into [`EventHandler`] callbacks. A spawned receive
//! loop feeds a bounded channel, so slow handlers apply backpressure on the
//! stream; the apply loop drives the handler and maintains the index cursor.
//!
//! A batch is everything between two `end_of_list` markers. `before_batch` /
//! `after_batch` are elided for empty boundaries: a marker with no preceding
//! events invokes no callbacks. Errors (handler or transport) tear the stream
//! down and surface once on the error channel; reconnection is the caller's
//! concern.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tonic::Status;
use tracing::{debug, error, info};

use lattice_proto::services::WatchResourcesResponse;
use lattice_proto::types::Resource;

use crate::error::{LatticeError, Result};

/// Callbacks driven by the synchronizer, in stream order. `after_batch` is
/// the atomic apply point.
#[async_trait]
pub trait EventHandler: Send {
    async fn before_batch(&mut self) -> Result<()>;
    async fn on_updated(&mut self, resource: Resource) -> Result<()>;
    async fn on_dropped(&mut self, resource: Resource) -> Result<()>;
    async fn after_batch(&mut self) -> Result<()>;
}

/// Capacity of the receive → apply channel.
const APPLY_CHANNEL_CAPACITY: usize = 16;

pub struct Synchronizer<H> {
    handler: H,
    index_cursor: i64,
}

impl<H: EventHandler> Synchronizer<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            index_cursor: 0,
        }
    }

    /// Highest `version.index` observed so far.
    pub fn index_cursor(&self) -> i64 {
        self.index_cursor
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Consumes the stream until it ends or fails. A clean end of stream
    /// returns `Ok(())`.
    pub async fn run<S>(&mut self, stream: S) -> Result<()>
    where
        S: Stream<Item = std::result::Result<WatchResourcesResponse, Status>> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<std::result::Result<WatchResourcesResponse, Status>>(
            APPLY_CHANNEL_CAPACITY,
        );

        let recv_task: JoinHandle<()> = tokio::spawn(async move {
            let mut stream = std::pin::pin!(stream);
            while let Some(message) = stream.next().await {
                if tx.send(message).await.is_err() {
                    break;
                }
            }
        });

        let result = self.apply_loop(&mut rx).await;

        rx.close();
        recv_task.abort();

        result
    }

    async fn apply_loop(
        &mut self,
        rx: &mut mpsc::Receiver<std::result::Result<WatchResourcesResponse, Status>>,
    ) -> Result<()> {
        let mut in_batch = false;

        while let Some(message) = rx.recv().await {
            let message = message.map_err(LatticeError::from)?;

            if message.end_of_list {
                if in_batch {
                    self.handler.after_batch().await?;
                    in_batch = false;
                }
                continue;
            }

            if message.updated_resources.is_empty() && message.dropped_resources.is_empty() {
                continue;
            }

            if !in_batch {
                self.handler.before_batch().await?;
                in_batch = true;
            }

            for resource in message.updated_resources {
                debug!(id = %resource.id, name = %resource.name, "updated resource");
                self.advance_cursor(&resource);
                self.handler.on_updated(resource).await?;
            }

            for resource in message.dropped_resources {
                debug!(id = %resource.id, "dropped resource");
                self.advance_cursor(&resource);
                self.handler.on_dropped(resource).await?;
            }
        }

        Ok(())
    }

    fn advance_cursor(&mut self, resource: &Resource) {
        if let Some(version) = &resource.version {
            if version.index > self.index_cursor {
                self.index_cursor = version.index;
            }
        }
    }
}

/// Spawns a synchronizer task. The first error is delivered on the returned
/// channel; a clean stream end closes it silently.
pub fn spawn<H, S>(
    name: &'static str,
    handler: H,
    stream: S,
) -> (JoinHandle<()>, mpsc::Receiver<LatticeError>)
where
    H: EventHandler + 'static,
    S: Stream<Item = std::result::Result<WatchResourcesResponse, Status>> + Send + 'static,
{
    let (err_tx, err_rx) = mpsc::channel(1);

    let task = tokio::spawn(async move {
        info!(synchronizer = name, "starting resource sync task");

        let mut synchronizer = Synchronizer::new(handler);
        match synchronizer.run(stream).await {
            Ok(()) => info!(synchronizer = name, "resource sync stream ended"),
            Err(err) => {
                error!(synchronizer = name, error = %err, "resource sync failed");
                let _ = err_tx.send(err).await;
            }
        }
    });

    (task, err_rx)
}
