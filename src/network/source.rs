//! `NetworkSource`: consumer side of a network channel (spec §4.5). Accepts
//! inbound TCP connections, resolves the announced partition against the
//! partition manager, and enqueues decoded `Data` frames as tasks for the
//! first stage of the target plan.

use super::channel::Channel;
use super::wire::{TerminationKind, WireMessage};
use crate::buffer::BufferPool;
use crate::error::Result;
use crate::partition::{LocalConsumer, PartitionManager};
use crate::queue::Dispatcher;
use crate::reconfiguration::{ReconfigurationEvent, ReconfigurationMarker};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub bind_addr: String,
    /// How long to hold a connection whose announced partition isn't
    /// registered yet before rejecting it (spec §4.5 "missing producer").
    pub registration_grace_period: Duration,
}

pub struct NetworkSource {
    config: SourceConfig,
}

impl NetworkSource {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    /// Binds and spawns the accept loop on the current tokio runtime. Returns
    /// once the listener is bound; connection handling runs in the
    /// background for the lifetime of the returned task.
    pub async fn listen(self, partitions: Arc<PartitionManager>, pool: BufferPool, dispatcher: Arc<dyn Dispatcher>) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "network source listening");
        let grace_period = self.config.registration_grace_period;
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let partitions = Arc::clone(&partitions);
                        let pool = pool.clone();
                        let dispatcher = Arc::clone(&dispatcher);
                        tokio::spawn(async move {
                            let channel = Channel::new(stream);
                            if let Err(err) = handle_connection(channel, partitions, pool, dispatcher, grace_period).await {
                                tracing::warn!(%peer, %err, "network source connection ended with error");
                            }
                        });
                    }
                    Err(err) => {
                        tracing::error!(%err, "network source accept failed");
                    }
                }
            }
        });
        Ok(())
    }
}

async fn handle_connection(
    mut channel: Channel,
    partitions: Arc<PartitionManager>,
    pool: BufferPool,
    dispatcher: Arc<dyn Dispatcher>,
    grace_period: Duration,
) -> Result<()> {
    let announce = channel.recv().await?;
    let partition = match announce {
        WireMessage::Announce { partition, .. } => partition,
        other => {
            tracing::warn!(?other, "expected Announce as first frame, closing connection");
            return Ok(());
        }
    };

    let deadline = Instant::now() + grace_period;
    while !partitions.is_registered(&partition) {
        if Instant::now() >= deadline {
            tracing::warn!(%partition, "rejecting connection: producer partition never registered within grace period");
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let (query_id, stage) = match partitions.lookup(&partition) {
        Some(LocalConsumer::Stage { query_id, stage_id }) => (query_id, stage_id),
        _ => {
            tracing::warn!(%partition, "partition registered to a non-stage consumer, closing connection");
            return Ok(());
        }
    };

    loop {
        let message = match channel.recv().await {
            Ok(m) => m,
            Err(_) => return Ok(()),
        };
        match message {
            WireMessage::Data { sequence_number, origin_id, watermark, tuple_count, tuple_size, payload, child_region, .. } => {
                let buffer = match pool.acquire(None) {
                    Ok(b) => b,
                    Err(err) => {
                        tracing::warn!(%err, "dropping inbound data frame, pool exhausted");
                        continue;
                    }
                };
                buffer.with_payload_mut(|dst| {
                    let n = payload.len().min(dst.len());
                    dst[..n].copy_from_slice(&payload[..n]);
                });
                buffer.with_child_region_mut(|dst| {
                    dst.clear();
                    dst.extend_from_slice(&child_region);
                });
                buffer.set_sequence_number(sequence_number);
                buffer.set_origin_id(origin_id);
                buffer.set_watermark(watermark);
                buffer.set_number_of_tuples(tuple_count);
                buffer.set_tuple_size_in_bytes(tuple_size);
                let _ = dispatcher.dispatch_data(query_id, stage, buffer);
            }
            WireMessage::EndOfStream { kind, version, .. } => {
                let event = match kind {
                    TerminationKind::Graceful => ReconfigurationEvent::SoftEnd,
                    TerminationKind::Hard => ReconfigurationEvent::HardEnd,
                    TerminationKind::Failure => ReconfigurationEvent::FailEnd,
                    TerminationKind::Reconfiguration => ReconfigurationEvent::Drain,
                };
                let mut marker = ReconfigurationMarker::new();
                marker.insert(partition.decomposed_query_id, version, vec![event]);
                let _ = dispatcher.dispatch_reconfiguration(query_id, stage, Arc::new(marker));
                return Ok(());
            }
            WireMessage::Event { event, .. } => {
                tracing::debug!(?event, %partition, "received back-channel event");
            }
            other => {
                tracing::debug!(?other, "ignoring unexpected frame on data channel");
            }
        }
    }
}
