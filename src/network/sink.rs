//! `NetworkSink`: producer side of a network channel (spec §4.5). Runs its
//! connect/reconnect state machine on a dedicated tokio task; worker threads
//! (synchronous) talk to it over a bounded `mpsc` channel, whose bounded
//! capacity *is* the reconnect buffer and whose blocking send *is* the
//! back-pressure mechanism spec §4.5 asks for.

use super::channel::Channel;
use super::wire::{TerminationKind, WireMessage};
use crate::buffer::TupleBuffer;
use crate::error::{EngineError, Result};
use crate::partition::{PartitionKey, PartitionManager};
use crate::reconfiguration::ReconfigurationMarker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Connection attempts before giving up; `0` means retry indefinitely.
    pub retry_times: u32,
    pub wait_time: Duration,
    /// Capacity of the reconnect buffer; also the outstanding-command queue
    /// depth, so a full reconnect buffer blocks the submitting worker.
    pub reconnect_buffer_capacity: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self { retry_times: 0, wait_time: Duration::from_millis(500), reconnect_buffer_capacity: 1024 }
    }
}

enum SinkCommand {
    Data(TupleBuffer),
    ConnectToNewReceiver(String, Arc<ReconfigurationMarker>),
    EndOfStream(TerminationKind, u64),
}

/// Handle a worker thread holds. Cheap to clone; the background task keeps
/// running until `end_of_stream` or the handle (and every clone) is dropped.
#[derive(Clone)]
pub struct NetworkSink {
    commands: mpsc::Sender<SinkCommand>,
}

impl NetworkSink {
    /// Spawns the background connector/writer task and returns a handle.
    /// `partitions` is deregistered once the sink sends its end-of-stream.
    pub fn start(partition: PartitionKey, addr: String, config: SinkConfig, partitions: Arc<PartitionManager>) -> Self {
        let (tx, rx) = mpsc::channel(config.reconnect_buffer_capacity.max(1));
        tokio::spawn(run_sink(partition, addr, config, rx, partitions));
        Self { commands: tx }
    }

    /// Blocks the calling (synchronous) worker thread if the reconnect
    /// buffer is full.
    pub fn submit(&self, buffer: TupleBuffer) -> Result<()> {
        self.commands.blocking_send(SinkCommand::Data(buffer)).map_err(|_| EngineError::ChannelClosed)
    }

    pub fn connect_to_new_receiver(&self, addr: String, marker: Arc<ReconfigurationMarker>) -> Result<()> {
        self.commands
            .blocking_send(SinkCommand::ConnectToNewReceiver(addr, marker))
            .map_err(|_| EngineError::ChannelClosed)
    }

    pub fn end_of_stream(&self, kind: TerminationKind, version: u64) -> Result<()> {
        self.commands.blocking_send(SinkCommand::EndOfStream(kind, version)).map_err(|_| EngineError::ChannelClosed)
    }
}

async fn connect_with_backoff(addr: &str, config: &SinkConfig) -> Option<Channel> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match Channel::connect(addr).await {
            Ok(channel) => {
                tracing::info!(addr, attempt, "sink connected");
                return Some(channel);
            }
            Err(err) => {
                tracing::warn!(addr, attempt, %err, "sink connect attempt failed");
                if config.retry_times != 0 && attempt >= config.retry_times {
                    tracing::error!(addr, attempts = attempt, "sink exhausted connect retries");
                    return None;
                }
                tokio::time::sleep(config.wait_time * attempt.min(8)).await;
            }
        }
    }
}

fn data_message(partition: PartitionKey, sequence_number: u64, buffer: &TupleBuffer) -> WireMessage {
    let tuple_count = buffer.number_of_tuples();
    let tuple_size = buffer.tuple_size_in_bytes();
    let payload_len = (tuple_count as usize) * (tuple_size as usize);
    let payload = buffer.with_payload(|p| p[..payload_len.min(p.len())].to_vec());
    let child_region = buffer.with_child_region(|c| c.to_vec());
    WireMessage::Data {
        partition,
        sequence_number,
        origin_id: buffer.origin_id(),
        watermark: buffer.watermark(),
        tuple_count,
        tuple_size,
        child_region_size: child_region.len() as u32,
        payload,
        child_region,
    }
}

async fn run_sink(
    partition: PartitionKey,
    addr: String,
    config: SinkConfig,
    mut commands: mpsc::Receiver<SinkCommand>,
    partitions: Arc<PartitionManager>,
) {
    let mut current_addr = addr;
    let mut channel = connect_with_backoff(&current_addr, &config).await;
    // Per-channel sequence counter, owned by the sink: the wire invariant
    // (spec §3/§8) is strictly increasing, gap-free sequence numbers on a
    // channel, restarting at 1 whenever `ConnectToNewReceiver` opens a new
    // one, regardless of whatever value a caller happened to stamp on the
    // buffer itself.
    let mut channel_sequence = 0u64;

    while let Some(command) = commands.recv().await {
        match command {
            SinkCommand::Data(buffer) => {
                channel_sequence += 1;
                let msg = data_message(partition, channel_sequence, &buffer);
                if channel.is_none() {
                    channel = connect_with_backoff(&current_addr, &config).await;
                }
                if let Some(ch) = channel.as_mut() {
                    if ch.send(&msg).await.is_err() {
                        tracing::warn!(%partition, "sink write failed, reconnecting");
                        channel = connect_with_backoff(&current_addr, &config).await;
                        if let Some(ch) = channel.as_mut() {
                            let _ = ch.send(&msg).await;
                        }
                    }
                }
            }
            SinkCommand::ConnectToNewReceiver(new_addr, marker) => {
                let version = marker.version_for(partition.decomposed_query_id).unwrap_or(0);
                if let Some(mut ch) = channel.take() {
                    let _ = ch
                        .send(&WireMessage::EndOfStream {
                            partition,
                            kind: TerminationKind::Reconfiguration,
                            last_sequence_number: channel_sequence,
                            version,
                        })
                        .await;
                }
                current_addr = new_addr;
                channel = connect_with_backoff(&current_addr, &config).await;
                channel_sequence = 0;
            }
            SinkCommand::EndOfStream(kind, version) => {
                if let Some(mut ch) = channel.take() {
                    let _ =
                        ch.send(&WireMessage::EndOfStream { partition, kind, last_sequence_number: channel_sequence, version }).await;
                }
                partitions.deregister(&partition);
                break;
            }
        }
    }
}
