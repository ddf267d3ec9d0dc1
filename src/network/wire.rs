//! Wire protocol: explicit little-endian framing, not reflection-based
//! serialization (spec §4.5, §9 redesign note). One frame carries one
//! [`WireMessage`]; `encode`/`decode` are the only place byte layout is
//! defined.

use crate::error::{EngineError, Result};
use crate::partition::PartitionKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Announce = 1,
    Data = 2,
    Event = 3,
    EndOfStream = 4,
    ReconfigurationMarker = 5,
}

impl TryFrom<u8> for MessageType {
    type Error = EngineError;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(MessageType::Announce),
            2 => Ok(MessageType::Data),
            3 => Ok(MessageType::Event),
            4 => Ok(MessageType::EndOfStream),
            5 => Ok(MessageType::ReconfigurationMarker),
            other => Err(EngineError::Serialization(format!("unknown message type {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TerminationKind {
    Graceful = 0,
    Hard = 1,
    Failure = 2,
    Reconfiguration = 3,
}

impl TryFrom<u8> for TerminationKind {
    type Error = EngineError;
    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(TerminationKind::Graceful),
            1 => Ok(TerminationKind::Hard),
            2 => Ok(TerminationKind::Failure),
            3 => Ok(TerminationKind::Reconfiguration),
            other => Err(EngineError::Serialization(format!("unknown termination kind {other}"))),
        }
    }
}

/// Back-channel event a consumer sends toward its producers (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    StartSource,
    Reconnect,
}

impl Event {
    fn to_u8(self) -> u8 {
        match self {
            Event::StartSource => 0,
            Event::Reconnect => 1,
        }
    }

    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Event::StartSource),
            1 => Ok(Event::Reconnect),
            other => Err(EngineError::Serialization(format!("unknown event kind {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Announce { partition: PartitionKey, producer_version: u64, expected_producers: u32 },
    Data {
        partition: PartitionKey,
        sequence_number: u64,
        origin_id: u64,
        watermark: u64,
        tuple_count: u32,
        tuple_size: u32,
        child_region_size: u32,
        payload: Vec<u8>,
        child_region: Vec<u8>,
    },
    Event { partition: PartitionKey, event: Event },
    EndOfStream { partition: PartitionKey, kind: TerminationKind, last_sequence_number: u64, version: u64 },
    ReconfigurationMarker { partition: PartitionKey, decomposed_query_id: u64, version: u64 },
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn partition(&mut self, p: &PartitionKey) {
        self.u64(p.shared_query_id);
        self.u64(p.decomposed_query_id);
        self.u64(p.operator_id);
        self.u64(p.producer_subpartition_index);
    }
    fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(EngineError::Serialization("wire frame truncated".to_string()));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn partition(&mut self) -> Result<PartitionKey> {
        Ok(PartitionKey::new(self.u64()?, self.u64()?, self.u64()?, self.u64()?))
    }
}

impl WireMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        match self {
            WireMessage::Announce { partition, producer_version, expected_producers } => {
                w.u8(MessageType::Announce as u8);
                w.partition(partition);
                w.u64(*producer_version);
                w.u32(*expected_producers);
            }
            WireMessage::Data {
                partition,
                sequence_number,
                origin_id,
                watermark,
                tuple_count,
                tuple_size,
                child_region_size,
                payload,
                child_region,
            } => {
                w.u8(MessageType::Data as u8);
                w.partition(partition);
                w.u64(*sequence_number);
                w.u64(*origin_id);
                w.u64(*watermark);
                w.u32(*tuple_count);
                w.u32(*tuple_size);
                w.u32(*child_region_size);
                w.bytes(payload);
                w.bytes(child_region);
            }
            WireMessage::Event { partition, event } => {
                w.u8(MessageType::Event as u8);
                w.partition(partition);
                w.u8(event.to_u8());
            }
            WireMessage::EndOfStream { partition, kind, last_sequence_number, version } => {
                w.u8(MessageType::EndOfStream as u8);
                w.partition(partition);
                w.u8(*kind as u8);
                w.u64(*last_sequence_number);
                w.u64(*version);
            }
            WireMessage::ReconfigurationMarker { partition, decomposed_query_id, version } => {
                w.u8(MessageType::ReconfigurationMarker as u8);
                w.partition(partition);
                w.u64(*decomposed_query_id);
                w.u64(*version);
            }
        }
        w.buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let message_type = MessageType::try_from(r.u8()?)?;
        let partition = r.partition()?;
        match message_type {
            MessageType::Announce => {
                let producer_version = r.u64()?;
                let expected_producers = r.u32()?;
                Ok(WireMessage::Announce { partition, producer_version, expected_producers })
            }
            MessageType::Data => {
                let sequence_number = r.u64()?;
                let origin_id = r.u64()?;
                let watermark = r.u64()?;
                let tuple_count = r.u32()?;
                let tuple_size = r.u32()?;
                let child_region_size = r.u32()?;
                let payload_len = tuple_count as usize * tuple_size as usize;
                let payload = r.take(payload_len)?.to_vec();
                let child_region = r.take(child_region_size as usize)?.to_vec();
                Ok(WireMessage::Data {
                    partition,
                    sequence_number,
                    origin_id,
                    watermark,
                    tuple_count,
                    tuple_size,
                    child_region_size,
                    payload,
                    child_region,
                })
            }
            MessageType::Event => {
                let event = Event::from_u8(r.u8()?)?;
                Ok(WireMessage::Event { partition, event })
            }
            MessageType::EndOfStream => {
                let kind = TerminationKind::try_from(r.u8()?)?;
                let last_sequence_number = r.u64()?;
                let version = r.u64()?;
                Ok(WireMessage::EndOfStream { partition, kind, last_sequence_number, version })
            }
            MessageType::ReconfigurationMarker => {
                let decomposed_query_id = r.u64()?;
                let version = r.u64()?;
                Ok(WireMessage::ReconfigurationMarker { partition, decomposed_query_id, version })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_message_roundtrips() {
        let msg = WireMessage::Data {
            partition: PartitionKey::new(1, 2, 3, 4),
            sequence_number: 5,
            origin_id: 6,
            watermark: 7,
            tuple_count: 2,
            tuple_size: 4,
            child_region_size: 3,
            payload: vec![1, 2, 3, 4, 5, 6, 7, 8],
            child_region: vec![9, 10, 11],
        };
        let encoded = msg.encode();
        let decoded = WireMessage::decode(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn announce_message_roundtrips() {
        let msg = WireMessage::Announce { partition: PartitionKey::invalid(), producer_version: 1, expected_producers: 3 };
        let decoded = WireMessage::decode(&msg.encode()).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn truncated_frame_is_a_serialization_error() {
        let msg = WireMessage::EndOfStream { partition: PartitionKey::invalid(), kind: TerminationKind::Graceful, last_sequence_number: 9, version: 1 };
        let encoded = msg.encode();
        let err = WireMessage::decode(&encoded[..encoded.len() - 2]).unwrap_err();
        assert!(matches!(err, EngineError::Serialization(_)));
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let err = WireMessage::decode(&[99, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, EngineError::Serialization(_)));
    }
}
