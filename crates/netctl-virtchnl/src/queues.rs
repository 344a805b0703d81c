//! Queue configuration payloads ([`crate::Opcode::ConfigTxQueues`] /
//! [`crate::Opcode::ConfigRxQueues`]).
//!
//! Each message carries a fixed header followed by fixed-size per-queue records, so the number
//! of queues one message can configure is bounded by the mailbox buffer size.

use crate::vport::{QueueModel, QueueType};
use crate::wire::{push_u16, push_u32, push_u64, DecodeError, Reader};

/// `vport_id` + `num_queues` + reserved.
pub const CONFIG_QUEUES_HEADER_LEN: usize = 8;

/// How many `record_len`-byte queue records fit in a single message for a mailbox buffer of
/// `buf_size` bytes.
pub const fn max_queues_per_msg(buf_size: usize, record_len: usize) -> usize {
    if buf_size <= CONFIG_QUEUES_HEADER_LEN || record_len == 0 {
        return 0;
    }
    (buf_size - CONFIG_QUEUES_HEADER_LEN) / record_len
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxQueueInfo {
    pub queue_id: u32,
    pub model: QueueModel,
    pub queue_type: QueueType,
    pub ring_len: u16,
    pub dma_ring_addr: u64,
    /// Only meaningful under the split model.
    pub tx_compl_queue_id: u16,
    pub relative_queue_id: u16,
}

impl TxQueueInfo {
    pub const LEN: usize = 24;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxQueueInfo {
    pub queue_id: u32,
    pub model: QueueModel,
    pub queue_type: QueueType,
    pub ring_len: u16,
    pub dma_ring_addr: u64,
    pub data_buffer_size: u32,
    pub max_pkt_size: u32,
    /// Only meaningful under the split model.
    pub rx_bufq1_id: u16,
    pub rx_bufq2_id: u16,
}

impl RxQueueInfo {
    pub const LEN: usize = 32;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigTxQueues {
    pub vport_id: u32,
    pub queues: Vec<TxQueueInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRxQueues {
    pub vport_id: u32,
    pub queues: Vec<RxQueueInfo>,
}

fn push_header(out: &mut Vec<u8>, vport_id: u32, count: usize) {
    push_u32(out, vport_id);
    push_u16(out, count as u16);
    push_u16(out, 0);
}

fn read_header(r: &mut Reader<'_>, record_len: usize) -> Result<(u32, usize), DecodeError> {
    let vport_id = r.read_u32()?;
    let count = r.read_u16()? as usize;
    let _reserved = r.read_u16()?;
    if r.remaining() != count * record_len {
        return Err(if r.remaining() < count * record_len {
            DecodeError::UnexpectedEof
        } else {
            DecodeError::TrailingBytes(r.remaining() - count * record_len)
        });
    }
    Ok((vport_id, count))
}

impl ConfigTxQueues {
    pub fn encode(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(CONFIG_QUEUES_HEADER_LEN + self.queues.len() * TxQueueInfo::LEN);
        push_header(&mut out, self.vport_id, self.queues.len());
        for q in &self.queues {
            push_u32(&mut out, q.queue_id);
            push_u16(&mut out, q.model.to_u16());
            push_u32(&mut out, q.queue_type.to_u32());
            push_u16(&mut out, q.ring_len);
            push_u64(&mut out, q.dma_ring_addr);
            push_u16(&mut out, q.tx_compl_queue_id);
            push_u16(&mut out, q.relative_queue_id);
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let (vport_id, count) = read_header(&mut r, TxQueueInfo::LEN)?;
        let mut queues = Vec::with_capacity(count);
        for _ in 0..count {
            queues.push(TxQueueInfo {
                queue_id: r.read_u32()?,
                model: QueueModel::from_u16(r.read_u16()?)?,
                queue_type: QueueType::from_u32(r.read_u32()?)?,
                ring_len: r.read_u16()?,
                dma_ring_addr: r.read_u64()?,
                tx_compl_queue_id: r.read_u16()?,
                relative_queue_id: r.read_u16()?,
            });
        }
        r.finish()?;
        Ok(Self { vport_id, queues })
    }
}

impl ConfigRxQueues {
    pub fn encode(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(CONFIG_QUEUES_HEADER_LEN + self.queues.len() * RxQueueInfo::LEN);
        push_header(&mut out, self.vport_id, self.queues.len());
        for q in &self.queues {
            push_u32(&mut out, q.queue_id);
            push_u16(&mut out, q.model.to_u16());
            push_u32(&mut out, q.queue_type.to_u32());
            push_u16(&mut out, q.ring_len);
            push_u64(&mut out, q.dma_ring_addr);
            push_u32(&mut out, q.data_buffer_size);
            push_u32(&mut out, q.max_pkt_size);
            push_u16(&mut out, q.rx_bufq1_id);
            push_u16(&mut out, q.rx_bufq2_id);
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let (vport_id, count) = read_header(&mut r, RxQueueInfo::LEN)?;
        let mut queues = Vec::with_capacity(count);
        for _ in 0..count {
            queues.push(RxQueueInfo {
                queue_id: r.read_u32()?,
                model: QueueModel::from_u16(r.read_u16()?)?,
                queue_type: QueueType::from_u32(r.read_u32()?)?,
                ring_len: r.read_u16()?,
                dma_ring_addr: r.read_u64()?,
                data_buffer_size: r.read_u32()?,
                max_pkt_size: r.read_u32()?,
                rx_bufq1_id: r.read_u16()?,
                rx_bufq2_id: r.read_u16()?,
            });
        }
        r.finish()?;
        Ok(Self { vport_id, queues })
    }
}
