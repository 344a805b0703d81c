use crate::wire::{push_u16, push_u32, push_u64, DecodeError, Reader};

/// Queue layout for a transmit or receive path.
///
/// Under [`QueueModel::Split`] every tx queue is paired with completion queues and every rx
/// queue with buffer queues; under [`QueueModel::Single`] there are no companion queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum QueueModel {
    Single,
    #[default]
    Split,
}

impl QueueModel {
    pub const fn to_u16(self) -> u16 {
        match self {
            QueueModel::Single => 0,
            QueueModel::Split => 1,
        }
    }

    pub fn from_u16(v: u16) -> Result<Self, DecodeError> {
        match v {
            0 => Ok(QueueModel::Single),
            1 => Ok(QueueModel::Split),
            _ => Err(DecodeError::InvalidEnum {
                field: "queue model",
                value: v as u32,
            }),
        }
    }

    pub const fn is_split(self) -> bool {
        matches!(self, QueueModel::Split)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    Tx,
    Rx,
    TxCompletion,
    RxBuffer,
}

impl QueueType {
    pub const fn to_u32(self) -> u32 {
        match self {
            QueueType::Tx => 0,
            QueueType::Rx => 1,
            QueueType::TxCompletion => 2,
            QueueType::RxBuffer => 3,
        }
    }

    pub fn from_u32(v: u32) -> Result<Self, DecodeError> {
        Ok(match v {
            0 => QueueType::Tx,
            1 => QueueType::Rx,
            2 => QueueType::TxCompletion,
            3 => QueueType::RxBuffer,
            _ => {
                return Err(DecodeError::InvalidEnum {
                    field: "queue type",
                    value: v,
                })
            }
        })
    }
}

/// Payload of a [`crate::Opcode::CreateVport`] request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateVportRequest {
    pub txq_model: QueueModel,
    pub rxq_model: QueueModel,
    pub num_tx_q: u16,
    /// Only meaningful when `txq_model` is split.
    pub num_tx_complq: u16,
    pub num_rx_q: u16,
    /// Only meaningful when `rxq_model` is split.
    pub num_rx_bufq: u16,
}

impl CreateVportRequest {
    pub const LEN: usize = 12;

    fn encode_into(&self, out: &mut Vec<u8>) {
        push_u16(out, self.txq_model.to_u16());
        push_u16(out, self.rxq_model.to_u16());
        push_u16(out, self.num_tx_q);
        push_u16(out, self.num_tx_complq);
        push_u16(out, self.num_rx_q);
        push_u16(out, self.num_rx_bufq);
    }

    fn decode_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            txq_model: QueueModel::from_u16(r.read_u16()?)?,
            rxq_model: QueueModel::from_u16(r.read_u16()?)?,
            num_tx_q: r.read_u16()?,
            num_tx_complq: r.read_u16()?,
            num_rx_q: r.read_u16()?,
            num_rx_bufq: r.read_u16()?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        self.encode_into(&mut out);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let req = Self::decode_from(&mut r)?;
        r.finish()?;
        Ok(req)
    }
}

/// A contiguous range of queues of one type, with the tail register location of the first
/// queue and the stride between consecutive tail registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueRegChunk {
    pub queue_type: QueueType,
    pub start_queue_id: u32,
    pub num_queues: u16,
    pub qtail_reg_start: u64,
    pub qtail_reg_spacing: u32,
}

impl QueueRegChunk {
    pub const LEN: usize = 22;
}

/// Payload of a [`crate::Opcode::CreateVport`] completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVportResponse {
    pub vport_id: u32,
    /// Queue counts and models as granted by firmware.
    pub granted: CreateVportRequest,
    pub max_mtu: u16,
    pub default_mac_addr: [u8; 6],
    pub chunks: Vec<QueueRegChunk>,
}

impl CreateVportResponse {
    pub const FIXED_LEN: usize = 4 + CreateVportRequest::LEN + 2 + 6 + 2;

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::FIXED_LEN + self.chunks.len() * QueueRegChunk::LEN);
        push_u32(&mut out, self.vport_id);
        self.granted.encode_into(&mut out);
        push_u16(&mut out, self.max_mtu);
        out.extend_from_slice(&self.default_mac_addr);
        push_u16(&mut out, self.chunks.len() as u16);
        for chunk in &self.chunks {
            push_u32(&mut out, chunk.queue_type.to_u32());
            push_u32(&mut out, chunk.start_queue_id);
            push_u16(&mut out, chunk.num_queues);
            push_u64(&mut out, chunk.qtail_reg_start);
            push_u32(&mut out, chunk.qtail_reg_spacing);
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let vport_id = r.read_u32()?;
        let granted = CreateVportRequest::decode_from(&mut r)?;
        let max_mtu = r.read_u16()?;
        let default_mac_addr = r.read_array::<6>()?;
        let count = r.read_u16()? as usize;
        if r.remaining() < count * QueueRegChunk::LEN {
            return Err(DecodeError::UnexpectedEof);
        }
        let mut chunks = Vec::with_capacity(count);
        for _ in 0..count {
            chunks.push(QueueRegChunk {
                queue_type: QueueType::from_u32(r.read_u32()?)?,
                start_queue_id: r.read_u32()?,
                num_queues: r.read_u16()?,
                qtail_reg_start: r.read_u64()?,
                qtail_reg_spacing: r.read_u32()?,
            });
        }
        r.finish()?;
        Ok(Self {
            vport_id,
            granted,
            max_mtu,
            default_mac_addr,
            chunks,
        })
    }
}

/// Payload naming a single vport (destroy / enable / disable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VportRef {
    pub vport_id: u32,
}

impl VportRef {
    pub const LEN: usize = 4;

    pub fn encode(&self) -> Vec<u8> {
        self.vport_id.to_le_bytes().to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let vport_id = r.read_u32()?;
        r.finish()?;
        Ok(Self { vport_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response() -> CreateVportResponse {
        CreateVportResponse {
            vport_id: 7,
            granted: CreateVportRequest {
                txq_model: QueueModel::Split,
                rxq_model: QueueModel::Single,
                num_tx_q: 4,
                num_tx_complq: 4,
                num_rx_q: 4,
                num_rx_bufq: 0,
            },
            max_mtu: 9000,
            default_mac_addr: [0x02, 0, 0, 0, 0, 7],
            chunks: vec![
                QueueRegChunk {
                    queue_type: QueueType::Tx,
                    start_queue_id: 64,
                    num_queues: 4,
                    qtail_reg_start: 0x10_0000,
                    qtail_reg_spacing: 0x1000,
                },
                QueueRegChunk {
                    queue_type: QueueType::Rx,
                    start_queue_id: 64,
                    num_queues: 4,
                    qtail_reg_start: 0x20_0000,
                    qtail_reg_spacing: 0x1000,
                },
            ],
        }
    }

    #[test]
    fn response_length_follows_chunk_count() {
        let resp = response();
        assert_eq!(
            resp.encode().len(),
            CreateVportResponse::FIXED_LEN + 2 * QueueRegChunk::LEN
        );
        assert_eq!(CreateVportResponse::decode(&resp.encode()), Ok(resp));
    }

    #[test]
    fn chunk_count_larger_than_payload_is_eof() {
        let mut bytes = response().encode();
        // Bump the chunk count without adding chunk bodies.
        let count_off = CreateVportResponse::FIXED_LEN - 2;
        bytes[count_off] = 3;
        assert_eq!(
            CreateVportResponse::decode(&bytes),
            Err(DecodeError::UnexpectedEof)
        );
    }

    #[test]
    fn invalid_queue_model_is_rejected() {
        let mut bytes = CreateVportRequest {
            txq_model: QueueModel::Split,
            rxq_model: QueueModel::Split,
            num_tx_q: 1,
            num_tx_complq: 1,
            num_rx_q: 1,
            num_rx_bufq: 2,
        }
        .encode();
        bytes[0] = 9;
        assert_eq!(
            CreateVportRequest::decode(&bytes),
            Err(DecodeError::InvalidEnum {
                field: "queue model",
                value: 9
            })
        );
    }
}
