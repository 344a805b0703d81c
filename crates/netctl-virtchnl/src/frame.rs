use crate::opcode::{status, Opcode};
use crate::wire::{push_i32, push_u32, DecodeError, Reader};

/// Default mailbox buffer size; also the largest payload a single frame may carry.
pub const MAX_MAILBOX_PAYLOAD: usize = 4096;

/// `opcode` + `retval` + `payload_len`.
pub const FRAME_HEADER_LEN: usize = 12;

/// One mailbox record.
///
/// Requests carry `retval == 0`; completions carry the firmware's return code. The opcode is
/// kept raw so that a frame with an unknown opcode can still be decoded and reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxMessage {
    pub opcode: u32,
    pub retval: i32,
    pub payload: Vec<u8>,
}

impl MailboxMessage {
    pub fn request(op: Opcode, payload: Vec<u8>) -> Self {
        Self {
            opcode: op.as_u32(),
            retval: status::SUCCESS,
            payload,
        }
    }

    pub fn completion(op: Opcode, retval: i32, payload: Vec<u8>) -> Self {
        Self {
            opcode: op.as_u32(),
            retval,
            payload,
        }
    }

    pub fn op(&self) -> Result<Opcode, DecodeError> {
        Opcode::try_from(self.opcode)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FRAME_HEADER_LEN + self.payload.len());
        push_u32(&mut out, self.opcode);
        push_i32(&mut out, self.retval);
        push_u32(&mut out, self.payload.len() as u32);
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let opcode = r.read_u32()?;
        let retval = r.read_i32()?;
        let len = r.read_u32()? as usize;
        if len > MAX_MAILBOX_PAYLOAD {
            return Err(DecodeError::OversizedPayload {
                len,
                max: MAX_MAILBOX_PAYLOAD,
            });
        }
        let payload = r.read_bytes(len)?.to_vec();
        r.finish()?;
        Ok(Self {
            opcode,
            retval,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_little_endian() {
        let msg = MailboxMessage::completion(Opcode::CreateVport, -5, vec![0xAA, 0xBB]);
        let bytes = msg.encode();
        assert_eq!(
            bytes,
            [
                0xF5, 0x01, 0x00, 0x00, // 501
                0xFB, 0xFF, 0xFF, 0xFF, // -5
                0x02, 0x00, 0x00, 0x00, // len
                0xAA, 0xBB,
            ]
        );
        assert_eq!(MailboxMessage::decode(&bytes), Ok(msg));
    }

    #[test]
    fn rejects_truncated_and_padded_frames() {
        let bytes = MailboxMessage::request(Opcode::GetCaps, vec![1, 2, 3, 4]).encode();

        assert_eq!(
            MailboxMessage::decode(&bytes[..bytes.len() - 1]),
            Err(DecodeError::UnexpectedEof)
        );

        let mut padded = bytes.clone();
        padded.push(0);
        assert_eq!(
            MailboxMessage::decode(&padded),
            Err(DecodeError::TrailingBytes(1))
        );
    }

    #[test]
    fn rejects_length_above_mailbox_buffer() {
        let mut bytes = Vec::new();
        push_u32(&mut bytes, Opcode::GetCaps.as_u32());
        push_i32(&mut bytes, 0);
        push_u32(&mut bytes, (MAX_MAILBOX_PAYLOAD + 1) as u32);
        assert_eq!(
            MailboxMessage::decode(&bytes),
            Err(DecodeError::OversizedPayload {
                len: MAX_MAILBOX_PAYLOAD + 1,
                max: MAX_MAILBOX_PAYLOAD,
            })
        );
    }

    #[test]
    fn unknown_opcode_survives_decode_but_not_op() {
        let msg = MailboxMessage {
            opcode: 9999,
            retval: 0,
            payload: Vec::new(),
        };
        let decoded = MailboxMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.op(), Err(DecodeError::UnknownOpcode(9999)));
    }
}
