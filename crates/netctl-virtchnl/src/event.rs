use crate::wire::{push_u32, push_u8, DecodeError, Reader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    LinkChange,
    ResetStart,
    ResetFinish,
    /// Forward-compatible: new event types are delivered, not rejected.
    Unknown(u32),
}

impl EventKind {
    pub const fn to_u32(self) -> u32 {
        match self {
            EventKind::LinkChange => 1,
            EventKind::ResetStart => 2,
            EventKind::ResetFinish => 3,
            EventKind::Unknown(v) => v,
        }
    }

    pub const fn from_u32(v: u32) -> Self {
        match v {
            1 => EventKind::LinkChange,
            2 => EventKind::ResetStart,
            3 => EventKind::ResetFinish,
            v => EventKind::Unknown(v),
        }
    }
}

/// Payload of an unsolicited [`crate::Opcode::Event`] message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMessage {
    pub kind: EventKind,
    pub vport_id: u32,
    pub link_speed_mbps: u32,
    pub link_up: bool,
}

impl EventMessage {
    pub const LEN: usize = 16;

    pub fn link_change(vport_id: u32, link_up: bool, link_speed_mbps: u32) -> Self {
        Self {
            kind: EventKind::LinkChange,
            vport_id,
            link_speed_mbps,
            link_up,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        push_u32(&mut out, self.kind.to_u32());
        push_u32(&mut out, self.link_speed_mbps);
        push_u32(&mut out, self.vport_id);
        push_u8(&mut out, self.link_up as u8);
        out.extend_from_slice(&[0u8; 3]);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let kind = EventKind::from_u32(r.read_u32()?);
        let link_speed_mbps = r.read_u32()?;
        let vport_id = r.read_u32()?;
        let link_up = match r.read_u8()? {
            0 => false,
            1 => true,
            v => {
                return Err(DecodeError::InvalidEnum {
                    field: "link status",
                    value: v as u32,
                })
            }
        };
        let _pad = r.read_bytes(3)?;
        r.finish()?;
        Ok(Self {
            kind,
            vport_id,
            link_speed_mbps,
            link_up,
        })
    }
}
