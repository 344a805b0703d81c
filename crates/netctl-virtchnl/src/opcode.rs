use crate::wire::DecodeError;

/// Raw value meaning "no operation". Never a valid [`Opcode`]; the command engine uses it as
/// its idle marker.
pub const OPCODE_NONE: u32 = 0;

/// Control operations understood by the firmware.
///
/// The numeric values are part of the firmware contract. Unknown values are rejected by
/// [`Opcode::try_from`] rather than passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    Version = 1,
    /// Unsolicited notification from firmware. Never issued as a command.
    Event = 17,
    GetCaps = 500,
    CreateVport = 501,
    DestroyVport = 502,
    EnableVport = 503,
    DisableVport = 504,
    ConfigTxQueues = 505,
    ConfigRxQueues = 506,
    EnableQueues = 507,
    DisableQueues = 508,
}

impl Opcode {
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// Whether the control plane may place this opcode in the command slot.
    pub const fn is_command(self) -> bool {
        !matches!(self, Opcode::Event)
    }
}

impl TryFrom<u32> for Opcode {
    type Error = DecodeError;

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        Ok(match v {
            1 => Opcode::Version,
            17 => Opcode::Event,
            500 => Opcode::GetCaps,
            501 => Opcode::CreateVport,
            502 => Opcode::DestroyVport,
            503 => Opcode::EnableVport,
            504 => Opcode::DisableVport,
            505 => Opcode::ConfigTxQueues,
            506 => Opcode::ConfigRxQueues,
            507 => Opcode::EnableQueues,
            508 => Opcode::DisableQueues,
            _ => return Err(DecodeError::UnknownOpcode(v)),
        })
    }
}

impl From<Opcode> for u32 {
    fn from(op: Opcode) -> Self {
        op.as_u32()
    }
}

/// Command return codes carried in [`crate::MailboxMessage::retval`].
pub mod status {
    pub const SUCCESS: i32 = 0;
    pub const ERR_PARAM: i32 = -5;
    pub const ERR_NO_MEMORY: i32 = -18;
    /// Also synthesized locally when a completion is released because its opcode did not match
    /// the pending command.
    pub const ERR_OPCODE_MISMATCH: i32 = -38;
    pub const ERR_CQP_COMPL_ERROR: i32 = -39;
    /// Also synthesized locally when a completion is released because the mailbox failed.
    pub const ERR_ADMIN_QUEUE_ERROR: i32 = -53;
    pub const ERR_NOT_SUPPORTED: i32 = -64;
}
