use bitflags::bitflags;

use crate::wire::{push_u16, push_u32, push_u64, DecodeError, Reader};

pub const VERSION_MAJOR: u32 = 2;
pub const VERSION_MINOR: u32 = 0;

/// Payload of [`crate::Opcode::Version`], in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub major: u32,
    pub minor: u32,
}

impl VersionInfo {
    pub const LEN: usize = 8;

    /// The version this control plane speaks.
    pub const fn current() -> Self {
        Self {
            major: VERSION_MAJOR,
            minor: VERSION_MINOR,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        push_u32(&mut out, self.major);
        push_u32(&mut out, self.minor);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let v = Self {
            major: r.read_u32()?,
            minor: r.read_u32()?,
        };
        r.finish()?;
        Ok(v)
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ChecksumCaps: u32 {
        const TX_CSUM_L3_IPV4 = 1 << 0;
        const TX_CSUM_L4_IPV4_TCP = 1 << 1;
        const TX_CSUM_L4_IPV4_UDP = 1 << 2;
        const TX_CSUM_L4_IPV4_SCTP = 1 << 3;
        const TX_CSUM_L4_IPV6_TCP = 1 << 4;
        const TX_CSUM_L4_IPV6_UDP = 1 << 5;
        const TX_CSUM_L4_IPV6_SCTP = 1 << 6;
        const TX_CSUM_GENERIC = 1 << 7;
        const RX_CSUM_L3_IPV4 = 1 << 8;
        const RX_CSUM_L4_IPV4_TCP = 1 << 9;
        const RX_CSUM_L4_IPV4_UDP = 1 << 10;
        const RX_CSUM_L4_IPV4_SCTP = 1 << 11;
        const RX_CSUM_L4_IPV6_TCP = 1 << 12;
        const RX_CSUM_L4_IPV6_UDP = 1 << 13;
        const RX_CSUM_L4_IPV6_SCTP = 1 << 14;
        const RX_CSUM_GENERIC = 1 << 15;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct SegmentationCaps: u32 {
        const IPV4_TCP = 1 << 0;
        const IPV4_UDP = 1 << 1;
        const IPV4_SCTP = 1 << 2;
        const IPV6_TCP = 1 << 3;
        const IPV6_UDP = 1 << 4;
        const IPV6_SCTP = 1 << 5;
        const GENERIC = 1 << 6;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct RssCaps: u64 {
        const IPV4_TCP = 1 << 0;
        const IPV4_UDP = 1 << 1;
        const IPV4_SCTP = 1 << 2;
        const IPV4_OTHER = 1 << 3;
        const IPV6_TCP = 1 << 4;
        const IPV6_UDP = 1 << 5;
        const IPV6_SCTP = 1 << 6;
        const IPV6_OTHER = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct OtherCaps: u64 {
        const RDMA = 1 << 0;
        const SRIOV = 1 << 1;
        const MACFILTER = 1 << 2;
        const SPLITQ_QSCHED = 1 << 3;
        const CRC = 1 << 4;
        const WB_ON_ITR = 1 << 5;
        const PROMISC = 1 << 6;
        const LINK_SPEED = 1 << 7;
    }
}

/// Payload of [`crate::Opcode::GetCaps`].
///
/// The request carries the capability bits the driver would like; the limits are ignored.
/// The response carries what firmware granted plus the resource limits for this function.
/// Unknown capability bits are retained so newer firmware does not fail decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub csum_caps: ChecksumCaps,
    pub seg_caps: SegmentationCaps,
    pub rss_caps: RssCaps,
    pub other_caps: OtherCaps,
    pub max_rx_q: u16,
    pub max_tx_q: u16,
    pub max_rx_bufq: u16,
    pub max_tx_complq: u16,
    pub max_vports: u16,
    pub default_num_vports: u16,
}

impl Capabilities {
    pub const LEN: usize = 36;

    /// Capability bits the control plane asks for during negotiation.
    pub fn requested() -> Self {
        Self {
            csum_caps: ChecksumCaps::all(),
            seg_caps: SegmentationCaps::IPV4_TCP | SegmentationCaps::IPV6_TCP,
            rss_caps: RssCaps::all(),
            other_caps: OtherCaps::WB_ON_ITR,
            max_rx_q: 0,
            max_tx_q: 0,
            max_rx_bufq: 0,
            max_tx_complq: 0,
            max_vports: 0,
            default_num_vports: 0,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        push_u32(&mut out, self.csum_caps.bits());
        push_u32(&mut out, self.seg_caps.bits());
        push_u64(&mut out, self.rss_caps.bits());
        push_u64(&mut out, self.other_caps.bits());
        push_u16(&mut out, self.max_rx_q);
        push_u16(&mut out, self.max_tx_q);
        push_u16(&mut out, self.max_rx_bufq);
        push_u16(&mut out, self.max_tx_complq);
        push_u16(&mut out, self.max_vports);
        push_u16(&mut out, self.default_num_vports);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let caps = Self {
            csum_caps: ChecksumCaps::from_bits_retain(r.read_u32()?),
            seg_caps: SegmentationCaps::from_bits_retain(r.read_u32()?),
            rss_caps: RssCaps::from_bits_retain(r.read_u64()?),
            other_caps: OtherCaps::from_bits_retain(r.read_u64()?),
            max_rx_q: r.read_u16()?,
            max_tx_q: r.read_u16()?,
            max_rx_bufq: r.read_u16()?,
            max_tx_complq: r.read_u16()?,
            max_vports: r.read_u16()?,
            default_num_vports: r.read_u16()?,
        };
        r.finish()?;
        Ok(caps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_lengths_match_declared() {
        assert_eq!(VersionInfo::current().encode().len(), VersionInfo::LEN);
        assert_eq!(Capabilities::requested().encode().len(), Capabilities::LEN);
    }

    #[test]
    fn unknown_capability_bits_are_retained() {
        let mut caps = Capabilities::requested();
        caps.other_caps = OtherCaps::from_bits_retain(1 << 40) | OtherCaps::CRC;

        let decoded = Capabilities::decode(&caps.encode()).unwrap();
        assert!(decoded.other_caps.contains(OtherCaps::CRC));
        assert_eq!(decoded.other_caps.bits() & (1 << 40), 1 << 40);
    }

    #[test]
    fn version_rejects_short_payload() {
        assert_eq!(
            VersionInfo::decode(&[2, 0, 0, 0]),
            Err(DecodeError::UnexpectedEof)
        );
    }
}
