//! Pack/unpack helpers for the control (SDP) and boot packet header
//! layouts (spec.md §4.A). No `#[repr(packed)]` tricks: every header is
//! written and read field-by-field into a plain byte buffer, little-endian
//! for the control channel and big-endian for the boot channel, matching
//! §9's guidance to express packing explicitly rather than relying on
//! struct-layout attributes.

use crate::constants::{SDP_DEFAULT_FLAGS, SDP_DEFAULT_SRC_CORE, SDP_DEFAULT_TAG, SDP_DEFAULT_TTO};

/// Size in bytes of a request [`SdpHeader`] on the wire.
pub const SDP_HEADER_LEN: usize = 26;
/// Size in bytes of a response [`SdpRespHeader`] on the wire.
pub const SDP_RESP_HEADER_LEN: usize = 14;
/// Size in bytes of a [`BootHeader`] on the wire.
pub const BOOT_HEADER_LEN: usize = 18;

/// A control (SDP) request header, little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdpHeader {
    pub tto: u8,
    pub pad: u8,
    pub flags: u8,
    pub tag: u8,
    pub dst_core: u8,
    pub src_core: u8,
    pub dst_cpu: u16,
    pub src_cpu: u16,
    pub cmd: u16,
    pub cmd_flags: u16,
    pub arg1: u32,
    pub arg2: u32,
    pub arg3: u32,
}

impl SdpHeader {
    /// A header with every field the defaults named in §4.A, and the rest zeroed.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            tto: SDP_DEFAULT_TTO,
            pad: 0,
            flags: SDP_DEFAULT_FLAGS,
            tag: SDP_DEFAULT_TAG,
            dst_core: 0,
            src_core: SDP_DEFAULT_SRC_CORE,
            dst_cpu: 0,
            src_cpu: 0,
            cmd: 0,
            cmd_flags: 0,
            arg1: 0,
            arg2: 0,
            arg3: 0,
        }
    }

    /// Packs the header into its 26-byte wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; SDP_HEADER_LEN] {
        let mut buf = [0_u8; SDP_HEADER_LEN];
        buf[0] = self.tto;
        buf[1] = self.pad;
        buf[2] = self.flags;
        buf[3] = self.tag;
        buf[4] = self.dst_core;
        buf[5] = self.src_core;
        buf[6..8].copy_from_slice(&self.dst_cpu.to_le_bytes());
        buf[8..10].copy_from_slice(&self.src_cpu.to_le_bytes());
        buf[10..12].copy_from_slice(&self.cmd.to_le_bytes());
        buf[12..14].copy_from_slice(&self.cmd_flags.to_le_bytes());
        buf[14..18].copy_from_slice(&self.arg1.to_le_bytes());
        buf[18..22].copy_from_slice(&self.arg2.to_le_bytes());
        buf[22..26].copy_from_slice(&self.arg3.to_le_bytes());
        buf
    }
}

/// A control response header, little-endian on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdpRespHeader {
    pub pad: u16,
    pub flags: u8,
    pub tag: u8,
    pub dst_core: u8,
    pub src_core: u8,
    pub dst_cpu: u16,
    pub src_cpu: u16,
    pub rc: u16,
    pub cmd_flags: u16,
}

impl SdpRespHeader {
    /// Unpacks a response header from its 16-byte wire form.
    ///
    /// # Errors
    /// Returns `None` if `buf` is shorter than [`SDP_RESP_HEADER_LEN`].
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < SDP_RESP_HEADER_LEN {
            return None;
        }
        Some(Self {
            pad: u16::from_le_bytes([buf[0], buf[1]]),
            flags: buf[2],
            tag: buf[3],
            dst_core: buf[4],
            src_core: buf[5],
            dst_cpu: u16::from_le_bytes([buf[6], buf[7]]),
            src_cpu: u16::from_le_bytes([buf[8], buf[9]]),
            rc: u16::from_le_bytes([buf[10], buf[11]]),
            cmd_flags: u16::from_le_bytes([buf[12], buf[13]]),
        })
    }

    /// The chip x/y and core id this response (or debug frame) originated from.
    #[must_use]
    pub fn source_address(&self) -> (u32, u32, u32) {
        (
            u32::from(self.src_cpu >> 8),
            u32::from(self.src_cpu & 0xff),
            u32::from(self.src_core & 0x1f),
        )
    }
}

/// A boot-channel header, big-endian on the wire, with word-reversed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootHeader {
    pub prot_ver: u16,
    pub op: u32,
    pub a1: u32,
    pub a2: u32,
    pub a3: u32,
}

impl BootHeader {
    /// Packs the header into its 18-byte big-endian wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; BOOT_HEADER_LEN] {
        let mut buf = [0_u8; BOOT_HEADER_LEN];
        buf[0..2].copy_from_slice(&self.prot_ver.to_be_bytes());
        buf[2..6].copy_from_slice(&self.op.to_be_bytes());
        buf[6..10].copy_from_slice(&self.a1.to_be_bytes());
        buf[10..14].copy_from_slice(&self.a2.to_be_bytes());
        buf[14..18].copy_from_slice(&self.a3.to_be_bytes());
        buf
    }
}

/// Byte-swaps each 4-byte word of a boot-packet payload to network (big-endian) order,
/// matching `send_boot_pkt`'s `ntohl` pass over the data section.
#[must_use]
pub fn swap_payload_words(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        out.extend_from_slice(&word.to_be_bytes());
    }
    out.extend_from_slice(chunks.remainder());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdp_header_round_trips_field_offsets() {
        let hdr = SdpHeader {
            cmd: 4,
            arg1: 0xdead_beef,
            dst_cpu: 0x0102,
            src_cpu: 0x0304,
            ..SdpHeader::defaults()
        };
        let buf = hdr.encode();
        assert_eq!(buf.len(), SDP_HEADER_LEN);
        assert_eq!(buf[0], SDP_DEFAULT_TTO);
        assert_eq!(buf[2], SDP_DEFAULT_FLAGS);
        assert_eq!(u16::from_le_bytes([buf[6], buf[7]]), 0x0102);
        assert_eq!(u16::from_le_bytes([buf[10], buf[11]]), 4);
        assert_eq!(u32::from_le_bytes([buf[14], buf[15], buf[16], buf[17]]), 0xdead_beef);
        // arg2/arg3 occupy the last two 4-byte slots without overlapping.
        assert_eq!(&buf[18..22], &0_u32.to_le_bytes());
        assert_eq!(&buf[22..26], &0_u32.to_le_bytes());
    }

    #[test]
    fn resp_header_decodes_source_address() {
        let mut buf = [0_u8; SDP_RESP_HEADER_LEN];
        buf[6..8].copy_from_slice(&(u16::from(3_u8) << 8 | 7).to_le_bytes()); // src_cpu: x=3, y=7
        buf[5] = 2; // src_core
        let hdr = SdpRespHeader::decode(&buf).unwrap();
        let (x, y, core) = hdr.source_address();
        assert_eq!((x, y), (3, 7));
        assert_eq!(core, 2);
    }

    #[test]
    fn boot_header_is_big_endian() {
        let hdr = BootHeader { prot_ver: 1, op: 1, a1: 0, a2: 0, a3: 5 };
        let buf = hdr.encode();
        assert_eq!(buf.len(), BOOT_HEADER_LEN);
        assert_eq!(&buf[0..2], &[0x00, 0x01]);
        assert_eq!(&buf[2..6], &[0x00, 0x00, 0x00, 0x01]);
        assert_eq!(&buf[14..18], &[0x00, 0x00, 0x00, 0x05]);
    }

    #[test]
    fn swap_payload_words_reverses_each_word() {
        let data = 0x0102_0304_u32.to_ne_bytes();
        let swapped = swap_payload_words(&data);
        assert_eq!(swapped, vec![0x01, 0x02, 0x03, 0x04]);
    }
}
