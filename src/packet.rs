//! Fixed-layout application datagram (spec §3, §6).
//!
//! Grounded in `original_source/routing_transport/src/routing_transport.c`'s
//! `parse_data_packet`/`generate_data_packet`. Kept as an explicit
//! struct with a fixed-offset serializer rather than a native string,
//! per spec §9 Design Notes — the 494-byte data field may hold arbitrary
//! ASCII including embedded spaces. `parse` trims the wire's NUL padding
//! back off at the first zero byte, mirroring `mesh_api.c`'s
//! `strcpy`-based delivery in `mesh_recv_data`.

use crate::shortmac::ShortMac;

pub const PACKET_LEN: usize = 513;
pub const DATA_LEN: usize = 494;

const OFF_TYPE: usize = 0;
const OFF_SRC: usize = 1;
const OFF_DEST: usize = 7;
const OFF_STATUS: usize = 13;
const OFF_PACKET_NUM: usize = 14;
const OFF_CRC: usize = 17;
const OFF_DATA: usize = 19;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Routing,
    Data,
}

impl PacketType {
    fn to_byte(self) -> u8 {
        match self {
            PacketType::Routing => b'0',
            PacketType::Data => b'1',
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'0' => Some(PacketType::Routing),
            b'1' => Some(PacketType::Data),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketStatus {
    Send,
    Ack,
    Unreachable,
    BroadcastRequest,
    BroadcastDeliver,
}

impl PacketStatus {
    fn to_byte(self) -> u8 {
        match self {
            PacketStatus::Send => b'0',
            PacketStatus::Ack => b'1',
            PacketStatus::Unreachable => b'2',
            PacketStatus::BroadcastRequest => b'3',
            PacketStatus::BroadcastDeliver => b'4',
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'0' => Some(PacketStatus::Send),
            b'1' => Some(PacketStatus::Ack),
            b'2' => Some(PacketStatus::Unreachable),
            b'3' => Some(PacketStatus::BroadcastRequest),
            b'4' => Some(PacketStatus::BroadcastDeliver),
            _ => None,
        }
    }
}

/// 513-byte framed application datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub packet_type: PacketType,
    pub src: ShortMac,
    pub dest: ShortMac,
    pub status: PacketStatus,
    pub packet_num: u16,
    pub data: Vec<u8>,
}

impl DataPacket {
    /// Build a `type='1'` request as the local application's `send`
    /// (spec §4.4 "sending from the local application").
    pub fn new_send(src: ShortMac, dest: ShortMac, data: &[u8]) -> Option<Self> {
        if data.len() > DATA_LEN {
            return None;
        }
        Some(DataPacket {
            packet_type: PacketType::Data,
            src,
            dest,
            status: PacketStatus::Send,
            packet_num: 0,
            data: data.to_vec(),
        })
    }

    pub fn ack_for(&self, body: &[u8]) -> DataPacket {
        DataPacket {
            packet_type: PacketType::Data,
            src: self.dest,
            dest: self.src,
            status: PacketStatus::Ack,
            packet_num: self.packet_num,
            data: body.to_vec(),
        }
    }

    pub fn unreachable_for(&self, body: &[u8]) -> DataPacket {
        DataPacket {
            packet_type: PacketType::Data,
            src: self.dest,
            dest: self.src,
            status: PacketStatus::Unreachable,
            packet_num: self.packet_num,
            data: body.to_vec(),
        }
    }

    pub fn serialize(&self) -> [u8; PACKET_LEN] {
        let mut out = [0u8; PACKET_LEN];
        out[OFF_TYPE] = self.packet_type.to_byte();
        out[OFF_SRC..OFF_SRC + 6].copy_from_slice(self.src.as_str().as_bytes());
        out[OFF_DEST..OFF_DEST + 6].copy_from_slice(self.dest.as_str().as_bytes());
        out[OFF_STATUS] = self.status.to_byte();

        let num = format!("{:03}", self.packet_num.min(999));
        out[OFF_PACKET_NUM..OFF_PACKET_NUM + 3].copy_from_slice(num.as_bytes());

        out[OFF_CRC..OFF_CRC + 2].copy_from_slice(b"00");

        let n = self.data.len().min(DATA_LEN);
        out[OFF_DATA..OFF_DATA + n].copy_from_slice(&self.data[..n]);
        out
    }

    pub fn parse(frame: &[u8]) -> Option<DataPacket> {
        if frame.len() != PACKET_LEN {
            return None;
        }
        let packet_type = PacketType::from_byte(frame[OFF_TYPE])?;
        let src = ShortMac::parse(std::str::from_utf8(&frame[OFF_SRC..OFF_SRC + 6]).ok()?)?;
        let dest = ShortMac::parse(std::str::from_utf8(&frame[OFF_DEST..OFF_DEST + 6]).ok()?)?;
        let status = PacketStatus::from_byte(frame[OFF_STATUS])?;
        let packet_num: u16 = std::str::from_utf8(&frame[OFF_PACKET_NUM..OFF_PACKET_NUM + 3])
            .ok()?
            .parse()
            .ok()?;
        let padded = &frame[OFF_DATA..OFF_DATA + DATA_LEN];
        let len = padded.iter().position(|&b| b == 0).unwrap_or(DATA_LEN);
        let data = padded[..len].to_vec();

        Some(DataPacket {
            packet_type,
            src,
            dest,
            status,
            packet_num,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_framing_roundtrips_and_is_exactly_513_bytes() {
        let src = ShortMac::parse("AABBCC").unwrap();
        let dest = ShortMac::parse("112233").unwrap();
        let packet = DataPacket::new_send(src, dest, b"ping").unwrap();

        let wire = packet.serialize();
        assert_eq!(wire.len(), PACKET_LEN);

        let parsed = DataPacket::parse(&wire).unwrap();
        assert_eq!(parsed.packet_type, packet.packet_type);
        assert_eq!(parsed.src, packet.src);
        assert_eq!(parsed.dest, packet.dest);
        assert_eq!(parsed.status, packet.status);
        assert_eq!(&parsed.data[..4], b"ping");
    }

    #[test]
    fn parse_trims_trailing_nul_padding_to_the_original_length() {
        let src = ShortMac::parse("AABBCC").unwrap();
        let dest = ShortMac::parse("112233").unwrap();
        let packet = DataPacket::new_send(src, dest, b"ping").unwrap();

        let parsed = DataPacket::parse(&packet.serialize()).unwrap();
        assert_eq!(parsed.data.len(), 4);
        assert_eq!(parsed.data, b"ping");
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let src = ShortMac::parse("AABBCC").unwrap();
        let dest = ShortMac::parse("112233").unwrap();
        let body = vec![b'x'; DATA_LEN + 1];
        assert!(DataPacket::new_send(src, dest, &body).is_none());
    }

    #[test]
    fn data_field_preserves_embedded_spaces() {
        let src = ShortMac::parse("AABBCC").unwrap();
        let dest = ShortMac::parse("112233").unwrap();
        let packet = DataPacket::new_send(src, dest, b"hello world").unwrap();
        let parsed = DataPacket::parse(&packet.serialize()).unwrap();
        assert_eq!(&parsed.data[..11], b"hello world");
    }

    #[test]
    fn ack_swaps_src_and_dest() {
        let src = ShortMac::parse("AABBCC").unwrap();
        let dest = ShortMac::parse("112233").unwrap();
        let packet = DataPacket::new_send(src, dest, b"ping").unwrap();
        let ack = packet.ack_for(b"Received");
        assert_eq!(ack.src, dest);
        assert_eq!(ack.dest, src);
        assert_eq!(ack.status, PacketStatus::Ack);
    }
}
