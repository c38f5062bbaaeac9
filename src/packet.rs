//! On-wire packet header for the reliable-sequenced pipeline.
//!
//! Field layout (little-endian, sequential), per `spec.md` §6:
//!
//! | field             | width |
//! |-------------------|-------|
//! | `packet_type`     | 2 B   |
//! | `processing_time` | 2 B   |
//! | `sequence_id`     | 2 B   |
//! | `acked_sequence`  | 2 B   |
//! | `ack_mask`        | 4 or 8 B, depending on `window_size` |
//!
//! The in-memory representation always carries a full `u64` ack mask for
//! alignment; only [`PacketHeader::serialize`]/[`PacketHeader::deserialize`]
//! know about the 4-vs-8-byte wire truncation (`spec.md` §9, "truncated
//! header" trick).
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PacketType {
    Payload = 0,
    Ack = 1,
}

impl PacketType {
    fn from_u16(value: u16) -> io::Result<Self> {
        match value {
            0 => Ok(PacketType::Payload),
            1 => Ok(PacketType::Ack),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown packet type {other}"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: PacketType,
    pub processing_time: u16,
    pub sequence_id: u16,
    pub acked_sequence: u16,
    pub ack_mask: u64,
}

impl PacketHeader {
    /// Serialize using the wire width appropriate for `window_size`
    /// (4-byte ack mask when `window_size <= 32`, 8-byte otherwise).
    pub fn serialize(&self, window_size: u16) -> Vec<u8> {
        let wide = window_size > crate::config::WIDE_ACK_MASK_THRESHOLD;
        let mut buf = Vec::with_capacity(if wide { 16 } else { 12 });
        buf.write_u16::<LittleEndian>(self.packet_type as u16).unwrap();
        buf.write_u16::<LittleEndian>(self.processing_time).unwrap();
        buf.write_u16::<LittleEndian>(self.sequence_id).unwrap();
        buf.write_u16::<LittleEndian>(self.acked_sequence).unwrap();
        if wide {
            buf.write_u64::<LittleEndian>(self.ack_mask).unwrap();
        } else {
            buf.write_u32::<LittleEndian>(self.ack_mask as u32).unwrap();
        }
        buf
    }

    pub fn deserialize(data: &[u8], window_size: u16) -> io::Result<Self> {
        let wide = window_size > crate::config::WIDE_ACK_MASK_THRESHOLD;
        let expected_len = if wide { 16 } else { 12 };
        if data.len() < expected_len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("header needs {expected_len} bytes, got {}", data.len()),
            ));
        }
        let mut cursor = Cursor::new(data);
        let packet_type = PacketType::from_u16(cursor.read_u16::<LittleEndian>()?)?;
        let processing_time = cursor.read_u16::<LittleEndian>()?;
        let sequence_id = cursor.read_u16::<LittleEndian>()?;
        let acked_sequence = cursor.read_u16::<LittleEndian>()?;
        let ack_mask = if wide {
            cursor.read_u64::<LittleEndian>()?
        } else {
            cursor.read_u32::<LittleEndian>()? as u64
        };
        Ok(Self {
            packet_type,
            processing_time,
            sequence_id,
            acked_sequence,
            ack_mask,
        })
    }

    pub fn wire_len(window_size: u16) -> usize {
        if window_size > crate::config::WIDE_ACK_MASK_THRESHOLD {
            16
        } else {
            12
        }
    }
}

/// A fully-formed outbound datagram: header plus payload bytes.
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn serialize(&self, window_size: u16) -> Vec<u8> {
        let mut out = self.header.serialize(window_size);
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn deserialize(data: &[u8], window_size: u16) -> io::Result<Self> {
        let header = PacketHeader::deserialize(data, window_size)?;
        let header_len = PacketHeader::wire_len(window_size);
        let payload = data[header_len..].to_vec();
        Ok(Self { header, payload })
    }
}
