//! Wire codec (component A): fixed header, remaining-length varint, and the
//! per-packet encode/decode implementations in the sibling modules.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::err::{DecodeError, DecodeErrorKind, EncodeError, EncodeErrorKind};

mod connack;
mod connect;
mod disconnect;
mod pingreq;
mod pingresp;
mod puback;
mod pubcomp;
mod publish;
mod pubrec;
mod pubrel;
mod suback;
mod subscribe;
mod unsuback;
mod unsubscribe;

pub use connack::ConnAckPacket;
pub use connect::{ConnectFlags, ConnectPacket, Protocol, Will};
pub use disconnect::DisconnectPacket;
pub use pingreq::PingReqPacket;
pub use pingresp::PingRespPacket;
pub use puback::PubAckPacket;
pub use pubcomp::PubCompPacket;
pub use publish::PublishPacket;
pub use pubrec::PubRecPacket;
pub use pubrel::PubRelPacket;
pub use suback::SubAckPacket;
pub use subscribe::SubscribePacket;
pub use unsuback::UnsubAckPacket;
pub use unsubscribe::UnsubscribePacket;

pub const MAX_REMAINING_LENGTH: u32 = 268_435_455;
pub const MAX_STRING_LEN: usize = u16::MAX as usize;

/// Control packet type, the top 4 bits of the fixed header's first byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketType {
    Connect,
    ConnAck,
    Publish,
    PubAck,
    PubRec,
    PubRel,
    PubComp,
    Subscribe,
    SubAck,
    Unsubscribe,
    UnsubAck,
    PingReq,
    PingResp,
    Disconnect,
}

impl PacketType {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Connect => 1,
            Self::ConnAck => 2,
            Self::Publish => 3,
            Self::PubAck => 4,
            Self::PubRec => 5,
            Self::PubRel => 6,
            Self::PubComp => 7,
            Self::Subscribe => 8,
            Self::SubAck => 9,
            Self::Unsubscribe => 10,
            Self::UnsubAck => 11,
            Self::PingReq => 12,
            Self::PingResp => 13,
            Self::Disconnect => 14,
        }
    }
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, DecodeError> {
        match value {
            1 => Ok(Self::Connect),
            2 => Ok(Self::ConnAck),
            3 => Ok(Self::Publish),
            4 => Ok(Self::PubAck),
            5 => Ok(Self::PubRec),
            6 => Ok(Self::PubRel),
            7 => Ok(Self::PubComp),
            8 => Ok(Self::Subscribe),
            9 => Ok(Self::SubAck),
            10 => Ok(Self::Unsubscribe),
            11 => Ok(Self::UnsubAck),
            12 => Ok(Self::PingReq),
            13 => Ok(Self::PingResp),
            14 => Ok(Self::Disconnect),
            other => Err(DecodeError::new(
                DecodeErrorKind::InvalidPacketType,
                format!("packet type nibble {other} is reserved or out of range"),
            )),
        }
    }
}

/// The fixed header present on every MQTT 3.1.1 control packet: the
/// type/flags byte followed by the remaining-length varint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub flags: u8,
    pub remaining_length: u32,
}

impl FixedHeader {
    /// Attempts to decode a fixed header from the front of `buf`. Returns
    /// `Ok(None)` if `buf` does not yet hold a complete header plus body —
    /// callers should leave the bytes in place and await more data.
    pub fn try_decode(buf: &Bytes) -> Result<Option<(Self, usize)>, DecodeError> {
        if buf.is_empty() {
            return Ok(None);
        }

        let first = buf[0];
        let packet_type = PacketType::try_from(first >> 4)?;
        let flags = first & 0x0F;

        let mut remaining_length: u32 = 0;
        let mut multiplier: u32 = 1;
        let mut header_len = 1;

        loop {
            if header_len >= buf.len() {
                return Ok(None);
            }
            let byte = buf[header_len];
            header_len += 1;
            remaining_length += (byte & 0x7F) as u32 * multiplier;

            if byte & 0x80 == 0 {
                break;
            }

            multiplier *= 128;
            if multiplier > 128 * 128 * 128 {
                return Err(DecodeError::new(
                    DecodeErrorKind::InvalidRemainingLength,
                    format!("remaining length exceeds {MAX_REMAINING_LENGTH}"),
                ));
            }
        }

        if remaining_length > MAX_REMAINING_LENGTH {
            return Err(DecodeError::new(
                DecodeErrorKind::InvalidRemainingLength,
                format!("remaining length {remaining_length} exceeds {MAX_REMAINING_LENGTH}"),
            ));
        }

        let total_len = header_len + remaining_length as usize;
        if buf.len() < total_len {
            return Ok(None);
        }

        Ok(Some((
            Self {
                packet_type,
                flags,
                remaining_length,
            },
            header_len,
        )))
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), EncodeError> {
        buf.put_u8((self.packet_type.as_u8() << 4) | (self.flags & 0x0F));
        encode_remaining_length(self.remaining_length, buf)
    }
}

pub fn encode_remaining_length(mut length: u32, buf: &mut BytesMut) -> Result<(), EncodeError> {
    if length > MAX_REMAINING_LENGTH {
        return Err(EncodeError::new(
            EncodeErrorKind::OversizedPayload,
            format!("remaining length {length} exceeds {MAX_REMAINING_LENGTH}"),
        ));
    }

    loop {
        let mut byte = (length % 128) as u8;
        length /= 128;
        if length > 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if length == 0 {
            break;
        }
    }

    Ok(())
}

pub fn encode_utf8_string(buf: &mut BytesMut, s: &str) -> Result<(), EncodeError> {
    if s.len() > MAX_STRING_LEN {
        return Err(EncodeError::new(
            EncodeErrorKind::BufferTooBig,
            format!("string of {} bytes exceeds {MAX_STRING_LEN}", s.len()),
        ));
    }
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
    Ok(())
}

pub fn decode_utf8_string(buf: &mut Bytes) -> Result<String, DecodeError> {
    if buf.len() < 2 {
        return Err(DecodeError::new(
            DecodeErrorKind::MalformedLength,
            String::from("buffer too short to hold a length-prefixed string"),
        ));
    }
    let len = buf.get_u16() as usize;
    if buf.len() < len {
        return Err(DecodeError::new(
            DecodeErrorKind::MalformedLength,
            format!("string declared {len} bytes but only {} remain", buf.len()),
        ));
    }
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| {
        DecodeError::new(
            DecodeErrorKind::Utf8ParseError,
            String::from("string is not valid UTF-8"),
        )
    })
}

pub trait Encode {
    fn encode(&self) -> Result<Bytes, EncodeError>;
}

pub trait Decode: Sized {
    fn decode(header: FixedHeader, body: Bytes) -> Result<Self, DecodeError>;
}

/// Any decoded control packet. The connection FSM dispatches on this.
#[derive(Debug, Clone)]
pub enum MqttPacket {
    Connect(ConnectPacket),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    PubComp(PubCompPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq(PingReqPacket),
    PingResp(PingRespPacket),
    Disconnect(DisconnectPacket),
}

impl MqttPacket {
    /// Decodes a single complete packet (fixed header already stripped of
    /// its length prefix; `body` holds exactly `remaining_length` bytes).
    pub fn decode(header: FixedHeader, body: Bytes) -> Result<Self, DecodeError> {
        Ok(match header.packet_type {
            PacketType::Connect => Self::Connect(ConnectPacket::decode(header, body)?),
            PacketType::ConnAck => Self::ConnAck(ConnAckPacket::decode(header, body)?),
            PacketType::Publish => Self::Publish(PublishPacket::decode(header, body)?),
            PacketType::PubAck => Self::PubAck(PubAckPacket::decode(header, body)?),
            PacketType::PubRec => Self::PubRec(PubRecPacket::decode(header, body)?),
            PacketType::PubRel => Self::PubRel(PubRelPacket::decode(header, body)?),
            PacketType::PubComp => Self::PubComp(PubCompPacket::decode(header, body)?),
            PacketType::Subscribe => Self::Subscribe(SubscribePacket::decode(header, body)?),
            PacketType::SubAck => Self::SubAck(SubAckPacket::decode(header, body)?),
            PacketType::Unsubscribe => Self::Unsubscribe(UnsubscribePacket::decode(header, body)?),
            PacketType::UnsubAck => Self::UnsubAck(UnsubAckPacket::decode(header, body)?),
            PacketType::PingReq => Self::PingReq(PingReqPacket::decode(header, body)?),
            PacketType::PingResp => Self::PingResp(PingRespPacket::decode(header, body)?),
            PacketType::Disconnect => Self::Disconnect(DisconnectPacket::decode(header, body)?),
        })
    }

    /// Attempts to pull one full packet off the front of `buf`, leaving any
    /// trailing bytes (the start of the next packet) untouched. `Ok(None)`
    /// means `buf` holds an incomplete packet and more bytes are needed.
    pub fn try_decode_from(buf: &mut BytesMut) -> Result<Option<Self>, DecodeError> {
        let frozen = buf.clone().freeze();
        let Some((header, header_len)) = FixedHeader::try_decode(&frozen)? else {
            return Ok(None);
        };

        let total_len = header_len + header.remaining_length as usize;
        let mut full = buf.split_to(total_len).freeze();
        full.advance(header_len);
        let packet = Self::decode(header, full)?;
        Ok(Some(packet))
    }
}

#[cfg(test)]
mod remaining_length {
    use bytes::{Bytes, BytesMut};

    use super::{encode_remaining_length, FixedHeader, PacketType};

    fn round_trip(length: u32) -> u32 {
        let mut buf = BytesMut::new();
        encode_remaining_length(length, &mut buf).unwrap();
        let mut header_bytes = BytesMut::new();
        header_bytes.extend_from_slice(&[PacketType::PingReq.as_u8() << 4]);
        header_bytes.extend_from_slice(&buf);
        // pad out the body so try_decode can see a "complete" packet.
        header_bytes.resize(header_bytes.len() + length as usize, 0);
        let frozen: Bytes = header_bytes.freeze();
        let (decoded, _) = FixedHeader::try_decode(&frozen).unwrap().unwrap();
        decoded.remaining_length
    }

    #[test]
    fn boundary_values() {
        for length in [0, 127, 128, 16_383, 16_384, 2_097_151, 2_097_152, 268_435_455] {
            assert_eq!(round_trip(length), length);
        }
    }

    #[test]
    fn rejects_fifth_continuation_byte() {
        let buf = Bytes::from_static(&[0xC0, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(FixedHeader::try_decode(&buf).is_err());
    }
}
