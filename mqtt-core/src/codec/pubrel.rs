//! PUBREL: third packet of the QoS 2 exchange. The fixed header's flag
//! nibble is fixed at `0b0010`; any other value is a reserved-bits violation.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{encode_remaining_length, Decode, Encode, FixedHeader, PacketType};
use crate::err::{DecodeError, DecodeErrorKind, EncodeError};

const FIXED_FLAGS: u8 = 0b0010;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PubRelPacket {
    pub packet_id: u16,
}

impl PubRelPacket {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

impl Decode for PubRelPacket {
    fn decode(header: FixedHeader, mut body: Bytes) -> Result<Self, DecodeError> {
        if header.flags != FIXED_FLAGS {
            return Err(DecodeError::new(
                DecodeErrorKind::InvalidReservedBits,
                format!("PUBREL flags must be {FIXED_FLAGS:#06b}, got {:#06b}", header.flags),
            ));
        }
        if body.remaining() != 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("PUBREL body must hold exactly a packet id"),
            ));
        }
        Ok(Self { packet_id: body.get_u16() })
    }
}

impl Encode for PubRelPacket {
    fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut out = BytesMut::with_capacity(4);
        out.put_u8((PacketType::PubRel.as_u8() << 4) | FIXED_FLAGS);
        encode_remaining_length(2, &mut out)?;
        out.put_u16(self.packet_id);
        Ok(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MqttPacket;
    use bytes::BytesMut;

    #[test]
    fn round_trip() {
        let packet = PubRelPacket::new(99);
        let mut buf = BytesMut::from(&packet.encode().unwrap()[..]);
        match MqttPacket::try_decode_from(&mut buf).unwrap().unwrap() {
            MqttPacket::PubRel(decoded) => assert_eq!(decoded, packet),
            other => panic!("expected PubRel, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_fixed_flags() {
        let mut buf = BytesMut::new();
        buf.put_u8(PacketType::PubRel.as_u8() << 4);
        encode_remaining_length(2, &mut buf).unwrap();
        buf.put_u16(1);
        let err = MqttPacket::try_decode_from(&mut buf).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::InvalidReservedBits);
    }
}
