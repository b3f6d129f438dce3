//! CONNACK packet: the broker's reply to CONNECT.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{encode_remaining_length, Decode, Encode, FixedHeader, PacketType};
use crate::err::{DecodeError, DecodeErrorKind, EncodeError};
use crate::ConnectReturnCode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnAckPacket {
    pub session_present: bool,
    pub return_code: ConnectReturnCode,
}

impl ConnAckPacket {
    pub fn new(session_present: bool, return_code: ConnectReturnCode) -> Self {
        Self {
            session_present,
            return_code,
        }
    }
}

impl Decode for ConnAckPacket {
    fn decode(_header: FixedHeader, mut body: Bytes) -> Result<Self, DecodeError> {
        if body.remaining() != 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                format!("CONNACK body must be 2 bytes, got {}", body.remaining()),
            ));
        }
        let flags = body.get_u8();
        if flags & 0b1111_1110 != 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::InvalidReservedBits,
                format!("CONNACK ack-flags reserved bits set, received {flags:#010b}"),
            ));
        }
        let return_code = ConnectReturnCode::try_from(body.get_u8())?;
        Ok(Self {
            session_present: flags & 0x01 != 0,
            return_code,
        })
    }
}

impl Encode for ConnAckPacket {
    fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut out = BytesMut::with_capacity(4);
        out.put_u8(PacketType::ConnAck.as_u8() << 4);
        encode_remaining_length(2, &mut out)?;
        out.put_u8(self.session_present as u8);
        out.put_u8(self.return_code as u8);
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
        let packet = ConnAckPacket::new(true, ConnectReturnCode::Accept);
        let mut buf = BytesMut::from(&packet.encode().unwrap()[..]);
        match MqttPacket::try_decode_from(&mut buf).unwrap().unwrap() {
            MqttPacket::ConnAck(decoded) => assert_eq!(decoded, packet),
            other => panic!("expected ConnAck, got {other:?}"),
        }
    }

    #[test]
    fn rejects_reserved_ack_flags() {
        let mut buf = BytesMut::new();
        buf.put_u8(PacketType::ConnAck.as_u8() << 4);
        encode_remaining_length(2, &mut buf).unwrap();
        buf.put_u8(0b0000_0010);
        buf.put_u8(ConnectReturnCode::Accept as u8);
        let err = MqttPacket::try_decode_from(&mut buf).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::InvalidReservedBits);
    }
}
