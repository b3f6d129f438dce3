//! UNSUBACK: packet-id only.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{encode_remaining_length, Decode, Encode, FixedHeader, PacketType};
use crate::err::{DecodeError, DecodeErrorKind, EncodeError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnsubAckPacket {
    pub packet_id: u16,
}

impl UnsubAckPacket {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

impl Decode for UnsubAckPacket {
    fn decode(_header: FixedHeader, mut body: Bytes) -> Result<Self, DecodeError> {
        if body.remaining() != 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("UNSUBACK body must hold exactly a packet id"),
            ));
        }
        Ok(Self { packet_id: body.get_u16() })
    }
}

impl Encode for UnsubAckPacket {
    fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut out = BytesMut::with_capacity(4);
        out.put_u8(PacketType::UnsubAck.as_u8() << 4);
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
        let packet = UnsubAckPacket::new(3);
        let mut buf = BytesMut::from(&packet.encode().unwrap()[..]);
        match MqttPacket::try_decode_from(&mut buf).unwrap().unwrap() {
            MqttPacket::UnsubAck(decoded) => assert_eq!(decoded, packet),
            other => panic!("expected UnsubAck, got {other:?}"),
        }
    }
}
