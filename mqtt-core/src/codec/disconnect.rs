//! DISCONNECT: the client's final, orderly packet. Fixed header only.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{encode_remaining_length, Decode, Encode, FixedHeader, PacketType};
use crate::err::{DecodeError, DecodeErrorKind, EncodeError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct DisconnectPacket;

impl DisconnectPacket {
    pub fn new() -> Self {
        Self
    }
}

impl Decode for DisconnectPacket {
    fn decode(header: FixedHeader, _body: Bytes) -> Result<Self, DecodeError> {
        if header.remaining_length != 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::ImproperDisconnect,
                String::from("DISCONNECT carries no body"),
            ));
        }
        Ok(Self)
    }
}

impl Encode for DisconnectPacket {
    fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut out = BytesMut::with_capacity(2);
        out.put_u8(PacketType::Disconnect.as_u8() << 4);
        encode_remaining_length(0, &mut out)?;
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
        let packet = DisconnectPacket::new();
        let mut buf = BytesMut::from(&packet.encode().unwrap()[..]);
        match MqttPacket::try_decode_from(&mut buf).unwrap().unwrap() {
            MqttPacket::Disconnect(decoded) => assert_eq!(decoded, packet),
            other => panic!("expected Disconnect, got {other:?}"),
        }
    }
}
