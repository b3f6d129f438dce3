//! PINGRESP: fixed header only.

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{encode_remaining_length, Decode, Encode, FixedHeader, PacketType};
use crate::err::{DecodeError, DecodeErrorKind, EncodeError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PingRespPacket;

impl PingRespPacket {
    pub fn new() -> Self {
        Self
    }
}

impl Decode for PingRespPacket {
    fn decode(header: FixedHeader, _body: Bytes) -> Result<Self, DecodeError> {
        if header.remaining_length != 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("PINGRESP carries no body"),
            ));
        }
        Ok(Self)
    }
}

impl Encode for PingRespPacket {
    fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut out = BytesMut::with_capacity(2);
        out.put_u8(PacketType::PingResp.as_u8() << 4);
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
        let packet = PingRespPacket::new();
        let mut buf = BytesMut::from(&packet.encode().unwrap()[..]);
        match MqttPacket::try_decode_from(&mut buf).unwrap().unwrap() {
            MqttPacket::PingResp(decoded) => assert_eq!(decoded, packet),
            other => panic!("expected PingResp, got {other:?}"),
        }
    }
}
