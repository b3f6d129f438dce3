//! SUBACK: one return code per filter in the SUBSCRIBE being acknowledged,
//! in the same order.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{encode_remaining_length, Decode, Encode, FixedHeader, PacketType};
use crate::err::{DecodeError, DecodeErrorKind, EncodeError};
use crate::qos::SubAckQoS;

#[derive(Clone, Debug, PartialEq)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub return_codes: Vec<SubAckQoS>,
}

impl SubAckPacket {
    pub fn new(packet_id: u16, return_codes: Vec<SubAckQoS>) -> Self {
        Self { packet_id, return_codes }
    }
}

impl Decode for SubAckPacket {
    fn decode(_header: FixedHeader, mut body: Bytes) -> Result<Self, DecodeError> {
        if body.remaining() < 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("SUBACK body truncated before packet id"),
            ));
        }
        let packet_id = body.get_u16();
        let mut return_codes = Vec::new();
        while body.remaining() > 0 {
            return_codes.push(SubAckQoS::try_from(body.get_u8())?);
        }
        Ok(Self { packet_id, return_codes })
    }
}

impl Encode for SubAckPacket {
    fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut out = BytesMut::with_capacity(4 + self.return_codes.len());
        out.put_u8(PacketType::SubAck.as_u8() << 4);
        encode_remaining_length((2 + self.return_codes.len()) as u32, &mut out)?;
        out.put_u16(self.packet_id);
        for code in &self.return_codes {
            out.put_u8((*code).into());
        }
        Ok(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MqttPacket;
    use crate::qos::QosLevel;
    use bytes::BytesMut;

    #[test]
    fn round_trip_mixed_codes() {
        let packet = SubAckPacket::new(
            9,
            vec![SubAckQoS::QOS(QosLevel::AtLeastOnce), SubAckQoS::Err, SubAckQoS::QOS(QosLevel::ExactlyOnce)],
        );
        let mut buf = BytesMut::from(&packet.encode().unwrap()[..]);
        match MqttPacket::try_decode_from(&mut buf).unwrap().unwrap() {
            MqttPacket::SubAck(decoded) => assert_eq!(decoded, packet),
            other => panic!("expected SubAck, got {other:?}"),
        }
    }
}
