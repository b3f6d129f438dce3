//! SUBSCRIBE: packet-id followed by one or more (topic filter, requested QoS)
//! pairs. Fixed header flags are fixed at `0b0010` per the spec.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{encode_remaining_length, encode_utf8_string, Decode, Encode, FixedHeader, PacketType};
use crate::err::{DecodeError, DecodeErrorKind, EncodeError};
use crate::qos::QosLevel;
use crate::topic::TopicFilter;

const FIXED_FLAGS: u8 = 0b0010;

#[derive(Clone, Debug, PartialEq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<(TopicFilter, QosLevel)>,
}

impl SubscribePacket {
    pub fn new(packet_id: u16, filters: Vec<(TopicFilter, QosLevel)>) -> Self {
        Self { packet_id, filters }
    }
}

impl Decode for SubscribePacket {
    fn decode(header: FixedHeader, mut body: Bytes) -> Result<Self, DecodeError> {
        if header.flags != FIXED_FLAGS {
            return Err(DecodeError::new(
                DecodeErrorKind::InvalidReservedBits,
                format!("SUBSCRIBE flags must be {FIXED_FLAGS:#06b}, got {:#06b}", header.flags),
            ));
        }
        if body.remaining() < 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("SUBSCRIBE body truncated before packet id"),
            ));
        }
        let packet_id = body.get_u16();

        let mut filters = Vec::new();
        while body.remaining() > 0 {
            let filter = TopicFilter::decode(&mut body)?;
            if body.remaining() < 1 {
                return Err(DecodeError::new(
                    DecodeErrorKind::MalformedLength,
                    String::from("SUBSCRIBE filter missing its requested-QoS byte"),
                ));
            }
            let qos = QosLevel::try_from(body.get_u8())?;
            filters.push((filter, qos));
        }

        if filters.is_empty() {
            return Err(DecodeError::new(
                DecodeErrorKind::ProtocolError,
                String::from("SUBSCRIBE must carry at least one topic filter"),
            ));
        }

        Ok(Self { packet_id, filters })
    }
}

impl Encode for SubscribePacket {
    fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut body = BytesMut::new();
        body.put_u16(self.packet_id);
        for (filter, qos) in &self.filters {
            encode_utf8_string(&mut body, &filter.clone().to_string())?;
            body.put_u8(*qos as u8);
        }

        let mut out = BytesMut::with_capacity(body.len() + 5);
        out.put_u8((PacketType::Subscribe.as_u8() << 4) | FIXED_FLAGS);
        encode_remaining_length(body.len() as u32, &mut out)?;
        out.extend_from_slice(&body);
        Ok(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MqttPacket;
    use bytes::BytesMut;

    #[test]
    fn round_trip_multiple_filters() {
        let packet = SubscribePacket::new(
            9,
            vec![
                (TopicFilter::from_str("sensor/+/temp").unwrap(), QosLevel::AtLeastOnce),
                (TopicFilter::from_str("home/#").unwrap(), QosLevel::AtMostOnce),
            ],
        );
        let mut buf = BytesMut::from(&packet.encode().unwrap()[..]);
        match MqttPacket::try_decode_from(&mut buf).unwrap().unwrap() {
            MqttPacket::Subscribe(decoded) => assert_eq!(decoded, packet),
            other => panic!("expected Subscribe, got {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_filter_list() {
        let mut buf = BytesMut::new();
        buf.put_u8((PacketType::Subscribe.as_u8() << 4) | FIXED_FLAGS);
        encode_remaining_length(2, &mut buf).unwrap();
        buf.put_u16(1);
        let err = MqttPacket::try_decode_from(&mut buf).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::ProtocolError);
    }
}
