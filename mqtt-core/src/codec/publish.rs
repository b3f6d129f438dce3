//! PUBLISH packet. The fixed-header flags nibble carries `{dup, qos(2), retain}`;
//! the packet-ID field is present iff QoS > 0.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{decode_utf8_string, encode_remaining_length, encode_utf8_string, Decode, Encode, FixedHeader, PacketType};
use crate::err::{DecodeError, DecodeErrorKind, EncodeError};
use crate::qos::QosLevel;
use crate::topic::TopicName;

const RETAIN: u8 = 0b0001;
const QOS_BITS: u8 = 0b0110;
const DUP: u8 = 0b1000;

#[derive(Clone, Debug, PartialEq)]
pub struct PublishPacket {
    pub dup: bool,
    pub qos: QosLevel,
    pub retain: bool,
    pub topic: TopicName,
    pub packet_id: Option<u16>,
    pub payload: Bytes,
}

impl PublishPacket {
    pub fn new(topic: TopicName, qos: QosLevel, payload: impl Into<Bytes>) -> Self {
        Self {
            dup: false,
            qos,
            retain: false,
            topic,
            packet_id: None,
            payload: payload.into(),
        }
    }

    pub fn with_packet_id(mut self, id: u16) -> Self {
        self.packet_id = Some(id);
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn with_dup(mut self, dup: bool) -> Self {
        self.dup = dup;
        self
    }
}

impl Decode for PublishPacket {
    fn decode(header: FixedHeader, mut body: Bytes) -> Result<Self, DecodeError> {
        let qos_bits = (header.flags & QOS_BITS) >> 1;
        if qos_bits == 3 {
            return Err(DecodeError::new(
                DecodeErrorKind::QoS,
                String::from("PUBLISH qos bits cannot both be set (value 3)"),
            ));
        }
        let qos = QosLevel::try_from(qos_bits)?;
        let dup = header.flags & DUP != 0;
        let retain = header.flags & RETAIN != 0;

        if dup && qos == QosLevel::AtMostOnce {
            return Err(DecodeError::new(
                DecodeErrorKind::ProtocolError,
                String::from("PUBLISH dup flag set on a QoS 0 message"),
            ));
        }

        let topic = TopicName::decode(&mut body)?;

        let packet_id = if qos != QosLevel::AtMostOnce {
            if body.remaining() < 2 {
                return Err(DecodeError::new(
                    DecodeErrorKind::MalformedLength,
                    String::from("PUBLISH body truncated before packet id"),
                ));
            }
            let id = body.get_u16();
            if id == 0 {
                return Err(DecodeError::new(
                    DecodeErrorKind::PacketIdZero,
                    String::from("PUBLISH with QoS > 0 cannot carry packet id 0"),
                ));
            }
            Some(id)
        } else {
            None
        };

        Ok(Self {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            payload: body,
        })
    }
}

impl Encode for PublishPacket {
    fn encode(&self) -> Result<Bytes, EncodeError> {
        let topic_string = self.topic.clone().to_string();
        let mut body = BytesMut::new();
        encode_utf8_string(&mut body, &topic_string)?;
        if let Some(id) = self.packet_id {
            body.put_u16(id);
        }
        body.put_slice(&self.payload);

        let mut flags = (self.qos as u8) << 1;
        if self.dup {
            flags |= DUP;
        }
        if self.retain {
            flags |= RETAIN;
        }

        let mut out = BytesMut::with_capacity(body.len() + 5);
        out.put_u8((PacketType::Publish.as_u8() << 4) | flags);
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

    fn round_trip(packet: PublishPacket) -> PublishPacket {
        let mut buf = BytesMut::from(&packet.encode().unwrap()[..]);
        match MqttPacket::try_decode_from(&mut buf).unwrap().unwrap() {
            MqttPacket::Publish(decoded) => decoded,
            other => panic!("expected Publish, got {other:?}"),
        }
    }

    #[test]
    fn qos0_has_no_packet_id() {
        let packet = PublishPacket::new(
            TopicName::from_str("sensor/kitchen/temp").unwrap(),
            QosLevel::AtMostOnce,
            Bytes::from_static(b"21.5"),
        );
        let decoded = round_trip(packet.clone());
        assert_eq!(decoded, packet);
        assert_eq!(decoded.packet_id, None);
    }

    #[test]
    fn qos1_round_trips_with_id_and_retain() {
        let packet = PublishPacket::new(
            TopicName::from_str("a/b").unwrap(),
            QosLevel::AtLeastOnce,
            Bytes::from_static(b"x"),
        )
        .with_packet_id(42)
        .with_retain(true);
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn rejects_invalid_qos_value_3() {
        let mut buf = BytesMut::new();
        buf.put_u8((PacketType::Publish.as_u8() << 4) | 0b0110);
        let mut body = BytesMut::new();
        encode_utf8_string(&mut body, "a").unwrap();
        body.put_u16(1);
        encode_remaining_length(body.len() as u32, &mut buf).unwrap();
        buf.extend_from_slice(&body);
        let err = MqttPacket::try_decode_from(&mut buf).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::QoS);
    }

    #[test]
    fn rejects_zero_packet_id_on_qos1() {
        let mut buf = BytesMut::new();
        buf.put_u8((PacketType::Publish.as_u8() << 4) | 0b0010);
        let mut body = BytesMut::new();
        encode_utf8_string(&mut body, "a").unwrap();
        body.put_u16(0);
        encode_remaining_length(body.len() as u32, &mut buf).unwrap();
        buf.extend_from_slice(&body);
        let err = MqttPacket::try_decode_from(&mut buf).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::PacketIdZero);
    }
}
