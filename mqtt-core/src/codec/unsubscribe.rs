//! UNSUBSCRIBE: packet-id followed by one or more topic filters. Fixed
//! header flags are fixed at `0b0010`, same as SUBSCRIBE.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{encode_remaining_length, encode_utf8_string, Decode, Encode, FixedHeader, PacketType};
use crate::err::{DecodeError, DecodeErrorKind, EncodeError};
use crate::topic::TopicFilter;

const FIXED_FLAGS: u8 = 0b0010;

#[derive(Clone, Debug, PartialEq)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<TopicFilter>,
}

impl UnsubscribePacket {
    pub fn new(packet_id: u16, filters: Vec<TopicFilter>) -> Self {
        Self { packet_id, filters }
    }
}

impl Decode for UnsubscribePacket {
    fn decode(header: FixedHeader, mut body: Bytes) -> Result<Self, DecodeError> {
        if header.flags != FIXED_FLAGS {
            return Err(DecodeError::new(
                DecodeErrorKind::InvalidReservedBits,
                format!("UNSUBSCRIBE flags must be {FIXED_FLAGS:#06b}, got {:#06b}", header.flags),
            ));
        }
        if body.remaining() < 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("UNSUBSCRIBE body truncated before packet id"),
            ));
        }
        let packet_id = body.get_u16();

        let mut filters = Vec::new();
        while body.remaining() > 0 {
            filters.push(TopicFilter::decode(&mut body)?);
        }

        if filters.is_empty() {
            return Err(DecodeError::new(
                DecodeErrorKind::ProtocolError,
                String::from("UNSUBSCRIBE must carry at least one topic filter"),
            ));
        }

        Ok(Self { packet_id, filters })
    }
}

impl Encode for UnsubscribePacket {
    fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut body = BytesMut::new();
        body.put_u16(self.packet_id);
        for filter in &self.filters {
            encode_utf8_string(&mut body, &filter.clone().to_string())?;
        }

        let mut out = BytesMut::with_capacity(body.len() + 5);
        out.put_u8((PacketType::Unsubscribe.as_u8() << 4) | FIXED_FLAGS);
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
    fn round_trip() {
        let packet = UnsubscribePacket::new(3, vec![TopicFilter::from_str("a/b/+").unwrap()]);
        let mut buf = BytesMut::from(&packet.encode().unwrap()[..]);
        match MqttPacket::try_decode_from(&mut buf).unwrap().unwrap() {
            MqttPacket::Unsubscribe(decoded) => assert_eq!(decoded, packet),
            other => panic!("expected Unsubscribe, got {other:?}"),
        }
    }
}
