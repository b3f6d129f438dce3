//! PUBREC: second packet of the QoS 2 exchange, packet-id only.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{encode_remaining_length, Decode, Encode, FixedHeader, PacketType};
use crate::err::{DecodeError, DecodeErrorKind, EncodeError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PubRecPacket {
    pub packet_id: u16,
}

impl PubRecPacket {
    pub fn new(packet_id: u16) -> Self {
        Self { packet_id }
    }
}

impl Decode for PubRecPacket {
    fn decode(_header: FixedHeader, mut body: Bytes) -> Result<Self, DecodeError> {
        if body.remaining() != 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("PUBREC body must hold exactly a packet id"),
            ));
        }
        Ok(Self { packet_id: body.get_u16() })
    }
}

impl Encode for PubRecPacket {
    fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut out = BytesMut::with_capacity(4);
        out.put_u8(PacketType::PubRec.as_u8() << 4);
        encode_remaining_length(2, &mut out)?;
        out.put_u16(self.packet_id);
        Ok(out.freeze())
    }
}
