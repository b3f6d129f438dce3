//! CONNECT packet (component A). Protocol name/level are fixed to MQTT 3.1.1
//! (`"MQTT"`, level 4); everything else in the payload is gated by bits in
//! the connect-flags byte.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{decode_utf8_string, encode_remaining_length, encode_utf8_string, Decode, Encode, FixedHeader, PacketType};
use crate::err::{DecodeError, DecodeErrorKind, EncodeError};
use crate::qos::QosLevel;

const USERNAME: u8 = 0b1000_0000;
const PASSWORD: u8 = 0b0100_0000;
const WILL_RETAIN: u8 = 0b0010_0000;
const WILL_QOS_BITS: u8 = 0b0001_1000;
const WILL: u8 = 0b0000_0100;
const CLEAN_SESSION: u8 = 0b0000_0010;
const RESERVED_BIT: u8 = 0b0000_0001;

/// The connect-flags byte: clean-session, will, will-qos, will-retain,
/// username, password, with bit 0 reserved (must be zero).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ConnectFlags {
    byte: u8,
}

impl ConnectFlags {
    pub fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        if byte & RESERVED_BIT != 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::InvalidReservedBits,
                format!("connect flags reserved bit set, received {byte:#010b}"),
            ));
        }
        if byte & WILL == 0 && byte & (WILL_QOS_BITS | WILL_RETAIN) != 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::Will,
                String::from("will-qos/will-retain set without the will flag"),
            ));
        }
        if byte & PASSWORD != 0 && byte & USERNAME == 0 {
            return Err(DecodeError::new(
                DecodeErrorKind::InvalidCredentials,
                String::from("password flag set without a username"),
            ));
        }
        Ok(Self { byte })
    }

    pub fn as_byte(&self) -> u8 {
        self.byte
    }

    pub fn clean_session(&self) -> bool {
        self.byte & CLEAN_SESSION != 0
    }

    pub fn set_clean_session(&mut self, val: bool) {
        set_bit(&mut self.byte, CLEAN_SESSION, val);
    }

    pub fn will(&self) -> bool {
        self.byte & WILL != 0
    }

    pub fn set_will(&mut self, val: bool) {
        set_bit(&mut self.byte, WILL, val);
    }

    pub fn will_qos(&self) -> Result<QosLevel, DecodeError> {
        QosLevel::try_from((self.byte & WILL_QOS_BITS) >> 3)
    }

    pub fn set_will_qos(&mut self, qos: QosLevel) {
        self.byte &= !WILL_QOS_BITS;
        self.byte |= (qos as u8) << 3;
    }

    pub fn will_retain(&self) -> bool {
        self.byte & WILL_RETAIN != 0
    }

    pub fn set_will_retain(&mut self, val: bool) {
        set_bit(&mut self.byte, WILL_RETAIN, val);
    }

    pub fn username(&self) -> bool {
        self.byte & USERNAME != 0
    }

    pub fn set_username(&mut self, val: bool) {
        set_bit(&mut self.byte, USERNAME, val);
    }

    pub fn password(&self) -> bool {
        self.byte & PASSWORD != 0
    }

    pub fn set_password(&mut self, val: bool) {
        set_bit(&mut self.byte, PASSWORD, val);
    }
}

fn set_bit(byte: &mut u8, mask: u8, val: bool) {
    if val {
        *byte |= mask;
    } else {
        *byte &= !mask;
    }
}

/// MQTT only ever defines one protocol name; kept as an enum so a future
/// bridge to other protocol levels has somewhere to grow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Mqtt311,
}

impl Protocol {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mqtt311 => "MQTT",
        }
    }

    pub fn level(&self) -> u8 {
        match self {
            Self::Mqtt311 => 4,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Will {
    pub topic: String,
    pub payload: String,
    pub qos: QosLevel,
    pub retain: bool,
}

impl Will {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>, qos: QosLevel, retain: bool) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConnectPacket {
    pub protocol: Protocol,
    pub flags: ConnectFlags,
    pub keep_alive: u16,
    pub client_id: String,
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectPacket {
    pub fn new(client_id: impl Into<String>, clean_session: bool, keep_alive: u16) -> Self {
        let mut flags = ConnectFlags::default();
        flags.set_clean_session(clean_session);
        Self {
            protocol: Protocol::Mqtt311,
            flags,
            keep_alive,
            client_id: client_id.into(),
            will: None,
            username: None,
            password: None,
        }
    }

    pub fn with_will(mut self, will: Will) -> Self {
        self.flags.set_will(true);
        self.flags.set_will_qos(will.qos);
        self.flags.set_will_retain(will.retain);
        self.will = Some(will);
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.flags.set_username(true);
        self.username = Some(username.into());
        if let Some(password) = password {
            self.flags.set_password(true);
            self.password = Some(password);
        }
        self
    }

    pub fn clean_session(&self) -> bool {
        self.flags.clean_session()
    }
}

impl Decode for ConnectPacket {
    fn decode(_header: FixedHeader, mut body: Bytes) -> Result<Self, DecodeError> {
        let name = decode_utf8_string(&mut body)?;
        if name != "MQTT" {
            return Err(DecodeError::new(
                DecodeErrorKind::UnsupportedProtocolName,
                format!("protocol name must be \"MQTT\", got {name:?}"),
            ));
        }

        if body.remaining() < 1 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("CONNECT body truncated before protocol level"),
            ));
        }
        let level = body.get_u8();
        if level != 4 {
            return Err(DecodeError::new(
                DecodeErrorKind::UnsupportedProtocolLevel,
                format!("protocol level must be 4, got {level}"),
            ));
        }

        if body.remaining() < 3 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("CONNECT body truncated before connect flags/keep-alive"),
            ));
        }
        let flags = ConnectFlags::from_byte(body.get_u8())?;
        let keep_alive = body.get_u16();
        let client_id = decode_utf8_string(&mut body)?;

        let will = if flags.will() {
            let topic = decode_utf8_string(&mut body)?;
            let payload = decode_utf8_string(&mut body)?;
            Some(Will::new(topic, payload, flags.will_qos()?, flags.will_retain()))
        } else {
            None
        };

        let username = if flags.username() {
            Some(decode_utf8_string(&mut body)?)
        } else {
            None
        };

        let password = if flags.password() {
            Some(decode_utf8_string(&mut body)?)
        } else {
            None
        };

        Ok(Self {
            protocol: Protocol::Mqtt311,
            flags,
            keep_alive,
            client_id,
            will,
            username,
            password,
        })
    }
}

impl Encode for ConnectPacket {
    fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut body = BytesMut::new();
        encode_utf8_string(&mut body, self.protocol.name())?;
        body.put_u8(self.protocol.level());
        body.put_u8(self.flags.as_byte());
        body.put_u16(self.keep_alive);
        encode_utf8_string(&mut body, &self.client_id)?;

        if let Some(will) = &self.will {
            encode_utf8_string(&mut body, &will.topic)?;
            encode_utf8_string(&mut body, &will.payload)?;
        }
        if let Some(username) = &self.username {
            encode_utf8_string(&mut body, username)?;
        }
        if let Some(password) = &self.password {
            encode_utf8_string(&mut body, password)?;
        }

        let mut out = BytesMut::with_capacity(body.len() + 5);
        out.put_u8(PacketType::Connect.as_u8() << 4);
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

    fn round_trip(packet: ConnectPacket) -> ConnectPacket {
        let encoded = packet.encode().unwrap();
        let mut buf = BytesMut::from(&encoded[..]);
        match MqttPacket::try_decode_from(&mut buf).unwrap().unwrap() {
            MqttPacket::Connect(decoded) => decoded,
            other => panic!("expected Connect, got {other:?}"),
        }
    }

    #[test]
    fn plain_round_trip() {
        let packet = ConnectPacket::new("client-1", true, 60);
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn with_will_and_credentials() {
        let packet = ConnectPacket::new("client-2", false, 30)
            .with_will(Will::new("last/will", "bye", QosLevel::AtLeastOnce, true))
            .with_credentials("user", Some(String::from("pass")));
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn rejects_bad_protocol_name() {
        let mut body = BytesMut::new();
        encode_utf8_string(&mut body, "MQIsdp").unwrap();
        body.put_u8(4);
        body.put_u8(0);
        body.put_u16(0);
        encode_utf8_string(&mut body, "x").unwrap();
        let err = ConnectPacket::decode(
            FixedHeader {
                packet_type: PacketType::Connect,
                flags: 0,
                remaining_length: body.len() as u32,
            },
            body.freeze(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::UnsupportedProtocolName);
    }

    #[test]
    fn rejects_password_without_username() {
        let flags = ConnectFlags::from_byte(PASSWORD);
        assert!(flags.is_err());
    }

    #[test]
    fn rejects_reserved_bit() {
        let flags = ConnectFlags::from_byte(RESERVED_BIT);
        assert_eq!(flags.unwrap_err().kind(), DecodeErrorKind::InvalidReservedBits);
    }
}
