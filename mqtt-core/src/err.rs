use std::{error::Error, fmt::Display};

#[derive(Debug, Clone)]
pub struct EncodeError {
    kind: EncodeErrorKind,
    message: String,
}

impl EncodeError {
    pub fn new(kind: EncodeErrorKind, message: String) -> Self {
        return Self { kind, message };
    }

    pub fn kind(&self) -> EncodeErrorKind {
        return self.kind;
    }
}

impl Error for EncodeError {}

impl Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum EncodeErrorKind {
    BufferTooBig,
    OversizedPayload,
}

impl Error for DecodeError {}

#[derive(Debug, Clone)]
pub struct DecodeError {
    kind: DecodeErrorKind,
    message: String,
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl DecodeError {
    pub fn new(kind: DecodeErrorKind, message: String) -> Self {
        return Self { kind, message };
    }

    pub fn kind(&self) -> DecodeErrorKind {
        return self.kind;
    }
}

/// Taxonomy of wire-level failures. Names mirror the kinds (not numeric codes)
/// enumerated for the protocol engine: a violation always maps to exactly one
/// of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeErrorKind {
    FlagBits,
    PacketType,
    WillQoS,
    Will,
    QoS,
    Utf8ParseError,
    MalformedLength,
    MalformedTopicFilter,
    MalformedTopicName,
    UsernamePassword,
    InvalidProtocol,
    InvalidReturnCode,
    ImproperDisconnect,
    ProtocolError,
    Timeout,
    InvalidReservedBits,
    BufferTooBig,
    InvalidRemainingLength,
    UnsupportedProtocolName,
    UnsupportedProtocolLevel,
    InvalidCredentials,
    InvalidPacketType,
    PacketIdZero,
}

pub mod client {
    use std::fmt::Display;

    use super::{DecodeError, EncodeError};

    /// Client-visible error taxonomy. `Display` is the "companion table"
    /// mapping each kind to a human-readable string: there is no separate
    /// global registration step, the impl below is the whole table.
    #[derive(Debug)]
    pub enum ErrorKind {
        IoError(std::io::Error),
        ProtocolError,
        TopicDoesNotExist(String),
        DecodeError,
        EncodeError,
        Timeout,
        Cancelled,
    }

    impl Display for ErrorKind {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            return write!(f, "{:?}", self);
        }
    }

    #[derive(Debug)]
    pub struct ClientError {
        kind: ErrorKind,
        message: String,
    }

    impl ClientError {
        pub fn new(kind: ErrorKind, message: String) -> Self {
            return Self { kind, message };
        }

        pub fn kind(&self) -> &ErrorKind {
            return &self.kind;
        }
    }

    impl std::error::Error for ClientError {}

    impl From<DecodeError> for ClientError {
        fn from(value: DecodeError) -> Self {
            return Self {
                kind: ErrorKind::DecodeError,
                message: value.to_string(),
            };
        }
    }

    impl From<EncodeError> for ClientError {
        fn from(value: EncodeError) -> Self {
            return Self {
                kind: ErrorKind::EncodeError,
                message: value.to_string(),
            };
        }
    }

    impl From<std::io::Error> for ClientError {
        fn from(value: std::io::Error) -> Self {
            return Self {
                kind: ErrorKind::IoError(value),
                message: String::new(),
            };
        }
    }

    impl Display for ClientError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            return write!(f, "{}. {}", self.kind, self.message);
        }
    }
}
