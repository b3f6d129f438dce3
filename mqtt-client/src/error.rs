//! Client-facing error taxonomy. Thin re-export of `mqtt_core::err::client`,
//! which already carries the `{kind, message}` + `Display` shape this crate
//! wants — no separate error type is introduced at this layer.

pub use mqtt_core::err::client::{ClientError, ErrorKind};
