//! `ConnectOptions`: a fluent builder for the handful of knobs a connection
//! needs at construction time, mirroring the field list a connection keeps
//! for its whole lifetime (host/port, client id, keep-alive, credentials,
//! will, request timeout, reconnect backoff bounds).

use std::time::Duration;

use mqtt_core::codec::Will;

#[derive(Clone, Debug)]
pub struct ConnectOptions {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) client_id: String,
    pub(crate) clean_session: bool,
    pub(crate) keep_alive_secs: u16,
    pub(crate) username: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) will: Option<Will>,
    pub(crate) request_timeout: Duration,
    pub(crate) reconnect_min: Duration,
    pub(crate) reconnect_max: Duration,
}

impl ConnectOptions {
    pub fn new(host: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            clean_session: true,
            keep_alive_secs: 60,
            username: None,
            password: None,
            will: None,
            request_timeout: Duration::from_secs(3),
            reconnect_min: Duration::from_secs(1),
            reconnect_max: Duration::from_secs(128),
        }
    }

    pub fn clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    pub fn keep_alive(mut self, secs: u16) -> Self {
        self.keep_alive_secs = secs;
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    pub fn will(mut self, will: Will) -> Self {
        self.will = Some(will);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn reconnect_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.reconnect_min = min;
        self.reconnect_max = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let opts = ConnectOptions::new("localhost", 1883, "client-1");
        assert!(opts.clean_session);
        assert_eq!(opts.keep_alive_secs, 60);
        assert_eq!(opts.reconnect_min, Duration::from_secs(1));
        assert_eq!(opts.reconnect_max, Duration::from_secs(128));
    }

    #[test]
    fn builder_overrides_fields() {
        let opts = ConnectOptions::new("broker.local", 8883, "client-2")
            .clean_session(false)
            .keep_alive(30)
            .credentials("user", Some(String::from("pass")))
            .request_timeout(Duration::from_secs(5))
            .reconnect_bounds(Duration::from_millis(500), Duration::from_secs(60));

        assert!(!opts.clean_session);
        assert_eq!(opts.keep_alive_secs, 30);
        assert_eq!(opts.username.as_deref(), Some("user"));
        assert_eq!(opts.request_timeout, Duration::from_secs(5));
        assert_eq!(opts.reconnect_max, Duration::from_secs(60));
    }
}
