//! Public Surface (component E): six non-blocking operations backed by a
//! cloneable handle. Every call enqueues onto the connection actor's
//! command channel and returns immediately; completion is reported through
//! the caller-supplied callback, matching the core's callback-based
//! interface rather than returning a `Future` per call.

use bytes::Bytes;
use tokio::sync::mpsc;

use mqtt_core::qos::QosLevel;
use mqtt_core::topic::{TopicFilter, TopicName};

use crate::connection::{Command, Connection, Handlers};
use crate::error::{ClientError, ErrorKind};
use crate::options::ConnectOptions;
use crate::transport::Connector;

type Completion = Box<dyn FnOnce(Result<(), ClientError>) + Send>;
type SubscribeCallback = Box<dyn FnMut(&str, &[u8]) + Send>;
type Cleanup = Box<dyn FnOnce() + Send>;

const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// A cheaply-cloneable handle to a running connection. Dropping every clone
/// closes the command channel, which the connection actor treats as an
/// implicit disconnect.
#[derive(Clone)]
pub struct MqttClient {
    commands: mpsc::Sender<Command>,
}

impl MqttClient {
    /// Spawns the connection actor and returns a handle to it immediately;
    /// `handlers.on_connection_complete` fires once the first CONNACK (or
    /// a transport failure) resolves.
    pub fn connect(options: ConnectOptions, connector: Box<dyn Connector>, handlers: Handlers) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let connection = Connection::new(options, connector, handlers, rx);
        tokio::spawn(connection.run());
        Self { commands: tx }
    }

    pub fn subscribe(
        &self,
        filter: &str,
        qos: QosLevel,
        callback: SubscribeCallback,
        cleanup: Option<Cleanup>,
        on_complete: Option<Completion>,
    ) -> Result<(), ClientError> {
        let filter = TopicFilter::from_str(filter)?;
        self.send(Command::Subscribe {
            filter,
            qos,
            callback,
            cleanup,
            on_complete,
        })
    }

    pub fn unsubscribe(&self, filter: &str, on_complete: Option<Completion>) -> Result<(), ClientError> {
        let filter = TopicFilter::from_str(filter)?;
        self.send(Command::Unsubscribe { filter, on_complete })
    }

    pub fn publish(
        &self,
        topic: &str,
        qos: QosLevel,
        retain: bool,
        payload: impl Into<Bytes>,
        on_complete: Option<Completion>,
    ) -> Result<(), ClientError> {
        let topic = TopicName::from_str(topic)?;
        self.send(Command::Publish {
            topic,
            qos,
            retain,
            payload: payload.into(),
            on_complete,
        })
    }

    pub fn ping(&self, on_complete: Option<Completion>) -> Result<(), ClientError> {
        self.send(Command::Ping { on_complete })
    }

    pub fn disconnect(&self, on_complete: Option<Completion>) -> Result<(), ClientError> {
        self.send(Command::Disconnect { on_complete })
    }

    fn send(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .try_send(command)
            .map_err(|_| ClientError::new(ErrorKind::Cancelled, String::from("connection actor is gone")))
    }
}
