use std::time::Duration;

use mqtt_client::{ConnectOptions, Handlers, MqttClient, TcpConnector};
use mqtt_core::qos::QosLevel;
use tokio::{sync::oneshot, time::sleep};

/// An empty retained payload tells the broker to drop whatever it was
/// previously holding retained for this topic.
#[tokio::main]
async fn main() {
    let options = ConnectOptions::new("127.0.0.1", 1883, "clean_retained_example");
    let connector = Box::new(TcpConnector::new("127.0.0.1", 1883));

    let mut handlers = Handlers::default();
    handlers.on_connection_complete = Some(Box::new(|result| {
        result.expect("connection failed");
        println!("connected");
    }));

    let client = MqttClient::connect(options, connector, handlers);
    sleep(Duration::from_millis(200)).await;

    let (tx, rx) = oneshot::channel();
    client
        .publish(
            "test",
            QosLevel::AtMostOnce,
            true,
            Vec::new(),
            Some(Box::new(move |result| {
                let _ = tx.send(result);
            })),
        )
        .unwrap();
    rx.await.unwrap().expect("publish failed");

    let (disc_tx, disc_rx) = oneshot::channel();
    client
        .disconnect(Some(Box::new(move |result| {
            let _ = disc_tx.send(result);
        })))
        .unwrap();
    disc_rx.await.unwrap().expect("disconnect failed");
}
