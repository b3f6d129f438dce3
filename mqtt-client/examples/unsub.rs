use std::time::Duration;

use mqtt_client::{ConnectOptions, Handlers, MqttClient, TcpConnector};
use mqtt_core::qos::QosLevel;
use tokio::{sync::oneshot, time::sleep};

#[tokio::main]
async fn main() {
    let options = ConnectOptions::new("127.0.0.1", 1883, "unsub_example");
    let connector = Box::new(TcpConnector::new("127.0.0.1", 1883));

    let mut handlers = Handlers::default();
    handlers.on_connection_complete = Some(Box::new(|result| {
        result.expect("connection failed");
        println!("connected");
    }));

    let client = MqttClient::connect(options, connector, handlers);
    sleep(Duration::from_millis(200)).await;

    let (sub_tx, sub_rx) = oneshot::channel();
    client
        .subscribe(
            "test",
            QosLevel::AtMostOnce,
            Box::new(|topic, payload| println!("topic: {topic}, payload: {payload:?}")),
            None,
            Some(Box::new(move |result| {
                let _ = sub_tx.send(result);
            })),
        )
        .unwrap();
    sub_rx.await.unwrap().expect("subscribe failed");

    sleep(Duration::from_secs(5)).await;

    let (unsub_tx, unsub_rx) = oneshot::channel();
    client
        .unsubscribe(
            "test",
            Some(Box::new(move |result| {
                let _ = unsub_tx.send(result);
            })),
        )
        .unwrap();
    unsub_rx.await.unwrap().expect("unsubscribe failed");
    println!("Unsubscribe success. Shutting down...");
}
