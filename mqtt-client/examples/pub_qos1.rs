use std::time::Duration;

use mqtt_client::{ConnectOptions, Handlers, MqttClient, TcpConnector};
use mqtt_core::qos::QosLevel;
use tokio::{sync::oneshot, time::sleep};

#[tokio::main]
async fn main() {
    let options = ConnectOptions::new("127.0.0.1", 1883, "pub_qos1");
    let connector = Box::new(TcpConnector::new("127.0.0.1", 1883));

    let mut handlers = Handlers::default();
    handlers.on_connection_complete = Some(Box::new(|result| {
        result.expect("connection failed");
        println!("connected");
    }));

    let client = MqttClient::connect(options, connector, handlers);
    sleep(Duration::from_millis(200)).await;

    let mut idx = 0u64;
    loop {
        sleep(Duration::from_millis(10)).await;
        let payload = format!("TEST QOS 1, idx: {idx}");
        let (tx, rx) = oneshot::channel();
        client
            .publish(
                "qos1",
                QosLevel::AtLeastOnce,
                false,
                payload.into_bytes(),
                Some(Box::new(move |result| {
                    let _ = tx.send(result);
                })),
            )
            .unwrap();
        rx.await.unwrap().expect("publish failed");

        println!("idx: {idx}");
        idx += 1;
    }
}
