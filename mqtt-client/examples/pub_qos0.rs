use std::time::Duration;

use mqtt_client::{ConnectOptions, Handlers, MqttClient, TcpConnector};
use mqtt_core::qos::QosLevel;
use tokio::time::sleep;

#[tokio::main]
async fn main() {
    let options = ConnectOptions::new("127.0.0.1", 1883, "pub_qos0");
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
        let payload = format!("TEST QOS 0, idx: {idx}");
        client
            .publish("qos0", QosLevel::AtMostOnce, false, payload.into_bytes(), None)
            .unwrap();
        println!("idx: {idx}");
        idx += 1;
    }
}
