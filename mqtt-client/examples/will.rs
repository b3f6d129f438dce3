use mqtt_client::{ConnectOptions, Handlers, MqttClient, TcpConnector};
use mqtt_core::{codec::Will, qos::QosLevel};

#[tokio::main]
async fn main() {
    let will = Will::new("test", "RETAIN", QosLevel::AtMostOnce, true);
    let options = ConnectOptions::new("127.0.0.1", 1883, "will_example").will(will);
    let connector = Box::new(TcpConnector::new("127.0.0.1", 1883));

    let mut handlers = Handlers::default();
    handlers.on_connection_complete = Some(Box::new(|result| {
        result.expect("connection failed");
        println!("connected");
    }));

    let _client = MqttClient::connect(options, connector, handlers);

    // check other clients to see if the will is published / retained once
    // this process is killed without an orderly disconnect.
    std::future::pending::<()>().await;
}
