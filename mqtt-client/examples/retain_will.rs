use mqtt_client::{ConnectOptions, Handlers, MqttClient, TcpConnector};
use mqtt_core::{codec::Will, qos::QosLevel};

#[tokio::main]
async fn main() {
    let will = Will::new("retain_will", "WILL & RETAIN MESSAGE", QosLevel::AtMostOnce, true);
    let options = ConnectOptions::new("127.0.0.1", 1883, "retain_will_example").will(will);
    let connector = Box::new(TcpConnector::new("127.0.0.1", 1883));

    let mut handlers = Handlers::default();
    handlers.on_connection_complete = Some(Box::new(|result| {
        result.expect("connection failed");
        println!("connected");
    }));

    let _client = MqttClient::connect(options, connector, handlers);

    println!("Kill this process (or the broker connection) to see the will published and retained");
    std::future::pending::<()>().await;
}
