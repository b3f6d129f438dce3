use std::env;

use mqtt_client::{ConnectOptions, Handlers, MqttClient, TcpConnector};
use mqtt_core::qos::QosLevel;

#[tokio::main]
async fn main() {
    let filters: Vec<String> = env::args().skip(1).collect();
    let filters = if filters.is_empty() {
        vec![String::from("test")]
    } else {
        filters
    };

    let options = ConnectOptions::new("127.0.0.1", 1883, "sub_example");
    let connector = Box::new(TcpConnector::new("127.0.0.1", 1883));

    let mut handlers = Handlers::default();
    handlers.on_connection_complete = Some(Box::new(move |result| {
        result.expect("connection failed");
        println!("connected");
    }));

    let client = MqttClient::connect(options, connector, handlers);

    for filter in &filters {
        client
            .subscribe(
                filter,
                QosLevel::ExactlyOnce,
                Box::new(|topic, payload| {
                    println!("topic: {topic}, payload: {payload:?}");
                }),
                None,
                Some(Box::new(|result| {
                    result.expect("subscribe failed");
                    println!("subscribed");
                })),
            )
            .unwrap();
    }

    std::future::pending::<()>().await;
}
