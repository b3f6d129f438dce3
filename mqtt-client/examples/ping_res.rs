use std::time::Duration;

use mqtt_client::{ConnectOptions, Handlers, MqttClient, TcpConnector};
use tokio::{
    sync::oneshot,
    time::{sleep, Instant},
};

const MAXPING: u32 = 10_000;

#[tokio::main]
async fn main() {
    let options = ConnectOptions::new("127.0.0.1", 1883, "ping_res_example");
    let connector = Box::new(TcpConnector::new("127.0.0.1", 1883));

    let mut handlers = Handlers::default();
    handlers.on_connection_complete = Some(Box::new(|result| {
        result.expect("connection failed");
        println!("connected");
    }));

    let client = MqttClient::connect(options, connector, handlers);
    sleep(Duration::from_millis(200)).await;

    let mut dur = Duration::from_secs(0);
    let start = Instant::now();

    for _ in 0..MAXPING {
        sleep(Duration::from_micros(1)).await;
        let ping_start = Instant::now();
        let (tx, rx) = oneshot::channel();
        client
            .ping(Some(Box::new(move |result| {
                let _ = tx.send(result);
            })))
            .unwrap();
        rx.await.unwrap().expect("ping failed");
        dur += Instant::now().duration_since(ping_start);
    }

    println!("Average ping response time: {} μs", dur.as_micros() / MAXPING as u128);
    println!(
        "Total sent: {}, Total Time: {} ms",
        MAXPING,
        Instant::now().duration_since(start).as_millis()
    );
}
