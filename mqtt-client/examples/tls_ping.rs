use std::{sync::Arc, time::Duration};

use mqtt_client::{ConnectOptions, Handlers, MqttClient, TlsTcpConnector};
use tokio::{sync::oneshot, time::Instant};
use tokio_rustls::{
    rustls::{self, pki_types::pem::PemObject, pki_types::CertificateDer},
    TlsConnector,
};

const MAXPING: u32 = 10_000;

#[tokio::main]
async fn main() {
    let mut root_cert_store = rustls::RootCertStore::empty();
    for cert in CertificateDer::pem_file_iter("certs/ca.pem").unwrap() {
        root_cert_store.add(cert.unwrap()).unwrap();
    }
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_cert_store)
        .with_no_client_auth();
    let tls_connector = TlsConnector::from(Arc::new(config));

    let options = ConnectOptions::new("test.mqtt.com", 8883, "tls_ping_example");
    let connector = Box::new(TlsTcpConnector::new("test.mqtt.com", 8883, tls_connector));

    let mut handlers = Handlers::default();
    handlers.on_connection_complete = Some(Box::new(|result| {
        result.expect("connection failed");
        println!("connected");
    }));

    let client = MqttClient::connect(options, connector, handlers);

    let mut dur = Duration::from_secs(0);
    let start = Instant::now();

    for _ in 0..MAXPING {
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
