use tokio::net::TcpListener;

use common::telemetry::{get_subscriber, init_subscriber};
use controller::{configuration::get_configuration, startup::run};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let subscriber = get_subscriber("controller".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    let configuration = get_configuration().expect("Failed to read configuration.");

    let address = format!("{}:{}", configuration.application.host, configuration.application.port);
    tracing::info!("Starting server on {}", address);
    let listener = TcpListener::bind(address).await?;

    match run(listener, configuration.hosts).await {
        Ok(server) => {
            server.await.unwrap();
        }
        Err(e) => {
            tracing::error!("Server failed to start: {}", e);
        }
    }

    Ok(())
}
