use influxdb::InfluxDbProvider;
use tfplug::ServerConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = ServerConfig::default();

    // stdout carries the plugin handshake
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::from(config.log_level))
        .with_ansi(false)
        .init();

    tfplug::serve(InfluxDbProvider::new(), config).await?;

    Ok(())
}
