use tracing::info;
use typed_rpc::{build_app, config::Config, logging};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let bind_socket = config.bind_socket()?;
    let app = build_app(&config.mount_path)?;
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        mount_path = %config.mount_path,
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
