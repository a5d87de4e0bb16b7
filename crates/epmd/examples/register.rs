use epmd::{get_short_hostname, NodeIdentity, Registration, DEFAULT_EPMD_PORT};

#[tokio::main]
async fn main() -> Result<(), epmd::Error> {
    tracing_subscriber::fmt::init();

    let name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "rust_node".to_string());
    let full_name = format!("{}@{}", name, get_short_hostname());

    let identity = NodeIdentity::new(full_name, 30000, DEFAULT_EPMD_PORT, false)?;
    let handle = Registration::spawn(identity);

    tokio::signal::ctrl_c().await?;

    handle.stop();
    handle.stopped().await;
    Ok(())
}
