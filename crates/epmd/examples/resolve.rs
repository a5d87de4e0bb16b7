use epmd::{resolve_port, DEFAULT_EPMD_PORT};

#[tokio::main]
async fn main() -> Result<(), epmd::Error> {
    let name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "rust_node@localhost".to_string());

    let port = resolve_port(&name, DEFAULT_EPMD_PORT).await?;
    println!("{} listens on port {}", name, port);

    Ok(())
}
