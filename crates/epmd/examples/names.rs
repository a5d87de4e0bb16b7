use epmd::{names, DEFAULT_EPMD_PORT};

#[tokio::main]
async fn main() -> Result<(), epmd::Error> {
    let host = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "localhost".to_string());

    let resp = names(&host, DEFAULT_EPMD_PORT).await?;
    println!("epmd at port {}", resp.epmd_port);
    for node in resp.nodes {
        println!("name {} at port {}", node.name, node.port);
    }

    Ok(())
}
