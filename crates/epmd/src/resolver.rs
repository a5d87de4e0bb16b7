use proto::NamesResp;

use crate::{split_node_name, EpmdClient, Error, Tcp, Transport};

/// Resolves the distribution port of `name@host` by asking the epmd on
/// `host`. Each call is a one-shot exchange on its own connection, never
/// routed through an active registration, so concurrent lookups are fine.
pub async fn resolve_port(full_name: &str, epmd_port: u16) -> Result<u16, Error> {
    resolve_port_with(&Tcp, full_name, epmd_port).await
}

pub async fn resolve_port_with<T: Transport>(
    transport: &T,
    full_name: &str,
    epmd_port: u16,
) -> Result<u16, Error> {
    // reject a bad name before touching the network
    let (name, domain) = split_node_name(full_name)?;

    let stream = transport
        .connect(domain, epmd_port)
        .await
        .map_err(Error::Connect)?;

    EpmdClient::new(stream).port_please(name).await
}

/// Lists every node registered at the epmd on `host`.
pub async fn names(host: &str, epmd_port: u16) -> Result<NamesResp, Error> {
    let stream = Tcp.connect(host, epmd_port).await.map_err(Error::Connect)?;

    EpmdClient::new(stream).names().await
}
