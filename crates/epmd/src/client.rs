use byteorder::{BigEndian, ByteOrder};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use proto::{AliveResp, Encoder, Len, NamesReq, NamesResp, Port2Resp, PortPleaseReq, PORT2_RESP};

use crate::{read_error, Error, NodeIdentity, Tcp, Transport};

/// One connection to an epmd instance. Every exchange is a single request
/// followed by a single reply; epmd never interleaves replies on one
/// connection.
#[derive(Debug)]
pub struct EpmdClient<T = TcpStream> {
    stream: T,
}

impl EpmdClient<TcpStream> {
    pub async fn connect(host: &str, port: u16) -> Result<Self, Error> {
        let stream = Tcp.connect(host, port).await.map_err(Error::Connect)?;
        Ok(Self::new(stream))
    }
}

impl<T> EpmdClient<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: T) -> Self {
        Self { stream }
    }

    /// Registers the node and returns the creation epmd assigned. The
    /// registration only lasts while this client's connection stays open;
    /// dropping the client unregisters the name.
    pub async fn register_node(&mut self, identity: &NodeIdentity) -> Result<u16, Error> {
        let req = identity.alive_req();
        let mut buf = Vec::with_capacity(2 + req.len());
        req.encode(&mut buf)?;
        self.stream.write_all(&buf).await?;

        let mut resp = [0u8; AliveResp::LEN];
        self.stream
            .read_exact(&mut resp)
            .await
            .map_err(read_error)?;

        let creation = AliveResp::decode(&resp)?.creation()?;
        Ok(creation)
    }

    /// Resolves the distribution port of a node registered at this epmd.
    pub async fn port_please(&mut self, name: &str) -> Result<u16, Error> {
        let req = PortPleaseReq {
            name: name.to_string(),
        };
        let mut buf = Vec::with_capacity(2 + req.len());
        req.encode(&mut buf)?;
        self.stream.write_all(&buf).await?;

        let mut resp = [0u8; 4];
        self.stream
            .read_exact(&mut resp[..Port2Resp::HEADER_LEN])
            .await
            .map_err(read_error)?;

        // the port follows only on success
        let n = if resp[0] == PORT2_RESP && resp[1] == 0 {
            self.stream
                .read_exact(&mut resp[Port2Resp::HEADER_LEN..4])
                .await
                .map_err(read_error)?;
            4
        } else {
            Port2Resp::HEADER_LEN
        };

        let port = Port2Resp::decode(&resp[..n])?.port()?;
        Ok(port)
    }

    /// Lists every node registered at this epmd.
    pub async fn names(&mut self) -> Result<NamesResp, Error> {
        let mut buf = Vec::with_capacity(2 + NamesReq.len());
        NamesReq.encode(&mut buf)?;
        self.stream.write_all(&buf).await?;

        let mut head = [0u8; 4];
        self.stream
            .read_exact(&mut head)
            .await
            .map_err(read_error)?;
        let epmd_port = BigEndian::read_u32(&head);

        let mut text = Vec::new();
        self.stream.read_to_end(&mut text).await?;

        Ok(NamesResp::parse(epmd_port, &text))
    }

    /// Blocks until the peer closes the stream. Epmd sends nothing after a
    /// successful ALIVE2 exchange, so any byte that arrives here is a
    /// protocol violation.
    pub(crate) async fn monitor(&mut self) -> Error {
        let mut byte = [0u8; 1];
        match self.stream.read(&mut byte).await {
            Ok(0) => Error::ConnectionClosed,
            Ok(_) => Error::UnexpectedMessage(byte[0]),
            Err(err) => read_error(err),
        }
    }
}
