use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::codec::Codec;
use crate::error::Result;
use crate::transport::TcpTransportBuilder;

/// Perform a one-off TCP request/response
///
/// Opens a connection, sends the request, receives the response, and closes the connection.
pub async fn request_tcp<Req, Res, C>(addr: SocketAddr, request: &Req, codec: C) -> Result<Res>
where
    Req: Serialize,
    Res: for<'de> Deserialize<'de>,
    C: Codec,
{
    let builder = TcpTransportBuilder::new().address(addr);
    request_with(builder, request, codec).await
}

/// Perform a one-off request/response over a configured transport
pub async fn request_with<Req, Res, C>(
    builder: TcpTransportBuilder,
    request: &Req,
    codec: C,
) -> Result<Res>
where
    Req: Serialize,
    Res: for<'de> Deserialize<'de>,
    C: Codec,
{
    let mut channel = Channel::connect(builder, codec).await?;
    channel.send(request).await?;
    let response = channel.receive().await?;
    channel.close().await?;
    Ok(response)
}
