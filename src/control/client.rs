use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, ToSocketAddrs};

use super::Command;

/// Send one command to a running control endpoint.
///
/// Fire-and-forget: the server sends nothing back, so success only means
/// the command was delivered.
pub async fn send_command(addr: impl ToSocketAddrs, command: &Command) -> Result<()> {
    let mut stream = TcpStream::connect(addr)
        .await
        .context("connecting to control endpoint")?;
    stream.write_all(&command.encode()?).await?;
    stream.shutdown().await?;
    Ok(())
}
