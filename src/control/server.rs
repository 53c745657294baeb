use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{Command, ControlError};
use crate::scheduler::Scheduler;

/// Upper bound on one encoded command.
pub const MAX_COMMAND_BYTES: usize = 64 * 1024;

/// Pause after a failed `accept` so a persistent error (fd exhaustion) does
/// not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// TCP listener that applies control commands to a [`Scheduler`].
///
/// Each connection is handled on its own task; at most `max_workers` run at
/// once and further connections wait in the listen backlog.
pub struct ControlEndpoint {
    listener: TcpListener,
    scheduler: Arc<Scheduler>,
    workers: Arc<Semaphore>,
    read_timeout: Duration,
}

impl ControlEndpoint {
    pub async fn bind(
        addr: impl ToSocketAddrs,
        scheduler: Arc<Scheduler>,
        max_workers: usize,
        read_timeout: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            scheduler,
            workers: Arc::new(Semaphore::new(max_workers.max(1))),
            read_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the task is dropped.
    pub async fn run(self) {
        if let Ok(addr) = self.local_addr() {
            info!(%addr, "control endpoint listening");
        }

        loop {
            let Ok(permit) = self.workers.clone().acquire_owned().await else {
                break;
            };

            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("accept failed: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };
            debug!(%peer, "control connection");

            let scheduler = self.scheduler.clone();
            let read_timeout = self.read_timeout;
            tokio::spawn(async move {
                handle_connection(stream, peer, &scheduler, read_timeout).await;
                drop(permit);
            });
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    scheduler: &Scheduler,
    read_timeout: Duration,
) {
    match read_command(&mut stream, read_timeout).await {
        Ok(command) => {
            let (kind, number) = (command.kind, command.resource.number);
            debug!(%peer, ?kind, resource = number, "executing command");
            if let Err(e) = command.execute(scheduler) {
                warn!(%peer, ?kind, resource = number, "command failed: {e}");
            }
        }
        Err(e) => warn!(%peer, "discarding connection: {e}"),
    }

    if let Err(e) = stream.shutdown().await {
        debug!(%peer, "could not close control connection: {e}");
    }
}

/// Read one newline- or EOF-terminated command from `reader`.
async fn read_command<R>(reader: R, timeout: Duration) -> Result<Command, ControlError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader.take(MAX_COMMAND_BYTES as u64 + 1));
    let mut buf = Vec::new();

    tokio::time::timeout(timeout, reader.read_until(b'\n', &mut buf))
        .await
        .map_err(|_| ControlError::Timeout)??;

    if buf.len() > MAX_COMMAND_BYTES && buf.last() != Some(&b'\n') {
        return Err(ControlError::TooLarge);
    }
    Command::decode(&buf)
}
