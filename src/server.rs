use std::fs::{self, File};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use tokio::net::UdpSocket;
use tokio::task;
use tokio::time::{timeout, Duration, Instant};

use crate::error::TftpError;
use crate::packet::{ErrorCode, TftpPacket};
use crate::resolve::resolve;
use crate::session::TransferSession;
use crate::{IDLE_WAIT_SEC, MAX_PACKET_SIZE};

/// The listening loop and per-request dispatcher.
///
/// Every accepted read request gets its own task and its own ephemeral reply
/// socket, so transfers do not serialize behind one another and the listening
/// socket only ever sees fresh requests.
pub struct Server {
    socket: UdpSocket,
    root: PathBuf,
    timeout: Duration,
    max_retries: u8,
}

impl Server {
    pub fn new(socket: UdpSocket, root: PathBuf, timeout: Duration, max_retries: u8) -> Self {
        Self {
            socket,
            root,
            timeout,
            max_retries,
        }
    }

    pub async fn run(&self) -> io::Result<()> {
        tracing::info!(
            addr = %self.socket.local_addr()?,
            root = %self.root.display(),
            timeout_ms = self.timeout.as_millis() as u64,
            retries = self.max_retries,
            "TFTP server listening"
        );

        let mut buf = [0u8; MAX_PACKET_SIZE];
        loop {
            let wait = Duration::from_secs(IDLE_WAIT_SEC);
            let (num, addr) = match timeout(wait, self.socket.recv_from(&mut buf)).await {
                Ok(Ok(received)) => received,
                Ok(Err(err)) => {
                    // Transient per-datagram failures (ICMP-induced errors,
                    // truncation) must not take the listening loop down.
                    tracing::error!(error = %err, "recv on listening socket failed");
                    continue;
                }
                Err(_) => {
                    tracing::info!("no request in {IDLE_WAIT_SEC} seconds");
                    continue;
                }
            };
            self.dispatch(&buf[..num], addr).await;
        }
    }

    /// Classifies one inbound datagram on the listening socket. Anything but
    /// a read request is answered with an error packet and dropped.
    async fn dispatch(&self, datagram: &[u8], addr: SocketAddr) {
        let pkt = match TftpPacket::deserialize(datagram) {
            Ok(pkt) => pkt,
            Err(err) => return self.reject(addr, err).await,
        };

        match pkt {
            TftpPacket::RRQ { filename, mode } => self.handle_rrq(filename, mode, addr).await,
            TftpPacket::WRQ { .. } => {
                self.reject(addr, TftpError::UnsupportedOperation("WRQ on a read-only server"))
                    .await
            }
            _ => {
                self.reject(addr, TftpError::UnsupportedOperation("expected a request packet"))
                    .await
            }
        }
    }

    async fn handle_rrq(&self, filename: String, mode: String, addr: SocketAddr) {
        tracing::info!(%addr, %filename, %mode, "read request");

        let path = match resolve(&filename, &self.root) {
            Ok(path) => path,
            Err(err) => return self.reject(addr, err).await,
        };
        // Mode is accepted as-is: no netascii translation, octet semantics
        // for everything.
        let filesize = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return self.reject(addr, TftpError::FileNotFound(filename)).await,
        };
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(_) => return self.reject(addr, TftpError::FileNotFound(filename)).await,
        };

        let timeout = self.timeout;
        let max_retries = self.max_retries;
        task::spawn(async move {
            let start = Instant::now();
            let socket = match UdpSocket::bind(reply_bind_addr(addr)).await {
                Ok(socket) => socket,
                Err(err) => {
                    tracing::error!(%addr, error = %err, "cannot bind reply socket");
                    return;
                }
            };

            let session = TransferSession::new(socket, addr, file, timeout, max_retries);
            match session.run().await {
                Ok(sent) => {
                    let cost = start.elapsed();
                    tracing::info!(
                        %addr,
                        %filename,
                        sent,
                        "transfer complete, cost: {:.3}s, speed: {:.2} MB/s",
                        cost.as_secs_f64(),
                        filesize as f64 / cost.as_secs_f64() / 1024.0 / 1024.0
                    );
                }
                Err(err) => {
                    tracing::warn!(%addr, %filename, error = %err, "transfer failed");
                }
            }
        });
    }

    /// Logs a rejected request and answers it with the matching error packet,
    /// if the taxonomy maps it to one. A failed reply send (a spoofed or
    /// otherwise unroutable source address) is the peer's loss, not ours:
    /// it is logged and the listening loop keeps going.
    async fn reject(&self, addr: SocketAddr, err: TftpError) {
        tracing::warn!(%addr, error = %err, "request rejected");
        if let Some(code) = err.reply_code() {
            let msg = match code {
                ErrorCode::IllegalOperation => "Illegal TFTP operation".to_string(),
                _ => err.to_string(),
            };
            let error = TftpPacket::error(code, msg);
            if let Err(err) = self.socket.send_to(&error.serialize(), addr).await {
                tracing::warn!(%addr, error = %err, "cannot send error reply");
            }
        }
    }
}

// The reply socket has to match the client's address family.
fn reply_bind_addr(client: SocketAddr) -> SocketAddr {
    match client {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A datagram can carry a source address we cannot send to, e.g. a
    // spoofed 255.255.255.255 (send_to fails with EACCES without
    // SO_BROADCAST). The reply failure stays inside the dispatcher.
    #[tokio::test]
    async fn undeliverable_error_reply_does_not_kill_the_dispatcher() {
        let socket = UdpSocket::bind("0.0.0.0:0").await.unwrap();
        let server = Server::new(socket, PathBuf::from("."), Duration::from_millis(100), 1);
        let spoofed: SocketAddr = "255.255.255.255:9999".parse().unwrap();

        server.dispatch(b"\x00\x09junk", spoofed).await;
        let wrq = TftpPacket::WRQ {
            filename: "upload.bin".to_string(),
            mode: "octet".to_string(),
        };
        server.dispatch(&wrq.serialize(), spoofed).await;
        server.dispatch(&TftpPacket::ACK(1).serialize(), spoofed).await;
    }
}
