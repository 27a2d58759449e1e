use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Duration, Instant};

use crate::error::TftpError;
use crate::packet::{ErrorCode, TftpPacket};
use crate::{BLOCK_SIZE, MAX_PACKET_SIZE};

/// One read transfer to one client, in RFC 1350 lockstep: a single DATA
/// packet in flight, the next one sent only after the matching ACK.
///
/// The session replies through its own ephemeral socket, so the (address,
/// port) pair of `client` is the transfer id. Datagrams from anyone else are
/// answered with error 5 and never touch the transfer state.
pub struct TransferSession {
    socket: UdpSocket,
    client: SocketAddr,
    file: File,
    timeout: Duration,
    max_retries: u8,
}

enum AckOutcome {
    /// ACK for the in-flight block.
    Acked,
    /// ACK from the right client with the wrong block number. Duplicate or
    /// out of order; the current block gets retransmitted.
    Stale,
    TimedOut,
}

impl TransferSession {
    pub fn new(
        socket: UdpSocket,
        client: SocketAddr,
        file: File,
        timeout: Duration,
        max_retries: u8,
    ) -> Self {
        Self {
            socket,
            client,
            file,
            timeout,
            max_retries,
        }
    }

    /// Drives the transfer to a terminal state and returns the bytes sent.
    ///
    /// A file whose size is an exact multiple of 512 (zero included) still
    /// ends with one empty DATA block, since only a short block tells the
    /// client the transfer is over.
    pub async fn run(mut self) -> Result<u64, TftpError> {
        let mut block: u16 = 1;
        let mut total: u64 = 0;
        let mut buf = vec![0u8; BLOCK_SIZE];

        loop {
            let size = self.fill_block(&mut buf)?;
            total += size as u64;
            let pkt = TftpPacket::DATA {
                block,
                data: buf[..size].to_vec(),
            };
            self.send_block(&pkt.serialize(), block).await?;

            if size < BLOCK_SIZE {
                return Ok(total);
            }
            block = block.wrapping_add(1);
        }
    }

    // File::read may return short for reasons other than EOF, and a short
    // mid-transfer block would end the transfer early on the client side.
    fn fill_block(&mut self, buf: &mut [u8]) -> Result<usize, TftpError> {
        let mut size = 0;
        while size < buf.len() {
            let n = self.file.read(&mut buf[size..])?;
            if n == 0 {
                break;
            }
            size += n;
        }
        Ok(size)
    }

    /// Sends one DATA packet and waits for its ACK, retransmitting the same
    /// bytes on timeout or stale ACK. The retry budget caps the total number
    /// of transmissions.
    async fn send_block(&mut self, pkt: &[u8], block: u16) -> Result<(), TftpError> {
        let mut attempts: u8 = 0;
        loop {
            self.socket.send_to(pkt, self.client).await?;
            attempts += 1;

            let deadline = Instant::now() + self.timeout;
            match self.await_ack(block, deadline).await? {
                AckOutcome::Acked => return Ok(()),
                AckOutcome::Stale => {
                    tracing::debug!(block, "stale ack, retransmitting");
                }
                AckOutcome::TimedOut => {
                    tracing::debug!(block, attempts, "ack timeout");
                }
            }
            if attempts >= self.max_retries {
                return Err(TftpError::NoResponse(attempts));
            }
        }
    }

    async fn await_ack(&mut self, block: u16, deadline: Instant) -> Result<AckOutcome, TftpError> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        loop {
            let (num, addr) = match timeout_at(deadline, self.socket.recv_from(&mut buf)).await {
                Ok(received) => received?,
                Err(_) => return Ok(AckOutcome::TimedOut),
            };

            if addr != self.client {
                self.reject_foreign(addr).await;
                continue;
            }

            return match TftpPacket::deserialize(&buf[..num]) {
                Ok(TftpPacket::ACK(ack)) if ack == block => Ok(AckOutcome::Acked),
                Ok(TftpPacket::ACK(_)) => Ok(AckOutcome::Stale),
                _ => {
                    let error =
                        TftpPacket::error(ErrorCode::IllegalOperation, "Expected ACK packet");
                    if let Err(err) = self.socket.send_to(&error.serialize(), self.client).await {
                        tracing::warn!(client = %self.client, error = %err, "cannot send error reply");
                    }
                    Err(TftpError::IllegalReply("expected ACK packet"))
                }
            };
        }
    }

    /// Someone else guessed our port. Tell them off with error 5 and keep
    /// waiting for the real client on the same deadline; neither the intruder
    /// nor a failure to reply to it may end the transfer.
    async fn reject_foreign(&self, addr: SocketAddr) {
        tracing::warn!(%addr, client = %self.client, "datagram from foreign client");
        let error = TftpPacket::error(ErrorCode::UnknownTransferId, "Unknown transfer ID");
        if let Err(err) = self.socket.send_to(&error.serialize(), addr).await {
            tracing::warn!(%addr, error = %err, "cannot send error to foreign client");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Spoofed-source datagrams can leave us with a reply address that
    // send_to refuses (255.255.255.255 fails with EACCES without
    // SO_BROADCAST). The session must shrug that off.
    #[tokio::test]
    async fn undeliverable_foreign_reject_is_swallowed() {
        let socket = UdpSocket::bind("0.0.0.0:0").await.unwrap();
        let file = tempfile::tempfile().unwrap();
        let client: SocketAddr = "127.0.0.1:1069".parse().unwrap();
        let session = TransferSession::new(
            socket,
            client,
            file,
            Duration::from_millis(100),
            1,
        );

        let spoofed: SocketAddr = "255.255.255.255:9999".parse().unwrap();
        session.reject_foreign(spoofed).await;
    }
}
