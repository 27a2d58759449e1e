mod cli;
mod error;
mod packet;
mod resolve;
mod server;
mod session;

pub use crate::cli::Cli;
pub use crate::error::TftpError;
pub use crate::packet::{ErrorCode, TftpPacket};
pub use crate::resolve::resolve;
pub use crate::server::Server;
pub use crate::session::TransferSession;

pub const BLOCK_SIZE: usize = 512; // RFC 1350
pub const MAX_PACKET_SIZE: usize = BLOCK_SIZE + 4;

pub const DEF_TIMEOUT_MS: u64 = 1000;
pub const MAX_RETRY_COUNT: u8 = 3;
pub const IDLE_WAIT_SEC: u64 = 5;
