use thiserror::Error;

use crate::packet::ErrorCode;

/// Everything that can end a request or a transfer early. All of these are
/// session-local: the listening loop keeps running whichever one fires.
#[derive(Debug, Error)]
pub enum TftpError {
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("cannot build a path under the server root from {0:?}")]
    PathError(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("no response from client after {0} attempts")]
    NoResponse(u8),

    #[error("illegal reply from client: {0}")]
    IllegalReply(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TftpError {
    /// Wire error code to answer the offending peer with, if any. `None`
    /// means the session dies silently (logged, no packet).
    pub fn reply_code(&self) -> Option<ErrorCode> {
        match self {
            TftpError::MalformedPacket(_) | TftpError::UnsupportedOperation(_) => {
                Some(ErrorCode::IllegalOperation)
            }
            TftpError::PathError(_) | TftpError::FileNotFound(_) => Some(ErrorCode::FileNotFound),
            TftpError::NoResponse(_) | TftpError::IllegalReply(_) | TftpError::Io(_) => None,
        }
    }
}
