use std::str;

use crate::error::TftpError;
use crate::BLOCK_SIZE;

/// Wire error codes this server emits (RFC 1350 §5, appendix).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotDefined = 0,
    FileNotFound = 1,
    IllegalOperation = 4,
    UnknownTransferId = 5,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TftpPacket {
    RRQ { filename: String, mode: String },
    WRQ { filename: String, mode: String },
    DATA { block: u16, data: Vec<u8> },
    ACK(u16),
    ERROR { code: u16, msg: String },
}

impl TftpPacket {
    pub fn error(code: ErrorCode, msg: impl Into<String>) -> Self {
        TftpPacket::ERROR {
            code: code.as_u16(),
            msg: msg.into(),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes: Vec<u8> = vec![0];

        match self {
            TftpPacket::RRQ { filename, mode } | TftpPacket::WRQ { filename, mode } => {
                if let TftpPacket::RRQ { .. } = self {
                    bytes.push(1);
                } else {
                    bytes.push(2);
                }
                bytes.extend(filename.as_bytes());
                bytes.push(0);
                bytes.extend(mode.as_bytes());
                bytes.push(0);
            }
            TftpPacket::DATA { block, data } => {
                bytes.push(3);
                bytes.extend(block.to_be_bytes());
                bytes.extend_from_slice(data);
            }
            TftpPacket::ACK(block) => {
                bytes.push(4);
                bytes.extend(block.to_be_bytes());
            }
            TftpPacket::ERROR { code, msg } => {
                bytes.push(5);
                bytes.extend(code.to_be_bytes());
                bytes.extend_from_slice(msg.as_bytes());
                bytes.push(0);
            }
        }
        bytes
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, TftpError> {
        if buf.len() < 2 {
            return Err(TftpError::MalformedPacket("packet shorter than an opcode"));
        }

        let opcode = u16::from_be_bytes([buf[0], buf[1]]);
        let pkt = match opcode {
            1 | 2 => {
                let filename = read_cstr(&buf[2..])?;
                let mode = read_cstr(&buf[2 + filename.len() + 1..])?;
                // RFC 2347 option pairs may follow; they are not negotiated
                // and are left unparsed.
                if opcode == 1 {
                    TftpPacket::RRQ { filename, mode }
                } else {
                    TftpPacket::WRQ { filename, mode }
                }
            }
            3 => {
                if buf.len() < 4 {
                    return Err(TftpError::MalformedPacket("DATA packet without block number"));
                }
                let block = u16::from_be_bytes([buf[2], buf[3]]);
                let data = buf[4..].to_vec();
                if data.len() > BLOCK_SIZE {
                    return Err(TftpError::MalformedPacket("DATA payload longer than 512 bytes"));
                }

                TftpPacket::DATA { block, data }
            }
            4 => {
                if buf.len() < 4 {
                    return Err(TftpError::MalformedPacket("ACK packet without block number"));
                }
                TftpPacket::ACK(u16::from_be_bytes([buf[2], buf[3]]))
            }
            5 => {
                if buf.len() < 4 {
                    return Err(TftpError::MalformedPacket("ERROR packet without error code"));
                }
                let code = u16::from_be_bytes([buf[2], buf[3]]);
                let msg = read_cstr(&buf[4..])?;

                TftpPacket::ERROR { code, msg }
            }
            _ => {
                return Err(TftpError::MalformedPacket("invalid opcode"));
            }
        };

        Ok(pkt)
    }
}

// 读取以 \0 结尾的 C 风格字符串
fn read_cstr(buf: &[u8]) -> Result<String, TftpError> {
    let pos = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or(TftpError::MalformedPacket("missing cstr terminator"))?;
    let s = str::from_utf8(&buf[..pos])
        .map_err(|_| TftpError::MalformedPacket("invalid cstr encoding"))?
        .to_string();
    Ok(s)
}
