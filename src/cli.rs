use anstyle::AnsiColor;
use clap::builder::styling::Styles;
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::{DEF_TIMEOUT_MS, MAX_RETRY_COUNT};

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default())
    .usage(AnsiColor::Green.on_default())
    .literal(AnsiColor::Cyan.on_default())
    .placeholder(AnsiColor::Red.on_default());

#[derive(Parser, Debug)]
#[command(name = "tftpd")]
#[command(about = "A read-only TFTP server", long_about = None)]
#[command(styles = STYLES)]
pub struct Cli {
    /// Listen port
    pub port: u16,

    /// Server root directory
    pub root: PathBuf,

    /// Listen ip
    #[arg(short, long, default_value = "0.0.0.0")]
    pub ip: IpAddr,

    /// Ack timeout (ms)
    #[arg(short, long, default_value_t = DEF_TIMEOUT_MS)]
    pub timeout: u64,

    /// Max transmissions per block
    #[arg(short, long, default_value_t = MAX_RETRY_COUNT)]
    pub retry: u8,
}
