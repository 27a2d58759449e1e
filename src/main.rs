use anyhow::Context;
use clap::Parser;
use tokio::net::UdpSocket;
use tokio::time::Duration;

use tftpd::Cli;
use tftpd::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    tracing_subscriber::fmt::init();

    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("server root {} is not usable", args.root.display()))?;
    anyhow::ensure!(root.is_dir(), "server root {} is not a directory", root.display());

    let socket = UdpSocket::bind((args.ip, args.port))
        .await
        .with_context(|| format!("cannot bind {}:{}", args.ip, args.port))?;

    let server = Server::new(
        socket,
        root,
        Duration::from_millis(args.timeout),
        args.retry,
    );
    server.run().await?;
    Ok(())
}
