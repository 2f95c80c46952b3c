use clap::Parser;
use log::info;
use server::network::Server;
use shared::{DEFAULT_PORT, MAX_PEERS};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Maximum number of connected clients
    #[arg(short = 'm', long, default_value_t = MAX_PEERS)]
    max_peers: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let address = format!("{}:{}", args.host, DEFAULT_PORT);

    info!("Starting relay server on {}", address);
    info!("Max peers: {}", args.max_peers);

    let mut server = Server::bind(address.as_str(), args.max_peers).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
