use clap::Parser;
use client::input::InputManager;
use client::network::{resolve_server, Client};
use client::rendering::{RenderConfig, Renderer};
use client::ClientError;
use log::{error, info};
use macroquad::prelude::*;
use shared::{DEFAULT_SERVER_HOST, SERVER_HOST_ENV};

const WINDOW_WIDTH: usize = 800;
const WINDOW_HEIGHT: usize = 600;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host to connect to
    #[arg(short = 's', long, env = SERVER_HOST_ENV, default_value = DEFAULT_SERVER_HOST)]
    server: String,

    /// Display name announced to other players
    #[arg(short = 'n', long)]
    name: Option<String>,
}

fn window_conf() -> Conf {
    Conf {
        window_title: "Birth client".to_owned(),
        window_width: WINDOW_WIDTH as i32,
        window_height: WINDOW_HEIGHT as i32,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let addr = resolve_server(&args.server)?;

    info!("Connecting to: {}", addr);
    info!("Controls: W/S to move, A/D to strafe, Q/E to turn, Shift to sprint");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let mut client = runtime.block_on(Client::connect(addr, args.name.as_deref()))?;
    let mut input = InputManager::new();
    let mut renderer = Renderer::new(WINDOW_WIDTH, WINDOW_HEIGHT);

    loop {
        if input.quit_pressed() {
            break;
        }

        let sample = input.sample();
        match runtime.block_on(client.update(sample, get_frame_time())) {
            Ok(()) => {}
            Err(ClientError::Disconnected) => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        renderer.render(
            client.world(),
            RenderConfig {
                local_id: client.world().local_id,
                rtt_ms: client.rtt_ms(),
            },
        );

        next_frame().await;
    }

    runtime.block_on(client.shutdown())?;
    Ok(())
}
