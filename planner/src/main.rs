use std::{io, path::PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use planner::{
    app,
    arm::{DryRunTransport, SerialTransport, Transport},
    config::Config,
    moves::{Choreographer, MoveRequest},
};

/// Moves chess pieces on the physical board with the arm and gripper.
#[derive(Parser, Debug)]
#[command(name = "planner", version)]
struct Cli {
    /// TOML file with serial ports, calibration and timing.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the arm's serial device.
    #[arg(long)]
    robot_port: Option<String>,

    /// Overrides the gripper's serial device.
    #[arg(long)]
    gripper_port: Option<String>,

    /// Log the commands instead of sending them.
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read moves from the terminal until `q` (the default).
    Shell,
    /// Play a single move and exit.
    Move {
        /// e.g. e2e4
        notation: String,
        /// The target square holds a piece that goes into the box first.
        #[arg(long)]
        capture: bool,
        /// King move of a castle; the rook is moved as well.
        #[arg(long, conflicts_with = "capture")]
        castle: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("planner=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(port) = cli.robot_port {
        config.serial.robot_port = port;
    }
    if let Some(port) = cli.gripper_port {
        config.serial.gripper_port = port;
    }

    let transport: Box<dyn Transport> = if cli.dry_run {
        Box::new(DryRunTransport::new())
    } else {
        Box::new(SerialTransport::open(&config.serial).context("opening serial links")?)
    };
    let mut choreographer = Choreographer::new(transport, &config);

    match cli.command.unwrap_or(Commands::Shell) {
        Commands::Shell => app::run(&mut choreographer, io::stdin().lock(), io::stdout()),
        Commands::Move {
            notation,
            capture,
            castle,
        } => {
            let parsed: MoveRequest = notation.parse()?;
            let request = MoveRequest::new(parsed.start, parsed.end, capture, castle)?;
            choreographer
                .execute(request)
                .with_context(|| format!("playing {request}"))
        }
    }
}
