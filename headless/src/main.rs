use std::path::PathBuf;

use clap::{Parser, ValueEnum};

mod config;
mod init;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    Gpu,
    Cpu,
}

#[derive(Parser, Debug)]
#[command(version, about = "Runs the ocean lod system without a window", long_about = None)]
struct Args {
    /// RON config file. Defaults are used when it does not exist.
    #[arg(short, long, default_value = "ocean.ron")]
    config: PathBuf,

    /// Write the effective config back to `--config` and exit.
    #[arg(long)]
    write_config: bool,

    #[arg(short, long, default_value_t = 600)]
    frames: u64,

    #[arg(long, default_value_t = 60.0)]
    fps: f64,

    /// Don't sleep between frames.
    #[arg(long)]
    fast: bool,

    /// Viewer speed in metres per second.
    #[arg(short, long, default_value_t = 8.0)]
    speed: f32,

    /// Viewer height above the sea.
    #[arg(short, long, default_value_t = 12.0)]
    altitude: f32,

    #[arg(short, long, value_enum, default_value_t = ProviderKind::Gpu)]
    provider: ProviderKind,

    /// Frames between surface probes.
    #[arg(short, long, default_value_t = 30)]
    query_every: u64,
}

fn main() {
    let args = Args::parse();

    if args.fps <= 0.0 || args.query_every == 0 {
        eprintln!("Error: fps and query_every must be greater than zero.");
        eprintln!("Got: fps {}, query_every {}", args.fps, args.query_every);
        std::process::exit(1);
    }

    init::init(
        &args.config,
        args.write_config,
        init::RunSettings {
            frames: args.frames,
            fps: args.fps,
            fast: args.fast,
            speed: args.speed,
            altitude: args.altitude,
            provider: args.provider,
            query_every: args.query_every,
        },
    );
}
