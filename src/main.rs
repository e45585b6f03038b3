mod capability;
mod command;
mod ffmpeg;
mod ffprobe;
mod outcome;
mod params;
mod pptx;
mod process;
mod scale;
mod temporary;

use anyhow::anyhow;
use clap::Parser;
use tokio::signal;

#[derive(Parser)]
#[clap(version, about)]
struct Args {
    #[command(flatten)]
    compress: command::compress::Args,

    /// Keep temporary files after exiting.
    #[arg(long)]
    keep: bool,

    #[command(flatten)]
    verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::WarnLevel>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    let out = tokio::select! {
        r = command::compress(args.compress) => r,
        _ = signal::ctrl_c() => Err(anyhow!("ctrl_c")),
    };

    if !args.keep {
        temporary::clean().await;
    }

    out
}
