// Camera → network → display loop.
// • Default: frame-difference detection, boxes drawn over the live feed.
// • --segment: class overlay and mask side by side in one window.
// • Close the window or hold ESC to quit.

use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;
use log::{error, info};

use camseg::config::Args;
use camseg::pipeline::Session;
use camseg::{video, Result};

fn run() -> Result<()> {
    let config = Args::parse().into_config()?;

    /* --- Source, sink and network ---
       The window opens on the first rendered frame. */
    let mut source = video::open_source(&config.input, config.width, config.height)?;
    let mut sink = video::open_sink(&config.output, config.mode.network())?;
    let mut session = Session::new(&config)?;

    /* --- Main loop --- */
    let summary = session.run(source.as_mut(), sink.as_mut())?;
    info!(
        "finished after {} frames ({} buffer allocations)",
        summary.frames, summary.allocations
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
