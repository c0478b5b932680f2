use std::process::ExitCode;

use clap::Parser;
use log::{debug, error, info};

use vr_video_player::config::Cli;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // help and version are not failures
            if let Err(print_err) = e.print() {
                debug!("failed to print usage: {print_err}");
            }
            return if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
        }
    };

    let config = cli.resolve();
    info!(
        "vr-video-player {} starting, window {:#x}",
        env!("CARGO_PKG_VERSION"),
        config.window_id
    );

    match vr_video_player::run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
