//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use std::error::Error;
use std::process::ExitCode;

use log::error;
use nuisance_cli::CliError;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match nuisance_cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => {
            let root: &(dyn Error + 'static) = &err;
            let chain: Vec<String> = std::iter::successors(Some(root), |&current| current.source())
                .map(ToString::to_string)
                .collect();
            error!("nuisance: {}", chain.join(": "));
            ExitCode::FAILURE
        }
    }
}
