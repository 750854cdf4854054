mod analytics;
mod cli;
mod collection;
mod config;
mod database;
mod error;
mod pool;
mod prices;
mod releases;
mod remote;
mod reports;
mod retry;
mod schema;
mod sync;
mod wants;

use directories::ProjectDirs;
use flexi_logger::Logger;
use log::error;

use crate::cli::Cli;
use crate::config::Config;

fn main() {
    let Some(project_dirs) = ProjectDirs::from("", "", "waxpulse") else {
        eprintln!("Unable to determine the platform data directory");
        std::process::exit(1);
    };

    let config = Config::load_config(&project_dirs);

    // Dependencies stay at warn; the configured level applies to this crate
    let log_spec = format!("warn, waxpulse={}", config.logging.waxpulse);
    let _logger = match Logger::try_with_str(&log_spec) {
        Ok(logger) => logger.start().ok(),
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    if let Err(err) = Cli::handle_command_line(&config) {
        error!("{:?}", err);
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
