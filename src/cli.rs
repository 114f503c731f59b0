use clap::Parser;
use std::path::PathBuf;

/// liquidd: monitoring daemon for NZXT Smart Device V2 class fan controllers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML config file path (default: $LIQUIDD_CONFIG, XDG config dir, /etc/liquidd/config.yml)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Detach from the terminal and run in the background
    #[arg(short = 'd', long = "daemonize", default_value = "false")]
    pub daemonize: bool,

    /// Log at debug level regardless of the configured level
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    pub verbose: bool,
}
