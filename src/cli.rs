use std::{env, path::PathBuf};

use clap::{ArgAction, Parser};

pub const NAME: &str = "syscap-replay";

#[derive(Parser, Debug, Clone)]
#[clap(name = NAME)]
#[clap(about = "Decode a capture of syscall records and apply thread suppression")]
#[clap(version = crate::metadata::VERSION)]
pub struct ReplayOpts {
    /// File holding concatenated records
    pub capture: PathBuf,

    /// INI file with a `[suppression]` section
    #[clap(long)]
    pub config_file: Option<PathBuf>,

    /// Command names to suppress, on top of the configuration
    #[clap(long = "suppress-comm", value_name = "COMM")]
    pub suppressed_comms: Vec<String>,

    /// Load the lineage of the threads running on this machine
    #[clap(long)]
    pub scan_procfs: bool,

    /// Print suppressed records too
    #[clap(long)]
    pub show_suppressed: bool,

    /// Pass many times for a more verbose output. Passing `-v` adds debug logs, `-vv` enables trace logging
    #[clap(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl ReplayOpts {
    pub fn override_log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

fn show_backtrace() -> bool {
    if log::max_level() >= log::LevelFilter::Debug {
        return true;
    }

    matches!(env::var("RUST_BACKTRACE").as_deref(), Ok("1"))
}

pub fn report_error(e: &anyhow::Error) {
    if show_backtrace() {
        log::error!("{:?}", e);
    } else {
        log::error!("{:#}", e);
    }
}
