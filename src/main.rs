use clap::Parser;
use syscap::cli::{self, ReplayOpts};

fn main() {
    let opts = ReplayOpts::parse();

    syscap::init_logger(Some(opts.override_log_level()));

    match syscap::replay::run_replay(&opts) {
        Ok(stats) if stats.decode_errors() == 0 => std::process::exit(0),
        Ok(stats) => {
            log::warn!("{} records failed to decode", stats.decode_errors());
            std::process::exit(2);
        }
        Err(e) => {
            cli::report_error(&e);
            std::process::exit(1);
        }
    }
}
