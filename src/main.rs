use clap::Parser;
use tasker::cli::{self, Cli};

fn main() {
    tasker::logging::init();

    let cli = Cli::parse();
    if let Err(err) = cli::run(cli) {
        eprintln!("{}", cli::format_error(&err));
        std::process::exit(err.exit_code());
    }
}
