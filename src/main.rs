use clap::Parser;
use transcript_parser::commands::{run, Cli};
use transcript_parser::{config, init_tracing};

fn main() {
    let cli = Cli::parse();
    init_tracing();
    tracing::debug!("{} v{}", config::APP_NAME, config::APP_VERSION);

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
