use clap::Parser;
use rrsweep::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
