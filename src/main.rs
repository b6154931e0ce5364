use clap::Parser;
use mabis_calc::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
