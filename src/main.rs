#![forbid(unsafe_code)]

//! embiggen-disk CLI entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let args = cli_app::normalize_args(std::env::args_os());
    let cli = match cli_app::Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };
    if let Err(e) = cli_app::run(&cli) {
        eprintln!("embiggen-disk: {e}");
        std::process::exit(e.exit_code());
    }
}
