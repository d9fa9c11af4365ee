//! deploy - combi oven software update and rollback
//!
//! Exit codes: 0 on success (the device reboots), 1 on any failure.

use clap::Parser;

use deploy_common::EXIT_FAILURE;
use deployctl::cli::{self, Cli};
use deployctl::{commands, logging};

fn main() {
    logging::init();

    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            std::process::exit(cli::parse_exit_code(&e));
        }
    };

    let code = match commands::execute(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}
