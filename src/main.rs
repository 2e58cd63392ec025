// src/main.rs

use cronguard::{cli, logging, run};

fn main() {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("cronguard error: {err:?}");
        std::process::exit(2);
    }

    match run(args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("cronguard error: {err}");
            std::process::exit(err.exit_code());
        }
    }
}
