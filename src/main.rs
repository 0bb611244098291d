use std::path::PathBuf;
use std::process;

use log::debug;

use crate::shell::script::run_script;
use crate::shell::Shell;
use crate::utils::config::Config;
use crate::utils::log::init_logger;

mod shell;
mod utils;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::new();
    init_logger(&config);
    debug!("configuration loaded");

    // `autosh <file.ash>` runs a script; no argument starts the REPL.
    if let Some(arg) = std::env::args().nth(1) {
        let status = run_script(&PathBuf::from(arg))?;
        process::exit(status);
    }

    let mut shell = Shell::new(&config)?;
    shell.run()
}
