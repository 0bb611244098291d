use std::error::Error;
use std::io::Write;

use colored::Colorize;
use log::{debug, warn};

use crate::shell::executor::Executor;
use crate::shell::parser::{parse, tokenize};
use crate::shell::readline::{ReadlineError, ReadlineManager};
use crate::shell::signals;
use crate::utils::config::Config;

pub struct Shell<'a> {
    readline: ReadlineManager<'a>,
    executor: Executor,
}

impl<'a> Shell<'a> {
    pub fn new(config: &'a Config) -> Result<Self, Box<dyn Error>> {
        Ok(Self {
            readline: ReadlineManager::new(config)?,
            executor: Executor::new(),
        })
    }

    pub fn run(&mut self) -> Result<(), Box<dyn Error>> {
        debug!("starting interactive session");

        signals::install_interactive_handlers();
        self.readline.load_history();

        println!("{}", "autosh - type 'exit' to leave".bold());

        self.run_loop()?;
        self.readline.save_history();

        debug!("session closed");
        Ok(())
    }

    fn run_loop(&mut self) -> Result<(), Box<dyn Error>> {
        loop {
            std::io::stdout().flush()?;
            // Collect state changes of background jobs before drawing the
            // prompt, so the listing shown by `jobs` is current.
            self.executor.ctx.jobs.reap();

            match self.readline.readline(&self.prompt()) {
                Ok(line) => self.handle_input(&line),
                Err(ReadlineError::Eof) => {
                    println!("exit");
                    break;
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl-C cancels the pending line, never the shell.
                    continue;
                }
                Err(err) => {
                    warn!("readline: {}", err);
                    eprintln!("autosh: {}", err);
                    break;
                }
            }
        }
        Ok(())
    }

    fn prompt(&self) -> String {
        let marker = if self.executor.ctx.last_status == 0 {
            "$".green()
        } else {
            "$".red()
        };
        format!("autosh {} ", marker)
    }

    fn handle_input(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        self.readline.add_history(line.to_string());

        let ast = parse(&tokenize(line));
        let status = self.executor.run(&ast);
        debug!("line finished with status {}", status);
    }
}
