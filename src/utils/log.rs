use crate::utils::config::Config;
use chrono::Local;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::{self, File};
use std::io::Write;
use std::process;

/// One dated log file per day under `logger_dir`. Records never go to the
/// terminal: an interactive prompt and interleaved log lines do not mix.
pub fn init_logger(config: &Config) {
    let level = match &config.logger_level {
        level if level.eq_ignore_ascii_case("error") => LevelFilter::Error,
        level if level.eq_ignore_ascii_case("warn") => LevelFilter::Warn,
        level if level.eq_ignore_ascii_case("info") => LevelFilter::Info,
        level if level.eq_ignore_ascii_case("debug") => LevelFilter::Debug,
        level if level.eq_ignore_ascii_case("trace") => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    let target = match open_log_file(config) {
        Some(file) => Target::Pipe(Box::new(file)),
        None => Target::Stderr,
    };

    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "[PID:{}][{}] {} - {}",
                process::id(),
                record.level(),
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.args()
            )
        })
        .target(target)
        .filter(Some(&config.name), level)
        .filter(None, LevelFilter::Warn)
        .init();

    log::debug!("log level set to {}", level);
}

fn open_log_file(config: &Config) -> Option<File> {
    if let Err(e) = fs::create_dir_all(&config.logger_dir) {
        eprintln!(
            "autosh: cannot create {}: {}",
            config.logger_dir.display(),
            e
        );
        return None;
    }
    let date = Local::now().format("%Y-%m-%d");
    let path = config.logger_dir.join(format!("autosh_{}.log", date));
    match File::options().create(true).append(true).open(&path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("autosh: cannot open {}: {}", path.display(), e);
            None
        }
    }
}
