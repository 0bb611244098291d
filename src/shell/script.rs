use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use log::debug;

use crate::shell::executor::Executor;
use crate::shell::parser::{parse, tokenize};
use crate::shell::signals;

/// Runs a `.ash` script: one command line per file line, `#` comments and
/// blank lines skipped, everything else fed through the same
/// tokenize/parse/execute path the interactive loop uses. Returns the
/// status of the last executed line.
pub fn run_script(path: &Path) -> io::Result<i32> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    signals::install_script_handlers();

    let mut executor = Executor::new();
    let mut last_status = 0;

    for (index, line) in reader.lines().enumerate() {
        if signals::interrupted() {
            eprintln!("interrupted");
            break;
        }
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        debug!("script line {}: {}", index + 1, line);
        last_status = executor.run(&parse(&tokenize(line)));
        if last_status != 0 {
            eprintln!("line {} exit status {}", index + 1, last_status);
        }
    }

    Ok(last_status)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;
    use std::process;

    fn scratch(name: &str) -> std::path::PathBuf {
        env::temp_dir().join(format!("autosh-script-{}-{}", name, process::id()))
    }

    #[test]
    fn test_runs_commands_and_skips_comments() {
        let out = scratch("out");
        let _ = fs::remove_file(&out);
        let script = scratch("basic.ash");
        fs::write(
            &script,
            format!(
                "# header comment\n\n/bin/echo from-script > {}\n   # indented comment\ntrue\n",
                out.display()
            ),
        )
        .unwrap();

        assert_eq!(run_script(&script).unwrap(), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "from-script\n");
        let _ = fs::remove_file(&out);
        let _ = fs::remove_file(&script);
    }

    #[test]
    fn test_returns_last_line_status() {
        let script = scratch("status.ash");
        fs::write(&script, "true\nsh -c 'exit 3'\n").unwrap();
        assert_eq!(run_script(&script).unwrap(), 3);

        fs::write(&script, "false\ntrue\n").unwrap();
        assert_eq!(run_script(&script).unwrap(), 0);
        let _ = fs::remove_file(&script);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(run_script(Path::new("/no/such/script.ash")).is_err());
    }
}
