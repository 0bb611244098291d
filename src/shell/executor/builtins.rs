use std::env;
use std::io::Write;

use log::debug;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use super::executor::ExecContext;

#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinResult {
    pub exit_code: i32,
    pub should_exit: bool,
}

pub fn is_builtin(name: &str) -> bool {
    matches!(
        name,
        "cd" | "pwd" | "echo" | "export" | "unset" | "exit" | "jobs" | "fg" | "bg"
    )
}

/// Dispatches a builtin by argv[0]. Returns `None` when the name is not a
/// builtin. Builtins needing job visibility (`jobs`, `fg`, `bg`) receive the
/// execution context.
pub fn run_builtin(argv: &[String], ctx: Option<&mut ExecContext>) -> Option<BuiltinResult> {
    let name = argv.first().map(String::as_str)?;
    if !is_builtin(name) {
        return None;
    }
    debug!("builtin: {:?}", argv);
    let mut result = BuiltinResult::default();
    match name {
        "cd" => result.exit_code = do_cd(argv),
        "pwd" => result.exit_code = do_pwd(),
        "echo" => result.exit_code = do_echo(argv),
        "export" => result.exit_code = do_export(argv),
        "unset" => result.exit_code = do_unset(argv),
        "exit" => {
            result.exit_code = argv.get(1).and_then(|a| a.parse().ok()).unwrap_or(0);
            result.should_exit = true;
        }
        _ => match ctx {
            None => {
                eprintln!("{}: no job control context", name);
                result.exit_code = 1;
            }
            Some(ctx) => match name {
                "jobs" => result.exit_code = do_jobs(ctx),
                "fg" => result.exit_code = do_fg(argv, ctx),
                "bg" => result.exit_code = do_bg(argv, ctx),
                _ => unreachable!(),
            },
        },
    }
    Some(result)
}

fn do_cd(argv: &[String]) -> i32 {
    let target = match argv.get(1).map(String::as_str) {
        None => shellexpand::tilde("~").into_owned(),
        Some("-") => {
            let previous = env::var("OLDPWD")
                .or_else(|_| env::var("PWD"))
                .unwrap_or_else(|_| "/".to_string());
            println!("{}", previous);
            previous
        }
        Some(path) => path.to_string(),
    };
    let old = env::current_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    if let Err(e) = env::set_current_dir(&target) {
        eprintln!("cd: {}: {}", target, e);
        return 1;
    }
    if let Ok(now) = env::current_dir() {
        env::set_var("OLDPWD", old);
        env::set_var("PWD", now);
    }
    0
}

fn do_pwd() -> i32 {
    match env::current_dir() {
        Ok(dir) => {
            println!("{}", dir.display());
            0
        }
        Err(e) => {
            eprintln!("pwd: {}", e);
            1
        }
    }
}

fn do_echo(argv: &[String]) -> i32 {
    println!("{}", argv[1..].join(" "));
    let _ = std::io::stdout().flush();
    0
}

fn do_export(argv: &[String]) -> i32 {
    let mut rc = 0;
    for arg in &argv[1..] {
        match arg.split_once('=') {
            Some((name, value)) if !name.is_empty() => env::set_var(name, value),
            _ => {
                eprintln!("export: invalid: {}", arg);
                rc = 1;
            }
        }
    }
    rc
}

fn do_unset(argv: &[String]) -> i32 {
    for name in &argv[1..] {
        env::remove_var(name);
    }
    0
}

fn do_jobs(ctx: &mut ExecContext) -> i32 {
    ctx.jobs.reap();
    for job in ctx.jobs.list() {
        println!("{}", job);
    }
    0
}

fn parse_job_id(argv: &[String]) -> Option<i32> {
    argv.get(1).and_then(|a| a.parse().ok())
}

fn do_fg(argv: &[String], ctx: &mut ExecContext) -> i32 {
    let Some(id) = parse_job_id(argv) else {
        eprintln!("fg: job id required");
        return 1;
    };
    let Some(job) = ctx.jobs.find(id) else {
        eprintln!("fg: job not found");
        return 1;
    };
    if job.stopped {
        if let Err(e) = killpg(Pid::from_raw(job.pgid), Signal::SIGCONT) {
            eprintln!("fg: SIGCONT: {}", e);
        }
        ctx.jobs.clear_stopped(job.pgid);
    }
    ctx.foreground.set(job.pgid);
    let status = wait_group_once(job.pgid, ctx);
    ctx.foreground.clear();
    ctx.jobs.reap();
    status
}

fn wait_group_once(pgid: i32, ctx: &mut ExecContext) -> i32 {
    loop {
        match waitpid(Pid::from_raw(-pgid), Some(WaitPidFlag::WUNTRACED)) {
            Err(Errno::EINTR) => continue,
            Err(e) => {
                eprintln!("fg: waitpid: {}", e);
                ctx.jobs.mark_finished(pgid);
                return 1;
            }
            Ok(WaitStatus::Exited(_, code)) => {
                ctx.jobs.mark_finished(pgid);
                return code;
            }
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                ctx.jobs.mark_finished(pgid);
                return 128 + sig as i32;
            }
            Ok(WaitStatus::Stopped(_, _)) => {
                ctx.jobs.mark_stopped(pgid);
                return 128 + Signal::SIGTSTP as i32;
            }
            Ok(_) => continue,
        }
    }
}

fn do_bg(argv: &[String], ctx: &mut ExecContext) -> i32 {
    let Some(id) = parse_job_id(argv) else {
        eprintln!("bg: job id required");
        return 1;
    };
    let Some(job) = ctx.jobs.find(id) else {
        eprintln!("bg: job not found");
        return 1;
    };
    if job.stopped {
        if let Err(e) = killpg(Pid::from_raw(job.pgid), Signal::SIGCONT) {
            eprintln!("bg: SIGCONT: {}", e);
        }
        ctx.jobs.clear_stopped(job.pgid);
    }
    ctx.jobs.reap();
    0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_is_builtin() {
        for name in ["cd", "pwd", "echo", "export", "unset", "exit", "jobs", "fg", "bg"] {
            assert!(is_builtin(name), "{}", name);
        }
        assert!(!is_builtin("ls"));
        assert!(!is_builtin(""));
    }

    #[test]
    fn test_non_builtin_returns_none() {
        assert!(run_builtin(&args(&["ls"]), None).is_none());
        assert!(run_builtin(&[], None).is_none());
    }

    #[test]
    fn test_exit_carries_code_and_flag() {
        let result = run_builtin(&args(&["exit", "3"]), None).unwrap();
        assert_eq!(result.exit_code, 3);
        assert!(result.should_exit);

        let result = run_builtin(&args(&["exit"]), None).unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.should_exit);
    }

    #[test]
    fn test_export_and_unset() {
        let result = run_builtin(&args(&["export", "AUTOSH_BUILTIN_T=v1"]), None).unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(env::var("AUTOSH_BUILTIN_T").unwrap(), "v1");

        let result = run_builtin(&args(&["unset", "AUTOSH_BUILTIN_T"]), None).unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(env::var("AUTOSH_BUILTIN_T").is_err());
    }

    #[test]
    fn test_export_rejects_malformed() {
        let result = run_builtin(&args(&["export", "novalue"]), None).unwrap();
        assert_eq!(result.exit_code, 1);
    }

    #[test]
    fn test_jobs_builtins_need_context() {
        let result = run_builtin(&args(&["jobs"]), None).unwrap();
        assert_eq!(result.exit_code, 1);
        let result = run_builtin(&args(&["fg", "1"]), None).unwrap();
        assert_eq!(result.exit_code, 1);
    }
}
