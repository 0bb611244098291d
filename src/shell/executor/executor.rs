use std::env;
use std::ffi::CString;
use std::io::{self, Write};
use std::os::unix::io::IntoRawFd;
use std::process;

use libc::{STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use log::{debug, error};
use nix::errno::Errno;
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{close, dup, dup2, execve, fork, pipe, setpgid, ForkResult, Pid};

use crate::shell::expand::{expand_word, expand_words};
use crate::shell::parser::ast::{
    AndOrNode, Ast, ChainOp, CommandNode, ListNode, PipelineElement, PipelineNode, SubshellNode,
};
use crate::shell::parser::lexer::Token;
use crate::shell::signals::{self, Foreground};
use crate::utils::path::resolve_executable;

use super::builtins::{is_builtin, run_builtin};
use super::jobs::JobTable;
use super::redir::{apply_redirections, RedirSpec};

/// The only mutable state threaded through execution; lives for the whole
/// shell session.
#[derive(Default)]
pub struct ExecContext {
    pub jobs: JobTable,
    pub last_status: i32,
    pub foreground: Foreground,
}

/// Walks one AST, realizing it against the OS process model. All
/// concurrency is process-level fork; the executor itself is
/// single-threaded and blocks only on foreground waits.
#[derive(Default)]
pub struct Executor {
    pub ctx: ExecContext,
}

impl Executor {
    pub fn new() -> Self {
        Self {
            ctx: ExecContext {
                jobs: JobTable::new(),
                last_status: 0,
                foreground: Foreground,
            },
        }
    }

    pub fn run(&mut self, ast: &Ast) -> i32 {
        self.run_list(&ast.list)
    }

    fn run_list(&mut self, list: &ListNode) -> i32 {
        let mut status = 0;
        for entry in &list.entries {
            status = self.run_andor(entry);
        }
        self.ctx.last_status = status;
        status
    }

    fn run_andor(&mut self, node: &AndOrNode) -> i32 {
        let mut status = 0;
        for segment in &node.segments {
            match segment.op {
                Some(ChainOp::AndIf) if status != 0 => continue,
                Some(ChainOp::OrIf) if status == 0 => continue,
                _ => status = self.run_pipeline(&segment.pipeline),
            }
        }
        status
    }

    fn run_pipeline(&mut self, pipeline: &PipelineNode) -> i32 {
        let n = pipeline.elements.len();
        if n == 0 {
            return 0;
        }
        if n == 1 {
            return match &pipeline.elements[0] {
                PipelineElement::Command(cmd) if cmd.background => self.launch_background(cmd),
                PipelineElement::Command(cmd) => self.run_command(cmd),
                PipelineElement::Subshell(sub) => self.run_subshell(sub, sub.background),
            };
        }

        // N-1 pipes, flat [read0, write0, read1, write1, ...].
        let mut fds: Vec<i32> = Vec::with_capacity(2 * (n - 1));
        for _ in 0..n - 1 {
            match pipe() {
                Ok((read_end, write_end)) => {
                    fds.push(read_end.into_raw_fd());
                    fds.push(write_end.into_raw_fd());
                }
                Err(e) => {
                    error!("pipe: {}", e);
                    close_all(&fds);
                    return 1;
                }
            }
        }

        let mut pids: Vec<Pid> = Vec::with_capacity(n);
        for (i, element) in pipeline.elements.iter().enumerate() {
            match unsafe { fork() } {
                Err(e) => {
                    error!("fork: {}", e);
                    close_all(&fds);
                    return 1;
                }
                Ok(ForkResult::Child) => {
                    signals::reset_child_signals();
                    if i > 0 {
                        let _ = dup2(fds[2 * (i - 1)], STDIN_FILENO);
                    }
                    if i < n - 1 {
                        let _ = dup2(fds[2 * i + 1], STDOUT_FILENO);
                    }
                    // Every endpoint this stage does not use must go away,
                    // or EOF never propagates along the pipeline.
                    close_all(&fds);
                    let rc = match element {
                        PipelineElement::Command(cmd) => self.run_command(cmd),
                        PipelineElement::Subshell(sub) => self.run_subshell(sub, false),
                    };
                    child_exit(rc);
                }
                Ok(ForkResult::Parent { child }) => pids.push(child),
            }
        }
        close_all(&fds);

        let pgid = pids[0];
        for pid in &pids {
            let _ = setpgid(*pid, pgid);
        }

        let background = pipeline.elements.iter().any(|element| match element {
            PipelineElement::Command(cmd) => cmd.background,
            PipelineElement::Subshell(sub) => sub.background,
        });
        if background {
            let id = self.ctx.jobs.add(pgid.as_raw(), "pipeline", true);
            println!("[{}] {} running in background", id, pgid.as_raw());
            return 0;
        }

        self.ctx.foreground.set(pgid.as_raw());
        let (status, stopped) = wait_for_group(&pids);
        self.ctx.foreground.clear();
        if stopped {
            let id = self.ctx.jobs.add(pgid.as_raw(), "pipeline", false);
            self.ctx.jobs.mark_stopped(pgid.as_raw());
            println!("[{}] {} stopped", id, pgid.as_raw());
        }
        status
    }

    fn run_subshell(&mut self, node: &SubshellNode, background: bool) -> i32 {
        match unsafe { fork() } {
            Err(e) => {
                error!("fork: {}", e);
                1
            }
            Ok(ForkResult::Child) => {
                signals::reset_child_signals();
                let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
                let status = self.run_list(&node.list);
                child_exit(status);
            }
            Ok(ForkResult::Parent { child }) => {
                let _ = setpgid(child, child);
                if background {
                    let id = self.ctx.jobs.add(child.as_raw(), "subshell", true);
                    println!("[{}] {} running in background", id, child.as_raw());
                    return 0;
                }
                self.ctx.foreground.set(child.as_raw());
                let (status, stopped) = wait_for_group(&[child]);
                self.ctx.foreground.clear();
                if stopped {
                    let id = self.ctx.jobs.add(child.as_raw(), "subshell", false);
                    self.ctx.jobs.mark_stopped(child.as_raw());
                    println!("[{}] {} stopped", id, child.as_raw());
                }
                status
            }
        }
    }

    fn run_command(&mut self, cmd: &CommandNode) -> i32 {
        let argv = expand_words(&cmd.argv);
        if argv.is_empty() {
            // Pure assignment (or everything expanded away): mutate the
            // shell environment and succeed.
            apply_assigns(&cmd.assigns);
            return 0;
        }
        if is_builtin(&argv[0]) {
            return self.run_builtin_command(cmd, &argv);
        }
        let Some(exe) = resolve_executable(&argv[0]) else {
            eprintln!("{}: command not found", argv[0]);
            return 127;
        };
        debug!("exec {} {:?}", exe, argv);
        // CStrings and the environment block are built before the fork;
        // the child stays on the async-signal-safe path until exec.
        let Some((c_exe, c_argv)) = build_cstrings(&exe, &argv) else {
            eprintln!("{}: invalid argument", argv[0]);
            return 1;
        };
        let c_envp = build_envp(&cmd.assigns);
        let specs = build_redirs(cmd);
        match unsafe { fork() } {
            Err(e) => {
                error!("fork: {}", e);
                1
            }
            Ok(ForkResult::Child) => {
                signals::reset_child_signals();
                if let Err(e) = apply_redirections(&specs) {
                    eprintln!("autosh: {}", e);
                    child_exit(1);
                }
                let _ = execve(&c_exe, &c_argv, &c_envp);
                eprintln!("{}: cannot execute", argv[0]);
                child_exit(127);
            }
            Ok(ForkResult::Parent { child }) => wait_for_pid(child),
        }
    }

    fn launch_background(&mut self, cmd: &CommandNode) -> i32 {
        let argv = expand_words(&cmd.argv);
        if argv.is_empty() {
            apply_assigns(&cmd.assigns);
            return 0;
        }
        if is_builtin(&argv[0]) {
            // Builtins never fork; `&` is ignored for them.
            return self.run_builtin_command(cmd, &argv);
        }
        let Some(exe) = resolve_executable(&argv[0]) else {
            eprintln!("{}: command not found", argv[0]);
            return 127;
        };
        let Some((c_exe, c_argv)) = build_cstrings(&exe, &argv) else {
            eprintln!("{}: invalid argument", argv[0]);
            return 1;
        };
        let c_envp = build_envp(&cmd.assigns);
        let specs = build_redirs(cmd);
        match unsafe { fork() } {
            Err(e) => {
                error!("fork: {}", e);
                1
            }
            Ok(ForkResult::Child) => {
                // Detached from the keyboard: background children keep
                // ignoring interactive interrupts.
                unsafe {
                    let _ = signal(Signal::SIGINT, SigHandler::SigIgn);
                }
                let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
                if let Err(e) = apply_redirections(&specs) {
                    eprintln!("autosh: {}", e);
                    child_exit(1);
                }
                let _ = execve(&c_exe, &c_argv, &c_envp);
                eprintln!("{}: cannot execute", argv[0]);
                child_exit(127);
            }
            Ok(ForkResult::Parent { child }) => {
                let _ = setpgid(child, child);
                let id = self.ctx.jobs.add(child.as_raw(), &argv.join(" "), true);
                println!("[{}] {} running in background", id, child.as_raw());
                0
            }
        }
    }

    fn run_builtin_command(&mut self, cmd: &CommandNode, argv: &[String]) -> i32 {
        let specs = build_redirs(cmd);
        let saved = if specs.is_empty() {
            None
        } else {
            let _ = io::stdout().flush();
            match SavedFds::save() {
                Ok(saved) => Some(saved),
                Err(e) => {
                    error!("dup: {}", e);
                    return 1;
                }
            }
        };
        if !specs.is_empty() {
            if let Err(e) = apply_redirections(&specs) {
                eprintln!("autosh: {}", e);
                if let Some(saved) = saved {
                    saved.restore();
                }
                return 1;
            }
        }
        let result = run_builtin(argv, Some(&mut self.ctx)).unwrap_or_default();
        let _ = io::stdout().flush();
        if let Some(saved) = saved {
            saved.restore();
        }
        if result.should_exit {
            debug!("exit requested, terminating session");
            process::exit(result.exit_code);
        }
        result.exit_code
    }
}

/// Standard descriptors saved around an in-process builtin, so a failed or
/// finished redirection never leaks into the shell's own fds.
struct SavedFds {
    stdin: i32,
    stdout: i32,
    stderr: i32,
}

impl SavedFds {
    fn save() -> nix::Result<Self> {
        Ok(Self {
            stdin: dup(STDIN_FILENO)?,
            stdout: dup(STDOUT_FILENO)?,
            stderr: dup(STDERR_FILENO)?,
        })
    }

    fn restore(self) {
        let _ = dup2(self.stdin, STDIN_FILENO);
        let _ = dup2(self.stdout, STDOUT_FILENO);
        let _ = dup2(self.stderr, STDERR_FILENO);
        let _ = close(self.stdin);
        let _ = close(self.stdout);
        let _ = close(self.stderr);
    }
}

fn build_redirs(cmd: &CommandNode) -> Vec<RedirSpec> {
    cmd.redirs
        .iter()
        .map(|r| RedirSpec {
            kind: r.kind,
            target: r.target.clone(),
        })
        .collect()
}

fn build_cstrings(exe: &str, argv: &[String]) -> Option<(CString, Vec<CString>)> {
    let c_exe = CString::new(exe).ok()?;
    let c_argv = argv
        .iter()
        .map(|a| CString::new(a.as_str()))
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    Some((c_exe, c_argv))
}

fn apply_assigns(assigns: &[Token]) {
    for token in assigns {
        if let Some((name, value)) = token.text.split_once('=') {
            env::set_var(name, expand_word(value));
        }
    }
}

/// Snapshot of the shell environment with `NAME=VALUE` prefixes overlaid,
/// ready to hand to execve.
fn build_envp(assigns: &[Token]) -> Vec<CString> {
    let mut vars: Vec<(String, String)> = env::vars().collect();
    for token in assigns {
        if let Some((name, value)) = token.text.split_once('=') {
            let value = expand_word(value);
            match vars.iter_mut().find(|(n, _)| n == name) {
                Some(entry) => entry.1 = value,
                None => vars.push((name.to_string(), value)),
            }
        }
    }
    vars.into_iter()
        .filter_map(|(name, value)| CString::new(format!("{}={}", name, value)).ok())
        .collect()
}

fn close_all(fds: &[i32]) {
    for &fd in fds {
        let _ = close(fd);
    }
}

fn child_exit(status: i32) -> ! {
    // Stdout may be block-buffered into a pipe; flush before the raw exit.
    let _ = io::stdout().flush();
    unsafe { libc::_exit(status) }
}

/// Waits one specific child; exit code, or 128+signal.
fn wait_for_pid(pid: Pid) -> i32 {
    loop {
        match waitpid(pid, None) {
            Err(Errno::EINTR) => continue,
            Err(_) => return 1,
            Ok(WaitStatus::Exited(_, code)) => return code,
            Ok(WaitStatus::Signaled(_, sig, _)) => return 128 + sig as i32,
            Ok(_) => continue,
        }
    }
}

/// Waits every pid of a foreground group; the returned status is the last
/// child's. A stop of any member abandons the wait and reports the group
/// stopped.
fn wait_for_group(pids: &[Pid]) -> (i32, bool) {
    let mut status = 0;
    for pid in pids {
        loop {
            match waitpid(*pid, Some(WaitPidFlag::WUNTRACED)) {
                Err(Errno::EINTR) => continue,
                Err(_) => break,
                Ok(WaitStatus::Exited(_, code)) => {
                    status = code;
                    break;
                }
                Ok(WaitStatus::Signaled(_, sig, _)) => {
                    status = 128 + sig as i32;
                    break;
                }
                Ok(WaitStatus::Stopped(_, _)) => {
                    return (128 + Signal::SIGTSTP as i32, true);
                }
                Ok(_) => continue,
            }
        }
    }
    (status, false)
}
