use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;

use libc::{STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use nix::unistd::dup2;

use crate::shell::parser::ast::RedirKind;

/// One redirection ready to be applied to the standard descriptors.
#[derive(Debug, Clone)]
pub struct RedirSpec {
    pub kind: RedirKind,
    pub target: String,
}

fn dup_to(fd: i32, target: i32) -> io::Result<()> {
    dup2(fd, target).map_err(io::Error::from)?;
    Ok(())
}

/// Applies redirections in two passes. File-based specs are opened and
/// duplicated onto their standard descriptor first; `2>&1` runs second so
/// it sees the final stdout target, not the original one. The first open
/// failure aborts the whole application.
pub fn apply_redirections(specs: &[RedirSpec]) -> io::Result<()> {
    for spec in specs {
        let (file, target_fd) = match spec.kind {
            RedirKind::Out => (
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(0o644)
                    .open(&spec.target)?,
                STDOUT_FILENO,
            ),
            RedirKind::OutAppend => (
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .append(true)
                    .mode(0o644)
                    .open(&spec.target)?,
                STDOUT_FILENO,
            ),
            RedirKind::In => (
                OpenOptions::new().read(true).open(&spec.target)?,
                STDIN_FILENO,
            ),
            RedirKind::Err => (
                OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(0o644)
                    .open(&spec.target)?,
                STDERR_FILENO,
            ),
            RedirKind::ErrToOut => continue,
        };
        dup_to(file.as_raw_fd(), target_fd)?;
        // `file` drops here, closing the temporary descriptor.
    }
    for spec in specs {
        if spec.kind == RedirKind::ErrToOut {
            dup_to(STDOUT_FILENO, STDERR_FILENO)?;
        }
    }
    Ok(())
}
