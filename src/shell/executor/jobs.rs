use std::fmt;

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

/// Bookkeeping record for one backgrounded or stopped pipeline/subshell.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: i32,
    pub pgid: i32,
    pub command_line: String,
    /// Still has live processes (a stopped job is still running).
    pub running: bool,
    pub background: bool,
    pub stopped: bool,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.stopped {
            "stopped"
        } else if self.running {
            "running"
        } else {
            "done"
        };
        write!(
            f,
            "[{}] pgid={} {}{} - {}",
            self.id,
            self.pgid,
            state,
            if self.background { " &" } else { "" },
            self.command_line
        )
    }
}

/// Tracks background/stopped jobs keyed by sequential id and process group.
/// Completed jobs are kept in the table; there is no purge policy.
#[derive(Default)]
pub struct JobTable {
    jobs: Vec<Job>,
    next_id: i32,
}

impl JobTable {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            next_id: 1,
        }
    }

    pub fn add(&mut self, pgid: i32, command_line: &str, background: bool) -> i32 {
        let id = self.next_id;
        self.next_id += 1;
        self.jobs.push(Job {
            id,
            pgid,
            command_line: command_line.to_string(),
            running: true,
            background,
            stopped: false,
        });
        id
    }

    pub fn list(&self) -> Vec<Job> {
        self.jobs.clone()
    }

    pub fn find(&self, id: i32) -> Option<Job> {
        self.jobs.iter().find(|j| j.id == id).cloned()
    }

    pub fn mark_finished(&mut self, pgid: i32) {
        if let Some(job) = self.jobs.iter_mut().find(|j| j.pgid == pgid) {
            job.running = false;
            job.stopped = false;
        }
    }

    pub fn mark_stopped(&mut self, pgid: i32) {
        if let Some(job) = self.jobs.iter_mut().find(|j| j.pgid == pgid) {
            job.stopped = true;
        }
    }

    pub fn clear_stopped(&mut self, pgid: i32) {
        if let Some(job) = self.jobs.iter_mut().find(|j| j.pgid == pgid) {
            job.stopped = false;
        }
    }

    /// Non-blocking status drain over every tracked running job, targeting
    /// each job's process group. Never blocks the caller; safe to call at
    /// any point in the main loop.
    pub fn reap(&mut self) {
        let flags = WaitPidFlag::WUNTRACED | WaitPidFlag::WNOHANG;
        for job in self.jobs.iter_mut() {
            if !job.running {
                continue;
            }
            let group = Pid::from_raw(-job.pgid);
            loop {
                match waitpid(group, Some(flags)) {
                    Ok(WaitStatus::StillAlive) => break,
                    Ok(WaitStatus::Stopped(_, _)) => {
                        // Stopped, not gone: keep running=true.
                        job.stopped = true;
                    }
                    Ok(WaitStatus::Exited(_, _)) | Ok(WaitStatus::Signaled(_, _, _)) => {
                        // Probe once more to see whether the group is drained.
                        match waitpid(group, Some(flags)) {
                            Ok(WaitStatus::StillAlive) => continue,
                            Err(_) => {
                                job.running = false;
                                job.stopped = false;
                                break;
                            }
                            Ok(_) => continue,
                        }
                    }
                    Ok(_) => {}
                    Err(Errno::EINTR) => continue,
                    Err(_) => break,
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use nix::sys::signal::{killpg, Signal};
    use std::os::unix::process::CommandExt;
    use std::process::Command;
    use std::thread;
    use std::time::Duration;

    fn spawn_in_own_group(script: &str) -> i32 {
        let child = Command::new("sh")
            .arg("-c")
            .arg(script)
            .process_group(0)
            .spawn()
            .unwrap();
        child.id() as i32
    }

    fn poll<F: FnMut(&JobTable) -> bool>(table: &mut JobTable, mut pred: F) -> bool {
        for _ in 0..100 {
            table.reap();
            if pred(table) {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut table = JobTable::new();
        assert_eq!(table.add(100, "a", true), 1);
        assert_eq!(table.add(200, "b", true), 2);
        assert_eq!(table.add(300, "c", false), 3);
        assert_eq!(table.list().len(), 3);
    }

    #[test]
    fn test_reap_clears_running_after_exit() {
        let mut table = JobTable::new();
        let pgid = spawn_in_own_group("exit 0");
        let id = table.add(pgid, "exit 0", true);
        assert!(table.find(id).unwrap().running);
        assert!(poll(&mut table, |t| !t.find(id).unwrap().running));
    }

    #[test]
    fn test_completed_jobs_stay_in_table() {
        let mut table = JobTable::new();
        let pgid = spawn_in_own_group("exit 0");
        let id = table.add(pgid, "exit 0", true);
        assert!(poll(&mut table, |t| !t.find(id).unwrap().running));
        // Done, but never purged.
        assert_eq!(table.list().len(), 1);
        let job = table.find(id).unwrap();
        assert!(!job.running);
        assert!(!job.stopped);
    }

    #[test]
    fn test_stop_and_resume() {
        let mut table = JobTable::new();
        let pgid = spawn_in_own_group("kill -TSTP $$; exit 0");
        let id = table.add(pgid, "stop-and-go", true);

        assert!(poll(&mut table, |t| t.find(id).unwrap().stopped));
        let job = table.find(id).unwrap();
        assert!(job.running, "a stopped job still counts as running");

        killpg(Pid::from_raw(pgid), Signal::SIGCONT).unwrap();
        table.clear_stopped(pgid);
        assert!(poll(&mut table, |t| !t.find(id).unwrap().running));
    }

    #[test]
    fn test_mark_finished() {
        let mut table = JobTable::new();
        let id = table.add(4242, "ghost", true);
        table.mark_finished(4242);
        assert!(!table.find(id).unwrap().running);
    }

    #[test]
    fn test_display_format() {
        let mut table = JobTable::new();
        let id = table.add(77, "sleep 5", true);
        let job = table.find(id).unwrap();
        assert_eq!(format!("{}", job), "[1] pgid=77 running & - sleep 5");
    }
}
