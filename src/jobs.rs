//! The job table: runtime tracking for every launched pipeline.
//!
//! The table is the single owner of the pid-to-job mapping; every wait status
//! the kernel hands out is applied here exactly once. All mutation happens on
//! the shell's only thread, at the foreground wait or the per-prompt poll.

use crate::signals;
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{Pid, getpgrp, tcsetpgrp};
use std::fmt;
use std::io::{self, IsTerminal};

/// Lifecycle state of a job, derived from its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobState {
    /// At least one member has not stopped or exited.
    Running,
    /// No member is running and at least one is stopped.
    Stopped,
    /// Every member has reported terminal status.
    Done,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Running => write!(f, "Running"),
            JobState::Stopped => write!(f, "Stopped"),
            JobState::Done => write!(f, "Done"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Member {
    pid: Pid,
    status: WaitStatus,
}

impl Member {
    fn state(&self) -> JobState {
        match self.status {
            WaitStatus::Exited(..) | WaitStatus::Signaled(..) => JobState::Done,
            WaitStatus::Stopped(..) => JobState::Stopped,
            #[cfg(any(target_os = "linux", target_os = "android"))]
            WaitStatus::PtraceEvent(..) | WaitStatus::PtraceSyscall(..) => JobState::Stopped,
            _ => JobState::Running,
        }
    }
}

/// The runtime record of one launched pipeline.
#[derive(Debug)]
pub struct Job {
    /// Monotonically increasing identifier, unique for the shell's lifetime.
    pub id: u32,
    /// Process group shared by every member.
    pub pgid: Pid,
    /// Whether the job was launched with a trailing `&`.
    pub background: bool,
    /// The input line that produced the job, for reporting.
    pub line: String,
    members: Vec<Member>,
    /// Last state announced to the user; transitions are reported once.
    reported: JobState,
}

impl Job {
    /// Aggregate state: `Running` while any member runs, then `Stopped`
    /// while any member is stopped, `Done` once all have exited.
    pub fn state(&self) -> JobState {
        self.members
            .iter()
            .map(Member::state)
            .min()
            .unwrap_or(JobState::Done)
    }

    /// Overall pipeline status: the status of the last command, with death
    /// by signal mapped to `128 + signo`.
    pub fn exit_status(&self) -> i32 {
        match self.members.last().map(|m| m.status) {
            Some(WaitStatus::Exited(_, code)) => code,
            Some(WaitStatus::Signaled(_, sig, _)) => 128 + sig as i32,
            _ => 0,
        }
    }

    fn apply(&mut self, pid: Pid, status: WaitStatus) -> bool {
        match self.members.iter_mut().find(|m| m.pid == pid) {
            Some(member) => {
                member.status = status;
                true
            }
            None => false,
        }
    }

    /// Forget recorded stops after a `SIGCONT`, so the job reads as running
    /// until the kernel reports otherwise.
    fn mark_continued(&mut self) {
        for member in &mut self.members {
            if member.state() == JobState::Stopped {
                member.status = WaitStatus::StillAlive;
            }
        }
        self.reported = JobState::Running;
    }
}

/// A state transition worth announcing at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub id: u32,
    pub state: JobState,
    pub status: i32,
    pub line: String,
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            JobState::Done if self.status != 0 => {
                write!(f, "[{}] Exit {}\t{}", self.id, self.status, self.line)
            }
            state => write!(f, "[{}] {}\t{}", self.id, state, self.line),
        }
    }
}

/// Tracking table for every launched pipeline.
#[derive(Debug)]
pub struct JobTable {
    jobs: Vec<Job>,
    next_id: u32,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub fn new() -> Self {
        JobTable {
            jobs: Vec::new(),
            next_id: 1,
        }
    }

    /// Record a freshly spawned pipeline. The first pid is the group id.
    pub fn register(&mut self, line: &str, background: bool, pids: &[Pid]) -> u32 {
        assert!(!pids.is_empty());
        let id = self.next_id;
        self.next_id += 1;
        self.jobs.push(Job {
            id,
            pgid: pids[0],
            background,
            line: line.to_string(),
            members: pids
                .iter()
                .map(|&pid| Member {
                    pid,
                    status: WaitStatus::StillAlive,
                })
                .collect(),
            reported: JobState::Running,
        });
        id
    }

    pub fn get(&self, id: u32) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// All live jobs, oldest first.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// The most recently registered live job, if any.
    pub fn current(&self) -> Option<u32> {
        self.jobs.last().map(|j| j.id)
    }

    fn job_mut(&mut self, id: u32) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    /// Route one wait status to the job owning that pid. Statuses for pids
    /// the table does not own (e.g. members of an abandoned launch) are
    /// dropped; they were already reaped by the `waitpid` that produced them.
    fn apply_status(&mut self, status: WaitStatus) -> bool {
        let Some(pid) = status.pid() else {
            return false;
        };
        self.jobs.iter_mut().any(|job| job.apply(pid, status))
    }

    fn remove(&mut self, id: u32) {
        self.jobs.retain(|j| j.id != id);
    }

    /// Block until job `id` is done or stopped and return its status.
    ///
    /// The terminal is handed to the job's process group for the duration of
    /// the wait and reclaimed afterwards. A `SIGINT` delivered to the shell
    /// while blocked here is forwarded to the job's group; the shell itself
    /// keeps running. Done jobs are removed; a stopped job stays in the
    /// table so it can be continued later.
    pub fn wait_foreground(&mut self, id: u32) -> i32 {
        let Some(pgid) = self.get(id).map(|j| j.pgid) else {
            return 0;
        };

        let interactive = io::stdin().is_terminal();
        if interactive {
            let _ = tcsetpgrp(io::stdin(), pgid);
        }

        let group = Pid::from_raw(-pgid.as_raw());
        let status = loop {
            match waitpid(group, Some(WaitPidFlag::WUNTRACED)) {
                Ok(status) => {
                    self.apply_status(status);
                    let Some(job) = self.job_mut(id) else { break 0 };
                    match job.state() {
                        JobState::Done => break job.exit_status(),
                        JobState::Stopped => {
                            // The caller announces the stop; don't repeat it.
                            job.reported = JobState::Stopped;
                            break 128 + Signal::SIGTSTP as i32;
                        }
                        JobState::Running => {}
                    }
                }
                Err(Errno::EINTR) => {
                    if signals::take_interrupt() {
                        let _ = killpg(pgid, Signal::SIGINT);
                    }
                }
                Err(_) => break self.get(id).map(Job::exit_status).unwrap_or(0),
            }
        };

        if interactive {
            let _ = tcsetpgrp(io::stdin(), getpgrp());
        }

        if self.get(id).map(|j| j.state()) == Some(JobState::Done) {
            self.remove(id);
        }
        status
    }

    /// Non-blocking reap, run once per prompt cycle.
    ///
    /// Consumes the pending child-event flag, drains every available wait
    /// status without blocking and returns the jobs whose state changed
    /// since it was last announced. Done jobs are removed after reporting.
    pub fn poll_background(&mut self) -> Vec<JobReport> {
        signals::take_child_event();
        let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
        loop {
            match waitpid(Pid::from_raw(-1), Some(flags)) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(status) => {
                    self.apply_status(status);
                }
                // ECHILD: no children left at all.
                Err(_) => break,
            }
        }
        self.sweep()
    }

    /// Deliver `SIGCONT` to job `id`'s process group and mark it running.
    /// Returns the job's display line, or `ESRCH` when no such job exists.
    ///
    /// When resuming into the foreground the terminal must change hands
    /// first: a job stopped mid-read would otherwise restart its read as a
    /// background group, take `SIGTTIN` and stop again immediately.
    pub fn continue_job(&mut self, id: u32, foreground: bool) -> nix::Result<String> {
        let Some(job) = self.job_mut(id) else {
            return Err(Errno::ESRCH);
        };
        if foreground && io::stdin().is_terminal() {
            tcsetpgrp(io::stdin(), job.pgid)?;
        }
        killpg(job.pgid, Signal::SIGCONT)?;
        job.mark_continued();
        Ok(job.line.clone())
    }

    /// The notice to print when a foreground wait ended in a stop rather
    /// than an exit; `None` when the job finished (or vanished).
    pub fn stopped_notice(&self, id: u32) -> Option<JobReport> {
        let job = self.get(id)?;
        (job.state() == JobState::Stopped).then(|| JobReport {
            id: job.id,
            state: JobState::Stopped,
            status: 0,
            line: job.line.clone(),
        })
    }

    /// Report every job whose state differs from the last announced one,
    /// then drop the finished ones. Returning to `Running` (after `bg`) is
    /// recorded but not announced.
    fn sweep(&mut self) -> Vec<JobReport> {
        let mut reports = Vec::new();
        self.jobs.retain_mut(|job| {
            let state = job.state();
            if state != job.reported {
                job.reported = state;
                if state != JobState::Running {
                    reports.push(JobReport {
                        id: job.id,
                        state,
                        status: job.exit_status(),
                        line: job.line.clone(),
                    });
                }
            }
            state != JobState::Done
        });
        reports
    }
}
