//! Launching a pipeline as a group of external processes.
//!
//! All inter-stage pipes are created before the first fork. Every child
//! duplicates its assigned pipe ends onto stdin/stdout, joins the pipeline's
//! process group (the first child creates it), restores default signal
//! dispositions and replaces itself with the target program. The parent never
//! keeps a pipe descriptor open past the fork that consumes it.

use crate::env::Environment;
use crate::parser::{Command, Pipeline};
use crate::signals;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::{ForkResult, Pid, dup2, execve, fork, pipe2, setpgid};
use std::ffi::CString;
use std::fmt;
use std::io::{self, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Exit status a child reserves for "the program does not exist".
pub const EXIT_COMMAND_NOT_FOUND: i32 = 127;
/// Exit status a child reserves for "the program exists but exec failed".
pub const EXIT_EXEC_FAILED: i32 = 126;

/// Process-creation failures observed by the shell itself.
///
/// A program that cannot be found or executed is *not* a `LaunchError`: the
/// child reports that by exiting with [`EXIT_COMMAND_NOT_FOUND`] or
/// [`EXIT_EXEC_FAILED`], and the shell observes it through the job table.
#[derive(Debug)]
pub enum LaunchError {
    /// Creating an inter-stage pipe failed.
    Pipe(Errno),
    /// Forking a pipeline member failed.
    Fork(Errno),
    /// An argument contained a NUL byte and cannot cross `execve`.
    NulByte(String),
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchError::Pipe(errno) => write!(f, "failed to create pipe: {errno}"),
            LaunchError::Fork(errno) => write!(f, "failed to fork: {errno}"),
            LaunchError::NulByte(arg) => write!(f, "argument contains NUL byte: {arg:?}"),
        }
    }
}

impl std::error::Error for LaunchError {}

/// Everything a child needs for `execve`, prepared before forking so the
/// child allocates nothing between `fork` and `execve`.
struct PreparedCommand {
    /// Resolved executable path; `None` means "command not found".
    path: Option<CString>,
    /// argv, program name first.
    argv: Vec<CString>,
    /// Program name as typed, for the child's error message.
    program: String,
}

/// Spawn every member of `pipeline` as an external process.
///
/// Returns the member pids in pipeline order; the first pid is the process
/// group id. On failure nothing is left registered anywhere: already-forked
/// members are killed by group and will be collected by the background poll.
pub fn spawn_pipeline(pipeline: &Pipeline, env: &Environment) -> Result<Vec<Pid>, LaunchError> {
    let commands = &pipeline.commands;
    assert!(!commands.is_empty());

    let prepared: Vec<PreparedCommand> = commands
        .iter()
        .map(|cmd| prepare_command(cmd, env))
        .collect::<Result<_, _>>()?;
    let envp = env.as_envp();

    // Every pipe exists before the first fork; slot i connects stage i to
    // stage i + 1 and is dropped in the parent as soon as both users forked.
    let mut pipes: Vec<Option<(OwnedFd, OwnedFd)>> = Vec::with_capacity(commands.len() - 1);
    for _ in 1..commands.len() {
        pipes.push(Some(pipe2(OFlag::O_CLOEXEC).map_err(LaunchError::Pipe)?));
    }

    let mut pids: Vec<Pid> = Vec::with_capacity(commands.len());
    let mut pgid: Option<Pid> = None;

    for (i, prep) in prepared.iter().enumerate() {
        let stdin_fd: Option<RawFd> = if i > 0 {
            pipes[i - 1].as_ref().map(|p| p.0.as_raw_fd())
        } else {
            None
        };
        let stdout_fd: Option<RawFd> = if i + 1 < commands.len() {
            pipes[i].as_ref().map(|p| p.1.as_raw_fd())
        } else {
            None
        };

        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                // Pid 0 means "this process"; pgid 0 means "create own group".
                let join = pgid.unwrap_or_else(|| Pid::from_raw(0));
                let _ = setpgid(Pid::from_raw(0), join);
                if let Some(fd) = stdin_fd {
                    let _ = dup2(fd, libc::STDIN_FILENO);
                }
                if let Some(fd) = stdout_fd {
                    let _ = dup2(fd, libc::STDOUT_FILENO);
                }
                // Originals are CLOEXEC; the dup2 copies onto 0/1 are not.
                signals::reset_child_dispositions();
                exec_child(prep, &envp)
            }
            Ok(ForkResult::Parent { child }) => {
                // Mirror the child's setpgid so neither side races the other.
                let join = pgid.unwrap_or(child);
                let _ = setpgid(child, join);
                pgid.get_or_insert(child);
                pids.push(child);
                if i > 0 {
                    // Both users of this pipe are forked now.
                    pipes[i - 1] = None;
                }
            }
            Err(errno) => {
                if let Some(pgid) = pgid {
                    let _ = killpg(pgid, Signal::SIGKILL);
                }
                return Err(LaunchError::Fork(errno));
            }
        }
    }

    Ok(pids)
}

/// Replace the child's image with the prepared program. Never returns: a
/// lookup or exec failure turns into the reserved child exit status.
fn exec_child(prep: &PreparedCommand, envp: &[CString]) -> ! {
    match &prep.path {
        Some(path) => {
            let _ = execve(path.as_c_str(), &prep.argv, envp);
            let _ = writeln!(io::stderr(), "jsh: {}: cannot execute", prep.program);
            unsafe { libc::_exit(EXIT_EXEC_FAILED) }
        }
        None => {
            let _ = writeln!(io::stderr(), "jsh: {}: command not found", prep.program);
            unsafe { libc::_exit(EXIT_COMMAND_NOT_FOUND) }
        }
    }
}

fn prepare_command(cmd: &Command, env: &Environment) -> Result<PreparedCommand, LaunchError> {
    let mut argv = Vec::with_capacity(cmd.args.len() + 1);
    argv.push(to_cstring(&cmd.program)?);
    for arg in &cmd.args {
        argv.push(to_cstring(arg)?);
    }
    let path = match resolve_program(env, &cmd.program) {
        Some(path) => Some(
            CString::new(path.as_os_str().as_bytes())
                .map_err(|_| LaunchError::NulByte(cmd.program.clone()))?,
        ),
        None => None,
    };
    Ok(PreparedCommand {
        path,
        argv,
        program: cmd.program.clone(),
    })
}

fn to_cstring(s: &str) -> Result<CString, LaunchError> {
    CString::new(s).map_err(|_| LaunchError::NulByte(s.to_string()))
}

/// Resolve a program name the way a typical shell would.
///
/// - Absolute path: returned if it exists.
/// - A path with multiple components, or one starting with `./`: returned if
///   it exists relative to the current directory.
/// - A bare name: the first match found in the directories of `$PATH`.
pub fn resolve_program(env: &Environment, program: &str) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    let path = Path::new(program);
    if path.is_absolute() {
        return path.exists().then(|| path.to_path_buf());
    }
    if path.components().count() > 1 || program.starts_with("./") {
        return path.exists().then(|| path.to_path_buf());
    }
    let search = env.get_var("PATH")?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(path))
        .find(|candidate| candidate.exists())
}
