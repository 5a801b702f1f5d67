//! Built-in commands, executed inside the shell process.
//!
//! Builtins are parsed with [`argh`] (`FromArgs`) and run synchronously:
//! they mutate shell-local state (working directory, environment, job table)
//! that a child process could never propagate back to the parent.

use crate::env::Environment;
use crate::interpreter::ExitCode;
use crate::jobs::JobTable;
use anyhow::{Result, anyhow};
use argh::{EarlyExit, FromArgs};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// A command the shell recognizes at compile time.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd" or "jobs".
    fn name() -> &'static str;

    /// Executes the command against the shell's own state.
    ///
    /// Return value follows shell conventions: 0 for success, non-zero for
    /// error. An `Err` is reported to the user and becomes exit code 1; it
    /// never aborts the shell.
    fn execute(
        self,
        stdout: &mut dyn Write,
        env: &mut Environment,
        jobs: &mut JobTable,
    ) -> Result<ExitCode>;
}

/// Run the builtin named `name`, or return `None` when no builtin has that
/// name and the command should go to the process launcher instead.
pub(crate) fn dispatch(
    name: &str,
    args: &[&str],
    stdout: &mut dyn Write,
    env: &mut Environment,
    jobs: &mut JobTable,
) -> Option<ExitCode> {
    let code = match name {
        "cd" => run::<Cd>(args, stdout, env, jobs),
        "exit" => run::<Exit>(args, stdout, env, jobs),
        "jobs" => run::<Jobs>(args, stdout, env, jobs),
        "fg" => run::<Fg>(args, stdout, env, jobs),
        "bg" => run::<Bg>(args, stdout, env, jobs),
        _ => return None,
    };
    Some(code)
}

fn run<T: BuiltinCommand>(
    args: &[&str],
    stdout: &mut dyn Write,
    env: &mut Environment,
    jobs: &mut JobTable,
) -> ExitCode {
    match T::from_args(&[T::name()], args) {
        Ok(cmd) => match cmd.execute(stdout, env, jobs) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("jsh: {e}");
                1
            }
        },
        Err(EarlyExit { output, status }) => {
            let _ = writeln!(stdout, "{}", output.trim_end());
            if status.is_err() { 1 } else { 0 }
        }
    }
}

/// `cd` failed; the shell's directory and environment are unchanged.
#[derive(Debug)]
pub struct NavigationError {
    target: PathBuf,
    reason: std::io::Error,
}

impl fmt::Display for NavigationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cd: {}: {}", self.target.display(), self.reason)
    }
}

impl std::error::Error for NavigationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.reason)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// With no target, changes to the user's home directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _stdout: &mut dyn Write,
        env: &mut Environment,
        _jobs: &mut JobTable,
    ) -> Result<ExitCode> {
        let target = match &self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => env
                .home_dir()
                .ok_or_else(|| anyhow!("cd: no target and HOME not set"))?,
        };

        // The logical path: `.` and `..` fold away lexically, so a symlink
        // crossed on the way in is not resolved on the way back out.
        let resolved = if target.is_absolute() {
            normalize(&target)
        } else {
            normalize(&env.current_dir.join(target))
        };

        // Validate and chdir before touching any shell state, so a failure
        // leaves the environment exactly as it was.
        let meta = fs::metadata(&resolved).map_err(|reason| NavigationError {
            target: resolved.clone(),
            reason,
        })?;
        if !meta.is_dir() {
            return Err(NavigationError {
                target: resolved,
                reason: std::io::Error::from(std::io::ErrorKind::NotADirectory),
            }
            .into());
        }
        std::env::set_current_dir(&resolved).map_err(|reason| NavigationError {
            target: resolved.clone(),
            reason,
        })?;

        env.set_var("PWD", resolved.to_string_lossy());
        env.current_dir = resolved;
        Ok(0)
    }
}

/// Fold `.` and `..` components out of an absolute path without touching the
/// filesystem. `..` at the root stays at the root.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[derive(FromArgs)]
/// Exit the shell.
pub struct Exit {
    #[argh(positional)]
    /// exit status to leave with; defaults to the last pipeline's status
    pub code: Option<i32>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        _stdout: &mut dyn Write,
        env: &mut Environment,
        _jobs: &mut JobTable,
    ) -> Result<ExitCode> {
        if let Some(code) = self.code {
            env.last_status = code;
        }
        env.should_exit = true;
        Ok(env.last_status)
    }
}

#[derive(FromArgs)]
/// List the shell's jobs.
pub struct Jobs {}

impl BuiltinCommand for Jobs {
    fn name() -> &'static str {
        "jobs"
    }

    fn execute(
        self,
        stdout: &mut dyn Write,
        _env: &mut Environment,
        jobs: &mut JobTable,
    ) -> Result<ExitCode> {
        for job in jobs.jobs() {
            writeln!(stdout, "[{}] {}\t{}", job.id, job.state(), job.line)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Resume a job in the foreground.
pub struct Fg {
    #[argh(positional)]
    /// job id; defaults to the most recent job
    pub id: Option<u32>,
}

impl BuiltinCommand for Fg {
    fn name() -> &'static str {
        "fg"
    }

    fn execute(
        self,
        stdout: &mut dyn Write,
        env: &mut Environment,
        jobs: &mut JobTable,
    ) -> Result<ExitCode> {
        let id = self
            .id
            .or_else(|| jobs.current())
            .ok_or_else(|| anyhow!("fg: no current job"))?;
        let line = jobs
            .continue_job(id, true)
            .map_err(|e| anyhow!("fg: job {id}: {e}"))?;
        writeln!(stdout, "{line}")?;

        let status = jobs.wait_foreground(id);
        if let Some(notice) = jobs.stopped_notice(id) {
            eprintln!("{notice}");
        }
        env.last_status = status;
        Ok(status)
    }
}

#[derive(FromArgs)]
/// Resume a stopped job in the background.
pub struct Bg {
    #[argh(positional)]
    /// job id; defaults to the most recent job
    pub id: Option<u32>,
}

impl BuiltinCommand for Bg {
    fn name() -> &'static str {
        "bg"
    }

    fn execute(
        self,
        stdout: &mut dyn Write,
        _env: &mut Environment,
        jobs: &mut JobTable,
    ) -> Result<ExitCode> {
        let id = self
            .id
            .or_else(|| jobs.current())
            .ok_or_else(|| anyhow!("bg: no current job"))?;
        let line = jobs
            .continue_job(id, false)
            .map_err(|e| anyhow!("bg: job {id}: {e}"))?;
        writeln!(stdout, "[{id}] {line} &")?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn empty_env() -> Environment {
        Environment {
            vars: HashMap::new(),
            current_dir: std::env::current_dir().unwrap(),
            last_status: 0,
            should_exit: false,
        }
    }

    fn dispatch_str(
        name: &str,
        args: &[&str],
        env: &mut Environment,
        jobs: &mut JobTable,
    ) -> (Option<ExitCode>, String) {
        let mut out: Vec<u8> = Vec::new();
        let code = dispatch(name, args, &mut out, env, jobs);
        (code, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_unknown_name_is_not_a_builtin() {
        let mut env = empty_env();
        let mut jobs = JobTable::new();
        let (code, _) = dispatch_str("ls", &[], &mut env, &mut jobs);
        assert_eq!(code, None);
    }

    #[test]
    fn test_exit_sets_flag_and_status() {
        let mut env = empty_env();
        let mut jobs = JobTable::new();
        let (code, _) = dispatch_str("exit", &["3"], &mut env, &mut jobs);
        assert_eq!(code, Some(3));
        assert!(env.should_exit);
        assert_eq!(env.last_status, 3);
    }

    #[test]
    fn test_cd_roundtrip_updates_pwd() {
        let tmp = std::env::temp_dir();
        let mut env = empty_env();
        let mut jobs = JobTable::new();

        let target = tmp.to_str().unwrap();
        let (code, _) = dispatch_str("cd", &[target], &mut env, &mut jobs);
        assert_eq!(code, Some(0));

        assert_eq!(env.current_dir, tmp);
        assert_eq!(env.get_var("PWD"), Some(tmp.to_string_lossy().into_owned()));
    }

    #[test]
    fn test_cd_keeps_logical_path_through_symlink() {
        let base = std::env::temp_dir().join(format!("jsh-cd-link-{}", std::process::id()));
        let real = base.join("a").join("real");
        std::fs::create_dir_all(&real).unwrap();
        let link = base.join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let mut env = empty_env();
        let mut jobs = JobTable::new();

        // The symlink is not resolved: PWD is the path as typed.
        let (code, _) = dispatch_str("cd", &[link.to_str().unwrap()], &mut env, &mut jobs);
        assert_eq!(code, Some(0));
        assert_eq!(env.current_dir, link);

        // `..` folds lexically, landing in the link's parent rather than
        // the target's.
        let (code, _) = dispatch_str("cd", &[".."], &mut env, &mut jobs);
        assert_eq!(code, Some(0));
        assert_eq!(env.current_dir, base);

        // `cd` moved the process-wide cwd into `base`; leave before deleting
        // it so later tests can still call `std::env::current_dir()`.
        std::env::set_current_dir(std::env::temp_dir()).unwrap();
        std::fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn test_cd_to_a_file_fails() {
        let file = std::env::temp_dir().join(format!("jsh-cd-file-{}", std::process::id()));
        std::fs::write(&file, b"x").unwrap();

        let mut env = empty_env();
        let mut jobs = JobTable::new();
        let before = env.current_dir.clone();

        let (code, _) = dispatch_str("cd", &[file.to_str().unwrap()], &mut env, &mut jobs);
        assert_eq!(code, Some(1));
        assert_eq!(env.current_dir, before);

        std::fs::remove_file(&file).unwrap();
    }

    #[test]
    fn test_cd_failure_leaves_state_unchanged() {
        let mut env = empty_env();
        let mut jobs = JobTable::new();
        let before = env.current_dir.clone();

        let (code, _) = dispatch_str("cd", &["/definitely/not/a/dir"], &mut env, &mut jobs);
        assert_eq!(code, Some(1));
        assert_eq!(env.current_dir, before);
        assert_eq!(env.get_var("PWD"), None);
    }

    #[test]
    fn test_cd_without_target_uses_home() {
        let tmp = std::env::temp_dir();
        let mut env = empty_env();
        env.set_var("HOME", tmp.to_string_lossy());
        let mut jobs = JobTable::new();

        let (code, _) = dispatch_str("cd", &[], &mut env, &mut jobs);
        assert_eq!(code, Some(0));
        assert_eq!(env.current_dir, tmp);
    }

    #[test]
    fn test_jobs_lists_registered_jobs() {
        let mut env = empty_env();
        let mut jobs = JobTable::new();
        jobs.register("sleep 10 &", true, &[nix::unistd::Pid::from_raw(424242)]);

        let (code, out) = dispatch_str("jobs", &[], &mut env, &mut jobs);
        assert_eq!(code, Some(0));
        assert_eq!(out, "[1] Running\tsleep 10 &\n");
    }

    #[test]
    fn test_fg_without_jobs_fails() {
        let mut env = empty_env();
        let mut jobs = JobTable::new();
        let (code, _) = dispatch_str("fg", &[], &mut env, &mut jobs);
        assert_eq!(code, Some(1));
    }

    #[test]
    fn test_bg_unknown_job_fails() {
        let mut env = empty_env();
        let mut jobs = JobTable::new();
        let (code, _) = dispatch_str("bg", &["7"], &mut env, &mut jobs);
        assert_eq!(code, Some(1));
    }
}
