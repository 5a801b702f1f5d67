use std::collections::HashMap;
use std::env as stdenv;
use std::ffi::CString;
use std::path::PathBuf;

/// Mutable, shell-local view of the process environment.
///
/// The environment contains:
/// - `vars`: a map of environment variables, snapshotted from the process
///   environment at startup and passed to every spawned command.
/// - `current_dir`: the working directory, maintained by the `cd` builtin.
/// - `last_status`: exit status of the most recently completed foreground
///   pipeline (reserved for a future `$?` special variable).
/// - `should_exit`: a flag that the REPL loop checks to know when to terminate.
///
/// There are no ambient globals: every component that needs the environment
/// receives a reference to this struct.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    /// Exit status of the last foreground pipeline.
    pub last_status: i32,
    /// When set to true, indicates that the interactive loop should exit.
    pub should_exit: bool,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// This copies variables from `std::env::vars()` and initializes
    /// `current_dir` from `std::env::current_dir()`.
    pub fn new() -> Self {
        let mut vars = HashMap::new();
        for (k, v) in stdenv::vars() {
            vars.insert(k, v);
        }
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            vars,
            current_dir,
            last_status: 0,
            should_exit: false,
        }
    }

    /// Get the value of an environment variable.
    ///
    /// Lookups go through the shell's own snapshot only; a variable removed
    /// from `self.vars` is undefined even if the process environment still
    /// carries it.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// The user's home directory: `$HOME` when set, otherwise the home
    /// directory recorded for the current user in the OS user database.
    pub fn home_dir(&self) -> Option<PathBuf> {
        if let Some(home) = self.get_var("HOME") {
            return Some(PathBuf::from(home));
        }
        nix::unistd::User::from_uid(nix::unistd::getuid())
            .ok()
            .flatten()
            .map(|user| user.dir)
    }

    /// Export the variable map as `NAME=value` C strings for `execve`.
    ///
    /// Entries that cannot be represented (embedded NUL bytes) are skipped.
    pub fn as_envp(&self) -> Vec<CString> {
        self.vars
            .iter()
            .filter_map(|(k, v)| CString::new(format!("{k}={v}")).ok())
            .collect()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Environment;
    use std::collections::HashMap;
    use std::env as stdenv;

    fn empty_env() -> Environment {
        Environment {
            vars: HashMap::new(),
            current_dir: stdenv::current_dir().unwrap(),
            last_status: 0,
            should_exit: false,
        }
    }

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = empty_env();

        // initially absent
        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");

        assert_eq!(env.get_var("KEY"), Some("VALUE".to_string()));
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
    }

    #[test]
    fn test_home_dir_prefers_home_var() {
        let mut env = empty_env();
        env.set_var("HOME", "/tmp/somewhere");
        assert_eq!(
            env.home_dir(),
            Some(std::path::PathBuf::from("/tmp/somewhere"))
        );
    }

    #[test]
    fn test_as_envp_exports_pairs() {
        let mut env = empty_env();
        env.set_var("A", "1");
        let envp = env.as_envp();
        assert_eq!(envp.len(), 1);
        assert_eq!(envp[0].to_str().unwrap(), "A=1");
    }
}
