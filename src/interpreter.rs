use crate::builtin;
use crate::env::Environment;
use crate::exec;
use crate::jobs::JobTable;
use crate::lexer;
use crate::parser;
use crate::signals;
use anyhow::Context;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, IsTerminal};

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// The interactive shell: reads lines, expands variables, and executes them
/// as builtins or pipelines of external processes with job control.
///
/// The interpreter owns all mutable shell state (an [`Environment`] and a
/// job table) and is driven one line at a time, either by [`repl`] or by
/// calling [`execute_line`] directly.
///
/// [`repl`]: Interpreter::repl
/// [`execute_line`]: Interpreter::execute_line
pub struct Interpreter {
    env: Environment,
    jobs: JobTable,
}

impl Interpreter {
    /// Create an interpreter and install the shell's signal configuration.
    ///
    /// Fails only when the signal handlers themselves cannot be installed;
    /// that is the one setup failure job control cannot recover from.
    pub fn new() -> anyhow::Result<Self> {
        let interactive = io::stdin().is_terminal();
        signals::install(interactive).context("failed to install signal handlers")?;
        Ok(Self::with_env(Environment::new()))
    }

    fn with_env(env: Environment) -> Self {
        Self {
            env,
            jobs: JobTable::new(),
        }
    }

    /// The shell's environment, read-only.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Execute one line of input to completion and return its exit status.
    ///
    /// Parse errors, launch failures and builtin errors are reported to the
    /// user here and folded into the status; none of them aborts the caller's
    /// loop. A blank line is a successful no-op.
    pub fn execute_line(&mut self, line: &str) -> ExitCode {
        let tokens = match lexer::split_line(line, &self.env) {
            Ok(tokens) => tokens,
            Err(e) => return self.report(e),
        };
        let pipeline = match parser::build_pipeline(line, tokens) {
            Ok(Some(pipeline)) => pipeline,
            Ok(None) => return 0,
            Err(e) => return self.report(e),
        };

        // Builtins only intercept single-command pipelines; `cd` on one side
        // of a pipe could never affect the parent shell anyway.
        if pipeline.commands.len() == 1 {
            let cmd = &pipeline.commands[0];
            let args: Vec<&str> = cmd.args.iter().map(String::as_str).collect();
            let mut stdout = io::stdout();
            if let Some(code) = builtin::dispatch(
                &cmd.program,
                &args,
                &mut stdout,
                &mut self.env,
                &mut self.jobs,
            ) {
                self.env.last_status = code;
                return code;
            }
        }

        match exec::spawn_pipeline(&pipeline, &self.env) {
            Ok(pids) => {
                let id = self
                    .jobs
                    .register(&pipeline.line, pipeline.background, &pids);
                if pipeline.background {
                    println!("[{}] {}", id, pids[0]);
                    0
                } else {
                    let status = self.jobs.wait_foreground(id);
                    if let Some(notice) = self.jobs.stopped_notice(id) {
                        eprintln!("{notice}");
                    }
                    self.env.last_status = status;
                    status
                }
            }
            Err(e) => {
                eprintln!("jsh: {e}");
                self.env.last_status = 1;
                1
            }
        }
    }

    fn report(&mut self, err: impl std::fmt::Display) -> ExitCode {
        eprintln!("jsh: {err}");
        self.env.last_status = 2;
        2
    }

    /// The read-eval-print loop.
    ///
    /// Each iteration first reaps finished background jobs and announces
    /// them, then reads a line. End-of-input ends the loop with status 0;
    /// Ctrl-C at the prompt just yields a fresh prompt. The `exit` builtin
    /// ends the loop with the recorded status.
    pub fn repl(&mut self) -> anyhow::Result<ExitCode> {
        let mut rl = DefaultEditor::new()?;

        loop {
            for notice in self.jobs.poll_background() {
                println!("{notice}");
            }

            match rl.readline("jsh$ ") {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = rl.add_history_entry(line.as_str());
                    }
                    self.execute_line(&line);
                    if self.env.should_exit {
                        return Ok(self.env.last_status);
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl-C with no foreground job: drop the flag, fresh prompt.
                    signals::take_interrupt();
                }
                Err(ReadlineError::Eof) => return Ok(0),
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn bare_interpreter() -> Interpreter {
        // No signal installation in tests; the harness owns the process.
        Interpreter::with_env(Environment {
            vars: HashMap::new(),
            current_dir: std::env::current_dir().unwrap(),
            last_status: 0,
            should_exit: false,
        })
    }

    #[test]
    fn test_blank_line_is_a_successful_noop() {
        let mut sh = bare_interpreter();
        assert_eq!(sh.execute_line(""), 0);
        assert_eq!(sh.execute_line("   \t "), 0);
    }

    #[test]
    fn test_line_of_only_undefined_variable_is_a_noop() {
        let mut sh = bare_interpreter();
        assert_eq!(sh.execute_line("$NOT_SET_ANYWHERE"), 0);
    }

    #[test]
    fn test_parse_error_reports_and_continues() {
        let mut sh = bare_interpreter();
        assert_eq!(sh.execute_line("echo 'oops"), 2);
        assert_eq!(sh.env().last_status, 2);
        // The interpreter is still usable.
        assert_eq!(sh.execute_line(""), 0);
    }

    #[test]
    fn test_syntax_error_reports_and_continues() {
        let mut sh = bare_interpreter();
        assert_eq!(sh.execute_line("a | | b"), 2);
        assert_eq!(sh.execute_line("| b"), 2);
    }

    #[test]
    fn test_exit_builtin_requests_shutdown() {
        let mut sh = bare_interpreter();
        assert_eq!(sh.execute_line("exit 5"), 5);
        assert!(sh.env().should_exit);
    }

    #[test]
    fn test_builtin_dispatch_goes_through_lexer() {
        let mut sh = bare_interpreter();
        sh.env.set_var("CODE", "7");
        assert_eq!(sh.execute_line("exit $CODE"), 7);
    }
}
