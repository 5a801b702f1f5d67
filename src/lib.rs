//! An interactive Unix shell with pipelines and job control.
//!
//! This crate reads one command line per prompt cycle, expands environment
//! variables, and executes the result either as a builtin (in-process) or as
//! a pipeline of external processes sharing a process group. Launched
//! pipelines are tracked as jobs: foreground jobs block the prompt until
//! they finish or stop, background jobs are reaped lazily once per prompt,
//! and signals are routed between the shell and whichever job currently owns
//! the foreground.
//!
//! The main entry point is [`Interpreter`], which owns all shell state and
//! executes one line at a time. The public modules [`env`] and [`jobs`]
//! expose the environment snapshot and the job-tracking types.

mod builtin;
pub mod env;
mod exec;
mod interpreter;
pub mod jobs;
mod lexer;
mod parser;
mod signals;

pub use interpreter::{ExitCode, Interpreter};
