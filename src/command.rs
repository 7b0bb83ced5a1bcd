//! Subprocess execution, abstracted behind a trait so `rewrite_local_args`,
//! the local preprocessor step, and the remote compile step can all be
//! exercised in tests without touching a real compiler.

use std::process::{Command, Output, Stdio};

use errors::*;

/// Runs an external command and collects its output. The real
/// implementation below shells out; tests substitute a scripted one.
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<Output>;
}

/// Spawns the real process via `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealRunner;

impl CommandRunner for RealRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<Output> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .chain_err(|| format!("failed to run {}", program))
    }
}
