use std::fmt;
use std::process::{Command, Stdio};

use crate::exec::command::Invocation;

/// How a finished command ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exit {
    Code(i32),
    /// Killed by a signal (number when the platform reports one).
    Signal(Option<i32>),
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exit::Code(c) => write!(f, "exit code {c}"),
            Exit::Signal(Some(s)) => write!(f, "killed by signal {s}"),
            Exit::Signal(None) => f.write_str("killed by signal"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RunOutput {
    pub exit: Exit,
    /// All of stdout, then all of stderr. The two streams are captured
    /// separately, so their relative order is lost.
    pub output: Vec<u8>,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.exit == Exit::Code(0)
    }
}

/// Runs one invocation to completion. Spawn failures are `Err`; anything
/// that ran comes back as `Ok` with its exit and output laid out as in
/// [`RunOutput::output`].
pub trait CommandRunner: Send + Sync {
    fn run(&self, inv: &Invocation) -> std::io::Result<RunOutput>;
}

/// Real subprocesses, stdin closed, output captured.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, inv: &Invocation) -> std::io::Result<RunOutput> {
        let mut cmd = Command::new(&inv.program);
        cmd.args(&inv.args).stdin(Stdio::null());
        if let Some(dir) = &inv.cwd {
            cmd.current_dir(dir);
        }
        tracing::debug!(command = %inv, "running");
        let out = cmd.output()?;
        let mut output = out.stdout;
        output.extend_from_slice(&out.stderr);
        Ok(RunOutput {
            exit: exit_of(&out.status),
            output,
        })
    }
}

fn exit_of(status: &std::process::ExitStatus) -> Exit {
    if let Some(c) = status.code() {
        return Exit::Code(c);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        Exit::Signal(status.signal())
    }
    #[cfg(not(unix))]
    {
        Exit::Signal(None)
    }
}
