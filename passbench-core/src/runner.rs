//! Timeout-Bounded Process Runner
//!
//! Launches an external command, waits up to a bound, and on expiry kills the
//! entire process subtree. The invoked compilers wrap further subprocesses in
//! some modes, so killing only the direct child would leak descendants; the
//! child is therefore placed in its own process group and signals go to the
//! group.
//!
//! Timeout sequence: SIGTERM to the group → short grace window → SIGKILL to
//! the group → reap. Output readers are joined after the kill so partial
//! stdout/stderr produced before the timeout is still returned.

use std::io::{Read, Write};
use std::os::unix::process::CommandExt;
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Poll interval while waiting for the child to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Grace window between SIGTERM and SIGKILL on timeout.
const KILL_GRACE: Duration = Duration::from_millis(200);

/// Errors from launching or supervising an external process.
///
/// A timeout is deliberately *not* an error: it is reported through
/// [`RunStatus::TimedOut`] so callers can still inspect partial output.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The argv was empty.
    #[error("empty command line")]
    EmptyCommand,

    /// The executable could not be found or started.
    #[error("failed to launch {program}: {source}")]
    Launch {
        /// Program that failed to start.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// I/O failure while supervising the child.
    #[error("process i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// How an invocation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// The process exited on its own within the bound.
    Completed {
        /// Exit code, if the process was not signal-terminated.
        code: Option<i32>,
    },
    /// The bound expired; the process group was killed before returning.
    TimedOut,
}

impl RunStatus {
    /// True for a normal zero exit.
    pub fn success(&self) -> bool {
        matches!(self, RunStatus::Completed { code: Some(0) })
    }

    /// True if the bound expired.
    pub fn timed_out(&self) -> bool {
        matches!(self, RunStatus::TimedOut)
    }
}

/// Captured result of one invocation.
#[derive(Debug)]
pub struct ProcessOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error (the compilers' diagnostic channel).
    pub stderr: String,
    /// Completion status.
    pub status: RunStatus,
}

/// One external command: argv, optional stdin payload, timeout.
///
/// Built per call and consumed by [`run`].
#[derive(Debug, Clone)]
pub struct Invocation {
    argv: Vec<String>,
    stdin: Option<String>,
    timeout: Duration,
}

impl Invocation {
    /// Start an invocation of `program` with a default 15 second bound.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            argv: vec![program.into()],
            stdin: None,
            timeout: Duration::from_secs(15),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// Provide a textual stdin payload (the pipe is closed after writing it).
    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    /// Override the timeout bound.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The program name (first argv element), for error reporting.
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }
}

/// Send `signal` to the whole process group rooted at `pgid`.
fn signal_group(pgid: libc::pid_t, signal: libc::c_int) {
    // Negative pid addresses the group. ESRCH just means everyone is gone.
    unsafe {
        libc::kill(-pgid, signal);
    }
}

/// Drain a pipe to a lossily-decoded string on a background thread.
fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Run one invocation to completion or timeout.
///
/// On timeout the entire process group is terminated (SIGTERM, grace window,
/// SIGKILL) before this returns, and whatever output the child produced up to
/// that point is still collected. A missing or unrunnable executable surfaces
/// as [`RunnerError::Launch`], distinct from a timeout.
pub fn run(invocation: &Invocation) -> Result<ProcessOutput, RunnerError> {
    let (program, args) = invocation
        .argv
        .split_first()
        .ok_or(RunnerError::EmptyCommand)?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // New process group, so one signal reaches the child and every descendant.
    unsafe {
        command.pre_exec(|| {
            libc::setpgid(0, 0);
            Ok(())
        });
    }

    debug!(command = ?invocation.argv, timeout = ?invocation.timeout, "spawning");

    let mut child = command.spawn().map_err(|source| RunnerError::Launch {
        program: program.clone(),
        source,
    })?;
    let pgid = child.id() as libc::pid_t;

    if let Some(payload) = invocation.stdin.clone() {
        if let Some(mut stdin) = child.stdin.take() {
            // Write on a separate thread; the child may not read everything.
            std::thread::spawn(move || {
                let _ = stdin.write_all(payload.as_bytes());
            });
        }
    }

    let stdout_reader = spawn_reader::<ChildStdout>(child.stdout.take());
    let stderr_reader = spawn_reader::<ChildStderr>(child.stderr.take());

    let status = wait_with_deadline(&mut child, pgid, invocation.timeout)?;

    // Once the group is dead the pipes hit EOF, so these joins terminate.
    let stdout = join_reader(stdout_reader);
    let stderr = join_reader(stderr_reader);

    Ok(ProcessOutput {
        stdout,
        stderr,
        status,
    })
}

/// Poll for exit until `timeout`; on expiry escalate SIGTERM → SIGKILL on the
/// whole group and reap.
fn wait_with_deadline(
    child: &mut Child,
    pgid: libc::pid_t,
    timeout: Duration,
) -> Result<RunStatus, RunnerError> {
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(exit) = child.try_wait()? {
            return Ok(RunStatus::Completed { code: exit.code() });
        }
        if Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    warn!(pid = pgid, "timeout expired, terminating process group");
    signal_group(pgid, libc::SIGTERM);

    let grace_deadline = Instant::now() + KILL_GRACE;
    while Instant::now() < grace_deadline {
        if child.try_wait()?.is_some() {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    // Force-kill stragglers (including descendants that ignored SIGTERM).
    signal_group(pgid, libc::SIGKILL);
    let _ = child.wait();

    Ok(RunStatus::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Invocation {
        Invocation::new("/bin/sh").arg("-c").arg(script)
    }

    #[test]
    fn captures_stdout_and_stderr() {
        let out = run(&sh("echo out; echo err >&2")).unwrap();
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert!(out.status.success());
    }

    #[test]
    fn forwards_stdin_payload() {
        let out = run(&sh("cat").stdin("hello from the pipe")).unwrap();
        assert_eq!(out.stdout, "hello from the pipe");
    }

    #[test]
    fn reports_nonzero_exit() {
        let out = run(&sh("exit 3")).unwrap();
        assert_eq!(out.status, RunStatus::Completed { code: Some(3) });
        assert!(!out.status.success());
    }

    #[test]
    fn launch_failure_is_distinct_from_timeout() {
        let err = run(&Invocation::new("/no/such/binary-here")).unwrap_err();
        assert!(matches!(err, RunnerError::Launch { .. }));
    }

    #[test]
    fn empty_command_is_rejected() {
        let invocation = Invocation {
            argv: Vec::new(),
            stdin: None,
            timeout: Duration::from_secs(1),
        };
        assert!(matches!(run(&invocation), Err(RunnerError::EmptyCommand)));
    }

    #[test]
    fn timeout_kills_the_whole_subtree() {
        // The shell forks a sleeping grandchild; both must be gone afterwards.
        let start = Instant::now();
        let out = run(&sh("sleep 30 & sleep 30").timeout(Duration::from_millis(300))).unwrap();
        assert_eq!(out.status, RunStatus::TimedOut);
        // Returning promptly means we did not block on the grandchild's pipe:
        // the group kill reached it.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn partial_output_survives_a_timeout() {
        let out = run(&sh("echo early; sleep 30").timeout(Duration::from_millis(300))).unwrap();
        assert_eq!(out.status, RunStatus::TimedOut);
        assert_eq!(out.stdout, "early\n");
    }
}
