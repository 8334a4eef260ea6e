//! Process execution for chartlift.
//!
//! This crate runs external tools (helm) with output capture, an optional
//! stdin payload and an optional deadline after which the child is killed.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use chartlift_process::{run_command_with_timeout, CommandInput};
//!
//! let result = run_command_with_timeout(
//!     "helm",
//!     &["version", "--short"],
//!     CommandInput::None,
//!     Some(Duration::from_secs(10)),
//! )
//! .expect("run");
//! assert!(result.success);
//! ```

use std::io::{ErrorKind, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long output is still collected once the child is gone. Pipes held open
/// by a grandchild are abandoned after this.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Result of a command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Whether the command succeeded (exit code 0)
    pub success: bool,
    /// Exit code (if available)
    pub exit_code: Option<i32>,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Whether the command was killed after exceeding its deadline
    #[serde(default)]
    pub timed_out: bool,
    /// Duration of execution
    pub duration_ms: u64,
}

impl CommandResult {
    /// Best diagnostic text: stderr if present, otherwise stdout.
    pub fn diagnostic(&self) -> &str {
        let err = self.stderr.trim();
        if err.is_empty() {
            self.stdout.trim()
        } else {
            err
        }
    }
}

/// What to feed the child on stdin.
#[derive(Debug, Clone, Copy)]
pub enum CommandInput<'a> {
    /// Stdin is closed immediately.
    None,
    /// Bytes written to stdin, then stdin is closed.
    Bytes(&'a [u8]),
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Run a command with an optional stdin payload and deadline.
///
/// On timeout the child is killed and the result carries `timed_out = true`
/// with a note appended to stderr. Spawn failures are returned as errors.
///
/// Output is collected for a short grace period after the child exits, so a
/// background grandchild holding the pipes cannot stall the caller.
pub fn run_command_with_timeout(
    program: &str,
    args: &[&str],
    input: CommandInput<'_>,
    timeout: Option<Duration>,
) -> Result<CommandResult> {
    let start = Instant::now();

    let stdin = match input {
        CommandInput::None => Stdio::null(),
        CommandInput::Bytes(_) => Stdio::piped(),
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn command: {} {:?}", program, args))?;

    let (tx, rx) = mpsc::channel();
    spawn_reader(child.stdout.take(), Stream::Stdout, tx.clone());
    spawn_reader(child.stderr.take(), Stream::Stderr, tx);

    if let CommandInput::Bytes(bytes) = input
        && let Some(mut pipe) = child.stdin.take()
    {
        let payload = bytes.to_vec();
        // A child that exits before reading its input yields a broken pipe;
        // its exit status is the meaningful signal, so the write error is dropped.
        thread::spawn(move || {
            let _ = pipe.write_all(&payload);
        });
    }

    let (exit_code, success, timed_out) = wait_with_deadline(&mut child, timeout)?;

    let (stdout, mut stderr) = drain_output(&rx, Instant::now() + DRAIN_GRACE);
    if timed_out && let Some(limit) = timeout {
        stderr.push_str(&format!(
            "\ncommand timed out after {}",
            humantime::format_duration(limit)
        ));
    }

    Ok(CommandResult {
        success,
        exit_code,
        stdout,
        stderr,
        timed_out,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Option<Duration>,
) -> Result<(Option<i32>, bool, bool)> {
    let Some(limit) = timeout else {
        let status = child.wait().context("failed to wait for command")?;
        return Ok((status.code(), status.success(), false));
    };

    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait().context("failed to poll command")? {
            return Ok((status.code(), status.success(), false));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok((None, false, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn spawn_reader<R>(pipe: Option<R>, stream: Stream, tx: Sender<(Stream, Vec<u8>)>)
where
    R: Read + Send + 'static,
{
    let Some(mut pipe) = pipe else {
        return;
    };
    thread::spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send((stream, buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    });
}

/// Gather reader output until both pipes close or `until` passes.
fn drain_output(rx: &Receiver<(Stream, Vec<u8>)>, until: Instant) -> (String, String) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    loop {
        let remaining = until.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((Stream::Stdout, chunk)) => stdout.extend_from_slice(&chunk),
            Ok((Stream::Stderr, chunk)) => stderr.extend_from_slice(&chunk),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
        }
    }
    (
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
    )
}

/// Check if a command exists in PATH
pub fn command_exists(program: &str) -> bool {
    which::which(program).is_ok()
}
