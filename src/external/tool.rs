//! Bounded-time external tool runner
//!
//! A child process gets a deadline. On expiry it is killed and the call
//! fails with `SD_TOOL_TIMEOUT`; nothing here retries. Secrets go in on
//! stdin, never on the command line.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use zeroize::Zeroizing;

use super::errors::{ToolError, ToolResult};
use crate::observability::{log_event, Event};

/// Deadline for disk enumeration
pub const ENUMERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for a volume mount
pub const MOUNT_TIMEOUT: Duration = Duration::from_secs(60);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured result of a finished child
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit code; `None` when terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// First non-empty line of stderr, else of stdout
    pub fn diagnostic(&self) -> String {
        self.stderr
            .lines()
            .chain(self.stdout.lines())
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("no output")
            .to_string()
    }
}

/// Builder for one external tool invocation
pub struct ToolCommand {
    program: String,
    args: Vec<OsString>,
    stdin: Option<Zeroizing<Vec<u8>>>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Bytes written to the child's stdin, then stdin is closed.
    pub fn stdin_secret(mut self, bytes: Zeroizing<Vec<u8>>) -> Self {
        self.stdin = Some(bytes);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run to completion or deadline.
    pub fn run(self) -> ToolResult<ToolOutput> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ToolError::not_found(&self.program),
                _ => ToolError::io(&self.program, e),
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        if let (Some(secret), Some(mut pipe)) = (self.stdin.as_ref(), child.stdin.take()) {
            match pipe.write_all(secret) {
                Ok(()) => {}
                // Child exited without reading; its exit status tells the story.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
                Err(e) => {
                    kill(&mut child);
                    return Err(ToolError::io(&self.program, e));
                }
            }
        }

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    kill(&mut child);
                    let limit = self.timeout.as_secs().to_string();
                    log_event(
                        Event::ToolTimeout,
                        &[("program", self.program.as_str()), ("timeout_secs", limit.as_str())],
                    );
                    return Err(ToolError::timeout(&self.program, self.timeout));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    kill(&mut child);
                    return Err(ToolError::io(&self.program, e));
                }
            }
        };

        Ok(ToolOutput {
            exit_code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }

    /// Run and require a zero exit status.
    pub fn run_checked(self) -> ToolResult<ToolOutput> {
        let program = self.program.clone();
        let output = self.run()?;
        if output.success() {
            return Ok(output);
        }
        let code = output
            .exit_code
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        let diagnostic = output.diagnostic();
        log_event(
            Event::ToolFailed,
            &[("exit_code", code.as_str()), ("program", program.as_str())],
        );
        Err(ToolError::failed(
            &program,
            format!("{} exited with {}: {}", program, code, diagnostic),
        ))
    }
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::external::ToolErrorCode;

    #[test]
    fn test_missing_program_is_not_found() {
        let err = ToolCommand::new("smartdrive-no-such-tool", Duration::from_secs(1))
            .run()
            .unwrap_err();
        assert_eq!(err.code(), ToolErrorCode::SdToolNotFound);
    }

    #[test]
    fn test_output_captured() {
        let output = ToolCommand::new("sh", Duration::from_secs(5))
            .args(["-c", "echo out; echo err >&2; exit 3"])
            .run()
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.diagnostic(), "err");
    }

    #[test]
    fn test_stdin_delivered() {
        let output = ToolCommand::new("cat", Duration::from_secs(5))
            .stdin_secret(Zeroizing::new(b"hunter2\n".to_vec()))
            .run_checked()
            .unwrap();
        assert_eq!(output.stdout, "hunter2\n");
    }

    #[test]
    fn test_deadline_kills_child() {
        let started = Instant::now();
        let err = ToolCommand::new("sleep", Duration::from_millis(200))
            .arg("5")
            .run()
            .unwrap_err();
        assert_eq!(err.code(), ToolErrorCode::SdToolTimeout);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_nonzero_exit_fails_checked_run() {
        let err = ToolCommand::new("false", Duration::from_secs(5))
            .run_checked()
            .unwrap_err();
        assert_eq!(err.code(), ToolErrorCode::SdToolFailed);
    }
}
