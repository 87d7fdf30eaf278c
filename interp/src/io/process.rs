//! Child processes fed through stdin, with a timeout and bounded output.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Output text when a process succeeds without printing anything.
pub const SILENT_SUCCESS: &str = "run successfully";

/// How to run one piped invocation.
#[derive(Debug, Clone)]
pub struct ProcessRequest<'a> {
    /// Program followed by its arguments.
    pub argv: &'a [String],
    pub stdin: &'a str,
    pub timeout: Duration,
    /// Bytes kept from each stream; the rest is drained and counted.
    pub output_limit_bytes: usize,
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub truncated_bytes: usize,
    pub timed_out: bool,
    pub timeout: Duration,
}

impl ProcessOutput {
    /// Caller-facing text: stdout then stderr, plus notes on abnormal exits.
    pub fn render(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        let clean_exit = self.status.success() && !self.timed_out;
        if text.trim().is_empty() && clean_exit && self.truncated_bytes == 0 {
            return SILENT_SUCCESS.to_string();
        }

        let mut notes = Vec::new();
        if self.timed_out {
            notes.push(format!("[timed out after {:?}]", self.timeout));
        } else if !self.status.success() {
            match self.status.code() {
                Some(code) => notes.push(format!("[exit status {code}]")),
                None => notes.push("[terminated by signal]".to_string()),
            }
        }
        if self.truncated_bytes > 0 {
            notes.push(format!("[output truncated {} bytes]", self.truncated_bytes));
        }
        for note in notes {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&note);
        }
        text
    }
}

/// Spawn `argv`, write `stdin` to it, and collect both output streams.
///
/// Stdin is written from its own thread and both streams are drained
/// concurrently, so a chatty child cannot deadlock against a large script.
#[instrument(skip_all, fields(program = %request.argv.first().map(String::as_str).unwrap_or(""), timeout_secs = request.timeout.as_secs()))]
pub fn run_piped(request: &ProcessRequest<'_>) -> Result<ProcessOutput> {
    let (program, args) = request
        .argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command"))?;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own group, so a timeout also reaches grandchildren holding the pipes.
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            error!(err = %err, "failed to spawn command");
            return Err(err).with_context(|| format!("spawn {program}"));
        }
    };

    let mut child_stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin was not piped"))?;
    let input = request.stdin.as_bytes().to_vec();
    let stdin_handle = thread::spawn(move || -> std::io::Result<()> {
        child_stdin.write_all(&input)?;
        // Dropping closes the pipe so the child sees EOF.
        drop(child_stdin);
        Ok(())
    });

    let limit = request.output_limit_bytes;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_handle = thread::spawn(move || drain_limited(stdout, limit));
    let stderr_handle = thread::spawn(move || drain_limited(stderr, limit));

    let mut timed_out = false;
    let status = match child
        .wait_timeout(request.timeout)
        .context("wait for command")?
    {
        Some(status) => status,
        None => {
            warn!("command timed out, killing");
            timed_out = true;
            kill_group(&mut child)?;
            child.wait().context("wait command after kill")?
        }
    };

    match stdin_handle.join() {
        Ok(Ok(())) => {}
        // A child that exits without reading all of stdin closes the pipe early.
        Ok(Err(err)) if err.kind() == std::io::ErrorKind::BrokenPipe => {
            debug!("child closed stdin early");
        }
        Ok(Err(err)) => return Err(err).context("write stdin"),
        Err(_) => return Err(anyhow!("stdin writer thread panicked")),
    }
    let (stdout, stdout_dropped) = join_reader(stdout_handle).context("join stdout")?;
    let (stderr, stderr_dropped) = join_reader(stderr_handle).context("join stderr")?;
    let truncated_bytes = stdout_dropped + stderr_dropped;
    if truncated_bytes > 0 {
        warn!(truncated_bytes, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(ProcessOutput {
        status,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        truncated_bytes,
        timed_out,
        timeout: request.timeout,
    })
}

/// Kill the child and everything it spawned into its process group.
fn kill_group(child: &mut Child) -> Result<()> {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        match Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(exit_code = ?status.code(), "kill of process group failed"),
            Err(err) => warn!(err = %err, "could not run kill for process group"),
        }
    }
    match child.kill() {
        Ok(()) => Ok(()),
        // Already reaped by the group kill.
        Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
        Err(err) => Err(err).context("kill command"),
    }
}

fn join_reader(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    handle
        .join()
        .unwrap_or_else(|_| Err(anyhow!("output reader thread panicked")))
}

/// Read to EOF, keeping at most `limit` bytes; returns kept bytes and the dropped count.
fn drain_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            return Ok((kept, dropped));
        }
        let room = limit.saturating_sub(kept.len()).min(n);
        kept.extend_from_slice(&chunk[..room]);
        dropped += n - room;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh() -> Vec<String> {
        vec!["sh".to_string()]
    }

    fn run(argv: &[String], stdin: &str, limit: usize) -> ProcessOutput {
        run_piped(&ProcessRequest {
            argv,
            stdin,
            timeout: Duration::from_secs(10),
            output_limit_bytes: limit,
        })
        .expect("run")
    }

    #[test]
    fn silent_success_is_reported() {
        let out = run(&sh(), "true\n", 1000);
        assert_eq!(out.render(), SILENT_SUCCESS);
    }

    #[test]
    fn stdout_and_stderr_are_combined_with_exit_note() {
        let out = run(&sh(), "echo out\necho err 1>&2\nexit 3\n", 1000);
        assert_eq!(out.render(), "out\nerr\n[exit status 3]");
    }

    #[test]
    fn output_beyond_limit_is_counted() {
        let out = run(&sh(), "printf 0123456789\n", 4);
        assert_eq!(out.stdout, "0123");
        assert_eq!(out.truncated_bytes, 6);
        assert!(out.render().ends_with("[output truncated 6 bytes]"));
    }

    #[test]
    fn slow_commands_time_out() {
        let out = run_piped(&ProcessRequest {
            argv: &sh(),
            stdin: "sleep 2\n",
            timeout: Duration::from_millis(200),
            output_limit_bytes: 100,
        })
        .expect("run");
        assert!(out.timed_out);
        assert_eq!(out.render(), "[timed out after 200ms]");
    }

    #[test]
    fn timeout_kills_grandchildren_holding_the_pipes() {
        let started = std::time::Instant::now();
        let out = run_piped(&ProcessRequest {
            argv: &sh(),
            stdin: "sleep 30\necho never\n",
            timeout: Duration::from_millis(200),
            output_limit_bytes: 100,
        })
        .expect("run");
        assert!(out.timed_out);
        assert!(!out.stdout.contains("never"));
        assert!(started.elapsed() < Duration::from_secs(5), "{:?}", started.elapsed());
    }

    #[test]
    fn missing_program_is_an_error() {
        let argv = vec!["definitely-not-a-real-program-xyz".to_string()];
        let err = run_piped(&ProcessRequest {
            argv: &argv,
            stdin: "",
            timeout: Duration::from_secs(1),
            output_limit_bytes: 100,
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("spawn definitely-not-a-real-program-xyz"));
    }
}
