// For executing shell commands and capturing their output.
use std::process::{Child, Command, Stdio};
// Both pipes are drained on their own threads so a chatty command cannot block.
use std::io::Read;
use std::thread;
use std::time::{Duration, Instant};
// Environment overlays come from descriptors as ordered maps.
use std::collections::BTreeMap;
// The 'colored' crate helps us make our console output look pretty and readable.
use colored::Colorize;
// Our custom logging macros.
use crate::log_debug;
use crate::libs::cancel::CancelToken;
use crate::libs::errors::{Error, Result};

// How often a running command checks for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Builds the platform shell invocation for `command`: `sh -c` or `cmd /C`.
fn shell(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

/// Runs `command` through the shell and returns its captured output.
///
/// # Arguments
/// * `command`: The command line.
/// * `env`: Variables added on top of the inherited environment.
/// * `cancel`: The child is killed when the token fires.
///
/// # Returns
/// * `Result<(String, String)>`: stdout and stderr on a zero exit status;
///   `Error::Command` with the combined output otherwise, `Error::Cancelled` when killed.
pub fn run(command: &str, env: &BTreeMap<String, String>, cancel: &CancelToken) -> Result<(String, String)> {
    execute(shell(command), command, env, cancel, None)
}

/// Runs `program` with `args` directly, without a shell.
///
/// Same contract as [`run`].
pub fn run_program(
    program: &str,
    args: &[String],
    env: &BTreeMap<String, String>,
    cancel: &CancelToken,
) -> Result<(String, String)> {
    let (cmd, display) = program_command(program, args);
    execute(cmd, &display, env, cancel, None)
}

/// Runs `program` like [`run_program`], killing it once `timeout` has elapsed.
///
/// # Returns
/// * `Err(Error::Timeout)` when the program is still running at the deadline.
pub fn run_program_within(
    program: &str,
    args: &[String],
    env: &BTreeMap<String, String>,
    cancel: &CancelToken,
    timeout: Duration,
) -> Result<(String, String)> {
    let (cmd, display) = program_command(program, args);
    execute(cmd, &display, env, cancel, Some(timeout))
}

fn program_command(program: &str, args: &[String]) -> (Command, String) {
    let mut cmd = Command::new(program);
    cmd.args(args);
    let display = std::iter::once(program.to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");
    (cmd, display)
}

fn execute(
    mut cmd: Command,
    command: &str,
    env: &BTreeMap<String, String>,
    cancel: &CancelToken,
    timeout: Option<Duration>,
) -> Result<(String, String)> {
    cancel.check()?;
    log_debug!("[Shell] Running: {}", command.cyan());

    let mut child = cmd
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::io(format!("failed to start `{command}`"), e))?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let started = Instant::now();

    let status = loop {
        if cancel.is_cancelled() {
            kill(&mut child);
            return Err(Error::Cancelled);
        }
        if let Some(limit) = timeout.filter(|limit| started.elapsed() >= *limit) {
            kill(&mut child);
            return Err(Error::Timeout {
                command: command.to_string(),
                seconds: limit.as_secs_f64(),
            });
        }
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                kill(&mut child);
                return Err(Error::io(format!("failed to wait for `{command}`"), e));
            }
        }
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();

    if status.success() {
        Ok((stdout, stderr))
    } else {
        Err(Error::Command {
            command: command.to_string(),
            code: status.code().unwrap_or(-1),
            output: combine(&stdout, &stderr),
        })
    }
}

/// Runs each command in order and stops at the first failure.
///
/// # Returns
/// * `Result<String>`: the combined output of every command, one block per command.
pub fn run_all(commands: &[String], env: &BTreeMap<String, String>, cancel: &CancelToken) -> Result<String> {
    let mut log = Vec::new();
    for command in commands {
        let (stdout, stderr) = run(command, env, cancel)?;
        let output = combine(&stdout, &stderr);
        if !output.is_empty() {
            log.push(output);
        }
    }
    Ok(log.join("\n"))
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        String::from_utf8_lossy(&buffer).to_string()
    })
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn combine(stdout: &str, stderr: &str) -> String {
    match (stdout.trim(), stderr.trim()) {
        ("", err) => err.to_string(),
        (out, "") => out.to_string(),
        (out, err) => format!("{out}\n{err}"),
    }
}
