//! Process supervisor: one child process per stage
//!
//! Output is read in raw chunks on two reader tasks and funnelled through a
//! channel to the supervising task, which is the only place callbacks are
//! invoked. That task also owns the wall-clock deadline and the output byte
//! counter, so whichever of {exit, timeout, output cap} happens first decides
//! the outcome and nothing is emitted afterwards.

use crate::limits::ResourceLimits;
use crate::sink::OutputSink;
use crate::types::{StageCommand, StageOutcome, Termination};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

const READ_BUFFER_SIZE: usize = 8 * 1024;
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Limits applied to a single supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageLimits {
    pub timeout: Duration,
    pub max_output_bytes: usize,
    pub kill_grace: Duration,
}

impl StageLimits {
    /// Limits for the run stage
    pub fn run(limits: &ResourceLimits) -> Self {
        Self {
            timeout: limits.timeout,
            max_output_bytes: limits.max_output_bytes,
            kill_grace: limits.kill_grace,
        }
    }

    /// Limits for the compile stage
    pub fn compile(limits: &ResourceLimits) -> Self {
        Self {
            timeout: limits.compile_timeout,
            ..Self::run(limits)
        }
    }
}

impl Default for StageLimits {
    fn default() -> Self {
        Self::run(&ResourceLimits::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

struct Chunk {
    stream: Stream,
    bytes: Vec<u8>,
}

/// Spawns and supervises a single process
#[derive(Debug, Clone, Default)]
pub struct ProcessSupervisor {
    limits: StageLimits,
}

impl ProcessSupervisor {
    pub fn new(limits: StageLimits) -> Self {
        Self { limits }
    }

    /// Run `command` to completion, streaming its output into `sink`.
    ///
    /// Non-empty `stdin` is written in full and the pipe closed; otherwise the
    /// child gets a null stdin.
    pub async fn run(
        &self,
        command: &StageCommand,
        stdin: &str,
        sink: &dyn OutputSink,
    ) -> StageOutcome {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(if stdin.is_empty() {
                Stdio::null()
            } else {
                Stdio::piped()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %command, error = %e, "Failed to spawn process");
                sink.on_error(&format!("Process error: {}", e));
                return StageOutcome::spawn_failed();
            }
        };
        let pid = child.id();
        debug!(command = %command, pid, "Process spawned");

        if let Some(mut pipe) = child.stdin.take() {
            let input = stdin.as_bytes().to_vec();
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&input).await {
                    // The child may exit without reading its input
                    debug!(pid, error = %e, "Failed to write stdin");
                }
                // Dropping the pipe closes it so the child sees end-of-input
            });
        }

        let (tx, mut rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump(stdout, Stream::Stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump(stderr, Stream::Stderr, tx.clone())));
        }
        drop(tx);

        let deadline = tokio::time::sleep(self.limits.timeout);
        tokio::pin!(deadline);

        let mut stdout_decoder = Utf8Decoder::default();
        let mut stderr_decoder = Utf8Decoder::default();
        let mut output_bytes = 0usize;
        let mut exit_code = None;
        let mut exited = false;
        let mut streams_open = true;
        // Once the child exits, descendants still holding its pipes get
        // `kill_grace` to finish writing before the group is killed.
        let mut drain_deadline: Option<Instant> = None;

        let termination = loop {
            if exited && !streams_open {
                break None;
            }

            tokio::select! {
                biased;

                // Once the child has exited on its own only the drain window applies
                _ = &mut deadline, if !exited => break Some(Termination::TimedOut),

                chunk = rx.recv(), if streams_open => match chunk {
                    Some(chunk) => {
                        output_bytes += chunk.bytes.len();
                        if output_bytes > self.limits.max_output_bytes {
                            break Some(Termination::OutputLimitExceeded);
                        }
                        match chunk.stream {
                            Stream::Stdout => emit(sink, Stream::Stdout, stdout_decoder.decode(&chunk.bytes)),
                            Stream::Stderr => emit(sink, Stream::Stderr, stderr_decoder.decode(&chunk.bytes)),
                        }
                    }
                    None => streams_open = false,
                },

                status = child.wait(), if !exited => {
                    exited = true;
                    drain_deadline = Some(Instant::now() + self.limits.kill_grace);
                    match status {
                        Ok(status) => {
                            exit_code = status.code();
                            debug!(pid, ?status, "Process exited");
                        }
                        Err(e) => warn!(pid, error = %e, "Failed to wait for process"),
                    }
                },

                _ = sleep_until_opt(drain_deadline), if exited && streams_open => {
                    debug!(pid, "Output still open after exit; killing process group");
                    if let Some(pid) = pid {
                        kill_process_group(pid);
                    }
                    break None;
                },
            }
        };

        match termination {
            Some(cause) => {
                let message = match cause {
                    Termination::TimedOut => {
                        warn!(
                            pid,
                            timeout_ms = self.limits.timeout.as_millis() as u64,
                            "Process timed out"
                        );
                        ResourceLimits::timeout_message(self.limits.timeout)
                    }
                    Termination::OutputLimitExceeded => {
                        warn!(
                            pid,
                            output_bytes,
                            limit = self.limits.max_output_bytes,
                            "Output limit exceeded"
                        );
                        ResourceLimits::output_limit_message(self.limits.max_output_bytes)
                    }
                };
                self.terminate(&mut child, pid, exited).await;
                sink.on_error(&message);
            }
            None => {
                emit(sink, Stream::Stdout, stdout_decoder.finish());
                emit(sink, Stream::Stderr, stderr_decoder.finish());
                // Descendants that detached from the pipes die with the stage
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
            }
        }

        for reader in readers {
            reader.abort();
        }

        StageOutcome {
            exit_code,
            termination,
            output_bytes,
        }
    }

    /// Kill the process group, then wait a bounded time for the child to be
    /// reaped. `kill_on_drop` covers a child that still refuses to go.
    async fn terminate(&self, child: &mut Child, pid: Option<u32>, exited: bool) {
        if let Some(pid) = pid {
            kill_process_group(pid);
        }
        if exited {
            return;
        }
        if let Err(e) = child.start_kill() {
            debug!(pid, error = %e, "start_kill failed");
        }
        match tokio::time::timeout(self.limits.kill_grace, child.wait()).await {
            Ok(Ok(status)) => debug!(pid, ?status, "Killed process reaped"),
            Ok(Err(e)) => warn!(pid, error = %e, "Failed to reap killed process"),
            Err(_) => warn!(
                pid,
                grace_ms = self.limits.kill_grace.as_millis() as u64,
                "Killed process not reaped within grace period"
            ),
        }
    }
}

async fn pump<R>(mut reader: R, stream: Stream, tx: mpsc::Sender<Chunk>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = Chunk {
                    stream,
                    bytes: buf[..n].to_vec(),
                };
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(?stream, error = %e, "Read from child failed");
                break;
            }
        }
    }
}

fn emit(sink: &dyn OutputSink, stream: Stream, text: String) {
    if text.is_empty() {
        return;
    }
    match stream {
        Stream::Stdout => sink.on_output(&text),
        Stream::Stderr => sink.on_error(&text),
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: kill(2) only delivers a signal; a negative pid targets the
    // process group the child leads (spawned with process_group(0)).
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pgid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

/// Incremental UTF-8 decoding that carries split multi-byte sequences over
/// to the next chunk. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut out = String::with_capacity(self.pending.len());
        let mut input: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    out.push_str(text);
                    input = &[];
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        None => {
                            input = rest;
                            break;
                        }
                    }
                }
            }
        }

        let consumed = self.pending.len() - input.len();
        self.pending.drain(..consumed);
        out
    }

    fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}
