//! Standalone process session
//!
//! Runs one program with piped standard streams when no multiplexer is used.
//! Reader tasks append every output line to a bounded [`OutputBuffer`]; the
//! buffer's lock is the only synchronization the component needs.

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::{OUTPUT_BUFFER_CAPACITY, OutputBuffer, SessionBackend};
use crate::error::{Result, SessionError};

/// Launch parameters for a standalone process
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

/// A child process with captured output
pub struct ProcessSession {
    command: String,
    pid: Option<u32>,
    buffer: Arc<Mutex<OutputBuffer>>,
    stdin: tokio::sync::Mutex<Option<ChildStdin>>,
    exit: watch::Receiver<Option<i32>>,
    readers: CancellationToken,
}

impl ProcessSession {
    /// Spawn `command` through `sh -c`
    ///
    /// When `echo` is given, every captured line is also sent there as it arrives.
    #[instrument(skip(options, echo))]
    pub fn spawn(
        command: &str,
        options: &ProcessOptions,
        echo: Option<mpsc::UnboundedSender<String>>,
    ) -> Result<Self> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &options.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| SessionError::SpawnFailed {
            command: command.to_string(),
            reason: e.to_string(),
        })?;

        let pid = child.id();
        info!("Spawned '{}' as pid {:?}", command, pid);

        let buffer = Arc::new(Mutex::new(OutputBuffer::new()));
        let readers = CancellationToken::new();

        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, buffer.clone(), echo.clone(), readers.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, buffer.clone(), echo, readers.clone());
        }

        let stdin = child.stdin.take();

        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status
                    .code()
                    .or_else(|| status.signal().map(|sig| 128 + sig))
                    .unwrap_or(1),
                Err(e) => {
                    debug!("wait() failed: {}", e);
                    1
                }
            };
            info!("Process exited with code {}", code);
            let _ = exit_tx.send(Some(code));
        });

        Ok(Self {
            command: command.to_string(),
            pid,
            buffer,
            stdin: tokio::sync::Mutex::new(stdin),
            exit: exit_rx,
            readers,
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// The most recent `count` output lines, oldest first
    pub fn last_lines(&self, count: usize) -> Vec<String> {
        self.buffer().last(count)
    }

    /// Write to the process's stdin; silently does nothing once it is closed
    pub async fn write(&self, data: &str) {
        let mut stdin = self.stdin.lock().await;
        let Some(pipe) = stdin.as_mut() else {
            return;
        };

        let written = async {
            pipe.write_all(data.as_bytes()).await?;
            pipe.flush().await
        }
        .await;

        if let Err(e) = written {
            debug!("stdin closed: {}", e);
            *stdin = None;
        }
    }

    /// Close stdin so the program sees EOF
    pub async fn close_stdin(&self) {
        self.stdin.lock().await.take();
    }

    /// Exit code, if the process has exited
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.exit_code().is_none()
    }

    /// Wait for the process to exit and return its exit code
    pub async fn wait(&self) -> i32 {
        let mut exit = self.exit.clone();
        match exit.wait_for(Option::is_some).await {
            Ok(code) => (*code).unwrap_or(1),
            Err(_) => 1,
        }
    }

    /// Ask the process to stop (SIGTERM)
    pub fn stop(&self) -> Result<()> {
        self.signal(Signal::SIGTERM)
    }

    /// Forcibly stop the process and its readers
    pub fn kill(&self) -> Result<()> {
        let result = self.signal(Signal::SIGKILL);
        self.readers.cancel();
        result
    }

    fn signal(&self, signal: Signal) -> Result<()> {
        if !self.is_running() {
            return Err(SessionError::NotRunning.into());
        }
        let pid = self.pid.ok_or(SessionError::NotRunning)?;
        let pid = i32::try_from(pid).map_err(|_| SessionError::NotRunning)?;
        kill(Pid::from_raw(pid), signal).map_err(std::io::Error::from)?;
        Ok(())
    }

    fn buffer(&self) -> MutexGuard<'_, OutputBuffer> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        self.readers.cancel();
    }
}

#[async_trait]
impl SessionBackend for ProcessSession {
    async fn capture(&self) -> Result<String> {
        Ok(self.last_lines(OUTPUT_BUFFER_CAPACITY).join("\n"))
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.write(text).await;
        Ok(())
    }

    async fn send_enter(&self) -> Result<()> {
        self.write("\n").await;
        Ok(())
    }

    async fn interrupt(&self) -> Result<()> {
        self.stop()
    }

    async fn terminate(&self) -> Result<()> {
        ProcessSession::kill(self)
    }

    async fn is_alive(&self) -> bool {
        self.is_running()
    }
}

fn spawn_reader<R>(
    stream: R,
    buffer: Arc<Mutex<OutputBuffer>>,
    echo: Option<mpsc::UnboundedSender<String>>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line,
            };

            match line {
                Ok(Some(line)) => {
                    if let Some(echo) = &echo {
                        let _ = echo.send(line.clone());
                    }
                    buffer
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .push(line);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Output reader stopped: {}", e);
                    break;
                }
            }
        }
    });
}
