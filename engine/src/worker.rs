//! Engine worker processes.
//!
//! A [`Worker`] is a line-oriented pipe to one running engine. The session
//! never touches `tokio::process` directly; it asks a [`WorkerFactory`] for a
//! fresh worker at start-up and again after every crash, so a restart always
//! brings back the same engine binary.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;

use crate::EngineError;

/// A running engine that accepts and produces protocol lines.
#[async_trait]
pub trait Worker: Send {
    /// Queue one newline-terminated line for the engine's stdin.
    async fn send(&mut self, line: String) -> Result<(), EngineError>;

    /// Next line of engine output, trimmed. `None` once the output has ended,
    /// which means the process exited or its pipe broke.
    ///
    /// Must be cancel-safe: the session polls it inside `select!`.
    async fn next_line(&mut self) -> Option<String>;

    /// Kill the process. Calling it again after the first kill is a no-op.
    async fn kill(&mut self);
}

/// Creates workers for a session.
pub trait WorkerFactory: Send + Sync + 'static {
    fn spawn(&self) -> Result<Box<dyn Worker>, EngineError>;
}

/// Spawns an engine binary as a child process.
#[derive(Debug, Clone)]
pub struct ProcessWorkerFactory {
    path: PathBuf,
    args: Vec<String>,
}

impl ProcessWorkerFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WorkerFactory for ProcessWorkerFactory {
    #[tracing::instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    fn spawn(&self) -> Result<Box<dyn Worker>, EngineError> {
        ProcessWorker::spawn(&self.path, &self.args).map(|w| Box::new(w) as Box<dyn Worker>)
    }
}

/// Engine child process with background stdin-writer and stdout-reader tasks.
pub struct ProcessWorker {
    process: Child,
    stdin_tx: mpsc::Sender<String>,
    lines_rx: mpsc::Receiver<String>,
    killed: bool,
}

impl ProcessWorker {
    pub fn spawn(path: &Path, args: &[String]) -> Result<Self, EngineError> {
        tracing::debug!("Spawning engine process {:?}", path);
        let mut process = tokio::process::Command::new(path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::error!("Failed to spawn engine: {}", e);
                EngineError::Io(e)
            })?;

        let mut stdin = process.stdin.take().ok_or(EngineError::NoStdin)?;
        let stdout = process.stdout.take().ok_or(EngineError::NoStdout)?;

        let (lines_tx, lines_rx) = mpsc::channel::<String>(256);
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        tracing::warn!("Engine stdout EOF - engine closed");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        tracing::trace!("UCI << {}", trimmed);
                        if lines_tx.send(trimmed.to_string()).await.is_err() {
                            // Session dropped its worker
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Error reading from engine stdout: {}", e);
                        break;
                    }
                }
            }
            tracing::debug!("Output reader task exiting");
        });

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(32);
        tokio::spawn(async move {
            while let Some(cmd) = stdin_rx.recv().await {
                tracing::trace!("UCI >> {}", cmd.trim());
                if let Err(e) = stdin.write_all(cmd.as_bytes()).await {
                    tracing::error!("Failed to write to stdin: {}", e);
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    tracing::error!("Failed to flush stdin: {}", e);
                    break;
                }
            }
            tracing::debug!("Stdin writer task exiting");
        });

        Ok(Self {
            process,
            stdin_tx,
            lines_rx,
            killed: false,
        })
    }
}

#[async_trait]
impl Worker for ProcessWorker {
    async fn send(&mut self, line: String) -> Result<(), EngineError> {
        self.stdin_tx
            .send(line)
            .await
            .map_err(|_| EngineError::Crashed)
    }

    async fn next_line(&mut self) -> Option<String> {
        self.lines_rx.recv().await
    }

    async fn kill(&mut self) {
        if self.killed {
            return;
        }
        self.killed = true;
        if let Err(e) = self.process.kill().await {
            tracing::debug!("Engine process already gone: {}", e);
        }
    }
}

/// Find a Stockfish executable in common locations
pub fn find_engine_path() -> Option<PathBuf> {
    let paths = [
        "/usr/local/bin/stockfish",
        "/usr/bin/stockfish",
        "/opt/homebrew/bin/stockfish",
        "/usr/games/stockfish",
        "stockfish", // In PATH
    ];

    for path_str in paths {
        let path = Path::new(path_str);
        if path.exists() || path_str == "stockfish" {
            // Make sure it actually runs
            if std::process::Command::new(path_str)
                .arg("quit")
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .is_ok()
            {
                return Some(PathBuf::from(path_str));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_keeps_path() {
        let factory = ProcessWorkerFactory::new("/opt/engines/stockfish-17");
        assert_eq!(factory.path(), Path::new("/opt/engines/stockfish-17"));
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let factory = ProcessWorkerFactory::new("/nonexistent/engine/binary");
        assert!(matches!(factory.spawn(), Err(EngineError::Io(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_worker_round_trip() {
        // `cat` echoes every line back, standing in for an engine
        let mut worker = ProcessWorker::spawn(Path::new("cat"), &[]).unwrap();
        worker.send("uciok\n".to_string()).await.unwrap();
        assert_eq!(worker.next_line().await.as_deref(), Some("uciok"));

        worker.kill().await;
        worker.kill().await;
        assert_eq!(worker.next_line().await, None);
    }
}
