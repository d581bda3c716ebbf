//! Scripted in-memory engine for testing - only compiled in test mode or with mock feature

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::worker::{Worker, WorkerFactory};
use crate::EngineError;

/// What the fake engine does when it receives `go depth N` for a position.
#[derive(Debug, Clone)]
pub enum SearchReply {
    /// Print these lines, in order.
    Lines(Vec<String>),
    /// Close the output stream, as if the process died.
    Crash,
    /// Print nothing and never finish.
    Hang,
}

#[derive(Default)]
struct ScriptState {
    replies: HashMap<String, VecDeque<SearchReply>>,
    sent: Vec<String>,
    spawns: usize,
    kills: usize,
    fail_spawns_from: Option<usize>,
    silent_handshake: bool,
}

/// Factory for scripted workers sharing one script and one call log.
#[derive(Clone, Default)]
pub struct ScriptedWorkerFactory {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedWorkerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next search of `fen`. Searches with no queued
    /// reply get [`default_search_lines`].
    pub fn on_search(&self, fen: &str, reply: SearchReply) -> &Self {
        self.state
            .lock()
            .unwrap()
            .replies
            .entry(fen.trim().to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Every spawn starting with the `n`th (0-based) fails.
    pub fn fail_spawns_from(&self, n: usize) -> &Self {
        self.state.lock().unwrap().fail_spawns_from = Some(n);
        self
    }

    /// Workers never answer the handshake.
    pub fn silent_handshake(&self) -> &Self {
        self.state.lock().unwrap().silent_handshake = true;
        self
    }

    /// Every line written to any worker, without the trailing newline.
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Number of `go` commands written so far.
    pub fn searches(&self) -> usize {
        self.sent().iter().filter(|l| l.starts_with("go ")).count()
    }

    pub fn spawns(&self) -> usize {
        self.state.lock().unwrap().spawns
    }

    pub fn kills(&self) -> usize {
        self.state.lock().unwrap().kills
    }
}

impl WorkerFactory for ScriptedWorkerFactory {
    fn spawn(&self) -> Result<Box<dyn Worker>, EngineError> {
        let mut state = self.state.lock().unwrap();
        let index = state.spawns;
        state.spawns += 1;
        if state.fail_spawns_from.is_some_and(|n| index >= n) {
            return Err(EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "scripted spawn failure",
            )));
        }
        Ok(Box::new(ScriptedWorker {
            state: Arc::clone(&self.state),
            outbox: VecDeque::new(),
            position: None,
            closed: false,
            killed: false,
        }))
    }
}

struct ScriptedWorker {
    state: Arc<Mutex<ScriptState>>,
    outbox: VecDeque<String>,
    position: Option<String>,
    closed: bool,
    killed: bool,
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn send(&mut self, line: String) -> Result<(), EngineError> {
        if self.closed {
            return Err(EngineError::Crashed);
        }
        let line = line.trim().to_string();
        let mut state = self.state.lock().unwrap();
        state.sent.push(line.clone());

        if line == "uci" {
            if !state.silent_handshake {
                self.outbox.push_back("id name Scripted".to_string());
                self.outbox.push_back("uciok".to_string());
            }
        } else if line == "isready" {
            self.outbox.push_back("readyok".to_string());
        } else if let Some(fen) = line.strip_prefix("position fen ") {
            self.position = Some(fen.to_string());
        } else if let Some(depth) = line.strip_prefix("go depth ") {
            let depth: u8 = depth.parse().unwrap_or(1);
            let fen = self.position.clone().unwrap_or_default();
            let reply = state
                .replies
                .get_mut(&fen)
                .and_then(|queue| queue.pop_front())
                .unwrap_or_else(|| SearchReply::Lines(default_search_lines(depth)));
            match reply {
                SearchReply::Lines(lines) => self.outbox.extend(lines),
                SearchReply::Crash => self.closed = true,
                SearchReply::Hang => {}
            }
        }
        Ok(())
    }

    async fn next_line(&mut self) -> Option<String> {
        if let Some(line) = self.outbox.pop_front() {
            return Some(line);
        }
        if self.closed {
            return None;
        }
        std::future::pending::<Option<String>>().await
    }

    async fn kill(&mut self) {
        if self.killed {
            return;
        }
        self.killed = true;
        self.closed = true;
        self.outbox.clear();
        self.state.lock().unwrap().kills += 1;
    }
}

/// A plausible search transcript: two ranked lines per depth, then `bestmove`.
/// Rank 1 scores +20 and plays e2e4; rank 2 scores +10 and plays d2d4.
pub fn default_search_lines(depth: u8) -> Vec<String> {
    let mut lines = Vec::new();
    for d in 1..=depth {
        lines.push(info_line(d, 1, "cp 20", "e2e4"));
        lines.push(info_line(d, 2, "cp 10", "d2d4"));
    }
    lines.push("bestmove e2e4 ponder e7e5".to_string());
    lines
}

/// Format an `info` line the way Stockfish prints it.
pub fn info_line(depth: u8, multipv: u8, score: &str, pv: &str) -> String {
    format!(
        "info depth {} seldepth {} multipv {} score {} nodes 1000 nps 500000 time 2 pv {}",
        depth,
        depth + 2,
        multipv,
        score,
        pv
    )
}
