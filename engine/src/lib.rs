pub mod session;
pub mod uci;
pub mod worker;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use session::{EngineSession, ReadySignal, SessionConfig, SessionState};
pub use uci::{decode, encode, side_to_move};
pub use worker::{find_engine_path, ProcessWorkerFactory, Worker, WorkerFactory};

use cozy_chess::Color;
use serde::{Deserialize, Serialize};

/// Number of ranked alternatives the engine is asked to report per search.
pub const TRACKED_LINES: u8 = 2;

/// Commands sent to the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Handshake,
    SetOption { name: String, value: String },
    SetPosition { fen: String },
    Search { depth: u8 },
    /// Synchronization ping, answered with `readyok`.
    IsReady,
    Quit,
}

/// Events decoded from engine output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    HandshakeAck,
    ReadyOk,
    Info(InfoLine),
    BestMove,
    /// `info depth 0 ...`, emitted when the searched position is already terminal.
    DepthZero,
    /// Produced by the worker layer when the process output ends or fails.
    Crashed,
}

/// One fully-populated search report for a single ranked alternative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoLine {
    pub depth: u8,
    pub multipv: u8,
    pub score: Score,
    /// First move of the principal variation, in UCI notation.
    pub principal_move: String,
}

/// Raw engine score, relative to the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    Mate(i32), // Negative for being mated
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalKind {
    Cp,
    Mate,
}

/// Evaluation stored from White's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    #[serde(rename = "type")]
    pub kind: EvalKind,
    pub value: i32,
}

impl Evaluation {
    /// Normalize a side-to-move score to White's perspective.
    pub fn from_side_to_move(score: Score, side: Color) -> Self {
        let (kind, raw) = match score {
            Score::Centipawns(cp) => (EvalKind::Cp, cp),
            Score::Mate(n) => (EvalKind::Mate, n),
        };
        let value = match side {
            Color::White => raw,
            Color::Black => -raw,
        };
        Self { kind, value }
    }
}

/// A finalized candidate line from one search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    #[serde(rename = "id")]
    pub rank: u8,
    pub depth: u8,
    pub evaluation: Evaluation,
    #[serde(rename = "moveUCI")]
    pub mv: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Engine has no stdin")]
    NoStdin,
    #[error("Engine has no stdout")]
    NoStdout,
    #[error("Engine crashed during search")]
    Crashed,
    #[error("Search timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Engine unavailable after {0} restart attempts")]
    Unavailable(u32),
    #[error("Engine session terminated")]
    Terminated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_black_to_move_score_is_negated() {
        let eval = Evaluation::from_side_to_move(Score::Centipawns(120), Color::Black);
        assert_eq!(eval, Evaluation { kind: EvalKind::Cp, value: -120 });
    }

    #[test]
    fn test_white_to_move_score_is_kept() {
        let eval = Evaluation::from_side_to_move(Score::Centipawns(120), Color::White);
        assert_eq!(eval.value, 120);
        let mate = Evaluation::from_side_to_move(Score::Mate(-3), Color::White);
        assert_eq!(mate, Evaluation { kind: EvalKind::Mate, value: -3 });
    }

    #[test]
    fn test_line_wire_format() {
        let line = Line {
            rank: 1,
            depth: 16,
            evaluation: Evaluation { kind: EvalKind::Mate, value: -2 },
            mv: "e2e4".to_string(),
        };
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 1,
                "depth": 16,
                "evaluation": { "type": "mate", "value": -2 },
                "moveUCI": "e2e4"
            })
        );
    }
}
