use engine::Line;
use serde::{Deserialize, Serialize};

/// Source tag for evaluations computed by a local engine.
pub const LOCAL_WORKER: &str = "local";

/// One ply of the game as produced by the move-list parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// FEN after the move was played.
    #[serde(rename = "after", alias = "afterFen", default)]
    pub after_fen: Option<String>,
    #[serde(default)]
    pub san: Option<String>,
    #[serde(rename = "lan", alias = "uci", default)]
    pub uci: Option<String>,
    /// Opening name, when the parser labelled the position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening: Option<String>,
}

impl Position {
    /// The FEN to search, if there is a usable one.
    pub fn fen(&self) -> Option<&str> {
        self.after_fen.as_deref().filter(|fen| !fen.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveNotation {
    #[serde(default)]
    pub san: Option<String>,
    #[serde(default)]
    pub uci: Option<String>,
}

/// Engine result for one input position, in the reporting service's format.
///
/// An empty `top_lines` means no evaluation is available for the position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatedPosition {
    #[serde(rename = "move")]
    pub mv: MoveNotation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fen: Option<String>,
    #[serde(rename = "topLines")]
    pub top_lines: Vec<Line>,
    pub worker: String,
}

impl EvaluatedPosition {
    pub fn new(position: &Position, top_lines: Vec<Line>) -> Self {
        Self {
            mv: MoveNotation {
                san: position.san.clone(),
                uci: position.uci.clone(),
            },
            fen: position.after_fen.clone(),
            top_lines,
            worker: LOCAL_WORKER.to_string(),
        }
    }

    /// Stand-in for a position the engine did not (or could not) evaluate.
    pub fn placeholder(position: &Position) -> Self {
        Self::new(position, Vec::new())
    }

    pub fn is_unavailable(&self) -> bool {
        self.top_lines.is_empty()
    }
}

/// How far a review has got.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewProgress {
    pub evaluated: usize,
    pub total: usize,
}

impl ReviewProgress {
    /// Completed share as a whole percentage, rounded half up.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        ((self.evaluated * 200 + self.total) / (self.total * 2)).min(100) as u8
    }
}
