//! Game review: evaluate every position of a game with a local engine and
//! hand the results to the reporting service.

pub mod config;
pub mod outcome;
pub mod pipeline;
pub mod report;
pub mod types;

pub use config::ReviewConfig;
pub use outcome::{is_game_concluded, is_terminal_position};
pub use pipeline::{evaluate_positions, PositionEvaluator, ReviewOutcome, ReviewPipeline};
pub use report::{
    Accuracies, Classification, ClassifiedPosition, Report, ReportClient, ReportEndpoint, ReportError,
};
pub use types::{EvaluatedPosition, MoveNotation, Position, ReviewProgress, LOCAL_WORKER};

use engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}
