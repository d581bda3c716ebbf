use std::sync::Arc;

use async_trait::async_trait;
use engine::{EngineError, EngineSession, Line, SessionConfig, WorkerFactory};
use tokio::sync::watch;

use crate::report::{Report, ReportClient};
use crate::types::{EvaluatedPosition, Position, ReviewProgress};
use crate::ReviewError;

/// Anything that can search one position to a fixed depth.
#[async_trait]
pub trait PositionEvaluator: Send {
    async fn evaluate(&mut self, fen: &str, depth: u8) -> Result<Vec<Line>, EngineError>;
}

#[async_trait]
impl PositionEvaluator for EngineSession {
    async fn evaluate(&mut self, fen: &str, depth: u8) -> Result<Vec<Line>, EngineError> {
        EngineSession::evaluate(self, fen, depth).await
    }
}

/// Evaluate every position in order, one search at a time.
///
/// The output has exactly one entry per input position, in input order. A
/// position gets an empty placeholder instead of a search when it has no FEN,
/// when it is the final position of a concluded game, or when its search
/// fails. `on_progress` is called after each position is done.
pub async fn evaluate_positions<E>(
    evaluator: &mut E,
    positions: &[Position],
    game_concluded: bool,
    depth: u8,
    mut on_progress: impl FnMut(ReviewProgress) + Send,
) -> Vec<EvaluatedPosition>
where
    E: PositionEvaluator + ?Sized,
{
    let total = positions.len();
    let mut evaluations = Vec::with_capacity(total);

    for (index, position) in positions.iter().enumerate() {
        let is_final = index + 1 == total;

        let evaluated = match position.fen() {
            None => {
                tracing::debug!(index, "Position has no FEN, skipping search");
                EvaluatedPosition::placeholder(position)
            }
            Some(_) if is_final && game_concluded => {
                tracing::debug!(index, "Final position of a finished game, skipping search");
                EvaluatedPosition::placeholder(position)
            }
            Some(fen) => match evaluator.evaluate(fen, depth).await {
                Ok(lines) => {
                    tracing::debug!(index, lines = lines.len(), "Position evaluated");
                    EvaluatedPosition::new(position, lines)
                }
                Err(e) => {
                    tracing::warn!(index, %fen, "Error evaluating position: {}", e);
                    EvaluatedPosition::placeholder(position)
                }
            },
        };

        evaluations.push(evaluated);
        on_progress(ReviewProgress {
            evaluated: index + 1,
            total,
        });
    }

    evaluations
}

/// Everything a finished review produced.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    pub evaluations: Vec<EvaluatedPosition>,
    /// `None` when there was nothing to submit.
    pub report: Option<Report>,
}

/// Runs a game through one engine session and the reporting service.
pub struct ReviewPipeline {
    factory: Arc<dyn WorkerFactory>,
    session_config: SessionConfig,
    search_depth: u8,
    progress: watch::Sender<ReviewProgress>,
}

impl ReviewPipeline {
    pub fn new(
        factory: Arc<dyn WorkerFactory>,
        session_config: SessionConfig,
        search_depth: u8,
    ) -> Self {
        let (progress, _) = watch::channel(ReviewProgress::default());
        Self {
            factory,
            session_config,
            search_depth,
            progress,
        }
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<ReviewProgress> {
        self.progress.subscribe()
    }

    /// Evaluate `positions` with a session started for this call alone.
    ///
    /// The session is terminated before returning. If the returned future is
    /// dropped early, dropping the session releases the engine instead.
    #[tracing::instrument(level = "info", skip_all, fields(positions = positions.len(), game_concluded = game_concluded))]
    pub async fn evaluate(
        &self,
        positions: &[Position],
        game_concluded: bool,
    ) -> Result<Vec<EvaluatedPosition>, ReviewError> {
        if positions.is_empty() {
            tracing::info!("No positions to evaluate");
            return Ok(Vec::new());
        }

        self.progress.send_replace(ReviewProgress {
            evaluated: 0,
            total: positions.len(),
        });

        let mut session = EngineSession::start(self.factory.clone(), self.session_config.clone())?;
        let evaluations = evaluate_positions(
            &mut session,
            positions,
            game_concluded,
            self.search_depth,
            |progress| {
                tracing::info!(
                    "Review progress {}% ({}/{})",
                    progress.percent(),
                    progress.evaluated,
                    progress.total
                );
                self.progress.send_replace(progress);
            },
        )
        .await;
        session.terminate().await;

        let unavailable = evaluations.iter().filter(|e| e.is_unavailable()).count();
        tracing::info!(unavailable, "Evaluation complete");
        Ok(evaluations)
    }

    /// Evaluate `positions` and submit the result for classification.
    pub async fn run(
        &self,
        positions: &[Position],
        game_concluded: bool,
        reporter: &ReportClient,
    ) -> Result<ReviewOutcome, ReviewError> {
        let evaluations = self.evaluate(positions, game_concluded).await?;
        if evaluations.is_empty() {
            return Ok(ReviewOutcome {
                evaluations,
                report: None,
            });
        }

        let report = reporter.submit(&evaluations).await?;
        Ok(ReviewOutcome {
            evaluations,
            report: Some(report),
        })
    }
}
