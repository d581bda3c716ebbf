//! Engine session: one worker process driven through the UCI lifecycle.
//!
//! [`EngineSession`] is the owning handle. A spawned actor task owns the
//! worker, runs the only decode loop over its output and performs crash
//! recovery; the handle talks to it over a request channel and watches its
//! [`SessionState`].
//!
//! Dropping the handle shuts the actor down and kills the worker, so every
//! exit path of the owner releases the process even without an explicit
//! [`EngineSession::terminate`].

mod actor;
mod search;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::worker::WorkerFactory;
use crate::{EngineError, Line, TRACKED_LINES};
use actor::{SessionActor, SessionRequest};
pub use state::SessionState;

/// Tunables for an engine session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Value sent as the `MultiPV` option.
    pub tracked_lines: u8,
    /// Consecutive failed restarts tolerated before the session gives up.
    pub max_restarts: u32,
    /// Upper bound for one `evaluate` call, readiness wait included. On expiry
    /// the worker is restarted. `None` waits forever.
    pub search_timeout: Option<Duration>,
    /// Shown in the session's tracing span.
    pub label: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tracked_lines: TRACKED_LINES,
            max_restarts: 3,
            search_timeout: None,
            label: None,
        }
    }
}

/// Owning handle to one engine worker.
pub struct EngineSession {
    requests: mpsc::Sender<SessionRequest>,
    state_rx: watch::Receiver<SessionState>,
    search_timeout: Option<Duration>,
    actor: Option<JoinHandle<()>>,
}

impl EngineSession {
    /// Spawn a worker and begin the handshake in the background.
    ///
    /// Fails only if the first worker cannot be spawned.
    #[tracing::instrument(level = "info", skip(factory))]
    pub fn start(
        factory: Arc<dyn WorkerFactory>,
        config: SessionConfig,
    ) -> Result<Self, EngineError> {
        let worker = factory.spawn()?;
        tracing::info!("Engine worker spawned");

        let (state_tx, state_rx) = watch::channel(SessionState::Created);
        let (requests, request_rx) = mpsc::channel(8);
        let search_timeout = config.search_timeout;

        let actor = SessionActor::new(factory, config, worker, state_tx, request_rx);
        let actor = tokio::spawn(actor.run());

        Ok(Self {
            requests,
            state_rx,
            search_timeout,
            actor: Some(actor),
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Watch every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// A cloneable signal that resolves once the engine is ready.
    pub fn ready_signal(&self) -> ReadySignal {
        ReadySignal {
            rx: self.state_rx.clone(),
        }
    }

    pub async fn wait_until_ready(&self) -> Result<(), EngineError> {
        self.ready_signal().wait().await
    }

    /// Search `fen` to exactly `target_depth` plies and return the ranked lines
    /// reported at that depth, White-relative and sorted by rank.
    ///
    /// Requests made before the handshake completes are held until it does.
    pub async fn evaluate(
        &mut self,
        fen: &str,
        target_depth: u8,
    ) -> Result<Vec<Line>, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(SessionRequest::Evaluate {
                fen: fen.to_string(),
                target_depth,
                reply: tx,
            })
            .await
            .map_err(|_| EngineError::Terminated)?;

        let reply = match self.search_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    tracing::warn!(%fen, "Search timed out after {:?}, restarting engine", limit);
                    let _ = self.requests.send(SessionRequest::Restart).await;
                    return Err(EngineError::Timeout(limit));
                }
            },
            None => rx.await,
        };

        reply.map_err(|_| EngineError::Terminated)?
    }

    /// Kill the worker and stop the actor. Further calls do nothing.
    pub async fn terminate(&mut self) {
        let Some(actor) = self.actor.take() else {
            return;
        };
        let _ = self.requests.send(SessionRequest::Terminate).await;
        if let Err(e) = actor.await {
            tracing::error!("Engine session actor failed: {}", e);
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.actor.is_none() || self.state() == SessionState::Terminated
    }
}

/// Resolves once the session has reached `Ready`.
///
/// Awaiting it again after that returns immediately, and it may be awaited
/// before the handshake has even been sent.
#[derive(Clone)]
pub struct ReadySignal {
    rx: watch::Receiver<SessionState>,
}

impl ReadySignal {
    pub async fn wait(&mut self) -> Result<(), EngineError> {
        let ready = self
            .rx
            .wait_for(|state| state.is_ready() || *state == SessionState::Terminated)
            .await
            .map_err(|_| EngineError::Terminated)?
            .is_ready();

        if ready {
            Ok(())
        } else {
            Err(EngineError::Terminated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{default_search_lines, info_line, ScriptedWorkerFactory, SearchReply};
    use crate::EvalKind;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
    // Smothered mate, Black to move
    const MATED: &str = "6rk/5Npp/8/8/8/8/8/6K1 b - - 0 1";

    fn start(factory: &ScriptedWorkerFactory) -> EngineSession {
        EngineSession::start(Arc::new(factory.clone()), SessionConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_handshake_configures_multipv() {
        let factory = ScriptedWorkerFactory::new();
        let mut session = start(&factory);

        session.wait_until_ready().await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(
            factory.sent(),
            vec!["uci".to_string(), "setoption name MultiPV value 2".to_string()]
        );

        session.terminate().await;
    }

    #[tokio::test]
    async fn test_ready_signal_can_be_awaited_repeatedly() {
        let factory = ScriptedWorkerFactory::new();
        let mut session = start(&factory);

        let mut early = session.ready_signal();
        let mut other = early.clone();
        early.wait().await.unwrap();
        other.wait().await.unwrap();
        early.wait().await.unwrap();

        session.terminate().await;
    }

    #[tokio::test]
    async fn test_evaluate_returns_target_depth_lines() {
        let factory = ScriptedWorkerFactory::new();
        let mut session = start(&factory);

        let lines = session.evaluate(START, 16).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].rank, 1);
        assert_eq!(lines[0].depth, 16);
        assert_eq!(lines[0].mv, "e2e4");
        assert_eq!(lines[0].evaluation.value, 20);
        assert_eq!(lines[1].rank, 2);
        assert_eq!(lines[1].mv, "d2d4");
        assert_eq!(session.state(), SessionState::Ready);

        let sent = factory.sent();
        assert_eq!(sent[2], format!("position fen {}", START));
        assert_eq!(sent[3], "go depth 16");

        session.terminate().await;
    }

    #[tokio::test]
    async fn test_evaluate_black_to_move_negates_scores() {
        let factory = ScriptedWorkerFactory::new();
        factory.on_search(
            AFTER_E4,
            SearchReply::Lines(vec![
                info_line(16, 1, "cp 120", "e7e5"),
                "bestmove e7e5".to_string(),
            ]),
        );
        let mut session = start(&factory);

        let lines = session.evaluate(AFTER_E4, 16).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].evaluation.kind, EvalKind::Cp);
        assert_eq!(lines[0].evaluation.value, -120);

        session.terminate().await;
    }

    #[tokio::test]
    async fn test_revised_report_at_target_depth_wins() {
        let factory = ScriptedWorkerFactory::new();
        factory.on_search(
            START,
            SearchReply::Lines(vec![
                info_line(10, 1, "cp 50", "d2d4"),
                info_line(14, 1, "cp 40", "c2c4"),
                info_line(16, 1, "cp 30 lowerbound", "e2e4"),
                "info depth 16 currmove g1f3 currmovenumber 2".to_string(),
                info_line(16, 1, "cp 25", "g1f3"),
                "bestmove g1f3".to_string(),
            ]),
        );
        let mut session = start(&factory);

        let lines = session.evaluate(START, 16).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].evaluation.value, 25);
        assert_eq!(lines[0].mv, "g1f3");

        session.terminate().await;
    }

    #[tokio::test]
    async fn test_terminal_position_finishes_on_depth_zero() {
        let factory = ScriptedWorkerFactory::new();
        factory.on_search(
            MATED,
            SearchReply::Lines(vec![
                "info depth 0 score mate 0".to_string(),
                "bestmove (none)".to_string(),
            ]),
        );
        let mut session = start(&factory);

        let lines = session.evaluate(MATED, 16).await.unwrap();
        assert!(lines.is_empty());

        // The trailing `bestmove (none)` must not end the next search early
        let lines = session.evaluate(START, 16).await.unwrap();
        assert_eq!(lines.len(), 2);

        session.terminate().await;
    }

    #[tokio::test]
    async fn test_depth_zero_without_bestmove_does_not_stall_next_search() {
        let factory = ScriptedWorkerFactory::new();
        factory.on_search(
            MATED,
            SearchReply::Lines(vec!["info depth 0 score mate 0".to_string()]),
        );
        let mut session = start(&factory);

        let lines = session.evaluate(MATED, 16).await.unwrap();
        assert!(lines.is_empty());

        let lines = tokio::time::timeout(Duration::from_secs(2), session.evaluate(START, 16))
            .await
            .expect("search after a depth-0 finish stalled")
            .unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].mv, "e2e4");

        let sent = factory.sent();
        let sync = sent.iter().position(|l| l == "isready").unwrap();
        let next_go = sent.iter().rposition(|l| l.starts_with("go ")).unwrap();
        assert!(sync < next_go);

        session.terminate().await;
    }

    #[tokio::test]
    async fn test_crash_fails_search_and_restarts_worker() {
        let factory = ScriptedWorkerFactory::new();
        factory.on_search(START, SearchReply::Crash);
        let mut session = start(&factory);

        let result = session.evaluate(START, 16).await;
        assert!(matches!(result, Err(EngineError::Crashed)));

        // Same factory, fresh handshake, next search works
        let lines = session.evaluate(START, 16).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(factory.spawns(), 2);
        assert_eq!(factory.kills(), 1);
        assert_eq!(factory.sent().iter().filter(|l| *l == "uci").count(), 2);

        session.terminate().await;
    }

    #[tokio::test]
    async fn test_gives_up_when_respawn_keeps_failing() {
        let factory = ScriptedWorkerFactory::new();
        factory.on_search(START, SearchReply::Crash).fail_spawns_from(1);
        let mut session = EngineSession::start(
            Arc::new(factory.clone()),
            SessionConfig {
                max_restarts: 2,
                ..Default::default()
            },
        )
        .unwrap();

        assert!(matches!(
            session.evaluate(START, 16).await,
            Err(EngineError::Crashed)
        ));
        assert!(matches!(
            session.evaluate(START, 16).await,
            Err(EngineError::Terminated)
        ));
        assert_eq!(factory.spawns(), 3);
        assert!(session.is_terminated());

        session.terminate().await;
    }

    #[tokio::test]
    async fn test_timeout_restarts_worker() {
        let factory = ScriptedWorkerFactory::new();
        factory.on_search(START, SearchReply::Hang);
        let mut session = EngineSession::start(
            Arc::new(factory.clone()),
            SessionConfig {
                search_timeout: Some(Duration::from_millis(200)),
                ..Default::default()
            },
        )
        .unwrap();

        let result = session.evaluate(START, 16).await;
        assert!(matches!(result, Err(EngineError::Timeout(_))));

        let lines = session.evaluate(START, 16).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(factory.spawns(), 2);

        session.terminate().await;
    }

    #[tokio::test]
    async fn test_evaluate_before_handshake_is_held() {
        let factory = ScriptedWorkerFactory::new();
        let mut session = start(&factory);

        // No explicit wait: the request is parked until `uciok`
        let lines = session.evaluate(START, 4).await.unwrap();
        assert_eq!(lines.len(), 2);

        let sent = factory.sent();
        let multipv = sent.iter().position(|l| l.starts_with("setoption")).unwrap();
        let go = sent.iter().position(|l| l.starts_with("go ")).unwrap();
        assert!(multipv < go);

        session.terminate().await;
    }

    #[tokio::test]
    async fn test_silent_engine_never_becomes_ready_until_terminated() {
        let factory = ScriptedWorkerFactory::new();
        factory.silent_handshake();
        let mut session = start(&factory);
        let mut ready = session.ready_signal();

        let waiter = tokio::spawn(async move { ready.wait().await });
        session.terminate().await;
        assert!(matches!(waiter.await.unwrap(), Err(EngineError::Terminated)));
    }

    #[tokio::test]
    async fn test_terminate_twice_kills_once() {
        let factory = ScriptedWorkerFactory::new();
        let mut session = start(&factory);
        session.wait_until_ready().await.unwrap();

        session.terminate().await;
        session.terminate().await;

        assert!(session.is_terminated());
        assert_eq!(factory.kills(), 1);
        assert_eq!(factory.sent().last().map(String::as_str), Some("quit"));
        assert!(matches!(
            session.evaluate(START, 16).await,
            Err(EngineError::Terminated)
        ));
    }

    #[tokio::test]
    async fn test_drop_releases_worker() {
        let factory = ScriptedWorkerFactory::new();
        let session = start(&factory);
        let mut state = session.subscribe();
        session.wait_until_ready().await.unwrap();

        drop(session);
        state
            .wait_for(|s| *s == SessionState::Terminated)
            .await
            .unwrap();
        assert_eq!(factory.kills(), 1);
    }

    #[tokio::test]
    async fn test_default_transcript_shape() {
        // Guards the fixture other tests rely on
        let lines = default_search_lines(2);
        assert_eq!(lines.len(), 5);
        assert!(lines[4].starts_with("bestmove"));
    }
}
