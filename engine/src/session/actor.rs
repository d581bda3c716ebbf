use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;

use super::search::SearchAccumulator;
use super::state::SessionState;
use super::SessionConfig;
use crate::uci::{decode, encode, side_to_move};
use crate::worker::{Worker, WorkerFactory};
use crate::{EngineCommand, EngineError, EngineEvent, Line};

pub(crate) type SearchReply = oneshot::Sender<Result<Vec<Line>, EngineError>>;

/// Requests sent from the handle to the actor.
pub(crate) enum SessionRequest {
    Evaluate {
        fen: String,
        target_depth: u8,
        reply: SearchReply,
    },
    /// Replace the worker, abandoning any search in flight.
    Restart,
    Terminate,
}

struct ParkedSearch {
    fen: String,
    target_depth: u8,
    reply: SearchReply,
}

struct ActiveSearch {
    accumulator: SearchAccumulator,
    reply: SearchReply,
}

pub(crate) struct SessionActor {
    factory: Arc<dyn WorkerFactory>,
    config: SessionConfig,
    worker: Box<dyn Worker>,
    state_tx: watch::Sender<SessionState>,
    requests: mpsc::Receiver<SessionRequest>,
    parked: VecDeque<ParkedSearch>,
    search: Option<ActiveSearch>,
    /// Set after a search ended on `info depth 0`: a trailing `bestmove` may
    /// or may not follow, so output is drained up to `readyok` before the
    /// next search starts.
    draining: bool,
    restarts: u32,
}

impl SessionActor {
    pub(crate) fn new(
        factory: Arc<dyn WorkerFactory>,
        config: SessionConfig,
        worker: Box<dyn Worker>,
        state_tx: watch::Sender<SessionState>,
        requests: mpsc::Receiver<SessionRequest>,
    ) -> Self {
        Self {
            factory,
            config,
            worker,
            state_tx,
            requests,
            parked: VecDeque::new(),
            search: None,
            draining: false,
            restarts: 0,
        }
    }

    pub(crate) async fn run(self) {
        let span = tracing::info_span!(
            "engine_session",
            label = self.config.label.as_deref().unwrap_or("engine")
        );
        self.run_inner().instrument(span).await;
    }

    async fn run_inner(mut self) {
        tracing::info!("Engine session actor started");

        if let Err(e) = self.begin_handshake().await {
            self.recover(&format!("handshake failed: {}", e)).await;
        }

        while self.state() != SessionState::Terminated {
            tokio::select! {
                biased;

                request = self.requests.recv() => {
                    match request {
                        Some(SessionRequest::Terminate) | None => {
                            self.shutdown().await;
                        }
                        Some(SessionRequest::Evaluate { fen, target_depth, reply }) => {
                            self.parked.push_back(ParkedSearch { fen, target_depth, reply });
                            self.dispatch_next().await;
                        }
                        Some(SessionRequest::Restart) => {
                            self.recover("restart requested").await;
                        }
                    }
                }

                line = self.worker.next_line() => {
                    let event = match line {
                        Some(line) => decode(&line),
                        None => Some(EngineEvent::Crashed),
                    };
                    if let Some(event) = event {
                        self.handle_event(event).await;
                    }
                }
            }
        }

        for parked in self.parked.drain(..) {
            let _ = parked.reply.send(Err(EngineError::Terminated));
        }
        tracing::info!("Engine session actor exited");
    }

    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn transition(&self, next: SessionState) {
        let current = self.state();
        if !current.can_transition_to(next) {
            tracing::debug!("Ignoring session transition {:?} -> {:?}", current, next);
            return;
        }
        tracing::debug!("Session state {:?} -> {:?}", current, next);
        self.state_tx.send_replace(next);
    }

    async fn send(&mut self, cmd: EngineCommand) -> Result<(), EngineError> {
        tracing::trace!("Sending engine command: {:?}", cmd);
        self.worker.send(encode(&cmd)).await
    }

    async fn begin_handshake(&mut self) -> Result<(), EngineError> {
        self.transition(SessionState::Initializing);
        self.send(EngineCommand::Handshake).await
    }

    async fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::HandshakeAck => {
                if self.state() != SessionState::Initializing {
                    tracing::trace!("Ignoring handshake ack in {:?}", self.state());
                    return;
                }
                let option = EngineCommand::SetOption {
                    name: "MultiPV".to_string(),
                    value: self.config.tracked_lines.to_string(),
                };
                if let Err(e) = self.send(option).await {
                    self.recover(&format!("failed to configure engine: {}", e))
                        .await;
                    return;
                }
                self.restarts = 0;
                self.transition(SessionState::Ready);
                tracing::info!("Engine is ready");
                self.dispatch_next().await;
            }
            EngineEvent::Info(info) => {
                if let Some(search) = self.search.as_mut() {
                    search.accumulator.push(info);
                }
            }
            EngineEvent::BestMove => {
                if self.draining {
                    tracing::trace!("Dropping bestmove of a search that ended at depth 0");
                    return;
                }
                self.finish_search().await;
            }
            EngineEvent::DepthZero => {
                if self.search.is_none() || self.draining {
                    return;
                }
                self.draining = true;
                self.finish_search().await;
                if let Err(e) = self.send(EngineCommand::IsReady).await {
                    self.recover(&format!("failed to sync engine: {}", e)).await;
                }
            }
            EngineEvent::ReadyOk => {
                if self.draining {
                    self.draining = false;
                    self.dispatch_next().await;
                }
            }
            EngineEvent::Crashed => {
                self.recover("engine output closed").await;
            }
        }
    }

    /// Start the next parked search if the engine is idle.
    async fn dispatch_next(&mut self) {
        if self.state() != SessionState::Ready || self.search.is_some() || self.draining {
            return;
        }

        let parked = loop {
            match self.parked.pop_front() {
                // Caller gave up (timeout or dropped future)
                Some(parked) if parked.reply.is_closed() => continue,
                Some(parked) => break parked,
                None => return,
            }
        };

        tracing::debug!(fen = %parked.fen, depth = parked.target_depth, "Starting search");
        let commands = [
            EngineCommand::SetPosition {
                fen: parked.fen.clone(),
            },
            EngineCommand::Search {
                depth: parked.target_depth,
            },
        ];
        for cmd in commands {
            if let Err(e) = self.send(cmd).await {
                let _ = parked.reply.send(Err(EngineError::Crashed));
                self.recover(&format!("failed to start search: {}", e)).await;
                return;
            }
        }

        self.search = Some(ActiveSearch {
            accumulator: SearchAccumulator::new(parked.target_depth, side_to_move(&parked.fen)),
            reply: parked.reply,
        });
        self.transition(SessionState::Searching);
    }

    async fn finish_search(&mut self) {
        let Some(search) = self.search.take() else {
            tracing::trace!("Search terminator with no search in flight");
            return;
        };
        let seen = search.accumulator.seen();
        let lines = search.accumulator.finish();
        tracing::debug!(reports = seen, lines = lines.len(), "Search finished");

        self.transition(SessionState::Ready);
        let _ = search.reply.send(Ok(lines));
        self.dispatch_next().await;
    }

    /// Kill the current worker and bring up a replacement from the same factory.
    async fn recover(&mut self, reason: &str) {
        tracing::warn!("Engine worker lost ({}), restarting", reason);
        self.transition(SessionState::Crashed);
        if let Some(search) = self.search.take() {
            let _ = search.reply.send(Err(EngineError::Crashed));
        }
        self.draining = false;
        self.worker.kill().await;

        loop {
            if self.restarts >= self.config.max_restarts {
                tracing::error!(
                    "Engine could not be restarted after {} attempts, giving up",
                    self.restarts
                );
                for parked in self.parked.drain(..) {
                    let _ = parked.reply.send(Err(EngineError::Unavailable(self.restarts)));
                }
                self.transition(SessionState::Terminated);
                return;
            }
            self.restarts += 1;

            match self.factory.spawn() {
                Ok(worker) => {
                    self.worker = worker;
                }
                Err(e) => {
                    tracing::warn!(attempt = self.restarts, "Failed to respawn engine: {}", e);
                    continue;
                }
            }

            match self.begin_handshake().await {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(attempt = self.restarts, "Handshake write failed: {}", e);
                    self.transition(SessionState::Crashed);
                    self.worker.kill().await;
                }
            }
        }
    }

    async fn shutdown(&mut self) {
        tracing::info!("Engine session shutting down");
        let _ = self.send(EngineCommand::Quit).await;
        self.worker.kill().await;
        if let Some(search) = self.search.take() {
            let _ = search.reply.send(Err(EngineError::Terminated));
        }
        self.transition(SessionState::Terminated);
    }
}
