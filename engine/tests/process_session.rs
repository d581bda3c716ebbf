//! End-to-end session tests against a real child process.
//!
//! A small shell script speaks enough UCI to stand in for Stockfish.
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use engine::{EngineError, EngineSession, EvalKind, ProcessWorkerFactory, SessionConfig, SessionState};

const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";

const SHELL_ENGINE: &str = r#"
while read -r line; do
  case "$line" in
    uci) echo "id name ShellFish"; echo "uciok" ;;
    isready) echo "readyok" ;;
    "go depth "*)
      d="${line#go depth }"
      i=1
      while [ "$i" -le "$d" ]; do
        echo "info depth $i seldepth $i multipv 1 score cp 33 nodes 10 pv e2e4 e7e5"
        echo "info depth $i seldepth $i multipv 2 score cp 5 nodes 10 pv g1f3"
        i=$((i + 1))
      done
      echo "bestmove e2e4 ponder e7e5" ;;
    quit) exit 0 ;;
  esac
done
"#;

const CRASHING_ENGINE: &str = r#"
while read -r line; do
  case "$line" in
    uci) echo "uciok" ;;
    "go depth "*) exit 3 ;;
  esac
done
"#;

fn shell(script: &str) -> Arc<ProcessWorkerFactory> {
    Arc::new(ProcessWorkerFactory::new("sh").with_args(vec!["-c".to_string(), script.to_string()]))
}

fn config() -> SessionConfig {
    SessionConfig {
        search_timeout: Some(Duration::from_secs(10)),
        label: Some("process-test".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_process_session_evaluates_positions() {
    let mut session = EngineSession::start(shell(SHELL_ENGINE), config()).unwrap();
    session.wait_until_ready().await.unwrap();

    let lines = session.evaluate(START, 6).await.unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].rank, 1);
    assert_eq!(lines[0].depth, 6);
    assert_eq!(lines[0].mv, "e2e4");
    assert_eq!(lines[0].evaluation.kind, EvalKind::Cp);
    assert_eq!(lines[0].evaluation.value, 33);
    assert_eq!(lines[1].mv, "g1f3");

    let lines = session.evaluate(AFTER_E4, 3).await.unwrap();
    assert_eq!(lines[0].evaluation.value, -33);
    assert_eq!(lines[1].evaluation.value, -5);

    session.terminate().await;
    assert_eq!(session.state(), SessionState::Terminated);
}

#[tokio::test]
async fn test_process_crash_fails_only_current_search() {
    let mut session = EngineSession::start(shell(CRASHING_ENGINE), config()).unwrap();
    session.wait_until_ready().await.unwrap();

    let result = session.evaluate(START, 4).await;
    assert!(matches!(result, Err(EngineError::Crashed)));

    // The replacement process handshakes again
    session.wait_until_ready().await.unwrap();
    assert!(!session.is_terminated());

    session.terminate().await;
}

#[tokio::test]
async fn test_missing_binary_fails_to_start() {
    let factory = Arc::new(ProcessWorkerFactory::new("/nonexistent/stockfish"));
    assert!(EngineSession::start(factory, config()).is_err());
}
