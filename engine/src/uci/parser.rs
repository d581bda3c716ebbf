use crate::{EngineEvent, InfoLine, Score};
use cozy_chess::Color;

/// Decode one line of engine output.
///
/// Anything that is not a recognised, complete message yields `None`; the
/// engine's chatter (`id`, `option`, `info string`, partial `info` lines)
/// is dropped here rather than surfaced as an error.
pub fn decode(line: &str) -> Option<EngineEvent> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens.first() {
        Some(&"uciok") => Some(EngineEvent::HandshakeAck),
        Some(&"readyok") => Some(EngineEvent::ReadyOk),
        // `bestmove (none)` in mated/stalemated positions still ends the search
        Some(&"bestmove") => Some(EngineEvent::BestMove),
        Some(&"info") => decode_info(&tokens[1..]),
        _ => None,
    }
}

/// Fields of an `info` line, each optional until the line is complete.
#[derive(Debug, Default)]
struct PartialInfo {
    depth: Option<u8>,
    multipv: Option<u8>,
    score: Option<Score>,
    pv_head: Option<String>,
}

fn decode_info(tokens: &[&str]) -> Option<EngineEvent> {
    let mut info = PartialInfo::default();
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                i += 1;
                info.depth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "multipv" => {
                i += 1;
                info.multipv = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "score" => {
                i += 1;
                if let Some(&score_type) = tokens.get(i) {
                    i += 1;
                    if let Some(value_str) = tokens.get(i) {
                        info.score = match score_type {
                            "cp" => value_str.parse().ok().map(Score::Centipawns),
                            "mate" => value_str.parse().ok().map(Score::Mate),
                            _ => None,
                        };
                    }
                }
            }
            "pv" => {
                i += 1;
                info.pv_head = tokens
                    .get(i)
                    .filter(|s| !is_keyword(s))
                    .map(|s| s.to_string());
                // The rest of the variation is not needed
                break;
            }
            "string" => {
                // Free text until end of line
                break;
            }
            _ => {
                // Unknown keyword or value, skip
            }
        }
        i += 1;
    }

    if info.depth == Some(0) {
        return Some(EngineEvent::DepthZero);
    }

    Some(EngineEvent::Info(InfoLine {
        depth: info.depth?,
        multipv: info.multipv?,
        score: info.score?,
        principal_move: info.pv_head?,
    }))
}

fn is_keyword(token: &str) -> bool {
    matches!(
        token,
        "depth"
            | "seldepth"
            | "time"
            | "nodes"
            | "score"
            | "pv"
            | "multipv"
            | "currmove"
            | "currmovenumber"
            | "hashfull"
            | "nps"
            | "tbhits"
            | "cpuload"
            | "string"
    )
}

/// Side to move according to the FEN active-colour field.
pub fn side_to_move(fen: &str) -> Color {
    match fen.split_whitespace().nth(1) {
        Some("b") => Color::Black,
        _ => Color::White,
    }
}
