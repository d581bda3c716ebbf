use crate::types::Position;

/// Whether a position has no legal moves (checkmate or stalemate).
///
/// Resignations and time forfeits leave no trace in the FEN; callers that know
/// about them should pass the flag to the pipeline directly.
pub fn is_terminal_position(fen: &str) -> bool {
    match fen.parse::<cozy_chess::Board>() {
        Ok(board) => board.status() != cozy_chess::GameStatus::Ongoing,
        Err(_) => false,
    }
}

/// Whether the game ended on the board at its final position.
pub fn is_game_concluded(positions: &[Position]) -> bool {
    positions
        .last()
        .and_then(Position::fen)
        .is_some_and(is_terminal_position)
}
