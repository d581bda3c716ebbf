use crate::EngineCommand;

/// Format a command as a single newline-terminated UCI line
pub fn encode(cmd: &EngineCommand) -> String {
    let mut line = match cmd {
        EngineCommand::Handshake => "uci".to_string(),
        EngineCommand::SetOption { name, value } => {
            format!("setoption name {} value {}", name, value)
        }
        EngineCommand::SetPosition { fen } => format!("position fen {}", fen.trim()),
        EngineCommand::Search { depth } => format!("go depth {}", depth),
        EngineCommand::IsReady => "isready".to_string(),
        EngineCommand::Quit => "quit".to_string(),
    };
    line.push('\n');
    line
}
