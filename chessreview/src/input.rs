//! Loading the position list produced by the move-list parser.

use std::io::Read;
use std::path::Path;

use review::Position;

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("failed to read {source_name}: {source}")]
    Read {
        source_name: String,
        source: std::io::Error,
    },
    #[error("invalid position list in {source_name}: {source}")]
    Parse {
        source_name: String,
        source: serde_json::Error,
    },
}

/// Read a JSON array of positions from `path`, or from stdin when it is `-`.
pub fn load_positions(path: &Path) -> Result<Vec<Position>, InputError> {
    let source_name = path.display().to_string();
    let text = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|source| InputError::Read {
                source_name: "stdin".to_string(),
                source,
            })?;
        buf
    } else {
        std::fs::read_to_string(path).map_err(|source| InputError::Read {
            source_name: source_name.clone(),
            source,
        })?
    };

    parse_positions(&text).map_err(|source| InputError::Parse {
        source_name,
        source,
    })
}

fn parse_positions(text: &str) -> Result<Vec<Position>, serde_json::Error> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(text)
}
