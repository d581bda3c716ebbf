use std::collections::BTreeMap;

use cozy_chess::Color;

use crate::{Evaluation, InfoLine, Line};

/// Collects the info reports of one search.
///
/// Only reports at exactly the target depth are kept, one per multipv rank;
/// a later report for a rank replaces an earlier one.
#[derive(Debug)]
pub(crate) struct SearchAccumulator {
    target_depth: u8,
    side: Color,
    lines: BTreeMap<u8, Line>,
    seen: usize,
}

impl SearchAccumulator {
    pub(crate) fn new(target_depth: u8, side: Color) -> Self {
        Self {
            target_depth,
            side,
            lines: BTreeMap::new(),
            seen: 0,
        }
    }

    pub(crate) fn push(&mut self, info: InfoLine) {
        self.seen += 1;
        if info.depth != self.target_depth {
            return;
        }
        self.lines.insert(
            info.multipv,
            Line {
                rank: info.multipv,
                depth: info.depth,
                evaluation: Evaluation::from_side_to_move(info.score, self.side),
                mv: info.principal_move,
            },
        );
    }

    pub(crate) fn seen(&self) -> usize {
        self.seen
    }

    /// Final lines, ordered by rank.
    pub(crate) fn finish(self) -> Vec<Line> {
        self.lines.into_values().collect()
    }
}
