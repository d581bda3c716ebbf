pub mod encoder;
pub mod parser;

pub use encoder::encode;
pub use parser::{decode, side_to_move};
