//! Log records and their wire framing.
//!
//! - `model.rs`: the [`LogRecord`] map and [`DecodeError`]
//! - `codec.rs`: newline-delimited JSON framing over a byte stream

pub mod codec;
pub mod model;

pub use codec::{Frame, JsonLinesCodec};
pub use model::{DecodeError, LogRecord};

// Constants
pub const MAX_LINE_SIZE: usize = 1_048_576; // 1MB
