/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use thiserror::Error;

/// Result type for decoder operations
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Errors surfaced to the caller of the decoder.
///
/// Malformed network input is never reported through this type: it is
/// counted in [`crate::DecoderStatistics`] and logged. These variants
/// describe misuse of the decoder or a failing sink.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("decode() called before init()")]
    Uninitialized,

    #[error("Invalid dictionary id range: min {min} > max {max}")]
    InvalidRange { min: u32, max: u32 },

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Errors produced while parsing the fixed packet header
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("truncated header: {0} bytes")]
    Truncated(usize),

    #[error("declared packet length {0} is shorter than the header")]
    LengthTooShort(u16),
}

/// Errors raised by sink implementations
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
