use std::time::Duration;

use chessarm::EncodeError;
use thiserror::Error;

use crate::arm::Channel;

#[derive(Error, Debug)]
pub enum Error {
    /// File or rank outside the 8x8 board.
    #[error("invalid square: {0}")]
    InvalidSquare(String),

    #[error("could not encode command: {0}")]
    Encoding(#[from] EncodeError),

    /// No acknowledgement arrived in time. The move carries on regardless.
    #[error("no acknowledgement on {channel} link after {:.2}s", .waited.as_secs_f64())]
    TransportTimeout { channel: Channel, waited: Duration },

    #[error("malformed move {0:?}, expected something like e2e4")]
    MalformedMoveInput(String),

    #[error("a move cannot be both a capture and a castle")]
    ConflictingMoveFlags,

    #[error("serial I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration: {0}")]
    Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_the_link() {
        let err = Error::TransportTimeout {
            channel: Channel::Robot,
            waited: Duration::from_millis(20_050),
        };
        assert_eq!(err.to_string(), "no acknowledgement on robot link after 20.05s");
    }
}
