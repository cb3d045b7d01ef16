use thiserror::Error;

/// An Error enum capturing the errors produced by this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// The setting or the configuration it was built from is invalid
    #[error(transparent)]
    Setting(#[from] janus_mpc_common::error::Error),
    /// Connecting to or talking with the peer failed
    #[error("Transport error: {0}")]
    Transport(String),
    /// A party's inputs do not have the shape the setting expects
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Oblivious integers of different widths were combined
    #[error("Width mismatch: {0} vs {1} bits")]
    WidthMismatch(usize, usize),
    /// A message of an unexpected type or size arrived
    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),
    /// A IO error has occurred
    #[error(transparent)]
    IO(#[from] std::io::Error),
    /// Some other error has occurred.
    #[error("Err: {0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(mes: String) -> Self {
        Self::Other(mes)
    }
}

impl From<&str> for Error {
    fn from(mes: &str) -> Self {
        Self::Other(mes.to_owned())
    }
}
