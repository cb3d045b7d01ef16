use thiserror::Error;

/// An Error enum capturing the errors produced by this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Biometric kind outside of `finger` and `iris`
    #[error("Unknown biometric type: {0}")]
    UnknownBioKind(String),
    /// Slot width outside of 1..=8 bits
    #[error("Unsupported slot width: {0} bits")]
    UnsupportedSlotWidth(u8),
    /// Setting is internally inconsistent
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
    /// Loading the configuration failed
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl From<String> for Error {
    fn from(mes: String) -> Self {
        Self::InvalidSetting(mes)
    }
}

impl From<&str> for Error {
    fn from(mes: &str) -> Self {
        Self::InvalidSetting(mes.to_owned())
    }
}
