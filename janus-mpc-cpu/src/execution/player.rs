use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Runtime identity of party.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(pub String);

impl Default for Identity {
    fn default() -> Self {
        Identity("test_identity".to_string())
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Identity(s.to_string())
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Identity(s)
    }
}

/// The two parties of the protocol.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Registration station: holds the query, listens for the peer and is the
    /// only party that learns the membership bit.
    RegistrationStation,
    /// Biometric provider: holds the other half of the enrolled database.
    BiometricProvider,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::RegistrationStation, Role::BiometricProvider];

    /// The querying party.
    pub const QUERIER: Role = Role::RegistrationStation;

    pub fn index(&self) -> usize {
        match self {
            Role::RegistrationStation => 0,
            Role::BiometricProvider => 1,
        }
    }

    pub fn peer(&self) -> Role {
        match self {
            Role::RegistrationStation => Role::BiometricProvider,
            Role::BiometricProvider => Role::RegistrationStation,
        }
    }

    pub fn is_querier(&self) -> bool {
        *self == Self::QUERIER
    }

    /// Default identity used when both parties run with the same defaults.
    pub fn identity(&self) -> Identity {
        Identity(self.to_string())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rs" => Ok(Role::RegistrationStation),
            "bp" => Ok(Role::BiometricProvider),
            other => Err(Error::Other(format!(
                "unknown party {other}, expected rs or bp"
            ))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::RegistrationStation => write!(f, "rs"),
            Role::BiometricProvider => write!(f, "bp"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("rs".parse::<Role>().unwrap(), Role::RegistrationStation);
        assert_eq!("bp".parse::<Role>().unwrap(), Role::BiometricProvider);
        assert!("alice".parse::<Role>().is_err());
        for role in Role::ALL {
            assert_eq!(role.peer().peer(), role);
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert!(Role::RegistrationStation.is_querier());
    }
}
