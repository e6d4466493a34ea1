//! Crate-level error type

use thiserror::Error;

use crate::caps::CapsParseError;
use crate::listener::ListenerError;
use crate::node::NodeError;
use crate::registry::RegistryError;

/// Any error produced by this crate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Caps(#[from] CapsParseError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn publish_twice() -> Result<()> {
        let second: std::result::Result<(), RegistryError> =
            Err(RegistryError::AlreadyExists("cam".into()));
        second?;
        Ok(())
    }

    #[test]
    fn test_conversion() {
        let err = publish_twice().unwrap_err();
        assert_eq!(err, Error::Registry(RegistryError::AlreadyExists("cam".into())));
        assert_eq!(err.to_string(), "node already registered: cam");
    }

    #[test]
    fn test_caps_error_converts() {
        let err: Error = "width=3".parse::<crate::caps::Caps>().unwrap_err().into();
        assert!(matches!(err, Error::Caps(_)));
    }
}
