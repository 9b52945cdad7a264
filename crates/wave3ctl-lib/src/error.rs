//! Unified error type for the wave3ctl-lib crate.
//!
//! [`Wave3Error`] wraps the proxy's error kinds (`ProxyError`) and the
//! caller-side failure kinds (`Io`, `Protocol`, `Config`). `From` impls allow
//! `?` to propagate across module boundaries.

use std::fmt;

use crate::proxy::ProxyError;

/// Unified error type for wave3ctl-lib operations.
#[derive(Debug)]
pub enum Wave3Error {
    /// The proxy refused or failed the transfer.
    Proxy(ProxyError),
    /// Socket or file I/O error (connect, frame read/write, config persistence).
    Io(std::io::Error),
    /// A response did not have the shape the request implied.
    Protocol(String),
    /// Configuration validation error.
    Config(String),
}

impl fmt::Display for Wave3Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Wave3Error::Proxy(e) => write!(f, "{e}"),
            Wave3Error::Io(e) => write!(f, "I/O error: {e}"),
            Wave3Error::Protocol(e) => write!(f, "Protocol error: {e}"),
            Wave3Error::Config(e) => write!(f, "Config error: {e}"),
        }
    }
}

impl std::error::Error for Wave3Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Wave3Error::Proxy(e) => Some(e),
            Wave3Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProxyError> for Wave3Error {
    fn from(e: ProxyError) -> Self {
        Wave3Error::Proxy(e)
    }
}

impl From<std::io::Error> for Wave3Error {
    fn from(e: std::io::Error) -> Self {
        Wave3Error::Io(e)
    }
}

impl Wave3Error {
    /// Whether retrying later could help (device unplugged, daemon gone).
    pub fn is_disconnect(&self) -> bool {
        match self {
            Wave3Error::Proxy(ProxyError::DeviceNotFound) => true,
            Wave3Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Crate-level Result alias using [`Wave3Error`].
pub type Result<T> = std::result::Result<T, Wave3Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_proxy_error() {
        let e: Wave3Error = ProxyError::DeviceNotFound.into();
        assert!(matches!(e, Wave3Error::Proxy(ProxyError::DeviceNotFound)));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: Wave3Error = io_err.into();
        assert!(matches!(e, Wave3Error::Io(_)));
    }

    #[test]
    fn display_proxy_error() {
        let e = Wave3Error::Proxy(ProxyError::TransferFailed(-32));
        assert_eq!(e.to_string(), "Control transfer failed: status -32");
    }

    #[test]
    fn display_config_error() {
        let e = Wave3Error::Config("invalid input".into());
        assert_eq!(e.to_string(), "Config error: invalid input");
    }

    #[test]
    fn display_protocol_error() {
        let e = Wave3Error::Protocol("short reply".into());
        assert_eq!(e.to_string(), "Protocol error: short reply");
    }

    #[test]
    fn source_chains_proxy_error() {
        let e = Wave3Error::Proxy(ProxyError::BoundaryFault);
        let source = std::error::Error::source(&e).unwrap();
        assert!(source.to_string().contains("copied"));
    }

    #[test]
    fn source_none_for_string_variants() {
        let e = Wave3Error::Config("test".into());
        assert!(std::error::Error::source(&e).is_none());
    }

    #[test]
    fn question_mark_propagation_proxy_to_wave3() {
        fn inner() -> crate::proxy::Result<()> {
            Err(ProxyError::InvalidArgument)
        }
        fn outer() -> Result<()> {
            inner()?;
            Ok(())
        }
        let err = outer().unwrap_err();
        assert!(matches!(err, Wave3Error::Proxy(ProxyError::InvalidArgument)));
    }

    #[test]
    fn disconnect_classification() {
        assert!(Wave3Error::Proxy(ProxyError::DeviceNotFound).is_disconnect());
        assert!(
            Wave3Error::Io(std::io::Error::from(std::io::ErrorKind::ConnectionRefused))
                .is_disconnect()
        );
        assert!(!Wave3Error::Proxy(ProxyError::TransferFailed(-32)).is_disconnect());
        assert!(!Wave3Error::Config("x".into()).is_disconnect());
    }
}
