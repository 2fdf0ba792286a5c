//! Directory query error types.
//!
//! Every failure a query can produce is classified into one [`ErrorKind`].
//! Errors are logged where they are detected and then returned unchanged;
//! nothing in this workspace retries or suppresses them.
//!
//! ## Security Note
//!
//! Error messages must not carry private key material or raw certificate
//! blobs. Certificate errors describe *what* was wrong, never the bytes.

use std::time::Duration;

use thiserror::Error;

/// Failure classes reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connect or search deadline exceeded.
    ConnectionTimeout,
    /// The directory rejected the request (bad filter, bind or search failure).
    Protocol,
    /// Transport-level failure (socket, TLS handshake, connection driver).
    Transport,
    /// Client certificate, private key or CA chain could not be used.
    CertificateFormat,
    /// Directory attributes could not be mapped onto the requested type.
    Mapping,
    /// Anything else.
    Unknown,
}

impl ErrorKind {
    /// Returns a stable, log-friendly name for the class.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionTimeout => "ConnectionTimeout",
            Self::Protocol => "ProtocolError",
            Self::Transport => "TransportError",
            Self::CertificateFormat => "CertificateFormatError",
            Self::Mapping => "MappingError",
            Self::Unknown => "UnknownError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while querying the Spine Directory Service.
#[derive(Debug, Error)]
pub enum SdsError {
    /// The connection could not be established within the connect timeout.
    #[error("connection to directory timed out after {0:?}")]
    ConnectionTimeout(Duration),

    /// The search did not complete within the overall search deadline.
    #[error("directory search exceeded its deadline of {0:?}")]
    SearchTimeout(Duration),

    /// The directory returned a non-success result.
    #[error("directory protocol error (result code {code}): {message}")]
    Protocol {
        /// LDAP result code, or 0 when the failure was detected client side.
        code: u32,
        /// Diagnostic text from the server.
        message: String,
    },

    /// Transport-level failure.
    #[error("directory transport error: {0}")]
    Transport(String),

    /// Certificate or key material is malformed or inconsistent.
    #[error("certificate format error: {0}")]
    CertificateFormat(String),

    /// The attribute document could not be decoded into the target type.
    #[error("could not map directory attributes onto {target}: {source}")]
    Mapping {
        /// Name of the requested result type.
        target: &'static str,
        /// Underlying decode failure.
        #[source]
        source: serde_json::Error,
    },

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Unclassified failure.
    #[error("unknown directory error: {0}")]
    Unknown(String),
}

impl SdsError {
    /// Creates a protocol error.
    #[must_use]
    pub fn protocol(code: u32, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a certificate format error.
    #[must_use]
    pub fn certificate(msg: impl Into<String>) -> Self {
        Self::CertificateFormat(msg.into())
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates an unknown error.
    #[must_use]
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Classifies this error.
    ///
    /// A search deadline overrun is reported as
    /// [`ErrorKind::ConnectionTimeout`], the class for every transport
    /// deadline. Configuration problems have no class of their own and are
    /// reported as [`ErrorKind::Unknown`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionTimeout(_) | Self::SearchTimeout(_) => ErrorKind::ConnectionTimeout,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Transport(_) => ErrorKind::Transport,
            Self::CertificateFormat(_) => ErrorKind::CertificateFormat,
            Self::Mapping { .. } => ErrorKind::Mapping,
            Self::Configuration(_) | Self::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Checks if this is a connection-related error.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConnectionTimeout | ErrorKind::Transport
        )
    }

    /// Checks if this is a security-related error.
    #[must_use]
    pub const fn is_security_error(&self) -> bool {
        matches!(self, Self::CertificateFormat(_))
    }
}

/// Result type for directory operations.
pub type SdsResult<T> = Result<T, SdsError>;
