//! Domain errors that callers may want to inspect.
//!
//! Everything is transported as `anyhow::Error`; use `downcast_ref::<PackageError>()`
//! to recover the structured variant.

use std::path::PathBuf;

#[derive(Debug)]
pub enum PackageError {
    /// The requested package is not defined in any scope.
    UnknownPackage { name: String },
    /// A user-scope-only operation was invoked while running as administrator.
    UserScopeInAdminMode { operation: &'static str },
    /// The configured default repository has an unrecognized kind tag.
    UnknownRepositoryType(String),
    /// Proxy resolution was asked for a URL with an unsupported scheme.
    UnsupportedProxyScheme(String),
    /// No proxy is configured in the settings or the environment.
    NoProxyConfigured,
    /// A package definition file could not be understood.
    InvalidDefinition { path: PathBuf, reason: String },
}

impl std::fmt::Display for PackageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageError::UnknownPackage { name } => {
                write!(f, "The requested package is unknown: {}", name)
            }
            PackageError::UserScopeInAdminMode { operation } => {
                write!(
                    f,
                    "{} is not available in administrator mode (there is no user scope)",
                    operation
                )
            }
            PackageError::UnknownRepositoryType(kind) => {
                write!(f, "Unknown repository type in configuration: {:?}", kind)
            }
            PackageError::UnsupportedProxyScheme(scheme) => {
                write!(f, "Unsupported URL scheme for proxy lookup: {:?}", scheme)
            }
            PackageError::NoProxyConfigured => write!(f, "No proxy host is configured."),
            PackageError::InvalidDefinition { path, reason } => {
                write!(f, "Invalid package definition file {:?}: {}", path, reason)
            }
        }
    }
}

impl std::error::Error for PackageError {}
