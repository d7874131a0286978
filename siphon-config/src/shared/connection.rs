use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Connection settings for the source database.
///
/// The connection string is an opaque credential in libpq key/value or URL form and is kept
/// behind [`SecretString`] so it never ends up in logs. This type intentionally does not
/// implement [`Serialize`].
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub connection_string: SecretString,
    #[serde(default = "TlsConfig::disabled")]
    pub tls: TlsConfig,
}

impl SourceConfig {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: SecretString::new(connection_string.into()),
            tls: TlsConfig::disabled(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.connection_string.expose_secret().trim().is_empty() {
            return Err(ValidationError::EmptyConnectionString);
        }

        self.tls.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// PEM encoded root certificates trusted when verifying the server.
    #[serde(default)]
    pub trusted_root_certs: String,
    #[serde(default)]
    pub enabled: bool,
}

impl TlsConfig {
    pub fn disabled() -> Self {
        Self {
            trusted_root_certs: String::new(),
            enabled: false,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.trim().is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}
