//! Destination credentials and the provider seam.
//!
//! The core only needs "give me a usable destination handle". Secret
//! material arrives either raw or base64-encoded and is resolved into a
//! [`ServiceAccountKey`] once, at startup.

use std::fmt;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ReplError, Result};
use crate::store::DestinationHandle;

/// Secret payload as supplied by the deployment.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialMaterial {
    /// The JSON key itself.
    Raw(String),
    /// The JSON key, base64-encoded.
    Encoded(String),
}

impl fmt::Debug for CredentialMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialMaterial::Raw(_) => f.write_str("CredentialMaterial::Raw(<redacted>)"),
            CredentialMaterial::Encoded(_) => f.write_str("CredentialMaterial::Encoded(<redacted>)"),
        }
    }
}

impl CredentialMaterial {
    /// Build from the two optional forms. Exactly one must be present.
    pub fn from_parts(raw: Option<String>, encoded: Option<String>) -> Result<Self> {
        match (raw, encoded) {
            (Some(raw), None) => Ok(CredentialMaterial::Raw(raw)),
            (None, Some(encoded)) => Ok(CredentialMaterial::Encoded(encoded)),
            (Some(_), Some(_)) => Err(ReplError::config(
                "both raw and encoded credential material supplied; set exactly one",
            )),
            (None, None) => Err(ReplError::config(
                "credential material required: set a raw or base64-encoded service-account key",
            )),
        }
    }

    /// The decoded secret text.
    pub fn decode(&self) -> Result<String> {
        match self {
            CredentialMaterial::Raw(raw) => Ok(raw.clone()),
            CredentialMaterial::Encoded(encoded) => {
                let bytes = STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| ReplError::config(format!("invalid base64 credential: {}", e)))?;
                String::from_utf8(bytes)
                    .map_err(|_| ReplError::config("decoded credential is not valid UTF-8"))
            }
        }
    }

    /// Decode and parse into a service-account key.
    pub fn resolve(&self) -> Result<ServiceAccountKey> {
        let mut text = self.decode()?;
        let key = ServiceAccountKey::parse(&text);
        text.zeroize();
        key
    }
}

/// Parsed service-account key.
#[derive(Clone, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ServiceAccountKey {
    /// Owning project, when present.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Principal the key authenticates as.
    pub client_email: String,
    private_key: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl ServiceAccountKey {
    /// Parse a JSON service-account key.
    pub fn parse(json: &str) -> Result<Self> {
        let key: ServiceAccountKey = serde_json::from_str(json)
            .map_err(|e| ReplError::config(format!("invalid service-account key: {}", e)))?;
        if key.client_email.is_empty() || key.private_key.is_empty() {
            return Err(ReplError::config(
                "service-account key has empty client_email or private_key",
            ));
        }
        Ok(key)
    }

    /// The private key material.
    pub fn private_key(&self) -> &str {
        &self.private_key
    }
}

/// Supplies authenticated destination handles.
///
/// Providers may cache handles across calls; the core treats whatever it
/// receives as a long-lived, shared, read-only resource.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// A handle bound to the destination `container`.
    async fn destination(&self, container: &str) -> Result<DestinationHandle>;
}

/// Provider that always returns the same pre-built handle.
pub struct StaticProvider {
    handle: DestinationHandle,
}

impl StaticProvider {
    /// Wrap an existing handle.
    pub fn new(handle: DestinationHandle) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl CredentialProvider for StaticProvider {
    async fn destination(&self, container: &str) -> Result<DestinationHandle> {
        if self.handle.container() != container {
            return Err(ReplError::Credential {
                msg: format!(
                    "handle is bound to {}, not {}",
                    self.handle.container(),
                    container
                ),
            });
        }
        Ok(self.handle.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_JSON: &str =
        r#"{"type":"service_account","project_id":"p1","client_email":"a@b.iam","private_key":"-----KEY-----"}"#;

    mod material {
        use super::*;

        #[test]
        fn test_exactly_one_form_required() {
            assert!(CredentialMaterial::from_parts(None, None).is_err());
            assert!(CredentialMaterial::from_parts(Some("a".into()), Some("b".into())).is_err());
            assert_eq!(
                CredentialMaterial::from_parts(Some("a".into()), None).unwrap(),
                CredentialMaterial::Raw("a".into())
            );
            assert_eq!(
                CredentialMaterial::from_parts(None, Some("b".into())).unwrap(),
                CredentialMaterial::Encoded("b".into())
            );
        }

        #[test]
        fn test_encoded_material_decodes() {
            let encoded = STANDARD.encode(KEY_JSON);
            let key = CredentialMaterial::Encoded(encoded).resolve().unwrap();
            assert_eq!(key.client_email, "a@b.iam");
            assert_eq!(key.project_id.as_deref(), Some("p1"));
        }

        #[test]
        fn test_bad_base64_is_configuration_error() {
            let err = CredentialMaterial::Encoded("***".into()).resolve().unwrap_err();
            assert!(matches!(err, ReplError::Configuration { .. }));
        }

        #[test]
        fn test_debug_redacts_secret() {
            let text = format!("{:?}", CredentialMaterial::Raw(KEY_JSON.into()));
            assert!(!text.contains("KEY"));
        }
    }

    mod service_account {
        use super::*;

        #[test]
        fn test_parse_raw_key() {
            let key = ServiceAccountKey::parse(KEY_JSON).unwrap();
            assert_eq!(key.private_key(), "-----KEY-----");
            assert!(!format!("{:?}", key).contains("-----KEY-----"));
        }

        #[test]
        fn test_missing_fields_rejected() {
            assert!(ServiceAccountKey::parse(r#"{"client_email":"a@b"}"#).is_err());
            assert!(ServiceAccountKey::parse("not json").is_err());
            assert!(ServiceAccountKey::parse(r#"{"client_email":"","private_key":"k"}"#).is_err());
        }
    }

    mod provider {
        use super::*;
        use crate::memory::MemoryStore;
        use std::sync::Arc;

        #[tokio::test]
        async fn test_static_provider_checks_container() {
            let store = Arc::new(MemoryStore::new());
            let provider = StaticProvider::new(Arc::new(store.destination("replica")));

            assert!(provider.destination("replica").await.is_ok());
            let err = provider.destination("other").await.err().unwrap();
            assert!(matches!(err, ReplError::Credential { .. }));
        }
    }
}
