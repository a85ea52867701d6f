//! RSA-PSS-SHA256 request signing (spec §4.3): `ACCESS-KEY` /
//! `ACCESS-SIGNATURE` / `ACCESS-TIMESTAMP` headers over
//! `timestamp_ms + METHOD + path`, MGF1-SHA256, salt length = digest length.
//!
//! No in-pack example performs RSA signing; `rsa` + `sha2` are the one
//! dependency introduced outside the retrieval pack (see DESIGN.md).

use crate::error::CoreError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rsa::pss::SigningKey;
use rsa::signature::rand_core::OsRng;
use rsa::signature::RandomizedSigner;
use rsa::RsaPrivateKey;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

/// Headers carrying one signed request's credentials.
#[derive(Debug, Clone)]
pub struct AuthHeaders {
    pub access_key: String,
    pub signature_base64: String,
    pub timestamp_millis: String,
}

/// Signs `(method, path)` pairs with an RSA private key loaded at startup.
pub struct RsaPssSigner {
    access_key: String,
    private_key: RsaPrivateKey,
}

impl RsaPssSigner {
    pub fn new(access_key: impl Into<String>, private_key: RsaPrivateKey) -> Self {
        Self { access_key: access_key.into(), private_key }
    }

    /// Build the auth headers for one request. Fails only if the key
    /// itself is malformed enough to reject signing (practically never,
    /// since `RsaPrivateKey` is validated at load time).
    pub fn sign(&self, method: &str, path: &str) -> Result<AuthHeaders, CoreError> {
        let timestamp_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis()
            .to_string();
        let message = format!("{timestamp_millis}{}{path}", method.to_uppercase());

        let signing_key = SigningKey::<Sha256>::new(self.private_key.clone());
        let signature = signing_key.sign_with_rng(&mut OsRng, message.as_bytes());

        Ok(AuthHeaders {
            access_key: self.access_key.clone(),
            signature_base64: STANDARD.encode(signature.to_bytes()),
            timestamp_millis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> RsaPrivateKey {
        RsaPrivateKey::new(&mut OsRng, 2048).expect("generate test key")
    }

    #[test]
    fn sign_produces_well_formed_headers() {
        let signer = RsaPssSigner::new("access-key-id", test_key());
        let headers = signer.sign("GET", "/trade-api/v2/portfolio/balance").unwrap();
        assert_eq!(headers.access_key, "access-key-id");
        assert!(!headers.signature_base64.is_empty());
        assert!(headers.timestamp_millis.parse::<u128>().is_ok());
    }

    #[test]
    fn distinct_calls_produce_distinct_signatures() {
        let signer = RsaPssSigner::new("access-key-id", test_key());
        let a = signer.sign("GET", "/trade-api/v2/portfolio/balance").unwrap();
        let b = signer.sign("POST", "/trade-api/v2/portfolio/orders").unwrap();
        assert_ne!(a.signature_base64, b.signature_base64);
    }
}
