//! Delivery URL signing for the presentation layer.

use std::path::Path;

use base64::{engine::general_purpose, Engine as _};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use sha2::Sha256;

use crate::error::{Error, Result};

/// Turns a plain delivery URL into one the CDN will serve.
pub trait UrlSigner: Send + Sync {
    fn sign(&self, url: &str) -> Result<String>;
}

/// Returns URLs unchanged, for public buckets or cookie-authenticated delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsignedUrls;

impl UrlSigner for UnsignedUrls {
    fn sign(&self, url: &str) -> Result<String> {
        Ok(url.to_string())
    }
}

/// Signs a canned policy ("this resource until that time") with an RSA key
/// and appends `Expires`, `Signature` and `Key-Pair-Id` to the URL.
pub struct CannedPolicySigner {
    key_pair_id: String,
    signing_key: SigningKey<Sha256>,
    expiration_secs: i64,
    now: fn() -> i64,
}

/// One cookie of the signed-cookie triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCookie {
    pub name: &'static str,
    pub value: String,
}

impl CannedPolicySigner {
    pub fn new(key_pair_id: impl Into<String>, key: RsaPrivateKey, expiration_secs: i64) -> Self {
        Self {
            key_pair_id: key_pair_id.into(),
            signing_key: SigningKey::<Sha256>::new(key),
            expiration_secs,
            now: || chrono::Utc::now().timestamp(),
        }
    }

    /// Load a PKCS#1 PEM ("RSA PRIVATE KEY") from disk.
    pub fn from_pem_file(
        key_pair_id: impl Into<String>,
        path: &Path,
        expiration_secs: i64,
    ) -> Result<Self> {
        let pem = std::fs::read_to_string(path)?;
        let key = RsaPrivateKey::from_pkcs1_pem(&pem)
            .map_err(|e| Error::Signing(format!("bad private key {}: {e}", path.display())))?;
        Ok(Self::new(key_pair_id, key, expiration_secs))
    }

    fn expires_at(&self) -> i64 {
        (self.now)() + self.expiration_secs
    }

    fn sign_policy(&self, policy: &str) -> String {
        let signature = self.signing_key.sign(policy.as_bytes());
        url_safe(&general_purpose::STANDARD.encode(signature.to_bytes()))
    }

    /// Policy-and-signature cookies granting access to every resource until expiry.
    pub fn signed_cookies(&self) -> Vec<SignedCookie> {
        let policy = canned_policy("*", self.expires_at());
        vec![
            SignedCookie {
                name: "CloudFront-Policy",
                value: url_safe(&general_purpose::STANDARD.encode(policy.as_bytes())),
            },
            SignedCookie {
                name: "CloudFront-Signature",
                value: self.sign_policy(&policy),
            },
            SignedCookie {
                name: "CloudFront-Key-Pair-Id",
                value: self.key_pair_id.clone(),
            },
        ]
    }
}

impl UrlSigner for CannedPolicySigner {
    fn sign(&self, url: &str) -> Result<String> {
        let expires = self.expires_at();
        let signature = self.sign_policy(&canned_policy(url, expires));
        let separator = if url.contains('?') { '&' } else { '?' };
        Ok(format!(
            "{url}{separator}Expires={expires}&Signature={signature}&Key-Pair-Id={}",
            self.key_pair_id
        ))
    }
}

fn canned_policy(resource: &str, expires: i64) -> String {
    format!(
        r#"{{"Statement":[{{"Resource":{},"Condition":{{"DateLessThan":{{"AWS:EpochTime":{}}}}}}}]}}"#,
        serde_json::Value::from(resource),
        expires
    )
}

/// Swap the base64 characters that are unsafe in query strings and cookies.
fn url_safe(encoded: &str) -> String {
    encoded
        .chars()
        .map(|c| match c {
            '+' => '-',
            '=' => '_',
            '/' => '~',
            other => other,
        })
        .collect()
}
