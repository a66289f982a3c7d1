/// Polymorphic credentials and the envelope used to persist them in any
/// keyring backend.

use chrono::{DateTime, Utc};

#[derive(Debug)]
struct CredError {
    inner: Context<CredErrKind>,
}
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum CredErrKind {
    #[fail(display = "unsupported credential type '{}'", _0)]
    UnsupportedCredentialType(String),

    #[fail(display = "unknown credential type tag '{}' on disk", _0)]
    UnknownCredentialType(String),
}
use failure::{Error, Fail, Context, Backtrace};
use std::fmt::{self, Display};

impl Fail for CredError {
    fn cause(&self) -> Option<&Fail> { self.inner.cause() }
    fn backtrace(&self) -> Option<&Backtrace> { self.inner.backtrace() }
}
impl Display for CredError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.inner, f)
    }
}
impl From<CredErrKind> for CredError {
    fn from(kind: CredErrKind) -> CredError {
        CredError { inner: Context::new(kind) }
    }
}
impl From<Context<CredErrKind>> for CredError {
    fn from(inner: Context<CredErrKind>) -> CredError {
        CredError { inner: inner }
    }
}
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Aws,
    Oidc,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Aws => "aws",
            CredentialKind::Oidc => "oidc",
        }
    }

    pub fn parse(s: &str) -> Result<CredentialKind> {
        match s {
            "aws" => Ok(CredentialKind::Aws),
            "oidc" => Ok(CredentialKind::Oidc),
            other => Err(CredErrKind::UnknownCredentialType(other.to_string()))?,
        }
    }
}

/// The AWS credential payload, as described in spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

/// The OIDC credential payload, as described in spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcCredentials {
    pub token: String,
    pub provider: String,
    pub audience: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

/// A shared capability set over the two credential variants (spec.md §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Credentials {
    Aws(AwsCredentials),
    Oidc(OidcCredentials),
}

impl Credentials {
    pub fn kind(&self) -> CredentialKind {
        match self {
            Credentials::Aws(_) => CredentialKind::Aws,
            Credentials::Oidc(_) => CredentialKind::Oidc,
        }
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        match self {
            Credentials::Aws(c) => c.expiration,
            Credentials::Oidc(c) => c.expiration,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiration() {
            Some(exp) => now >= exp,
            None => false,
        }
    }

    /// A short human-readable summary, analogous to a `whoami` command.
    pub fn whoami(&self) -> String {
        match self {
            Credentials::Aws(c) => format!("aws credentials for region {} (key {}...)", c.region, &c.access_key_id[..c.access_key_id.len().min(4)]),
            Credentials::Oidc(c) => format!("oidc token from {} (audience {})", c.provider, c.audience),
        }
    }
}

/// The on-disk/in-keyring unit: a tagged envelope wrapping the
/// type-specific serialized payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialEnvelope {
    #[serde(rename = "type")]
    pub kind: CredentialKind,
    pub data: Vec<u8>,
}

impl CredentialEnvelope {
    pub fn seal(creds: &Credentials) -> Result<CredentialEnvelope> {
        let (kind, inner) = match creds {
            Credentials::Aws(c) => (CredentialKind::Aws, serde_json::to_vec(c)?),
            Credentials::Oidc(c) => (CredentialKind::Oidc, serde_json::to_vec(c)?),
        };
        Ok(CredentialEnvelope { kind, data: inner })
    }

    pub fn open(&self) -> Result<Credentials> {
        match self.kind {
            CredentialKind::Aws => Ok(Credentials::Aws(serde_json::from_slice(&self.data)?)),
            CredentialKind::Oidc => Ok(Credentials::Oidc(serde_json::from_slice(&self.data)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn aws_creds(expires_in_secs: i64) -> Credentials {
        Credentials::Aws(AwsCredentials {
            access_key_id: "AKIAEXAMPLE".into(),
            secret_access_key: "secret".into(),
            session_token: Some("token".into()),
            region: "us-east-1".into(),
            expiration: Some(Utc::now() + Duration::seconds(expires_in_secs)),
        })
    }

    #[test]
    fn seal_and_open_round_trips() {
        let creds = aws_creds(3600);
        let envelope = CredentialEnvelope::seal(&creds).unwrap();
        assert_eq!(envelope.kind, CredentialKind::Aws);
        let opened = envelope.open().unwrap();
        assert_eq!(opened.kind(), CredentialKind::Aws);
    }

    #[test]
    fn is_expired_respects_expiration() {
        let expired = aws_creds(-10);
        assert!(expired.is_expired(Utc::now()));
        let fresh = aws_creds(3600);
        assert!(!fresh.is_expired(Utc::now()));
    }

    #[test]
    fn unknown_type_tag_errors() {
        assert!(CredentialKind::parse("unknown").is_err());
    }
}
