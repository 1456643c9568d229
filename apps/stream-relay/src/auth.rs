use async_trait::async_trait;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

/// Identity extracted from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token expired")]
    Expired,
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("token signature mismatch")]
    SignatureMismatch,
    #[error("token claim rejected: {0}")]
    ClaimRejected(String),
    #[error("token missing subject")]
    MissingSubject,
    #[error("token subject does not match uuid")]
    SubjectMismatch,
}

impl AuthError {
    pub fn metric_label(&self) -> &'static str {
        match self {
            AuthError::Expired => "token_expired",
            AuthError::Malformed(_) => "token_malformed",
            AuthError::SignatureMismatch => "token_signature",
            AuthError::ClaimRejected(_) => "token_claim",
            AuthError::MissingSubject => "token_missing_subject",
            AuthError::SubjectMismatch => "token_subject_mismatch",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::SignatureMismatch,
            ErrorKind::InvalidIssuer => AuthError::ClaimRejected("iss".into()),
            ErrorKind::InvalidAudience => AuthError::ClaimRejected("aud".into()),
            ErrorKind::ImmatureSignature => AuthError::ClaimRejected("nbf".into()),
            ErrorKind::MissingRequiredClaim(claim) => AuthError::ClaimRejected(claim.clone()),
            _ => AuthError::Malformed(err.to_string()),
        }
    }
}

/// Checks identity tokens issued by the external authority.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError>;
}

#[derive(Debug, Deserialize)]
struct IdentityClaims {
    #[serde(default)]
    sub: Option<String>,
}

/// HS256 verifier sharing a secret with the token issuer.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &[u8], issuer: Option<&str>, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        match audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let data = decode::<IdentityClaims>(token, &self.key, &self.validation)?;
        let subject = data
            .claims
            .sub
            .filter(|sub| !sub.trim().is_empty())
            .ok_or(AuthError::MissingSubject)?;
        Ok(VerifiedIdentity { subject })
    }
}
