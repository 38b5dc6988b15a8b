//! RS256 token issuance and verification bound to the key-value store.
//!
//! Every issued pair leaves two records behind:
//!
//! ```text
//! <subject>   -> <access jti>    (kept for the longer of the two lifetimes)
//! <access jti> -> <refresh jti>  (kept for the refresh lifetime)
//! ```
//!
//! A token is only accepted while the record keyed by its `sub` exists, so
//! deleting it revokes tokens whose signatures are still valid.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::domain::repositories::{KeyValueStore, KvError};
use crate::error::AppError;

/// Which keypair a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    /// `typ` header written on tokens of this kind.
    pub fn header_type(self) -> &'static str {
        match self {
            TokenKind::Access => "at+jwt",
            TokenKind::Refresh => "rt+jwt",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid {kind} key: {reason}")]
    Key { kind: &'static str, reason: String },

    #[error("token lifetime must be positive")]
    Lifetime,

    #[error("failed to sign token: {0}")]
    Sign(jsonwebtoken::errors::Error),

    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(jsonwebtoken::errors::Error),

    #[error("token revoked")]
    Revoked,

    #[error("token is not a {0:?} token")]
    WrongKind(TokenKind),

    #[error("refresh token does not belong to the access token")]
    Mismatch,

    #[error(transparent)]
    Store(#[from] KvError),
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Key { .. } | TokenError::Lifetime | TokenError::Sign(_) => {
                AppError::internal("Token service failure", json!({ "reason": e.to_string() }))
            }
            TokenError::Store(_) => {
                tracing::error!(error = %e, "token binding lookup failed");
                AppError::unauthorized("Unauthorized", json!({ "reason": "binding unavailable" }))
            }
            other => AppError::unauthorized("Unauthorized", json!({ "reason": other.to_string() })),
        }
    }
}

/// Token payload.
///
/// `aud` carries the subject's abilities on access tokens and is empty on
/// refresh tokens. It is read back from either a string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "string_or_list"
    )]
    pub aud: Vec<String>,
    pub jti: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

/// Access and refresh tokens issued together.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// One RSA keypair.
#[derive(Clone)]
pub struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    /// Parses PEM keys. The private key may be PKCS#1 or PKCS#8 but must be RSA.
    pub fn from_pem(kind: &'static str, private: &[u8], public: &[u8]) -> Result<Self, TokenError> {
        let encoding = EncodingKey::from_rsa_pem(private).map_err(|e| TokenError::Key {
            kind,
            reason: format!("private key: {e}"),
        })?;
        let decoding = DecodingKey::from_rsa_pem(public).map_err(|e| TokenError::Key {
            kind,
            reason: format!("public key: {e}"),
        })?;
        Ok(Self { encoding, decoding })
    }

    /// Parses base64-encoded PEM keys as found in configuration.
    pub fn from_base64_pem(kind: &'static str, private: &str, public: &str) -> Result<Self, TokenError> {
        let private = decode_base64(kind, "private", private)?;
        let public = decode_base64(kind, "public", public)?;
        Self::from_pem(kind, &private, &public)
    }
}

fn decode_base64(kind: &'static str, which: &str, value: &str) -> Result<Vec<u8>, TokenError> {
    let compact: String = value.split_whitespace().collect();
    STANDARD.decode(compact).map_err(|e| TokenError::Key {
        kind,
        reason: format!("{which} key is not base64: {e}"),
    })
}

/// Issuer and lifetimes applied to new tokens.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

/// Issues, verifies and revokes RS256 tokens.
pub struct TokenService {
    access: KeyPair,
    refresh: KeyPair,
    settings: TokenSettings,
    store: Arc<dyn KeyValueStore>,
}

impl TokenService {
    /// Creates a service from parsed keys.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Lifetime`] if either lifetime is not positive.
    pub fn new(
        access: KeyPair,
        refresh: KeyPair,
        settings: TokenSettings,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, TokenError> {
        if settings.access_ttl <= Duration::zero() || settings.refresh_ttl <= Duration::zero() {
            return Err(TokenError::Lifetime);
        }
        Ok(Self {
            access,
            refresh,
            settings,
            store,
        })
    }

    /// Creates a service from the `token` config section; lifetimes are in hours.
    pub fn from_config(
        config: &TokenConfig,
        issuer: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, TokenError> {
        let access = KeyPair::from_base64_pem(
            "access",
            &config.access_private_key,
            &config.access_public_key,
        )?;
        let refresh = KeyPair::from_base64_pem(
            "refresh",
            &config.refresh_private_key,
            &config.refresh_public_key,
        )?;
        let settings = TokenSettings {
            issuer: issuer.into(),
            access_ttl: Duration::hours(config.access_expire_hour),
            refresh_ttl: Duration::hours(config.refresh_expire_hour),
        };
        Self::new(access, refresh, settings, store)
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn sign(&self, kind: TokenKind, claims: &Claims) -> Result<String, TokenError> {
        let mut header = Header::new(Algorithm::RS256);
        header.typ = Some(kind.header_type().to_string());
        encode(&header, claims, &self.keys(kind).encoding).map_err(TokenError::Sign)
    }

    /// Issues an access/refresh pair for `subject` and records the bindings.
    pub async fn generate(
        &self,
        subject: &str,
        abilities: Vec<String>,
    ) -> Result<TokenPair, TokenError> {
        let now = Utc::now().timestamp();
        let access_id = Uuid::new_v4().to_string();
        let refresh_id = Uuid::new_v4().to_string();

        let access_claims = Claims {
            iss: self.settings.issuer.clone(),
            sub: subject.to_string(),
            aud: abilities,
            jti: access_id.clone(),
            iat: now,
            nbf: now,
            exp: now + self.settings.access_ttl.num_seconds(),
        };
        let refresh_claims = Claims {
            iss: self.settings.issuer.clone(),
            sub: access_id.clone(),
            aud: Vec::new(),
            jti: refresh_id.clone(),
            iat: now,
            nbf: now,
            exp: now + self.settings.refresh_ttl.num_seconds(),
        };

        let access_token = self.sign(TokenKind::Access, &access_claims)?;
        let refresh_token = self.sign(TokenKind::Refresh, &refresh_claims)?;

        // The subject binding must outlive the access token so an expired access
        // token can still be exchanged while its refresh token is valid.
        let subject_ttl = self.settings.access_ttl.max(self.settings.refresh_ttl);
        self.store
            .set_ex(subject, &access_id, to_std(subject_ttl))
            .await?;
        self.store
            .set_ex(&access_id, &refresh_id, to_std(self.settings.refresh_ttl))
            .await?;

        tracing::debug!(subject, access_id, "issued token pair");

        Ok(TokenPair {
            access_token,
            access_expires_at: timestamp(access_claims.exp),
            refresh_token,
            refresh_expires_at: timestamp(refresh_claims.exp),
        })
    }

    /// Verifies a token of the given kind.
    ///
    /// With `enforce_expiry = false` an expired but correctly signed token is
    /// still accepted. In every case the `typ` header must match `kind` and
    /// the binding for the token's `sub` must exist.
    pub async fn verify(
        &self,
        token: &str,
        kind: TokenKind,
        enforce_expiry: bool,
    ) -> Result<Claims, TokenError> {
        let claims = self.decode_claims(token, kind, enforce_expiry)?;

        match self.store.get(&claims.sub).await? {
            Some(_) => Ok(claims),
            None => Err(TokenError::Revoked),
        }
    }

    fn decode_claims(
        &self,
        token: &str,
        kind: TokenKind,
        enforce_expiry: bool,
    ) -> Result<Claims, TokenError> {
        let decoding = &self.keys(kind).decoding;

        let TokenData { header, claims } = match decode::<Claims>(token, decoding, &validation(true)) {
            Ok(data) => data,
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                if enforce_expiry {
                    return Err(TokenError::Expired);
                }
                decode::<Claims>(token, decoding, &validation(false)).map_err(TokenError::Invalid)?
            }
            Err(e) => return Err(TokenError::Invalid(e)),
        };

        if header.typ.as_deref() != Some(kind.header_type()) {
            return Err(TokenError::WrongKind(kind));
        }
        Ok(claims)
    }

    /// Exchanges an (possibly expired) access token and its refresh token for a new pair.
    ///
    /// The old bindings are replaced by the new ones.
    pub async fn refresh(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<TokenPair, TokenError> {
        let access = self.verify(access_token, TokenKind::Access, false).await?;
        let refresh = self.verify(refresh_token, TokenKind::Refresh, true).await?;

        if refresh.sub != access.jti {
            return Err(TokenError::Mismatch);
        }

        self.store.del(&access.jti).await?;
        self.generate(&access.sub, access.aud).await
    }

    /// Deletes the bindings of `subject`, revoking its outstanding tokens.
    pub async fn revoke(&self, subject: &str) -> Result<(), TokenError> {
        if let Some(access_id) = self.store.get(subject).await? {
            self.store.del(&access_id).await?;
        }
        self.store.del(subject).await?;
        tracing::debug!(subject, "revoked token bindings");
        Ok(())
    }
}

fn validation(validate_exp: bool) -> Validation {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.leeway = 0;
    validation.validate_exp = validate_exp;
    validation.validate_nbf = true;
    // Audience carries abilities, checked by the auth stage.
    validation.validate_aud = false;
    validation
}

fn to_std(duration: Duration) -> std::time::Duration {
    duration.to_std().unwrap_or_default()
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}
