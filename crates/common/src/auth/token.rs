use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::crypto::{signature_hex, DerivationError, KeyPair, PublicKey, Signature};

pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Derivation(#[from] DerivationError),
}

/// The signed part of a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub data: serde_json::Value,
    /// Expiry as unix milliseconds
    pub expires: i64,
}

/// Self-contained bearer credential.
///
/// The signature covers the JSON encoding of `payload`, so changing either
/// `data` or `expires` after issuance invalidates the token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub payload: TokenPayload,
    #[serde(with = "signature_hex")]
    pub signature: Signature,
    pub public_key: PublicKey,
}

impl Token {
    pub fn issue<T: Serialize>(keypair: &KeyPair, data: &T, ttl: Duration) -> Result<Self, TokenError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires = Utc::now().timestamp_millis().saturating_add(ttl_ms);
        Self::issue_until(keypair, data, expires)
    }

    pub(crate) fn issue_until<T: Serialize>(
        keypair: &KeyPair,
        data: &T,
        expires: i64,
    ) -> Result<Self, TokenError> {
        let payload = TokenPayload {
            data: serde_json::to_value(data)?,
            expires,
        };
        let signature = keypair.sign(&serde_json::to_vec(&payload)?)?;
        Ok(Token {
            payload,
            signature,
            public_key: keypair.public_key(),
        })
    }

    /// Check expiry and signature, returning the carried data
    pub fn verify(&self) -> Result<&serde_json::Value, TokenError> {
        if Utc::now().timestamp_millis() > self.payload.expires {
            return Err(TokenError::Expired);
        }
        let message = serde_json::to_vec(&self.payload)?;
        self.public_key
            .verify(&message, &self.signature)
            .map_err(|_| TokenError::InvalidSignature)?;
        Ok(&self.payload.data)
    }

    pub fn expires_at(&self) -> Option<chrono::DateTime<Utc>> {
        chrono::DateTime::from_timestamp_millis(self.payload.expires)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::Seed;
    use serde_json::json;

    #[test]
    fn test_issue_and_verify() {
        let keypair = KeyPair::from_seed(&Seed::generate());
        let token = Token::issue(&keypair, &json!({"role": "deploy"}), DEFAULT_TOKEN_TTL).unwrap();
        assert_eq!(token.verify().unwrap(), &json!({"role": "deploy"}));
        assert!(token.expires_at().unwrap() > Utc::now());
    }

    #[test]
    fn test_tampered_data_rejected() {
        let keypair = KeyPair::from_seed(&Seed::generate());
        let mut token = Token::issue(&keypair, &json!({"role": "read"}), DEFAULT_TOKEN_TTL).unwrap();
        token.payload.data = json!({"role": "admin"});
        assert!(matches!(token.verify(), Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn test_extended_expiry_rejected() {
        let keypair = KeyPair::from_seed(&Seed::generate());
        let mut token = Token::issue(&keypair, &"x", DEFAULT_TOKEN_TTL).unwrap();
        token.payload.expires += 1;
        assert!(matches!(token.verify(), Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let keypair = KeyPair::from_seed(&Seed::generate());
        let past = Utc::now().timestamp_millis() - 1_000;
        let token = Token::issue_until(&keypair, &"x", past).unwrap();
        assert!(matches!(token.verify(), Err(TokenError::Expired)));
    }

    #[test]
    fn test_foreign_key_rejected() {
        let keypair = KeyPair::from_seed(&Seed::generate());
        let other = KeyPair::from_seed(&Seed::generate());
        let mut token = Token::issue(&keypair, &"x", DEFAULT_TOKEN_TTL).unwrap();
        token.public_key = other.public_key();
        assert!(matches!(token.verify(), Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn test_public_only_cannot_issue() {
        let keypair = KeyPair::from_seed(&Seed::generate()).to_public();
        assert!(matches!(
            Token::issue(&keypair, &"x", DEFAULT_TOKEN_TTL),
            Err(TokenError::Derivation(DerivationError::CannotSign))
        ));
    }

    #[test]
    fn test_json_shape() {
        let keypair = KeyPair::from_seed(&Seed::generate());
        let token = Token::issue(&keypair, &"x", DEFAULT_TOKEN_TTL).unwrap();
        let value = serde_json::to_value(&token).unwrap();
        assert_eq!(value["publicKey"], keypair.public_key().to_hex());
        assert_eq!(value["payload"]["data"], "x");
        assert_eq!(value["signature"].as_str().unwrap().len(), 128);

        let back: Token = serde_json::from_value(value).unwrap();
        assert!(back.verify().is_ok());
    }
}
