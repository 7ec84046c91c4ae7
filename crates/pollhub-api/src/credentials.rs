use anyhow::anyhow;
use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::{SaltString, rand_core::OsRng},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;

use pollhub_core::{CredentialHasher, TokenIssuer, UserRef};
use pollhub_types::api::Claims;

/// Argon2id password digests in PHC string format.
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new(params: Params) -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::new(Params::default())
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("Password hashing failed: {}", e))?;
        Ok(digest.to_string())
    }

    fn verify(&self, password: &str, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return false;
        };
        self.argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}

/// HS256 JWTs carrying the user id and username. Expiry is checked by
/// `jsonwebtoken` on decode.
pub struct JwtIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl JwtIssuer {
    pub fn new(secret: &str, ttl: chrono::Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }
}

impl TokenIssuer for JwtIssuer {
    fn issue(&self, user: &UserRef) -> anyhow::Result<String> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: user.id,
            username: user.username.clone(),
            iat: now.timestamp() as usize,
            exp: (now + self.ttl).timestamp() as usize,
        };

        let token = encode(&Header::default(), &claims, &self.encoding)?;
        Ok(token)
    }

    fn verify(&self, token: &str) -> Option<UserRef> {
        match decode::<Claims>(token, &self.decoding, &Validation::default()) {
            Ok(data) => Some(UserRef {
                id: data.claims.sub,
                username: data.claims.username,
            }),
            Err(e) => {
                debug!("Token rejected: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn cheap_hasher() -> Argon2Hasher {
        Argon2Hasher::new(Params::new(1024, 1, 1, None).unwrap())
    }

    fn user() -> UserRef {
        UserRef {
            id: Uuid::new_v4(),
            username: "victor".into(),
        }
    }

    #[test]
    fn hash_verify_roundtrip() {
        let hasher = cheap_hasher();
        let digest = hasher.hash("open sesame").unwrap();

        assert!(digest.starts_with("$argon2id$"));
        assert!(hasher.verify("open sesame", &digest));
        assert!(!hasher.verify("open sesame!", &digest));
        assert!(!hasher.verify("open sesame", "not-a-phc-string"));
    }

    #[test]
    fn salts_differ_per_hash() {
        let hasher = cheap_hasher();
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn token_roundtrip() {
        let issuer = JwtIssuer::new("test-secret", chrono::Duration::hours(1));
        let user = user();

        let token = issuer.issue(&user).unwrap();
        assert_eq!(issuer.verify(&token), Some(user));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let issuer = JwtIssuer::new("secret-a", chrono::Duration::hours(1));
        let other = JwtIssuer::new("secret-b", chrono::Duration::hours(1));

        let token = issuer.issue(&user()).unwrap();
        assert!(other.verify(&token).is_none());
        assert!(issuer.verify("garbage").is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        // Well past the default 60s validation leeway.
        let issuer = JwtIssuer::new("test-secret", chrono::Duration::hours(-2));
        let token = issuer.issue(&user()).unwrap();
        assert!(issuer.verify(&token).is_none());
    }
}
