use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::web::Data;
use actix_web::{FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;
use crate::settings::AuthSettings;
use crate::user::UserId;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies the HS256 bearer tokens that identify a tenant.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl TokenService {
    pub fn new(secret: &str, lifetime: Duration) -> TokenService {
        TokenService {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            lifetime,
        }
    }

    pub fn from_settings(settings: &AuthSettings) -> TokenService {
        let secret = if settings.jwt_secret.is_empty() {
            warn!("no jwt secret configured, tokens will not survive a restart");
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(48)
                .map(char::from)
                .collect()
        } else {
            settings.jwt_secret.clone()
        };

        TokenService::new(&secret, Duration::minutes(settings.token_minutes))
    }

    pub fn issue(&self, user_id: UserId) -> Result<String, Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| Error::FailedToIssueToken)
    }

    pub fn verify(&self, token: &str) -> Result<UserId, Error> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map_err(|_| Error::InvalidBearerToken)?;

        data.claims
            .sub
            .parse()
            .map_err(|_| Error::InvalidBearerToken)
    }
}

/// The authenticated tenant of a request, taken from its bearer token.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Tenant {
    pub user_id: UserId,
}

impl Tenant {
    fn from_request_sync(req: &HttpRequest) -> Result<Tenant, Error> {
        let tokens = req
            .app_data::<Data<TokenService>>()
            .ok_or_else(|| Error::ExistentialState("token service is not registered".into()))?;

        let header = req
            .headers()
            .get(AUTHORIZATION)
            .ok_or(Error::MissingBearerToken)?
            .to_str()
            .map_err(|_| Error::InvalidBearerToken)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(Error::MissingBearerToken)?
            .trim();

        let user_id = tokens.verify(token)?;

        Ok(Tenant { user_id })
    }
}

impl FromRequest for Tenant {
    type Error = Error;
    type Future = Ready<Result<Tenant, Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Tenant::from_request_sync(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_to_same_user() {
        let tokens = TokenService::new("secret", Duration::minutes(5));
        let user_id = UserId::new();

        let token = tokens.issue(user_id).unwrap();

        assert_eq!(tokens.verify(&token).unwrap(), user_id);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let ours = TokenService::new("secret", Duration::minutes(5));
        let theirs = TokenService::new("other", Duration::minutes(5));

        let token = theirs.issue(UserId::new()).unwrap();

        assert_eq!(ours.verify(&token).unwrap_err(), Error::InvalidBearerToken);
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = TokenService::new("secret", Duration::minutes(-10));

        let token = tokens.issue(UserId::new()).unwrap();

        assert_eq!(tokens.verify(&token).unwrap_err(), Error::InvalidBearerToken);
    }
}
