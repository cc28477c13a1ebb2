use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, SameSite, Status},
    outcome::{try_outcome, IntoOutcome},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::{
    db::{User, UserId},
    mongodb::Coll,
};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token representing a signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub id: UserId,
}

impl AuthToken {
    /// Create a new [`AuthToken`] for the given user.
    pub fn new(user: &User) -> Self {
        Self { id: user.id }
    }

    #[allow(clippy::missing_panics_doc)]
    /// Serialize this token into a cookie.
    pub fn into_cookie(self, config: &Config) -> Cookie<'static> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .expect("JWT encoding is infallible with default settings");

        Cookie::build(AUTH_TOKEN_COOKIE, token)
            .path("/")
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Lax)
            .finish()
    }

    /// Deserialize a token from a cookie.
    pub fn from_cookie(cookie: &Cookie<'static>, config: &Config) -> Result<Self, Error> {
        let token = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims>| claims.claims.token)?;
        Ok(token)
    }

    /// A cookie that, when added to the jar, signs the user out.
    pub fn removal_cookie() -> Cookie<'static> {
        Cookie::build(AUTH_TOKEN_COOKIE, "").path("/").finish()
    }
}

/// Cookie claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    token: AuthToken,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = Error;

    /// Get an [`AuthToken`] from the cookie.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` is always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();

        // Forward to any routes that do not require an authentication token.
        let cookie = try_outcome!(req.cookies().get(AUTH_TOKEN_COOKIE).or_forward(()));

        // Expired or forged tokens are treated like no token at all.
        Self::from_cookie(cookie, config).or_forward(())
    }
}

/// The signed-in user. Forwards if nobody is signed in, the token is stale,
/// or the account has since been deactivated.
#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let token = try_outcome!(req.guard::<AuthToken>().await);

        // Check the user actually exists.
        let db = req.guard::<&State<mongodb::Database>>().await.unwrap();
        let users = Coll::<User>::from_db(db);
        match User::get(&users, token.id).await {
            Ok(Some(user)) if user.is_active => Outcome::Success(user),
            Ok(_) => Outcome::Forward(()),
            Err(e) => Outcome::Failure((Status::InternalServerError, e)),
        }
    }
}

/// A signed-in staff member.
///
/// Unlike [`User`], this guard never forwards: anyone else fails with
/// [`Error::LoginRequired`], which redirects to the login page.
#[derive(Debug)]
pub struct Staff(pub User);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Staff {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match req.guard::<User>().await {
            Outcome::Success(user) if user.is_staff => Outcome::Success(Staff(user)),
            Outcome::Failure(failure) => Outcome::Failure(failure),
            _ => Outcome::Failure((
                Status::SeeOther,
                Error::LoginRequired(req.uri().to_string()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        rocket::Config::figment().extract::<Config>().unwrap()
    }

    #[test]
    fn cookie_round_trip() {
        let config = config();
        let token = AuthToken::new(&User::example_member());
        let cookie = token.into_cookie(&config);
        assert_eq!(cookie.name(), AUTH_TOKEN_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));

        let decoded = AuthToken::from_cookie(&cookie, &config).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn forged_cookie_rejected() {
        let config = config();
        let cookie = Cookie::new(AUTH_TOKEN_COOKIE, "not.a.jwt");
        assert!(AuthToken::from_cookie(&cookie, &config).is_err());
    }
}
