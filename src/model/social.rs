//! Sign-in through an external identity provider.
//!
//! Only Google is supported. A returning identity signs in as the user it
//! was linked to; a new identity with a verified email is linked to the
//! active account with the same email, and only if there is none is a fresh
//! account created.

use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::{
    api::forms::USERNAME_MAX,
    db::{NewUser, SocialAccount, User},
    mongodb::{is_duplicate_key_error, Coll, Counter},
};

const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
#[cfg(not(test))]
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
#[cfg(not(test))]
const USERINFO_ENDPOINT: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// An identity asserted by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SocialIdentity {
    #[serde(skip)]
    pub provider: &'static str,
    /// The provider's stable subject identifier.
    #[serde(rename = "sub")]
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Whether the provider has confirmed that `email` belongs to this identity.
    #[serde(default)]
    pub email_verified: bool,
}

/// Google's OAuth 2.0 web flow.
pub struct GoogleProvider {
    client_id: String,
    #[cfg_attr(test, allow(dead_code))]
    client_secret: String,
    #[cfg_attr(test, allow(dead_code))]
    http: reqwest::Client,
}

impl GoogleProvider {
    pub const NAME: &'static str = "google";

    pub fn new(client_id: String, client_secret: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client_id,
            client_secret,
            http,
        })
    }

    /// Where to send the visitor to approve the sign-in.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<Url> {
        Url::parse_with_params(
            AUTHORIZATION_ENDPOINT,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("access_type", "online"),
                ("state", state),
            ],
        )
        .map_err(Error::internal)
    }

    /// Exchange an authorisation code for the identity behind it.
    #[cfg(not(test))]
    pub async fn fetch_identity(&self, code: &str, redirect_uri: &str) -> Result<SocialIdentity> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let token: TokenResponse = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut identity: SocialIdentity = self
            .http
            .get(USERINFO_ENDPOINT)
            .bearer_auth(token.access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        identity.provider = Self::NAME;
        Ok(identity)
    }

    /// In test mode the code is `<uid>:<email>`, or `<uid>:<email>:unverified`,
    /// and no request is made.
    #[cfg(test)]
    pub async fn fetch_identity(&self, code: &str, _redirect_uri: &str) -> Result<SocialIdentity> {
        let mut parts = code.splitn(3, ':');
        let (Some(uid), Some(email)) = (parts.next(), parts.next()) else {
            return Err(Error::bad_request("Malformed test authorisation code"));
        };
        Ok(SocialIdentity {
            provider: Self::NAME,
            uid: uid.to_string(),
            email: Some(email.to_string()).filter(|e| !e.is_empty()),
            email_verified: parts.next() != Some("unverified"),
        })
    }
}

/// How an external identity was matched to a local account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The identity was linked before.
    Returning(User),
    /// The identity was just linked to the account sharing its email.
    LinkedByEmail(User),
    /// A new account was created for the identity.
    SignedUp(User),
    /// The account sharing the identity's email is not active, so nothing
    /// was linked.
    Inactive(User),
}

impl Resolution {
    pub fn into_user(self) -> User {
        match self {
            Self::Returning(user)
            | Self::LinkedByEmail(user)
            | Self::SignedUp(user)
            | Self::Inactive(user) => user,
        }
    }
}

/// Find or create the local account for an external identity.
///
/// Fails with 400 if the identity is new and has no verified email, since
/// every account needs one and linking by an unverified one would hand over
/// someone else's account.
pub async fn resolve_identity(
    users: &Coll<User>,
    accounts: &Coll<SocialAccount>,
    counters: &Coll<Counter>,
    identity: &SocialIdentity,
) -> Result<Resolution> {
    if let Some(account) = SocialAccount::find(accounts, identity.provider, &identity.uid).await? {
        let user = User::get(users, account.user_id).await?.ok_or_else(|| {
            Error::internal(format!(
                "{} account {} is linked to missing user {}",
                account.provider, account.uid, account.user_id
            ))
        })?;
        return Ok(Resolution::Returning(user));
    }

    let email = identity
        .email
        .as_deref()
        .filter(|e| !e.is_empty())
        .ok_or_else(|| Error::bad_request("An email address is required to sign up"))?;
    if !identity.email_verified {
        return Err(Error::bad_request(format!("Unverified email address {email}")));
    }

    if let Some(user) = User::find_by_email(users, email).await? {
        if !user.is_active {
            return Ok(Resolution::Inactive(user));
        }
        SocialAccount::connect(accounts, identity.provider, &identity.uid, user.id).await?;
        return Ok(Resolution::LinkedByEmail(user));
    }

    let user = sign_up(users, counters, email).await?;
    SocialAccount::connect(accounts, identity.provider, &identity.uid, user.id).await?;
    Ok(Resolution::SignedUp(user))
}

/// Give up finding a free username after this many candidates.
const MAX_USERNAME_ATTEMPTS: u32 = 1000;

async fn sign_up(users: &Coll<User>, counters: &Coll<Counter>, email: &str) -> Result<User> {
    let base = username_base(email);
    for attempt in 0..MAX_USERNAME_ATTEMPTS {
        let candidate = username_candidate(&base, attempt);
        if User::find_by_username(users, &candidate).await?.is_some() {
            continue;
        }
        let new = NewUser {
            username: candidate,
            email: email.to_string(),
            password: None,
            is_active: true,
            is_staff: false,
        };
        match User::create(users, counters, new).await {
            Ok(user) => return Ok(user),
            // Someone else took the name in the meantime.
            Err(Error::Db(e)) if is_duplicate_key_error(&e) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(Error::internal(format!("No free username for {email}")))
}

/// A username derived from the local part of an email address.
fn username_base(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let base: String = local
        .chars()
        .filter(|c| c.is_alphanumeric() || "_.+-".contains(*c))
        .take(USERNAME_MAX - 4)
        .collect();
    if base.is_empty() {
        "user".to_string()
    } else {
        base
    }
}

fn username_candidate(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        base.to_string()
    } else {
        format!("{base}{attempt}")
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn identity(uid: &str, email: Option<&str>) -> SocialIdentity {
        SocialIdentity {
            provider: GoogleProvider::NAME,
            uid: uid.to_string(),
            email: email.map(str::to_string),
            email_verified: true,
        }
    }

    #[test]
    fn usernames_from_email() {
        assert_eq!(username_base("Jane.Doe+polls@example.com"), "Jane.Doe+polls");
        assert_eq!(username_base("spaced out@example.com"), "spacedout");
        assert_eq!(username_base("!!!@example.com"), "user");
        assert_eq!(username_candidate("jane", 0), "jane");
        assert_eq!(username_candidate("jane", 2), "jane2");
        assert!(username_base(&format!("{}@example.com", "a".repeat(300))).len() < USERNAME_MAX);
    }

    #[test]
    fn authorization_url_carries_state() {
        let provider = GoogleProvider::new("client".to_string(), "secret".to_string()).unwrap();
        let url = provider
            .authorization_url("http://127.0.0.1:8000/polls/accounts/google/login/callback/", "xyz")
            .unwrap();
        assert_eq!(url.host_str(), Some("accounts.google.com"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("state".to_string(), "xyz".to_string())));
        assert!(pairs.contains(&("client_id".to_string(), "client".to_string())));
        assert!(!url.as_str().contains("secret"));
    }

    #[backend_test]
    async fn email_match_links_existing_account(
        users: Coll<User>,
        accounts: Coll<SocialAccount>,
        counters: Coll<Counter>,
    ) {
        let member = User::example_member();
        users.insert_one(&member, None).await.unwrap();

        let shouting = identity("g-1", Some("MEMBER@EXAMPLE.COM"));
        let resolution = resolve_identity(&users, &accounts, &counters, &shouting)
            .await
            .unwrap();
        let Resolution::LinkedByEmail(linked) = resolution else {
            panic!("expected a link by email, got {resolution:?}");
        };
        assert_eq!(linked.id, member.id);
        assert_eq!(users.count_documents(None, None).await.unwrap(), 1);

        // The second time round the link is already there.
        let resolution = resolve_identity(&users, &accounts, &counters, &shouting)
            .await
            .unwrap();
        assert!(matches!(resolution, Resolution::Returning(_)));
        assert_eq!(resolution.into_user().id, member.id);
        assert_eq!(accounts.count_documents(None, None).await.unwrap(), 1);
    }

    #[backend_test]
    async fn unknown_email_signs_up(
        users: Coll<User>,
        accounts: Coll<SocialAccount>,
        counters: Coll<Counter>,
    ) {
        // Take the obvious username so a suffix is needed.
        users
            .insert_one(User::example_member(), None)
            .await
            .unwrap();

        let newcomer = identity("g-2", Some("member@elsewhere.org"));
        let resolution = resolve_identity(&users, &accounts, &counters, &newcomer)
            .await
            .unwrap();
        let Resolution::SignedUp(user) = resolution else {
            panic!("expected a new account, got {resolution:?}");
        };
        assert_eq!(user.username, "member1");
        assert_eq!(user.email, "member@elsewhere.org");
        assert!(user.is_active);
        assert!(user.password_hash.is_none());
        assert!(user.date_joined <= Utc::now());

        let link = SocialAccount::find(&accounts, GoogleProvider::NAME, "g-2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(link.user_id, user.id);
    }

    #[backend_test]
    async fn no_email_no_account(
        users: Coll<User>,
        accounts: Coll<SocialAccount>,
        counters: Coll<Counter>,
    ) {
        let anonymous = identity("g-3", None);
        assert!(resolve_identity(&users, &accounts, &counters, &anonymous)
            .await
            .is_err());
        assert_eq!(users.count_documents(None, None).await.unwrap(), 0);
        assert_eq!(accounts.count_documents(None, None).await.unwrap(), 0);
    }

    #[backend_test]
    async fn inactive_account_is_not_linked(
        users: Coll<User>,
        accounts: Coll<SocialAccount>,
        counters: Coll<Counter>,
    ) {
        let dormant = User::example_inactive();
        users.insert_one(&dormant, None).await.unwrap();

        let resolution = resolve_identity(
            &users,
            &accounts,
            &counters,
            &identity("g-4", Some("dormant@example.com")),
        )
        .await
        .unwrap();
        let Resolution::Inactive(user) = resolution else {
            panic!("expected the inactive account, got {resolution:?}");
        };
        assert_eq!(user.id, dormant.id);
        assert_eq!(accounts.count_documents(None, None).await.unwrap(), 0);
        assert_eq!(users.count_documents(None, None).await.unwrap(), 1);
    }

    #[backend_test]
    async fn unverified_email_never_links(
        users: Coll<User>,
        accounts: Coll<SocialAccount>,
        counters: Coll<Counter>,
    ) {
        users
            .insert_one(User::example_member(), None)
            .await
            .unwrap();

        let unverified = SocialIdentity {
            email_verified: false,
            ..identity("g-5", Some("member@example.com"))
        };
        assert!(resolve_identity(&users, &accounts, &counters, &unverified)
            .await
            .is_err());
        assert_eq!(accounts.count_documents(None, None).await.unwrap(), 0);
        assert_eq!(users.count_documents(None, None).await.unwrap(), 1);
    }
}
