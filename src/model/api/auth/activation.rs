//! Account activation links.
//!
//! A link carries the user's ID and a token of the form
//! `<timestamp in base 36>-<hex HMAC-SHA256>`. The MAC covers the account
//! state that activating changes, so each token works at most once.

use chrono::{DateTime, Duration, Utc};
use data_encoding::{BASE64URL_NOPAD, HEXLOWER};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::Config;
use crate::model::db::{User, UserId};

type HmacSha256 = Hmac<Sha256>;

/// Encode a user ID for use in a URL path segment.
pub fn encode_uid(id: UserId) -> String {
    BASE64URL_NOPAD.encode(id.to_string().as_bytes())
}

/// Decode a user ID from a URL path segment.
pub fn decode_uid(uidb64: &str) -> Option<UserId> {
    let bytes = BASE64URL_NOPAD.decode(uidb64.as_bytes()).ok()?;
    String::from_utf8(bytes).ok()?.parse().ok()
}

/// Issues and checks activation tokens.
pub struct ActivationTokens<'a> {
    secret: &'a [u8],
    ttl: Duration,
}

impl<'a> ActivationTokens<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            secret: config.hmac_secret(),
            ttl: config.activation_ttl(),
        }
    }

    /// A fresh token for the user's current state.
    pub fn make_token(&self, user: &User) -> String {
        self.make_token_at(user, Utc::now().timestamp())
    }

    /// Is this token valid for the user as they are now?
    pub fn check_token(&self, user: &User, token: &str) -> bool {
        self.check_token_at(user, token, Utc::now())
    }

    fn make_token_at(&self, user: &User, timestamp: i64) -> String {
        let mac = self.mac(user, timestamp).finalize().into_bytes();
        format!("{}-{}", to_base36(timestamp), HEXLOWER.encode(&mac))
    }

    fn check_token_at(&self, user: &User, token: &str, now: DateTime<Utc>) -> bool {
        let Some((ts, hex)) = token.split_once('-') else {
            return false;
        };
        let Some(timestamp) = from_base36(ts) else {
            return false;
        };
        let Ok(tag) = HEXLOWER.decode(hex.as_bytes()) else {
            return false;
        };

        if self.mac(user, timestamp).verify_slice(&tag).is_err() {
            return false;
        }

        let age = now.timestamp() - timestamp;
        (0..=self.ttl.num_seconds()).contains(&age)
    }

    #[allow(clippy::missing_panics_doc)]
    fn mac(&self, user: &User, timestamp: i64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(self.secret).expect("HMAC accepts keys of any length");
        let id = user.id.to_string();
        let last_login = user
            .last_login
            .map(|at| at.timestamp_millis().to_string())
            .unwrap_or_default();
        let timestamp = timestamp.to_string();
        for field in [
            id.as_str(),
            user.password_hash.as_deref().unwrap_or(""),
            if user.is_active { "1" } else { "0" },
            last_login.as_str(),
            timestamp.as_str(),
        ] {
            // Length-prefixed so that field boundaries are unambiguous.
            mac.update(&(field.len() as u64).to_be_bytes());
            mac.update(field.as_bytes());
        }
        mac
    }
}

fn to_base36(mut n: i64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n <= 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn from_base36(s: &str) -> Option<i64> {
    if s.is_empty() || s.len() > 13 {
        return None;
    }
    i64::from_str_radix(s, 36).ok().filter(|n| *n >= 0)
}
