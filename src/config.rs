use chrono::Duration;
use mongodb::{error::Error as DbError, Client as MongoClient, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::mail::Mailer;
use crate::model::mongodb::{ensure_counters_exist, ensure_indexes_exist};
use crate::model::social::GoogleProvider;

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    site_url: String,
    auth_ttl: u32,
    activation_ttl: u32,
    // secrets
    jwt_secret: String,
    hmac_secret: String,
}

impl Config {
    /// Absolute base URL of the site, without a trailing slash.
    /// Used to build links that leave the site, e.g. in emails.
    pub fn site_url(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }

    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// How long an account activation link stays valid.
    pub fn activation_ttl(&self) -> Duration {
        Duration::seconds(self.activation_ttl.into())
    }

    /// Secret key used to encrypt JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Secret key used to sign activation tokens.
    pub fn hmac_secret(&self) -> &[u8] {
        self.hmac_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // secrets
    db_uri: String,
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places both a `Client` and a `Database`
/// into managed state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(DATABASE);

        if let Err(e) = prepare_database(&db).await {
            error!("Failed to prepare database: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// Name of the production database.
pub const DATABASE: &str = "polls";

/// Ensure the indexes and auto-increment counters exist.
///
/// This operation is idempotent.
pub async fn prepare_database(db: &Database) -> Result<(), DbError> {
    ensure_indexes_exist(db).await?;
    ensure_counters_exist(db).await?;
    Ok(())
}

/// Configuration for outgoing mail.
#[derive(Deserialize)]
struct MailConfig {
    mail_from: String,
}

/// A fairing that places a [`Mailer`] into managed state.
pub struct MailFairing;

#[rocket::async_trait]
impl Fairing for MailFairing {
    fn info(&self) -> Info {
        Info {
            name: "Mail",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let config = match rocket.figment().extract::<MailConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load mail config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Mail goes to the console backend, from {}", config.mail_from);

        rocket = rocket.manage(Mailer::console(config.mail_from));
        Ok(rocket)
    }
}

/// Configuration for Google sign-in. Both halves must be present to enable it.
#[derive(Deserialize)]
struct SocialConfig {
    // non-secrets
    google_client_id: Option<String>,
    // secrets
    google_client_secret: Option<String>,
}

/// A fairing that places a [`GoogleProvider`] into managed state when the
/// credentials are configured. Without one, the social sign-in routes 404.
pub struct SocialFairing;

#[rocket::async_trait]
impl Fairing for SocialFairing {
    fn info(&self) -> Info {
        Info {
            name: "Social sign-in",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        if !cfg!(feature = "social") {
            return Ok(rocket);
        }

        let config = match rocket.figment().extract::<SocialConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load social sign-in config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        match (config.google_client_id, config.google_client_secret) {
            (Some(id), Some(secret)) => {
                let provider = match GoogleProvider::new(id, secret) {
                    Ok(provider) => provider,
                    Err(e) => {
                        error!("Failed to build Google client: {e}");
                        return Err(rocket);
                    }
                };
                info!("Google sign-in enabled");
                rocket = rocket.manage(provider);
            }
            (None, None) => info!("Google sign-in not configured"),
            _ => {
                error!("Google sign-in needs both `google_client_id` and `google_client_secret`");
                return Err(rocket);
            }
        }
        Ok(rocket)
    }
}
