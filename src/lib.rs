#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use mongodb::Client as MongoClient;
use rocket::{Build, Rocket};

use crate::config::{ConfigFairing, DatabaseFairing, MailFairing, SocialFairing};
use crate::logging::LoggerFairing;

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod mail;
pub mod model;

pub use config::Config;

/// Assemble the server: configuration, database, mail, social sign-in,
/// request logging and all routes.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(ConfigFairing)
        .attach(DatabaseFairing)
        .attach(MailFairing)
        .attach(SocialFairing)
        .attach(LoggerFairing)
        .mount("/", api::routes())
        .register("/", api::catchers())
}

/// Assemble the server around an already-connected database.
///
/// Panics if the database cannot be prepared, since this is only used by
/// tests and tooling.
pub async fn rocket_for_db(db_client: MongoClient, db_name: &str) -> Rocket<Build> {
    let db = db_client.database(db_name);
    config::prepare_database(&db)
        .await
        .expect("Failed to prepare database");

    rocket::build()
        .attach(ConfigFairing)
        .attach(MailFairing)
        .attach(SocialFairing)
        .attach(LoggerFairing)
        .manage(db_client)
        .manage(db)
        .mount("/", api::routes())
        .register("/", api::catchers())
}

/// Connect to the database named by `db_uri` in the active figment.
#[cfg(test)]
async fn db_client() -> MongoClient {
    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .expect("`db_uri` not set");
    MongoClient::with_uri_str(&db_uri)
        .await
        .expect("Could not connect to test database")
}

/// A fresh database name for a single test.
#[cfg(test)]
fn database() -> String {
    let random: u32 = rand::random();
    format!("test{random}")
}

/// Route this crate's log output to the test harness, once per process.
#[cfg(test)]
fn init_test_logging() {
    log4rs_test_utils::test_logging::init_logging_once_for(
        vec!["polls_backend", "mail"],
        None,
        None,
    );
}
