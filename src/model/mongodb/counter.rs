use mongodb::{
    bson::doc,
    error::Error as DbError,
    options::{FindOneAndUpdateOptions, ReturnDocument, UpdateOptions},
    Database,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::Coll;

/// Counter backing question IDs.
pub const QUESTION_COUNTER: &str = "questions";
/// Counter backing choice IDs.
pub const CHOICE_COUNTER: &str = "choices";
/// Counter backing user IDs.
pub const USER_COUNTER: &str = "users";

const ALL_COUNTERS: [&str; 3] = [QUESTION_COUNTER, CHOICE_COUNTER, USER_COUNTER];

/// A counter object used to implement auto-increment fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub name: String,
    pub next: u32,
}

impl Counter {
    /// Atomically retrieve the next value of the named counter.
    pub async fn next(counters: &Coll<Counter>, name: &str) -> Result<u32> {
        let update = doc! {
            "$inc": { "next": 1 }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        let counter = counters
            .find_one_and_update(doc! { "_id": name }, update, options)
            .await?
            .ok_or_else(|| Error::internal(format!("Failed to find counter {name}")))?;
        Ok(counter.next)
    }
}

/// Ensure every auto-increment counter exists, starting at 1.
///
/// This operation is idempotent, and never resets an existing counter.
pub async fn ensure_counters_exist(db: &Database) -> std::result::Result<(), DbError> {
    debug!("Ensuring ID counters exist");

    let counters = Coll::<Counter>::from_db(db);
    let upsert = UpdateOptions::builder().upsert(true).build();
    for name in ALL_COUNTERS {
        counters
            .update_one(
                doc! { "_id": name },
                doc! { "$setOnInsert": { "next": 1 } },
                upsert.clone(),
            )
            .await?;
    }
    Ok(())
}
