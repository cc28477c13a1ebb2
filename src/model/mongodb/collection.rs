use std::ops::Deref;

use mongodb::{
    bson::doc,
    error::Error as DbError,
    options::{Collation, CollationStrength, IndexOptions},
    Collection, Database, IndexModel,
};
use rocket::{
    request::{self, FromRequest, Request},
    State,
};

use crate::model::db::{Choice, Question, SocialAccount, User};

use super::counter::Counter;

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a collection.
    ///
    /// Panics iff the [`Database`] is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let db = req.guard::<&State<Database>>().await.unwrap();
        request::Outcome::Success(Coll::from_db(db))
    }
}

impl MongoCollection for Question {
    const NAME: &'static str = "questions";
}

impl MongoCollection for Choice {
    const NAME: &'static str = "choices";
}

impl MongoCollection for User {
    const NAME: &'static str = "users";
}

impl MongoCollection for SocialAccount {
    const NAME: &'static str = "social_accounts";
}

impl MongoCollection for Counter {
    const NAME: &'static str = "counters";
}

/// Collation that compares strings ignoring case, as used for username and
/// email lookups.
pub fn case_insensitive() -> Collation {
    Collation::builder()
        .locale("en")
        .strength(CollationStrength::Secondary)
        .build()
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Question collection: the index page sorts by publication date.
    let pub_date_index = IndexModel::builder().keys(doc! {"pub_date": -1}).build();
    Coll::<Question>::from_db(db)
        .create_index(pub_date_index, None)
        .await?;

    // Choice collection: choices are always fetched per question.
    let choice_index = IndexModel::builder()
        .keys(doc! {"question_id": 1, "_id": 1})
        .build();
    Coll::<Choice>::from_db(db)
        .create_index(choice_index, None)
        .await?;

    // User collection. Usernames are unique ignoring case; emails are
    // checked at the form level since CLI-created users may have none.
    let username_index = IndexModel::builder()
        .keys(doc! {"username": 1})
        .options(
            IndexOptions::builder()
                .unique(true)
                .collation(case_insensitive())
                .build(),
        )
        .build();
    let email_index = IndexModel::builder()
        .keys(doc! {"email": 1})
        .options(IndexOptions::builder().collation(case_insensitive()).build())
        .build();
    let users = Coll::<User>::from_db(db);
    users.create_index(username_index, None).await?;
    users.create_index(email_index, None).await?;

    // Social account collection: an external identity links at most once.
    let social_index = IndexModel::builder()
        .keys(doc! {"provider": 1, "uid": 1})
        .options(unique)
        .build();
    Coll::<SocialAccount>::from_db(db)
        .create_index(social_index, None)
        .await?;

    Ok(())
}
