use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime, DateTime as BsonDateTime},
    options::FindOneOptions,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::{
    case_insensitive, is_duplicate_key_error, optional_datetime, u32_id_filter, Coll, Counter,
    USER_COUNTER,
};

/// Our user IDs are integers.
pub type UserId = u32;

/// A site account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub username: String,
    /// May be empty for accounts created with the management tool.
    pub email: String,
    /// Argon2 encoded hash. `None` means the account cannot sign in with a
    /// password, e.g. it was created by social sign-in.
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub is_staff: bool,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub date_joined: DateTime<Utc>,
    #[serde(default, with = "optional_datetime")]
    pub last_login: Option<DateTime<Utc>>,
}

/// The data needed to create a [`User`]; the ID and timestamps are filled in on insert.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    /// Plaintext; hashed before it goes anywhere near the database.
    pub password: Option<String>,
    pub is_active: bool,
    pub is_staff: bool,
}

impl User {
    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        match self.password_hash {
            Some(ref hash) => argon2::verify_encoded(hash, password.as_ref()).unwrap_or(false),
            None => false,
        }
    }

    /// Hash a plaintext password for storage.
    pub fn hash_password(password: &str) -> Result<String> {
        // 16 bytes is recommended for password hashing:
        //  https://en.wikipedia.org/wiki/Argon2
        let mut salt = [0_u8; 16];
        rand::thread_rng().fill(&mut salt);
        let hash = argon2::hash_encoded(password.as_bytes(), &salt, &argon2::Config::default())?;
        Ok(hash)
    }

    /// Create and insert a user.
    ///
    /// A unique index guards the username; callers check availability first
    /// so they can report it nicely, but a racing duplicate still fails here.
    pub async fn create(
        users: &Coll<User>,
        counters: &Coll<Counter>,
        new: NewUser,
    ) -> Result<User> {
        let password_hash = new.password.as_deref().map(Self::hash_password).transpose()?;
        let user = User {
            id: Counter::next(counters, USER_COUNTER).await?,
            username: new.username,
            email: new.email,
            password_hash,
            is_active: new.is_active,
            is_staff: new.is_staff,
            date_joined: Utc::now(),
            last_login: None,
        };
        users.insert_one(&user, None).await?;
        info!(
            "Created {} user {} ({})",
            if user.is_active { "active" } else { "inactive" },
            user.id,
            user.username
        );
        Ok(user)
    }

    /// Create and insert a user unless the username is already taken, ignoring
    /// case. Returns `None` if it was.
    pub async fn create_if_available(
        users: &Coll<User>,
        counters: &Coll<Counter>,
        new: NewUser,
    ) -> Result<Option<User>> {
        if Self::find_by_username(users, &new.username).await?.is_some() {
            return Ok(None);
        }
        match Self::create(users, counters, new).await {
            Ok(user) => Ok(Some(user)),
            // Lost a race for the same name.
            Err(Error::Db(e)) if is_duplicate_key_error(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Get a user by ID.
    pub async fn get(users: &Coll<User>, id: UserId) -> Result<Option<User>> {
        Ok(users.find_one(u32_id_filter(id), None).await?)
    }

    /// Find a user by username, ignoring case.
    pub async fn find_by_username(users: &Coll<User>, username: &str) -> Result<Option<User>> {
        let options = FindOneOptions::builder()
            .collation(case_insensitive())
            .build();
        Ok(users.find_one(doc! { "username": username }, options).await?)
    }

    /// Find the oldest user with the given email, ignoring case.
    /// Empty emails never match.
    pub async fn find_by_email(users: &Coll<User>, email: &str) -> Result<Option<User>> {
        if email.is_empty() {
            return Ok(None);
        }
        let options = FindOneOptions::builder()
            .collation(case_insensitive())
            .sort(doc! { "_id": 1 })
            .build();
        Ok(users.find_one(doc! { "email": email }, options).await?)
    }

    /// Resolve a sign-in identifier, which is either a username or, if it
    /// looks like one, an email address.
    pub async fn find_by_login(users: &Coll<User>, identifier: &str) -> Result<Option<User>> {
        if identifier.contains('@') {
            if let Some(user) = Self::find_by_email(users, identifier).await? {
                return Ok(Some(user));
            }
        }
        Self::find_by_username(users, identifier).await
    }

    /// Mark the account active.
    pub async fn activate(users: &Coll<User>, id: UserId) -> Result<()> {
        let update = doc! { "$set": { "is_active": true } };
        let result = users.update_one(u32_id_filter(id), update, None).await?;
        if result.matched_count == 0 {
            return Err(Error::not_found(format!("User with ID '{id}'")));
        }
        info!("Activated user {id}");
        Ok(())
    }

    /// Stamp a successful sign-in.
    pub async fn record_login(users: &Coll<User>, id: UserId, now: DateTime<Utc>) -> Result<()> {
        let update = doc! { "$set": { "last_login": BsonDateTime::from_chrono(now) } };
        users.update_one(u32_id_filter(id), update, None).await?;
        Ok(())
    }
}

/// Password of [`User::example_staff`].
#[cfg(test)]
pub const EXAMPLE_STAFF_PASSWORD: &str = "correcthorsebattery";
/// Password of [`User::example_member`].
#[cfg(test)]
pub const EXAMPLE_MEMBER_PASSWORD: &str = "membersonlypass";

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl User {
        fn example(id: UserId, username: &str, password: &str) -> Self {
            Self {
                id,
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password_hash: Some(User::hash_password(password).unwrap()),
                is_active: true,
                is_staff: false,
                date_joined: Utc::now(),
                last_login: None,
            }
        }

        pub fn example_staff() -> Self {
            Self {
                is_staff: true,
                ..Self::example(9001, "editor", EXAMPLE_STAFF_PASSWORD)
            }
        }

        pub fn example_member() -> Self {
            Self::example(9002, "member", EXAMPLE_MEMBER_PASSWORD)
        }

        pub fn example_inactive() -> Self {
            Self {
                is_active: false,
                ..Self::example(9003, "dormant", EXAMPLE_MEMBER_PASSWORD)
            }
        }
    }

    impl NewUser {
        pub fn example() -> Self {
            Self {
                username: "newcomer".to_string(),
                email: "Newcomer@Example.com".to_string(),
                password: Some("a fine passphrase".to_string()),
                is_active: false,
                is_staff: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_verification() {
        let user = User::example_member();
        assert!(user.verify_password(EXAMPLE_MEMBER_PASSWORD));
        assert!(!user.verify_password("not the password"));

        let passwordless = User {
            password_hash: None,
            ..user
        };
        assert!(!passwordless.verify_password(""));
    }

    #[backend_test]
    async fn create_and_find(users: Coll<User>, counters: Coll<Counter>) {
        let user = User::create(&users, &counters, NewUser::example())
            .await
            .unwrap();
        assert!(!user.is_active);
        assert!(user.verify_password("a fine passphrase"));

        let by_name = User::find_by_username(&users, "NEWCOMER").await.unwrap();
        assert_eq!(by_name.map(|u| u.id), Some(user.id));

        let by_email = User::find_by_email(&users, "newcomer@example.COM")
            .await
            .unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(user.id));

        let by_login = User::find_by_login(&users, "NEWCOMER@example.com")
            .await
            .unwrap();
        assert_eq!(by_login.map(|u| u.id), Some(user.id));

        assert!(User::find_by_email(&users, "").await.unwrap().is_none());
    }

    #[backend_test]
    async fn duplicate_username_rejected(users: Coll<User>, counters: Coll<Counter>) {
        User::create(&users, &counters, NewUser::example())
            .await
            .unwrap();
        let clash = NewUser {
            username: "NewComer".to_string(),
            email: "other@example.com".to_string(),
            ..NewUser::example()
        };
        match User::create(&users, &counters, clash).await {
            Err(Error::Db(e)) => assert!(is_duplicate_key_error(&e)),
            other => panic!("expected duplicate key error, got {other:?}"),
        }
    }

    #[backend_test]
    async fn create_if_available_skips_taken_names(users: Coll<User>, counters: Coll<Counter>) {
        let staff = NewUser {
            username: "admin".to_string(),
            email: "admin@example.com".to_string(),
            password: Some("a fine passphrase".to_string()),
            is_active: true,
            is_staff: true,
        };
        let created = User::create_if_available(&users, &counters, staff.clone())
            .await
            .unwrap()
            .expect("name was free");
        assert!(created.is_active && created.is_staff);
        assert!(created.verify_password("a fine passphrase"));

        let clash = NewUser {
            username: "ADMIN".to_string(),
            ..staff
        };
        assert!(User::create_if_available(&users, &counters, clash)
            .await
            .unwrap()
            .is_none());
        assert_eq!(users.count_documents(None, None).await.unwrap(), 1);
    }

    #[backend_test]
    async fn activate_and_record_login(users: Coll<User>) {
        let user = User::example_inactive();
        users.insert_one(&user, None).await.unwrap();

        User::activate(&users, user.id).await.unwrap();
        let now = Utc::now();
        User::record_login(&users, user.id, now).await.unwrap();

        let stored = User::get(&users, user.id).await.unwrap().unwrap();
        assert!(stored.is_active);
        // Stored to the millisecond.
        let recorded = stored.last_login.unwrap();
        assert!((recorded - now).num_milliseconds().abs() <= 1);

        assert!(User::activate(&users, 12345).await.is_err());
    }
}
