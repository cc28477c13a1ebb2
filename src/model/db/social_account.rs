use chrono::{DateTime, Utc};
use mongodb::bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    db::user::UserId,
    mongodb::{Coll, Id},
};

/// A link between a local user and an identity at an external provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialAccount {
    #[serde(rename = "_id")]
    pub id: Id,
    /// Provider name, e.g. `google`.
    pub provider: String,
    /// The provider's stable identifier for the account.
    pub uid: String,
    pub user_id: UserId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub date_joined: DateTime<Utc>,
}

impl SocialAccount {
    /// Find the link for the given external identity.
    pub async fn find(
        accounts: &Coll<SocialAccount>,
        provider: &str,
        uid: &str,
    ) -> Result<Option<SocialAccount>> {
        let filter = doc! {
            "provider": provider,
            "uid": uid,
        };
        Ok(accounts.find_one(filter, None).await?)
    }

    /// Link an external identity to a user.
    pub async fn connect(
        accounts: &Coll<SocialAccount>,
        provider: &str,
        uid: &str,
        user_id: UserId,
    ) -> Result<SocialAccount> {
        let account = SocialAccount {
            id: Id::new(),
            provider: provider.to_string(),
            uid: uid.to_string(),
            user_id,
            date_joined: Utc::now(),
        };
        accounts.insert_one(&account, None).await?;
        info!("Linked {provider} account {uid} to user {user_id}");
        Ok(account)
    }
}
