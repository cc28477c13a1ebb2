use chrono::{DateTime, Utc};
use mongodb::{
    bson::{
        doc, serde_helpers::chrono_datetime_as_bson_datetime, DateTime as BsonDateTime, Document,
    },
    options::FindOptions,
};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    db::choice::Choice,
    mongodb::{u32_id_filter, Coll, Counter, QUESTION_COUNTER},
};

/// Our question IDs are integers.
pub type QuestionId = u32;

/// A single votable prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: QuestionId,
    pub question_text: String,
    /// The question is hidden from the public until this moment.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub pub_date: DateTime<Utc>,
}

impl Question {
    /// Has this question been published as of `now`?
    pub fn is_published(&self, now: DateTime<Utc>) -> bool {
        self.pub_date <= now
    }

    /// Filter matching questions published as of `now`.
    pub fn published_filter(now: DateTime<Utc>) -> Document {
        doc! { "pub_date": { "$lte": BsonDateTime::from_chrono(now) } }
    }

    /// Create and insert a question together with its choices.
    pub async fn create(
        questions: &Coll<Question>,
        choices: &Coll<Choice>,
        counters: &Coll<Counter>,
        question_text: String,
        pub_date: DateTime<Utc>,
        choice_texts: Vec<String>,
    ) -> Result<Question> {
        let question = Question {
            id: Counter::next(counters, QUESTION_COUNTER).await?,
            question_text,
            pub_date,
        };
        questions.insert_one(&question, None).await?;

        for text in choice_texts {
            Choice::create(choices, counters, question.id, text).await?;
        }

        info!("Created question {}", question.id);
        Ok(question)
    }

    /// Get any question by ID, published or not.
    pub async fn get(questions: &Coll<Question>, id: QuestionId) -> Result<Question> {
        questions
            .find_one(u32_id_filter(id), None)
            .await?
            .ok_or_else(|| Error::not_found(format!("Question with ID '{id}'")))
    }

    /// Get a question by ID only if it is published as of `now`.
    pub async fn get_published(
        questions: &Coll<Question>,
        id: QuestionId,
        now: DateTime<Utc>,
    ) -> Result<Question> {
        let mut filter = Self::published_filter(now);
        filter.insert("_id", id);
        questions
            .find_one(filter, None)
            .await?
            .ok_or_else(|| Error::not_found(format!("Published question with ID '{id}'")))
    }

    /// The `limit` most recently published questions, newest first.
    /// Questions scheduled for the future are excluded.
    pub async fn latest(
        questions: &Coll<Question>,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Question>> {
        let options = FindOptions::builder()
            .sort(doc! { "pub_date": -1, "_id": -1 })
            .limit(limit)
            .build();
        let latest = questions
            .find(Self::published_filter(now), options)
            .await?
            .try_collect()
            .await?;
        Ok(latest)
    }

    /// Replace the text and stamp the question as published at `now`.
    pub async fn edit(
        questions: &Coll<Question>,
        id: QuestionId,
        question_text: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let update = doc! {
            "$set": {
                "question_text": question_text,
                "pub_date": BsonDateTime::from_chrono(now),
            }
        };
        let result = questions.update_one(u32_id_filter(id), update, None).await?;
        if result.matched_count == 0 {
            return Err(Error::not_found(format!("Question with ID '{id}'")));
        }
        info!("Edited question {id}");
        Ok(())
    }
}

/// Example data for tests.
#[cfg(test)]
pub(crate) mod examples {
    use chrono::Duration;

    use super::*;

    impl Question {
        /// A question published a day ago.
        pub fn example_published(id: QuestionId) -> Self {
            Self {
                id,
                question_text: format!("What's new {id}?"),
                pub_date: Utc::now() - Duration::days(1),
            }
        }

        /// A question scheduled for a month from now.
        pub fn example_future(id: QuestionId) -> Self {
            Self {
                id,
                question_text: format!("What's coming {id}?"),
                pub_date: Utc::now() + Duration::days(30),
            }
        }
    }
}
