use mongodb::{bson::doc, options::FindOptions};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    db::question::{Question, QuestionId},
    mongodb::{Coll, Counter, CHOICE_COUNTER},
};

/// Our choice IDs are integers.
pub type ChoiceId = u32;

/// One selectable option under a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(rename = "_id")]
    pub id: ChoiceId,
    pub question_id: QuestionId,
    pub choice_text: String,
    pub votes: u32,
}

impl Choice {
    /// Create and insert a choice with no votes.
    pub async fn create(
        choices: &Coll<Choice>,
        counters: &Coll<Counter>,
        question_id: QuestionId,
        choice_text: String,
    ) -> Result<Choice> {
        let choice = Choice {
            id: Counter::next(counters, CHOICE_COUNTER).await?,
            question_id,
            choice_text,
            votes: 0,
        };
        choices.insert_one(&choice, None).await?;
        Ok(choice)
    }

    /// Add a choice to an existing question, returning both.
    ///
    /// Fails with 404 if there is no such question, published or not.
    pub async fn add_to_question(
        questions: &Coll<Question>,
        choices: &Coll<Choice>,
        counters: &Coll<Counter>,
        question_id: QuestionId,
        choice_text: String,
    ) -> Result<(Question, Choice)> {
        let question = Question::get(questions, question_id).await?;
        let choice = Self::create(choices, counters, question.id, choice_text).await?;
        info!("Added choice {} to question {}", choice.id, question.id);
        Ok((question, choice))
    }

    /// All choices for the given question, in creation order.
    pub async fn for_question(
        choices: &Coll<Choice>,
        question_id: QuestionId,
    ) -> Result<Vec<Choice>> {
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let found = choices
            .find(doc! { "question_id": question_id }, options)
            .await?
            .try_collect()
            .await?;
        Ok(found)
    }

    /// Count one vote for the choice, provided it belongs to the question.
    ///
    /// The increment is evaluated by the database, so concurrent votes never
    /// overwrite each other. Returns false if nothing matched.
    pub async fn add_vote(
        choices: &Coll<Choice>,
        question_id: QuestionId,
        choice_id: ChoiceId,
    ) -> Result<bool> {
        let filter = doc! {
            "_id": choice_id,
            "question_id": question_id,
        };
        let update = doc! {
            "$inc": { "votes": 1 }
        };
        let result = choices.update_one(filter, update, None).await?;
        Ok(result.matched_count == 1)
    }
}

#[cfg(test)]
pub(crate) mod examples {
    use super::*;

    impl Choice {
        pub fn example(id: ChoiceId, question_id: QuestionId, votes: u32) -> Self {
            Self {
                id,
                question_id,
                choice_text: format!("Option {id}"),
                votes,
            }
        }
    }
}
