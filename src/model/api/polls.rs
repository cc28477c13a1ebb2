//! Page content for the poll views.

use chrono::{serde::ts_seconds, DateTime, Utc};
use serde::Serialize;

use crate::model::{
    api::forms::{FormErrors, QuestionForm},
    db::{Choice, ChoiceId, Question, QuestionId},
};

pub const INDEX_TEMPLATE: &str = "polls/index.html";
pub const DETAIL_TEMPLATE: &str = "polls/detail.html";
pub const RESULTS_TEMPLATE: &str = "polls/results.html";
pub const EDIT_TEMPLATE: &str = "polls/poll_new_edit.html";

/// Message shown when a vote names no valid choice.
pub const NO_CHOICE_SELECTED: &str = "You didn't select a choice.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub question_text: String,
    #[serde(with = "ts_seconds")]
    pub pub_date: DateTime<Utc>,
}

impl From<Question> for QuestionView {
    fn from(question: Question) -> Self {
        Self {
            id: question.id,
            question_text: question.question_text,
            pub_date: question.pub_date,
        }
    }
}

/// A choice as offered for voting, without its tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceView {
    pub id: ChoiceId,
    pub choice_text: String,
}

impl From<Choice> for ChoiceView {
    fn from(choice: Choice) -> Self {
        Self {
            id: choice.id,
            choice_text: choice.choice_text,
        }
    }
}

/// A choice with its tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceResult {
    pub id: ChoiceId,
    pub choice_text: String,
    pub votes: u32,
}

impl From<Choice> for ChoiceResult {
    fn from(choice: Choice) -> Self {
        Self {
            id: choice.id,
            choice_text: choice.choice_text,
            votes: choice.votes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IndexContent {
    pub latest_question_list: Vec<QuestionView>,
}

#[derive(Debug, Serialize)]
pub struct DetailContent {
    pub question: QuestionView,
    pub choices: Vec<ChoiceView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<&'static str>,
}

impl DetailContent {
    pub fn new(question: Question, choices: Vec<Choice>) -> Self {
        Self {
            question: question.into(),
            choices: choices.into_iter().map(Into::into).collect(),
            error_message: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResultsContent {
    pub question: QuestionView,
    pub choices: Vec<ChoiceResult>,
}

impl ResultsContent {
    pub fn new(question: Question, choices: Vec<Choice>) -> Self {
        Self {
            question: question.into(),
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }
}

/// The new/edit poll page. `question` is set when editing.
#[derive(Debug, Serialize)]
pub struct QuestionFormContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionView>,
    pub form: QuestionForm,
    pub errors: FormErrors,
}

impl QuestionFormContent {
    pub fn blank() -> Self {
        Self {
            question: None,
            form: QuestionForm::default(),
            errors: FormErrors::default(),
        }
    }

    /// A form prefilled from an existing question.
    pub fn editing(question: Question) -> Self {
        let form = QuestionForm {
            question_text: Some(question.question_text.clone()),
            pub_date: Some(question.pub_date.to_rfc3339()),
            choices: Vec::new(),
        };
        Self {
            question: Some(question.into()),
            form,
            errors: FormErrors::default(),
        }
    }
}
