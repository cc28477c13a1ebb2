use chrono::Utc;
use rocket::{form::Form, http::Status, Route};

use crate::{
    error::Result,
    model::{
        api::{
            auth::Staff,
            forms::QuestionForm,
            page::{Level, Page, PageContext, Reply},
            polls::{QuestionFormContent, EDIT_TEMPLATE},
            slogan::Slogan,
        },
        db::{Choice, Question, QuestionId},
        mongodb::{Coll, Counter},
    },
};

pub fn routes() -> Vec<Route> {
    routes![new_page, create, edit_page, edit]
}

#[get("/polls/new/")]
pub async fn new_page(
    staff: Result<Staff>,
    context: PageContext,
    slogan: Slogan,
) -> Result<Page<QuestionFormContent>> {
    staff?;
    Ok(context
        .render(EDIT_TEMPLATE, QuestionFormContent::blank())
        .with_slogan(slogan))
}

#[post("/polls/new/", data = "<form>")]
pub async fn create(
    staff: Result<Staff>,
    form: Form<QuestionForm>,
    context: PageContext,
    slogan: Slogan,
    questions: Coll<Question>,
    choices: Coll<Choice>,
    counters: Coll<Counter>,
) -> Result<Reply<QuestionFormContent>> {
    let Staff(editor) = staff?;

    let valid = match form.validate() {
        Ok(valid) => valid,
        Err(errors) => {
            let content = QuestionFormContent {
                question: None,
                form: form.into_inner(),
                errors,
            };
            return Ok(context
                .render(EDIT_TEMPLATE, content)
                .with_slogan(slogan)
                .with_status(Status::UnprocessableEntity)
                .into());
        }
    };

    let question = Question::create(
        &questions,
        &choices,
        &counters,
        valid.question_text,
        valid.pub_date.unwrap_or_else(Utc::now),
        valid.choices,
    )
    .await?;
    info!("{} created poll {}", editor.username, question.id);

    Ok(Level::Success
        .flash(uri!(crate::api::polls::detail(question.id)), "Poll created successfully!")
        .into())
}

#[get("/polls/<id>/edit/")]
pub async fn edit_page(
    id: QuestionId,
    staff: Result<Staff>,
    context: PageContext,
    slogan: Slogan,
    questions: Coll<Question>,
) -> Result<Page<QuestionFormContent>> {
    staff?;
    let question = Question::get(&questions, id).await?;
    Ok(context
        .render(EDIT_TEMPLATE, QuestionFormContent::editing(question))
        .with_slogan(slogan))
}

#[post("/polls/<id>/edit/", data = "<form>")]
pub async fn edit(
    id: QuestionId,
    staff: Result<Staff>,
    form: Form<QuestionForm>,
    context: PageContext,
    slogan: Slogan,
    questions: Coll<Question>,
) -> Result<Reply<QuestionFormContent>> {
    let Staff(editor) = staff?;
    let question = Question::get(&questions, id).await?;

    let valid = match form.validate() {
        Ok(valid) => valid,
        Err(errors) => {
            let content = QuestionFormContent {
                question: Some(question.into()),
                form: form.into_inner(),
                errors,
            };
            return Ok(context
                .render(EDIT_TEMPLATE, content)
                .with_slogan(slogan)
                .with_status(Status::UnprocessableEntity)
                .into());
        }
    };

    // Saving an edit republishes the question as of now.
    Question::edit(&questions, id, &valid.question_text, Utc::now()).await?;
    info!("{} edited poll {id}", editor.username);

    Ok(Level::Success
        .flash(uri!(crate::api::polls::detail(id)), "Poll updated successfully!")
        .into())
}
