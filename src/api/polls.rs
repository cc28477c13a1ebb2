use chrono::Utc;
use rocket::{form::Form, http::Status, response::Redirect, Route};

use crate::{
    error::Result,
    logging::RequestId,
    model::{
        api::{
            forms::VoteForm,
            page::{Page, PageContext, Reply},
            polls::{
                DetailContent, IndexContent, ResultsContent, DETAIL_TEMPLATE, INDEX_TEMPLATE,
                NO_CHOICE_SELECTED, RESULTS_TEMPLATE,
            },
            slogan::Slogan,
        },
        db::{Choice, Question, QuestionId},
        mongodb::Coll,
    },
};

/// How many questions the index lists.
const LATEST_COUNT: i64 = 5;

pub fn routes() -> Vec<Route> {
    routes![index, detail, results, vote]
}

#[get("/polls/")]
pub async fn index(
    context: PageContext,
    slogan: Slogan,
    questions: Coll<Question>,
) -> Result<Page<IndexContent>> {
    let latest = Question::latest(&questions, Utc::now(), LATEST_COUNT).await?;
    let content = IndexContent {
        latest_question_list: latest.into_iter().map(Into::into).collect(),
    };
    Ok(context.render(INDEX_TEMPLATE, content).with_slogan(slogan))
}

#[get("/polls/<id>/")]
pub async fn detail(
    id: QuestionId,
    context: PageContext,
    slogan: Slogan,
    questions: Coll<Question>,
    choices: Coll<Choice>,
) -> Result<Page<DetailContent>> {
    let question = Question::get_published(&questions, id, Utc::now()).await?;
    let choices = Choice::for_question(&choices, id).await?;
    Ok(context
        .render(DETAIL_TEMPLATE, DetailContent::new(question, choices))
        .with_slogan(slogan))
}

#[get("/polls/<id>/results/")]
pub async fn results(
    id: QuestionId,
    context: PageContext,
    slogan: Slogan,
    questions: Coll<Question>,
    choices: Coll<Choice>,
) -> Result<Page<ResultsContent>> {
    let question = Question::get(&questions, id).await?;
    let choices = Choice::for_question(&choices, id).await?;
    Ok(context
        .render(RESULTS_TEMPLATE, ResultsContent::new(question, choices))
        .with_slogan(slogan))
}

#[post("/polls/<id>/vote/", data = "<form>")]
pub async fn vote(
    id: QuestionId,
    form: Form<VoteForm>,
    context: PageContext,
    slogan: Slogan,
    request_id: &RequestId,
    questions: Coll<Question>,
    choices: Coll<Choice>,
) -> Result<Reply<DetailContent>> {
    let question = Question::get(&questions, id).await?;

    if let Some(choice_id) = form.choice_id() {
        if Choice::add_vote(&choices, id, choice_id).await? {
            debug!("[req{request_id}] Vote counted for choice {choice_id} of question {id}");
            return Ok(Redirect::to(uri!(results(id))).into());
        }
    }

    // Redisplay the voting form.
    let choices = Choice::for_question(&choices, id).await?;
    let content = DetailContent {
        error_message: Some(NO_CHOICE_SELECTED),
        ..DetailContent::new(question, choices)
    };
    Ok(context
        .render(DETAIL_TEMPLATE, content)
        .with_slogan(slogan)
        .with_status(Status::UnprocessableEntity)
        .into())
}

#[cfg(test)]
mod tests {
    use mongodb::bson::doc;
    use rocket::{
        futures::TryStreamExt,
        http::{uri::Origin, ContentType},
        local::asynchronous::Client,
        serde::json::{serde_json, Value},
    };

    use crate::model::api::slogan::SLOGANS;

    use super::*;

    async fn get_json(client: &Client, uri: Origin<'static>) -> (Status, Value) {
        let response = client.get(uri).dispatch().await;
        let status = response.status();
        let body = response.into_string().await.unwrap();
        (status, serde_json::from_str(&body).unwrap())
    }

    async fn insert_poll(questions: &Coll<Question>, choices: &Coll<Choice>, question: Question) {
        let id = question.id;
        questions.insert_one(question, None).await.unwrap();
        choices
            .insert_many(
                [
                    Choice::example(id * 10 + 1, id, 0),
                    Choice::example(id * 10 + 2, id, 3),
                ],
                None,
            )
            .await
            .unwrap();
    }

    #[backend_test]
    async fn index_lists_published_newest_first(client: Client, questions: Coll<Question>) {
        let mut older = Question::example_published(1);
        older.pub_date = older.pub_date - chrono::Duration::hours(1);
        questions.insert_one(older, None).await.unwrap();
        questions
            .insert_one(Question::example_published(2), None)
            .await
            .unwrap();
        questions
            .insert_one(Question::example_future(3), None)
            .await
            .unwrap();

        let (status, page) = get_json(&client, uri!(index)).await;
        assert_eq!(Status::Ok, status);
        assert_eq!(page["template"], INDEX_TEMPLATE);
        assert!(SLOGANS.contains(&page["slogan"].as_str().unwrap()));

        let ids: Vec<_> = page["latest_question_list"]
            .as_array()
            .unwrap()
            .iter()
            .map(|q| q["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[backend_test]
    async fn detail_hides_unpublished(
        client: Client,
        questions: Coll<Question>,
        choices: Coll<Choice>,
    ) {
        insert_poll(&questions, &choices, Question::example_published(1)).await;
        insert_poll(&questions, &choices, Question::example_future(2)).await;

        let (status, page) = get_json(&client, uri!(detail(1))).await;
        assert_eq!(Status::Ok, status);
        assert_eq!(page["question"]["id"], 1);
        assert_eq!(page["choices"].as_array().unwrap().len(), 2);
        // Tallies are only on the results page.
        assert!(page["choices"][0].get("votes").is_none());
        assert!(page.get("error_message").is_none());

        let response = client.get(uri!(detail(2))).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
        let response = client.get(uri!(detail(99))).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test]
    async fn results_show_tallies(
        client: Client,
        questions: Coll<Question>,
        choices: Coll<Choice>,
    ) {
        insert_poll(&questions, &choices, Question::example_future(4)).await;

        let (status, page) = get_json(&client, uri!(results(4))).await;
        assert_eq!(Status::Ok, status);
        assert_eq!(page["template"], RESULTS_TEMPLATE);
        assert_eq!(page["choices"][1]["votes"], 3);

        let response = client.get(uri!(results(99))).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test]
    async fn vote_counts_once_and_redirects(
        client: Client,
        questions: Coll<Question>,
        choices: Coll<Choice>,
    ) {
        insert_poll(&questions, &choices, Question::example_published(1)).await;

        let response = client
            .post(uri!(vote(1)))
            .header(ContentType::Form)
            .body("choice=12")
            .dispatch()
            .await;
        assert_eq!(Status::SeeOther, response.status());
        assert_eq!(
            response.headers().get_one("Location"),
            Some(uri!(results(1)).to_string().as_str())
        );

        let tallies: Vec<_> = Choice::for_question(&choices, 1)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.votes)
            .collect();
        assert_eq!(tallies, vec![0, 4]);
    }

    #[backend_test]
    async fn vote_without_choice_redisplays(
        client: Client,
        questions: Coll<Question>,
        choices: Coll<Choice>,
    ) {
        insert_poll(&questions, &choices, Question::example_published(1)).await;
        insert_poll(&questions, &choices, Question::example_published(2)).await;

        // Nothing selected, nonsense, and another question's choice.
        for body in ["", "choice=", "choice=abc", "choice=21"] {
            let response = client
                .post(uri!(vote(1)))
                .header(ContentType::Form)
                .body(body)
                .dispatch()
                .await;
            assert_eq!(Status::UnprocessableEntity, response.status());
            let page: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
            assert_eq!(page["template"], DETAIL_TEMPLATE);
            assert_eq!(page["error_message"], NO_CHOICE_SELECTED);
            assert_eq!(page["question"]["id"], 1);
        }

        let total: u32 = choices
            .find(doc! {}, None)
            .await
            .unwrap()
            .try_collect::<Vec<Choice>>()
            .await
            .unwrap()
            .iter()
            .map(|c| c.votes)
            .sum();
        assert_eq!(total, 6);
    }

    #[backend_test]
    async fn vote_on_missing_question(client: Client) {
        let response = client
            .post(uri!(vote(7)))
            .header(ContentType::Form)
            .body("choice=1")
            .dispatch()
            .await;
        assert_eq!(Status::NotFound, response.status());
    }
}
