use rocket::{
    http::{uri::Reference, Status},
    request::{FlashMessage, FromRequest, Outcome},
    response::{Flash, Redirect, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;

use crate::model::{api::slogan::Slogan, db::User};

/// A rendered page: the view's own content plus the context every page carries.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    #[serde(skip)]
    status: Status,
    /// Name of the view that produced this page.
    pub template: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slogan: Option<Slogan>,
    pub messages: Vec<Message>,
    pub user: Option<UserSummary>,
    #[serde(flatten)]
    pub content: T,
}

impl<T> Page<T> {
    /// Respond with a status other than 200, e.g. when re-rendering an invalid form.
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_slogan(mut self, slogan: Slogan) -> Self {
        self.slogan = Some(slogan);
        self
    }

    /// Add a message that is shown on this page only.
    pub fn with_message(mut self, level: Level, text: impl Into<String>) -> Self {
        self.messages.push(Message {
            level,
            text: text.into(),
        });
        self
    }
}

impl<'r, T: Serialize> Responder<'r, 'static> for Page<T> {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'static> {
        (self.status, Json(self)).respond_to(req)
    }
}

/// What a form handler does next: show a page, or send the visitor elsewhere.
#[derive(Debug)]
pub enum Reply<T> {
    Page(Page<T>),
    Redirect(Redirect),
    Flash(Flash<Redirect>),
}

impl<'r, T: Serialize> Responder<'r, 'static> for Reply<T> {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'static> {
        match self {
            Self::Page(page) => page.respond_to(req),
            Self::Redirect(redirect) => redirect.respond_to(req),
            Self::Flash(flash) => flash.respond_to(req),
        }
    }
}

impl<T> From<Page<T>> for Reply<T> {
    fn from(page: Page<T>) -> Self {
        Self::Page(page)
    }
}

impl<T> From<Redirect> for Reply<T> {
    fn from(redirect: Redirect) -> Self {
        Self::Redirect(redirect)
    }
}

impl<T> From<Flash<Redirect>> for Reply<T> {
    fn from(flash: Flash<Redirect>) -> Self {
        Self::Flash(flash)
    }
}

/// Severity of a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    fn parse(kind: &str) -> Self {
        match kind {
            "success" => Self::Success,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }

    /// Redirect to `uri`, showing `text` on the next page.
    pub fn flash<U: TryInto<Reference<'static>>>(
        self,
        uri: U,
        text: impl Into<String>,
    ) -> Flash<Redirect> {
        Flash::new(Redirect::to(uri), self.as_str(), text.into())
    }
}

/// A one-line message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub level: Level,
    pub text: String,
}

/// The signed-in user, as shown on every page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub username: String,
    pub is_staff: bool,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            is_staff: user.is_staff,
        }
    }
}

/// Request guard collecting the context shared by every page:
/// the pending flash message and the signed-in user.
#[derive(Debug, Default)]
pub struct PageContext {
    messages: Vec<Message>,
    user: Option<UserSummary>,
}

impl PageContext {
    /// Render `content` as the named view.
    pub fn render<T>(self, template: &'static str, content: T) -> Page<T> {
        Page {
            status: Status::Ok,
            template,
            slogan: None,
            messages: self.messages,
            user: self.user,
            content,
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PageContext {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Reading the flash clears its cookie, so it is shown once.
        let messages = match req.guard::<Option<FlashMessage<'_>>>().await {
            Outcome::Success(Some(flash)) => {
                let (kind, text) = flash.into_inner();
                vec![Message {
                    level: Level::parse(&kind),
                    text,
                }]
            }
            _ => Vec::new(),
        };
        let user = match req.guard::<Option<User>>().await {
            Outcome::Success(user) => user.as_ref().map(UserSummary::from),
            _ => None,
        };
        Outcome::Success(Self { messages, user })
    }
}

#[cfg(test)]
mod tests {
    use rocket::serde::json::serde_json;

    use super::*;

    #[derive(Serialize)]
    struct Content {
        answer: u32,
    }

    #[test]
    fn page_flattens_content() {
        let context = PageContext {
            messages: Vec::new(),
            user: Some(UserSummary::from(&User::example_member())),
        };
        let page = context
            .render("polls/index.html", Content { answer: 42 })
            .with_message(Level::Error, "Oops")
            .with_status(Status::UnprocessableEntity);
        assert_eq!(page.status, Status::UnprocessableEntity);

        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["template"], "polls/index.html");
        assert_eq!(json["answer"], 42);
        assert_eq!(json["messages"][0]["level"], "error");
        assert_eq!(json["messages"][0]["text"], "Oops");
        assert_eq!(json["user"]["username"], "member");
        assert!(json.get("slogan").is_none());
        assert!(json.get("status").is_none());
    }

    #[test]
    fn unknown_flash_kinds_are_info() {
        assert_eq!(Level::parse("success"), Level::Success);
        assert_eq!(Level::parse("error"), Level::Error);
        assert_eq!(Level::parse("warning"), Level::Info);
    }
}
