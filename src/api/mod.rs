use rocket::{
    http::Status,
    serde::json::{json, Value},
    Catcher, Request, Route,
};

pub mod auth;
pub mod editor;
pub mod polls;
#[cfg(feature = "social")]
pub mod social;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(polls::routes());
    routes.extend(editor::routes());
    routes.extend(auth::routes());
    #[cfg(feature = "social")]
    routes.extend(social::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![default_catcher]
}

/// Every error page is a small JSON document naming the status.
#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> (Status, Value) {
    let body = json!({
        "status": status.code,
        "reason": status.reason_lossy(),
    });
    (status, body)
}
