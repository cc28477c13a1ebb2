use data_encoding::BASE64URL_NOPAD;
use rand::RngCore;
use rocket::{
    http::{Cookie, CookieJar, SameSite},
    response::{Flash, Redirect},
    time::Duration,
    Route, State,
};

use crate::{
    api::auth::start_session,
    error::{Error, Result},
    model::{
        api::page::Level,
        db::{SocialAccount, User},
        mongodb::{Coll, Counter},
        social::{resolve_identity, GoogleProvider, Resolution},
    },
    Config,
};

/// Private cookie holding the anti-forgery state of a sign-in in progress.
pub const STATE_COOKIE: &str = "oauth_state";

pub fn routes() -> Vec<Route> {
    routes![google_login, google_callback]
}

fn callback_url(config: &Config) -> String {
    format!(
        "{}{}",
        config.site_url(),
        uri!(google_callback(_, _, _))
    )
}

fn provider_or_404(provider: Option<&State<GoogleProvider>>) -> Result<&GoogleProvider> {
    provider
        .map(|state| state.inner())
        .ok_or_else(|| Error::not_found("Google sign-in"))
}

#[get("/polls/accounts/google/login/")]
pub fn google_login(
    provider: Option<&State<GoogleProvider>>,
    cookies: &CookieJar<'_>,
    config: &State<Config>,
) -> Result<Redirect> {
    let provider = provider_or_404(provider)?;

    let mut bytes = [0_u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    let state = BASE64URL_NOPAD.encode(&bytes);

    cookies.add_private(
        Cookie::build(STATE_COOKIE, state.clone())
            .path("/")
            .max_age(Duration::minutes(10))
            .http_only(true)
            .same_site(SameSite::Lax)
            .finish(),
    );

    let url = provider.authorization_url(&callback_url(config), &state)?;
    Ok(Redirect::to(url.to_string()))
}

#[get("/polls/accounts/google/login/callback/?<code>&<state>&<error>")]
#[allow(clippy::too_many_arguments)]
pub async fn google_callback(
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    provider: Option<&State<GoogleProvider>>,
    cookies: &CookieJar<'_>,
    config: &State<Config>,
    users: Coll<User>,
    accounts: Coll<SocialAccount>,
    counters: Coll<Counter>,
) -> Result<Flash<Redirect>> {
    let provider = provider_or_404(provider)?;

    // The state is only good for one attempt.
    let expected = cookies
        .get_private(STATE_COOKIE)
        .map(|cookie| cookie.value().to_string());
    cookies.remove_private(Cookie::build(STATE_COOKIE, "").path("/").finish());

    if let Some(error) = error {
        debug!("Google sign-in was not completed: {error}");
        return Ok(Level::Error.flash(
            uri!(crate::api::auth::login_page(_)),
            "Google sign-in was cancelled.",
        ));
    }

    match (expected, state) {
        (Some(expected), Some(state)) if expected == state => {}
        _ => return Err(Error::bad_request("Sign-in state mismatch")),
    }
    let code = code.ok_or_else(|| Error::bad_request("Missing authorisation code"))?;

    let identity = provider.fetch_identity(&code, &callback_url(config)).await?;
    let resolution = resolve_identity(&users, &accounts, &counters, &identity).await?;
    match &resolution {
        Resolution::Returning(user) => debug!("Returning Google user {}", user.id),
        Resolution::LinkedByEmail(user) => info!("Linked Google identity to user {}", user.id),
        Resolution::SignedUp(user) => info!("Signed up user {} through Google", user.id),
        Resolution::Inactive(user) => {
            info!("Refused Google sign-in for inactive user {}", user.id)
        }
    }

    let user = resolution.into_user();
    // Also covers a returning identity whose account was deactivated since.
    if !user.is_active {
        return Ok(Level::Error.flash(
            uri!(crate::api::auth::login_page(_)),
            "This account is inactive.",
        ));
    }

    start_session(&user, &users, cookies, config).await?;
    Ok(Level::Info.flash(
        uri!(crate::api::polls::index),
        format!("You are now logged in as {}.", user.username),
    ))
}
