use chrono::Utc;
use rocket::{
    form::Form,
    http::{uri::Origin, CookieJar, Status},
    response::{Flash, Redirect},
    Route, State,
};

use crate::{
    error::Result,
    mail::Mailer,
    model::{
        api::{
            account::{
                ActivationContent, LoginContent, RegisterContent, ACTIVATED, ACTIVATION_FAILED,
                ACTIVATION_FAILURE_TEMPLATE, ACTIVATION_SUCCESS_TEMPLATE, EMAIL_TAKEN,
                INVALID_LOGIN, INVALID_REGISTRATION, LOGIN_TEMPLATE, REGISTER_TEMPLATE,
                USERNAME_TAKEN,
            },
            auth::{decode_uid, encode_uid, ActivationTokens, AuthToken},
            forms::{FormErrors, LoginForm, RegisterForm, ValidRegistration},
            page::{Level, Page, PageContext, Reply},
            slogan::Slogan,
        },
        db::{NewUser, User},
        mongodb::{Coll, Counter},
    },
    Config,
};

pub fn routes() -> Vec<Route> {
    routes![login_page, login, logout, register_page, register, activate]
}

/// Where to go after signing in: `next` if it stays on this site, else the index.
fn landing_page(next: Option<String>) -> String {
    next.filter(|next| {
        next.starts_with('/')
            && !next.starts_with("//")
            && !next.contains('\\')
            && Origin::parse(next).is_ok()
    })
    .unwrap_or_else(|| uri!(crate::api::polls::index).to_string())
}

/// Sign the user in on this client.
pub(crate) async fn start_session(
    user: &User,
    users: &Coll<User>,
    cookies: &CookieJar<'_>,
    config: &Config,
) -> Result<()> {
    User::record_login(users, user.id, Utc::now()).await?;
    cookies.add(AuthToken::new(user).into_cookie(config));
    info!("User {} ({}) signed in", user.id, user.username);
    Ok(())
}

#[get("/polls/login/?<next>")]
pub fn login_page(
    next: Option<String>,
    context: PageContext,
    slogan: Slogan,
) -> Page<LoginContent> {
    let content = LoginContent {
        login_form: LoginForm::default(),
        next,
    };
    context.render(LOGIN_TEMPLATE, content).with_slogan(slogan)
}

#[post("/polls/login/?<next>", data = "<form>")]
pub async fn login(
    next: Option<String>,
    form: Form<LoginForm>,
    context: PageContext,
    slogan: Slogan,
    cookies: &CookieJar<'_>,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<Reply<LoginContent>> {
    let user = match form.credentials() {
        Some((identifier, password)) => User::find_by_login(&users, identifier)
            .await?
            .filter(|user| user.is_active && user.verify_password(password)),
        None => None,
    };

    let Some(user) = user else {
        debug!("Failed sign-in attempt");
        let content = LoginContent {
            login_form: form.into_inner(),
            next,
        };
        return Ok(context
            .render(LOGIN_TEMPLATE, content)
            .with_slogan(slogan)
            .with_message(Level::Error, INVALID_LOGIN)
            .with_status(Status::UnprocessableEntity)
            .into());
    };

    start_session(&user, &users, cookies, config).await?;
    Ok(Level::Info
        .flash(
            landing_page(next),
            format!("You are now logged in as {}.", user.username),
        )
        .into())
}

#[get("/polls/logout/")]
pub fn logout(cookies: &CookieJar<'_>) -> Flash<Redirect> {
    cookies.remove(AuthToken::removal_cookie());
    Level::Info.flash(
        uri!(crate::api::polls::index),
        "You have successfully logged out.",
    )
}

#[get("/polls/register/")]
pub fn register_page(context: PageContext) -> Page<RegisterContent> {
    context.render(REGISTER_TEMPLATE, RegisterContent::default())
}

#[post("/polls/register/", data = "<form>")]
pub async fn register(
    form: Form<RegisterForm>,
    context: PageContext,
    users: Coll<User>,
    counters: Coll<Counter>,
    config: &State<Config>,
    mailer: &State<Mailer>,
) -> Result<Reply<RegisterContent>> {
    let created = match form.validate() {
        Ok(valid) => create_inactive_user(&users, &counters, valid).await?,
        Err(errors) => Err(errors),
    };

    let user = match created {
        Ok(user) => user,
        Err(errors) => {
            let content = RegisterContent {
                register_form: form.into_inner(),
                errors,
            };
            return Ok(context
                .render(REGISTER_TEMPLATE, content)
                .with_message(Level::Error, INVALID_REGISTRATION)
                .with_status(Status::UnprocessableEntity)
                .into());
        }
    };

    send_activation_email(&user, config, mailer);
    Ok(Level::Success
        .flash(
            uri!(crate::api::polls::index),
            format!(
                "Registration successful. Please check your '{}' inbox to activate your account.",
                user.email
            ),
        )
        .into())
}

/// Create the account unless the username or email is already in use.
async fn create_inactive_user(
    users: &Coll<User>,
    counters: &Coll<Counter>,
    valid: ValidRegistration,
) -> Result<std::result::Result<User, FormErrors>> {
    let mut errors = FormErrors::default();
    if User::find_by_email(users, &valid.email).await?.is_some() {
        errors.add("email", EMAIL_TAKEN);
    }
    if User::find_by_username(users, &valid.username).await?.is_some() {
        errors.add("username", USERNAME_TAKEN);
    }
    if !errors.is_empty() {
        return Ok(Err(errors));
    }

    let new = NewUser {
        username: valid.username,
        email: valid.email,
        password: Some(valid.password),
        is_active: false,
        is_staff: false,
    };
    match User::create_if_available(users, counters, new).await? {
        Some(user) => Ok(Ok(user)),
        // Lost a race with another registration.
        None => {
            errors.add("username", USERNAME_TAKEN);
            Ok(Err(errors))
        }
    }
}

fn send_activation_email(user: &User, config: &Config, mailer: &Mailer) {
    let token = ActivationTokens::new(config).make_token(user);
    let link = format!(
        "{}{}",
        config.site_url(),
        uri!(activate(encode_uid(user.id), token))
    );
    let body = format!(
        "Hi {},\n\nPlease click on the link below to confirm your registration:\n\n{link}\n",
        user.username
    );
    mailer.send(&user.email, "Activate your account.", &body);
}

#[get("/polls/activate/<uidb64>/<token>/")]
pub async fn activate(
    uidb64: &str,
    token: &str,
    context: PageContext,
    users: Coll<User>,
    config: &State<Config>,
) -> Result<Page<ActivationContent>> {
    let user = match decode_uid(uidb64) {
        Some(id) => User::get(&users, id).await?,
        None => None,
    };

    match user {
        Some(user) if ActivationTokens::new(config).check_token(&user, token) => {
            User::activate(&users, user.id).await?;
            Ok(context
                .render(ACTIVATION_SUCCESS_TEMPLATE, ActivationContent { activated: true })
                .with_message(Level::Success, ACTIVATED))
        }
        _ => {
            debug!("Rejected activation link for {uidb64}");
            Ok(context
                .render(ACTIVATION_FAILURE_TEMPLATE, ActivationContent { activated: false })
                .with_message(Level::Error, ACTIVATION_FAILED)
                .with_status(Status::BadRequest))
        }
    }
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::ContentType,
        local::asynchronous::Client,
        serde::json::{serde_json, Value},
    };

    use crate::model::{
        api::auth::AUTH_TOKEN_COOKIE,
        db::{EXAMPLE_MEMBER_PASSWORD, EXAMPLE_STAFF_PASSWORD},
    };

    use super::*;

    async fn post_form(
        client: &Client,
        uri: Origin<'static>,
        body: String,
    ) -> (Status, Option<String>, Value) {
        let response = client
            .post(uri)
            .header(ContentType::Form)
            .body(body)
            .dispatch()
            .await;
        let status = response.status();
        let location = response.headers().get_one("Location").map(str::to_string);
        let body = response.into_string().await.unwrap_or_default();
        (status, location, serde_json::from_str(&body).unwrap_or(Value::Null))
    }

    async fn page(client: &Client, uri: Origin<'static>) -> Value {
        let body = client
            .get(uri)
            .dispatch()
            .await
            .into_string()
            .await
            .unwrap();
        serde_json::from_str(&body).unwrap()
    }

    #[test]
    fn landing_page_stays_local() {
        assert_eq!(landing_page(None), "/polls/");
        assert_eq!(landing_page(Some("/polls/3/".to_string())), "/polls/3/");
        assert_eq!(landing_page(Some("//evil.example/".to_string())), "/polls/");
        assert_eq!(landing_page(Some("https://evil.example/".to_string())), "/polls/");
        assert_eq!(landing_page(Some("/\\evil.example".to_string())), "/polls/");
    }

    #[backend_test]
    async fn login_page_has_slogan(client: Client) {
        let page = page(&client, uri!(login_page(Some("/polls/new/")))).await;
        assert_eq!(page["template"], LOGIN_TEMPLATE);
        assert!(page["slogan"].is_string());
        assert_eq!(page["next"], "/polls/new/");
    }

    #[backend_test]
    async fn login_by_username_or_email(client: Client, users: Coll<User>) {
        let staff = User::example_staff();
        users.insert_one(&staff, None).await.unwrap();

        let (status, location, _) = post_form(
            &client,
            uri!(login(Some("/polls/new/"))),
            format!("username=EDITOR%40example.com&password={EXAMPLE_STAFF_PASSWORD}"),
        )
        .await;
        assert_eq!(Status::SeeOther, status);
        assert_eq!(location.as_deref(), Some("/polls/new/"));
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());

        let index = page(&client, uri!(crate::api::polls::index)).await;
        assert_eq!(index["messages"][0]["text"], "You are now logged in as editor.");
        assert_eq!(index["user"]["username"], "editor");

        let stored = User::get(&users, staff.id).await.unwrap().unwrap();
        assert!(stored.last_login.is_some());
    }

    #[backend_test]
    async fn bad_credentials_rejected(client: Client, users: Coll<User>) {
        users
            .insert_one(User::example_member(), None)
            .await
            .unwrap();
        users
            .insert_one(User::example_inactive(), None)
            .await
            .unwrap();

        for body in [
            "username=member&password=wrong".to_string(),
            "username=nobody&password=whatever".to_string(),
            format!("username=dormant&password={EXAMPLE_MEMBER_PASSWORD}"),
            "username=member".to_string(),
        ] {
            let (status, _, page) = post_form(&client, uri!(login(_)), body).await;
            assert_eq!(Status::UnprocessableEntity, status);
            assert_eq!(page["messages"][0]["text"], INVALID_LOGIN);
            assert_eq!(page["messages"][0]["level"], "error");
            assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_none());
        }
    }

    #[backend_test(user)]
    async fn logout_signs_out(client: Client) {
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());

        let response = client.get(uri!(logout)).dispatch().await;
        assert_eq!(Status::SeeOther, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_none());

        let index = page(&client, uri!(crate::api::polls::index)).await;
        assert_eq!(index["messages"][0]["text"], "You have successfully logged out.");
        assert!(index["user"].is_null());
    }

    const REGISTRATION: &str = concat!(
        "username=newcomer&email=newcomer%40example.com",
        "&password1=tulip-ocean-42&password2=tulip-ocean-42",
    );

    #[backend_test]
    async fn register_then_activate(client: Client, users: Coll<User>) {
        let page_before = page(&client, uri!(register_page)).await;
        assert!(page_before.get("slogan").is_none());

        let (status, location, _) =
            post_form(&client, uri!(register), REGISTRATION.to_string()).await;
        assert_eq!(Status::SeeOther, status);
        assert_eq!(location.as_deref(), Some("/polls/"));

        let user = User::find_by_username(&users, "newcomer")
            .await
            .unwrap()
            .unwrap();
        assert!(!user.is_active);

        // Inactive accounts cannot sign in yet.
        let (status, _, _) = post_form(
            &client,
            uri!(login(_)),
            "username=newcomer&password=tulip-ocean-42".to_string(),
        )
        .await;
        assert_eq!(Status::UnprocessableEntity, status);

        let mailer = client.rocket().state::<Mailer>().unwrap();
        let outbox = mailer.outbox();
        assert_eq!(outbox.len(), 1);
        assert_eq!(outbox[0].to, "newcomer@example.com");
        let link = outbox[0]
            .body
            .lines()
            .find(|line| line.contains("/polls/activate/"))
            .unwrap();
        let path = Origin::parse_owned(link[link.find("/polls/activate/").unwrap()..].to_string())
            .unwrap();

        let response = client.get(path.clone()).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let body: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(body["template"], ACTIVATION_SUCCESS_TEMPLATE);
        assert_eq!(body["messages"][0]["text"], ACTIVATED);
        assert!(User::get(&users, user.id).await.unwrap().unwrap().is_active);

        // The same link does not work twice.
        let response = client.get(path).dispatch().await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test]
    async fn tampered_activation_leaves_account_inactive(client: Client, users: Coll<User>) {
        let user = User::example_inactive();
        users.insert_one(&user, None).await.unwrap();

        let config = client.rocket().state::<Config>().unwrap();
        let token = ActivationTokens::new(config).make_token(&user);
        let mut tampered = token.clone();
        let last = if tampered.ends_with('0') { '1' } else { '0' };
        tampered.pop();
        tampered.push(last);

        let response = client
            .get(uri!(activate(encode_uid(user.id), tampered)))
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        let body: Value = serde_json::from_str(&response.into_string().await.unwrap()).unwrap();
        assert_eq!(body["template"], ACTIVATION_FAILURE_TEMPLATE);
        assert_eq!(body["messages"][0]["text"], ACTIVATION_FAILED);

        // Unknown user, garbage uid.
        let response = client
            .get(uri!(activate(encode_uid(4242), token.clone())))
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        let response = client
            .get(uri!(activate("%%%", token)))
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        assert!(!User::get(&users, user.id).await.unwrap().unwrap().is_active);
    }

    #[backend_test]
    async fn registration_errors(client: Client, users: Coll<User>) {
        users
            .insert_one(User::example_member(), None)
            .await
            .unwrap();

        let (status, _, page) = post_form(
            &client,
            uri!(register),
            concat!(
                "username=MEMBER&email=Member%40Example.com",
                "&password1=tulip-ocean-42&password2=tulip-ocean-42",
            )
            .to_string(),
        )
        .await;
        assert_eq!(Status::UnprocessableEntity, status);
        assert_eq!(page["messages"][0]["text"], INVALID_REGISTRATION);
        assert_eq!(page["errors"]["username"][0], USERNAME_TAKEN);
        assert_eq!(page["errors"]["email"][0], EMAIL_TAKEN);
        assert_eq!(page["register_form"]["username"], "MEMBER");
        assert!(page["register_form"].get("password1").is_none());

        let (status, _, page) = post_form(
            &client,
            uri!(register),
            "username=fresh&email=fresh%40example.com&password1=12345678&password2=12345678"
                .to_string(),
        )
        .await;
        assert_eq!(Status::UnprocessableEntity, status);
        let problems = page["errors"]["password2"].as_array().unwrap();
        assert!(problems.contains(&Value::from("This password is too common.")));
        assert!(problems.contains(&Value::from("This password is entirely numeric.")));

        assert_eq!(users.count_documents(None, None).await.unwrap(), 1);
        let mailer = client.rocket().state::<Mailer>().unwrap();
        assert!(mailer.outbox().is_empty());
    }
}
