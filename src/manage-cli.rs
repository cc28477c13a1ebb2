//! A small management tool for the polls site.
//! It talks to the same database as the server, using the same figment
//! (`Rocket.toml` and `ROCKET_*` variables), so it can seed staff accounts
//! and touch up polls without going through the web forms.

use std::fmt::{Display, Formatter};

use clap::{Arg, ArgAction, ArgMatches, Command};
use mongodb::Client as MongoClient;

use polls_backend::{
    config::{prepare_database, DATABASE},
    model::{
        db::{Choice, NewUser, User},
        mongodb::Coll,
    },
};

const PROGRAM_NAME: &str = "polls-manage";

const ABOUT_TEXT: &str = "Manage accounts and polls of the polls site.

EXIT CODES:
   0: Success.
   1: Error.";

const CREATE_USER: &str = "create-user";
const ADD_CHOICE: &str = "add-choice";

const USERNAME: &str = "USERNAME";
const EMAIL: &str = "EMAIL";
const PASSWORD: &str = "PASSWORD";
const STAFF: &str = "staff";
const QUESTION_ID: &str = "QUESTION_ID";
const CHOICE_TEXT: &str = "CHOICE_TEXT";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .subcommand_required(true)
        .subcommand(
            Command::new(CREATE_USER)
                .about("Create an active account that can sign in straight away")
                .arg(Arg::new(USERNAME).action(ArgAction::Set).required(true))
                .arg(Arg::new(EMAIL).action(ArgAction::Set).required(true))
                .arg(Arg::new(PASSWORD).action(ArgAction::Set).required(true))
                .arg(
                    Arg::new(STAFF)
                        .long(STAFF)
                        .help("Allow the account to create and edit polls")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new(ADD_CHOICE)
                .about("Add a choice to an existing poll")
                .arg(
                    Arg::new(QUESTION_ID)
                        .value_parser(clap::value_parser!(u32))
                        .action(ArgAction::Set)
                        .required(true),
                )
                .arg(Arg::new(CHOICE_TEXT).action(ArgAction::Set).required(true)),
        )
}

/// Errors that this program may produce.
#[derive(Debug)]
enum Error {
    /// Could not load config or reach the database.
    Setup(String),
    /// The request was understood but refused.
    Refused(String),
    /// The backend reported a failure.
    Backend(polls_backend::error::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup(msg) => write!(f, "Setup failed: {msg}"),
            Self::Refused(msg) => write!(f, "{msg}"),
            Self::Backend(err) => write!(f, "{err}"),
        }
    }
}

impl From<polls_backend::error::Error> for Error {
    fn from(err: polls_backend::error::Error) -> Self {
        Self::Backend(err)
    }
}

/// Connect to the configured database and prepare it for use.
async fn connect() -> Result<mongodb::Database, Error> {
    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .map_err(|e| Error::Setup(e.to_string()))?;
    let client = MongoClient::with_uri_str(&db_uri)
        .await
        .map_err(|e| Error::Setup(e.to_string()))?;
    let db = client.database(DATABASE);
    prepare_database(&db)
        .await
        .map_err(|e| Error::Setup(e.to_string()))?;
    Ok(db)
}

async fn create_user(db: &mongodb::Database, args: &ArgMatches) -> Result<String, Error> {
    // Required arguments are guaranteed to be present.
    let username: &String = args.get_one(USERNAME).unwrap();
    let email: &String = args.get_one(EMAIL).unwrap();
    let password: &String = args.get_one(PASSWORD).unwrap();
    let is_staff = args.get_flag(STAFF);

    let new = NewUser {
        username: username.clone(),
        email: email.clone(),
        password: Some(password.clone()),
        is_active: true,
        is_staff,
    };
    let user = User::create_if_available(&Coll::from_db(db), &Coll::from_db(db), new)
        .await?
        .ok_or_else(|| Error::Refused(format!("Username {username} is taken.")))?;
    Ok(format!(
        "Created {} {} with ID {}.",
        if user.is_staff { "staff user" } else { "user" },
        user.username,
        user.id
    ))
}

async fn add_choice(db: &mongodb::Database, args: &ArgMatches) -> Result<String, Error> {
    let question_id: u32 = *args.get_one(QUESTION_ID).unwrap();
    let text: &String = args.get_one(CHOICE_TEXT).unwrap();

    let (question, choice) = Choice::add_to_question(
        &Coll::from_db(db),
        &Coll::from_db(db),
        &Coll::from_db(db),
        question_id,
        text.clone(),
    )
    .await?;
    Ok(format!(
        "Added choice {} to \"{}\".",
        choice.id, question.question_text
    ))
}

/// Run the chosen subcommand, report the result, and return the exit code.
async fn run(args: &ArgMatches) -> u8 {
    let db = match connect().await {
        Ok(db) => db,
        Err(err) => {
            println!("{err}");
            return 1;
        }
    };

    let result = match args.subcommand() {
        Some((CREATE_USER, sub)) => create_user(&db, sub).await,
        Some((ADD_CHOICE, sub)) => add_choice(&db, sub).await,
        // Subcommands are required, and these are the only ones.
        _ => unreachable!(),
    };

    match result {
        Ok(msg) => {
            println!("{msg}");
            0
        }
        Err(err) => {
            println!("{err}");
            1
        }
    }
}

#[rocket::main]
async fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args).await;
    std::process::exit(exit_code.into())
}
