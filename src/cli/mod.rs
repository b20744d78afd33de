//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the
//! appropriate commands.

use std::error::Error;
use std::io::Write as _;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::api::client::ApiClient;
use crate::auth::{register, sign_in, sign_in_with_google, Credential, SessionRefresher};
use crate::core::config::Config;
use crate::ui::chat_loop::run_chat;

#[derive(Parser)]
#[command(name = "causerie")]
#[command(about = "A terminal client for a streaming chatbot service")]
#[command(
    long_about = "Causerie is a terminal chat client for a conversational AI service. \
It streams model replies over a WebSocket channel as they are generated and keeps \
conversations on the server, so history follows you across devices.\n\n\
Authentication:\n\
  Sign in with 'causerie login', or set CAUSERIE_EMAIL and CAUSERIE_PASSWORD.\n\
  Google federated login is available with 'causerie login --google <ID_TOKEN>'.\n\n\
Environment Variables:\n\
  CAUSERIE_API_URL    Base URL of the chat service (overrides the config file)\n\
  CAUSERIE_EMAIL      Email used when no credentials are given interactively\n\
  CAUSERIE_PASSWORD   Password used when no credentials are given interactively\n\
  RUST_LOG            Log filter, e.g. causerie=debug"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Conversation to open; starts a new conversation when omitted
    #[arg(short = 'c', long, global = true, value_name = "ID")]
    pub conversation: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// Sign in with email and password, or with a Google id token
    Login {
        /// Google id token for federated login
        #[arg(long, value_name = "ID_TOKEN")]
        google: Option<String>,
    },
    /// Create an account
    Register,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::load()?;
    let api = ApiClient::new(&config.api_base_url);

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Login { google } => {
            let (user, _) = login(&api, google.as_deref()).await?;
            println!("Signed in as {} <{}>", user.name, user.email);
            Ok(())
        }
        Commands::Register => {
            let name = prompt("Name: ")?;
            let email = prompt("Email: ")?;
            let password = prompt("Password: ")?;
            let (user, _) = register(&api, &name, &email, &password).await?;
            println!("Registered {} <{}>", user.name, user.email);
            Ok(())
        }
        Commands::Chat => {
            let (user, credential) = login(&api, None).await?;
            println!("Signed in as {}", user.name);

            let refresher = SessionRefresher::new(api.clone(), credential);
            run_chat(&config, &api, &refresher, args.conversation).await
        }
    }
}

/// Sign in, preferring a Google id token, then environment credentials,
/// then interactive prompts.
async fn login(
    api: &ApiClient,
    google_id_token: Option<&str>,
) -> Result<(crate::api::AuthUser, Credential), Box<dyn Error>> {
    if let Some(id_token) = google_id_token {
        return Ok(sign_in_with_google(api, id_token).await?);
    }

    let email = match std::env::var("CAUSERIE_EMAIL") {
        Ok(email) if !email.trim().is_empty() => email,
        _ => prompt("Email: ")?,
    };
    let password = match std::env::var("CAUSERIE_PASSWORD") {
        Ok(password) if !password.trim().is_empty() => password,
        _ => prompt("Password: ")?,
    };

    Ok(sign_in(api, &email, &password).await?)
}

fn prompt(label: &str) -> Result<String, Box<dyn Error>> {
    print!("{label}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
