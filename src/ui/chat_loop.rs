//! The interactive chat loop.
//!
//! A line-oriented front end over the conversation engine: it loads
//! history, joins the conversation's channel, prints reply fragments as
//! they stream, and reads user input from stdin. Rendering is deliberately
//! plain; all protocol behavior lives in `core`.

use std::error::Error;
use std::io::Write as _;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::api::client::{ApiClient, ApiError};
use crate::auth::{Session, SessionRefresher};
use crate::core::config::Config;
use crate::core::connection::{ChannelEvent, ConnectionManager};
use crate::core::conversation::Conversation;
use crate::core::message::{Message, Role};
use crate::core::router::{RouterAction, NAVIGATE_SETTLE_DELAY};
use crate::core::view::ConversationView;

/// The service identifies message authors server-side; locally-synthesized
/// messages carry this placeholder author.
const LOCAL_AUTHOR_ID: u64 = 0;

fn print_message(message: &Message) {
    match message.role {
        Role::User => println!("You: {}", message.content),
        Role::Model => println!("{}", message.content),
    }
}

fn print_history(messages: &[Message]) {
    for message in messages {
        print_message(message);
    }
}

/// Read the session, surfacing the terminal failure as a forced sign-out.
async fn current_session(
    refresher: &SessionRefresher<ApiClient>,
) -> Result<Session, Box<dyn Error>> {
    let session = refresher.read().await;
    if session.is_failed() {
        return Err("Session expired and could not be refreshed. Please sign in again.".into());
    }
    Ok(session)
}

/// Map API failures at the page boundary: 401 forces a sign-out, the rest
/// terminate with their own messages.
fn page_error(error: ApiError) -> Box<dyn Error> {
    match error {
        ApiError::Unauthorized => {
            "Session rejected by the server. Please sign in again.".into()
        }
        other => Box::new(other),
    }
}

async fn load_history(
    api: &ApiClient,
    refresher: &SessionRefresher<ApiClient>,
    conversation_id: Option<u64>,
) -> Result<Vec<Message>, Box<dyn Error>> {
    match conversation_id {
        Some(id) => {
            let session = current_session(refresher).await?;
            api.get_messages(id, &session.credential.access_token)
                .await
                .map_err(page_error)
        }
        None => Ok(Vec::new()),
    }
}

/// Run the interactive loop until stdin closes or the session fails.
pub async fn run_chat(
    config: &Config,
    api: &ApiClient,
    refresher: &SessionRefresher<ApiClient>,
    conversation_id: Option<u64>,
) -> Result<(), Box<dyn Error>> {
    let session = current_session(refresher).await?;
    let mut credential_generation = refresher.generation().await;

    let chats = api
        .get_chats(&session.credential.access_token)
        .await
        .map_err(page_error)?;
    if !chats.is_empty() {
        println!("Conversations:");
        // Newest first, as the sidebar shows them.
        for conversation in chats.into_iter().rev().map(Conversation::from) {
            println!("  {}  {}", conversation.id, conversation.topic);
        }
        println!();
    }

    let history = load_history(api, refresher, conversation_id).await?;
    print_history(&history);

    let socket_url = config.socket_url();
    let (mut manager, mut events_rx) = ConnectionManager::new();
    manager.connect(&socket_url, &session.credential);

    let (mut view, join) = ConversationView::mount(conversation_id, LOCAL_AUTHOR_ID, history);
    if let Some(join) = join {
        manager.send(&join);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut mid_reply = false;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let content = line.trim();
                if content.is_empty() {
                    continue;
                }

                // Consulted lazily on every read; a refreshed credential
                // means the live connection's auth context must be swapped.
                let session = current_session(refresher).await?;
                let generation = refresher.generation().await;
                if generation != credential_generation {
                    debug!("credential refreshed, reconnecting");
                    credential_generation = generation;
                    manager.connect(&socket_url, &session.credential);
                    if let Some(join) = view.rejoin() {
                        manager.send(&join);
                    }
                }

                let outbound = view.send(content);
                if !manager.send(&outbound) {
                    eprintln!("Not connected; message not sent.");
                }
            }
            event = events_rx.recv() => {
                let Some((event, generation)) = event else { break };
                if generation != manager.generation() {
                    debug!("dropping event from a stale connection");
                    continue;
                }

                match &event {
                    ChannelEvent::Connected => {
                        debug!("connected");
                        if let Some(join) = view.rejoin() {
                            manager.send(&join);
                        }
                        continue;
                    }
                    ChannelEvent::Disconnected => {
                        debug!("disconnected");
                        continue;
                    }
                    ChannelEvent::Fragment { part, .. } => {
                        print!("{part}");
                        let _ = std::io::stdout().flush();
                        mid_reply = true;
                    }
                    ChannelEvent::MessageEnd { .. } | ChannelEvent::TransportError { .. }
                        if mid_reply =>
                    {
                        println!();
                        mid_reply = false;
                    }
                    _ => {}
                }

                if let ChannelEvent::TransportError { message } = &event {
                    eprintln!("Stream failed: {message}");
                }

                if let Some(RouterAction::Navigate { conversation_id }) =
                    view.handle_event(event)
                {
                    // Let the finishing event settle before swapping views.
                    tokio::time::sleep(NAVIGATE_SETTLE_DELAY).await;
                    println!("\n— conversation {conversation_id} —");

                    let history = load_history(api, refresher, Some(conversation_id)).await?;
                    print_history(&history);

                    let (new_view, join) =
                        ConversationView::mount(Some(conversation_id), LOCAL_AUTHOR_ID, history);
                    view = new_view;
                    if let Some(join) = join {
                        manager.send(&join);
                    }
                }
            }
        }
    }

    manager.shutdown();
    Ok(())
}
