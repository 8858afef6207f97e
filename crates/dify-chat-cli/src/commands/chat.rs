//! Interactive chat against the current app.
//!
//! Answers stream to stdout as they arrive. Ctrl-C stops the running answer
//! and keeps what was received; `/quit` or end of input leaves.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use dify_chat_client::{
    AbortHandle, AppParameters, ChatBackend, ChatFile, ChatRequest, ChatTurn, DifyClient,
    TurnOutcome,
};
use dify_chat_core::{App, Conversation, CoreError, FileRef, LocalState, Message, Role, User};
use tokio::io::{AsyncBufReadExt as _, BufReader};

use super::{Context, client_for};

/// One line typed at the chat prompt.
#[derive(Debug, PartialEq, Eq)]
enum ReplInput {
    Empty,
    Quit,
    New,
    Help,
    Attach(PathBuf),
    Query(String),
}

fn parse_line(line: &str) -> ReplInput {
    let line = line.trim();
    if line.is_empty() {
        return ReplInput::Empty;
    }
    match line {
        "/quit" | "/exit" | "/q" => ReplInput::Quit,
        "/new" => ReplInput::New,
        "/help" | "/h" => ReplInput::Help,
        _ => match line.strip_prefix("/attach") {
            Some(rest) if rest.is_empty() || rest.starts_with(' ') => {
                ReplInput::Attach(PathBuf::from(rest.trim()))
            }
            _ => ReplInput::Query(line.to_string()),
        },
    }
}

/// Image MIME type from the file extension.
fn image_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// An uploaded image waiting to go out with the next query.
struct PendingImage {
    chat_file: ChatFile,
    file_ref: FileRef,
}

struct Session {
    app: App,
    user: User,
    client: Arc<DifyClient>,
    conversation_id: Option<String>,
    pending: Vec<PendingImage>,
    images_allowed: bool,
}

pub async fn execute(ctx: &Context, conversation: Option<String>) -> Result<()> {
    let user = ctx.require_user()?;
    let app = ctx.require_app()?;
    let client = Arc::new(client_for(&app)?);

    let params = match client.parameters().await {
        Ok(params) => params,
        Err(e) => {
            tracing::warn!(error = %e, "could not load app parameters");
            AppParameters::default()
        }
    };

    if let Some(id) = conversation.as_deref() {
        let local = ctx.state.conversations.get(id)?;
        print_transcript(&local);
    }

    let mut session = Session {
        images_allowed: app.visual_enabled || params.image_upload_enabled(),
        app,
        user,
        client,
        conversation_id: conversation,
        pending: Vec::new(),
    };

    println!(
        "Chatting with {} as {}. Type /help for commands.",
        session.app.name, session.user.username
    );
    if session.conversation_id.is_none() {
        print_opening(&params);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match parse_line(&line) {
            ReplInput::Empty => {}
            ReplInput::Quit => break,
            ReplInput::Help => print_help(),
            ReplInput::New => {
                session.conversation_id = None;
                session.pending.clear();
                println!("Started a new conversation.");
                print_opening(&params);
            }
            ReplInput::Attach(path) => match attach(&mut session, &path).await {
                Ok(name) => println!("Attached {name}; it will be sent with your next message."),
                Err(e) => eprintln!("error: {e:#}"),
            },
            ReplInput::Query(query) => {
                if let Err(e) = send(ctx, &mut session, query).await {
                    eprintln!("\nerror: {e:#}");
                }
            }
        }
    }
    Ok(())
}

async fn attach(session: &mut Session, path: &Path) -> Result<String> {
    if !session.images_allowed {
        bail!("image upload is not enabled for this app");
    }
    if path.as_os_str().is_empty() {
        bail!("usage: /attach <image path>");
    }
    let Some(mime) = image_mime_type(path) else {
        bail!("only png, jpg, gif and webp images can be attached");
    };
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image")
        .to_string();
    let uploaded = session
        .client
        .upload_file(&name, mime, bytes, &session.user.id)
        .await?;
    session.pending.push(PendingImage {
        chat_file: ChatFile::uploaded_image(&uploaded.id),
        file_ref: FileRef {
            id: uploaded.id,
            name: name.clone(),
            mime_type: mime.to_string(),
            url: uploaded.url.unwrap_or_default(),
        },
    });
    Ok(name)
}

/// Request and local user message for `query`, carrying the pending images.
/// The images stay pending until the turn is known to have gone out.
fn build_request(session: &Session, query: &str) -> (ChatRequest, Message) {
    let mut request = ChatRequest::new(query, &session.user.id);
    if let Some(id) = &session.conversation_id {
        request = request.conversation_id(id);
    }
    let mut files = Vec::with_capacity(session.pending.len());
    for image in &session.pending {
        request = request.file(image.chat_file.clone());
        files.push(image.file_ref.clone());
    }
    let user_message = Message::new(Role::User, "", query).with_files(files);
    (request, user_message)
}

async fn send(ctx: &Context, session: &mut Session, query: String) -> Result<()> {
    let (request, user_message) = build_request(session, &query);

    let (abort, signal) = AbortHandle::new();
    let backend: Arc<dyn ChatBackend> = session.client.clone();
    let turn = ChatTurn::new(backend, request).with_abort(signal);
    let run = turn.run(|delta| {
        print!("{}", delta.text);
        let _ = std::io::stdout().flush();
    });
    tokio::pin!(run);
    let outcome = tokio::select! {
        outcome = &mut run => outcome?,
        _ = tokio::signal::ctrl_c() => {
            abort.abort();
            run.await?
        }
    };
    println!();
    session.pending.clear();

    if let Some(cause) = &outcome.interruption {
        if outcome.is_cancelled() {
            println!("[stopped]");
        } else {
            eprintln!("[interrupted: {cause}]");
        }
    }
    if let Some(usage) = &outcome.usage {
        tracing::debug!(
            total_tokens = usage.total_tokens,
            latency = usage.latency,
            "turn usage"
        );
    }

    if let Some(id) = record_turn(&ctx.state, &session.app, &session.user, user_message, &outcome)? {
        session.conversation_id = Some(id);
    }
    Ok(())
}

/// Saves the exchange locally, creating the conversation on first use.
/// Partial answers are kept. Returns the conversation id when known.
fn record_turn(
    state: &LocalState,
    app: &App,
    user: &User,
    mut user_message: Message,
    outcome: &TurnOutcome,
) -> Result<Option<String>> {
    let id = outcome.conversation_id.clone();
    if id.is_empty() {
        return Ok(None);
    }
    match state.conversations.get(&id) {
        Ok(_) => {}
        Err(CoreError::NotFound { .. }) => {
            state
                .conversations
                .add(Conversation::new(&id, &app.id, &user.id, &user_message.content))?;
        }
        Err(e) => return Err(e.into()),
    }
    user_message.conversation_id = id.clone();
    state.conversations.append_message(&id, user_message)?;
    if !outcome.answer.is_empty() {
        let mut reply = Message::new(Role::Assistant, &id, &outcome.answer);
        if !outcome.message_id.is_empty() {
            reply.id = outcome.message_id.clone();
        }
        state.conversations.append_message(&id, reply)?;
    }
    Ok(Some(id))
}

fn print_opening(params: &AppParameters) {
    if let Some(opening) = params.opening_statement.as_deref().filter(|s| !s.is_empty()) {
        println!("\n{opening}");
    }
    for question in &params.suggested_questions {
        println!("  - {question}");
    }
}

pub(crate) fn print_transcript(conversation: &Conversation) {
    println!("== {} ==", conversation.name);
    for message in &conversation.messages {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        println!("\n[{who}] {}", message.content);
        for file in &message.files {
            println!("  (attached {})", file.name);
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /new            start a new conversation");
    println!("  /attach <path>  upload an image for the next message");
    println!("  /quit           leave the chat");
    println!("  Ctrl-C          stop the current answer");
}
