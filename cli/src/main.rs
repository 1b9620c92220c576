use std::time::Duration;

use boardsync::{ConfigError, ConnectionState, LocalUser, NewElement, SyncClient, SyncConfig, SyncError, SyncEvent};
use clap::{Args, Parser, Subcommand};
use frames::{DrawingElement, MessageType};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("not connected to {whiteboard_id} (state {state:?})")]
    NotConnected { whiteboard_id: String, state: ConnectionState },
    #[error("failed to encode element: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to listen for ctrl-c: {0}")]
    Signal(#[source] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "boardsync-cli", about = "Watch and edit a shared whiteboard from the terminal")]
struct Cli {
    /// Relay base URL; the whiteboard id is appended as a path segment.
    #[arg(long, env = "BOARDSYNC_WS_URL")]
    ws_url: Option<String>,

    #[arg(long, env = "BOARDSYNC_USER_ID", default_value = "cli")]
    user_id: String,

    #[arg(long, env = "BOARDSYNC_USER_NAME", default_value = "boardsync-cli")]
    user_name: String,

    #[arg(long, env = "BOARDSYNC_AUTH_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print connection, element and presence changes until ctrl-c.
    Watch { whiteboard_id: String },
    /// Add one element, then leave.
    Draw(DrawCommand),
    /// Remove every element, then leave.
    Clear { whiteboard_id: String },
}

#[derive(Args, Debug)]
struct DrawCommand {
    whiteboard_id: String,

    #[arg(long)]
    color: Option<String>,

    /// How long to stay connected after sending.
    #[arg(long, default_value_t = 250)]
    linger_ms: u64,

    #[command(subcommand)]
    shape: Shape,
}

#[derive(Subcommand, Debug)]
enum Shape {
    Rect { x: f64, y: f64, width: f64, height: f64 },
    Circle { x: f64, y: f64, width: f64, height: f64 },
    Line { x: f64, y: f64, end_x: f64, end_y: f64 },
    Text { x: f64, y: f64, text: String },
}

impl Shape {
    fn into_draft(self) -> NewElement {
        match self {
            Self::Rect { x, y, width, height } => NewElement::rectangle(x, y, width, height),
            Self::Circle { x, y, width, height } => NewElement::circle(x, y, width, height),
            Self::Line { x, y, end_x, end_y } => NewElement::line(x, y, end_x, end_y),
            Self::Text { x, y, text } => NewElement::text(x, y, text),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let mut config = SyncConfig::from_env()?;
    if let Some(url) = &cli.ws_url {
        config.ws_url = SyncConfig::new(url)?.ws_url;
    }
    if let Some(token) = cli.token {
        config = config.with_auth_token(token);
    }
    let mut client = SyncClient::websocket(config, LocalUser::new(cli.user_id, cli.user_name));

    let result = match cli.command {
        Command::Watch { whiteboard_id } => run_watch(&mut client, &whiteboard_id).await,
        Command::Draw(draw) => run_draw(&mut client, draw).await,
        Command::Clear { whiteboard_id } => run_clear(&mut client, &whiteboard_id).await,
    };
    client.disconnect().await;
    result
}

// =============================================================================
// COMMANDS
// =============================================================================

async fn run_watch(client: &mut SyncClient, whiteboard_id: &str) -> Result<(), CliError> {
    // The session keeps retrying after a failed first attempt; keep watching.
    if let Err(e) = client.set_current_whiteboard(Some(whiteboard_id)).await {
        eprintln!("initial connect failed: {e}");
    }
    println!("watching {whiteboard_id} as {}", client.user().id);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal.map_err(CliError::Signal)?;
                return Ok(());
            }
            event = client.next_event() => {
                let Some(event) = event else { return Ok(()) };
                print_event(client, event);
            }
        }
    }
}

async fn run_draw(client: &mut SyncClient, draw: DrawCommand) -> Result<(), CliError> {
    open(client, &draw.whiteboard_id).await?;

    let mut draft = draw.shape.into_draft();
    if let Some(color) = draw.color {
        draft = draft.with_color(color);
    }
    let sent = client.add_element(draft)?;
    println!("{}", serde_json::to_string(&sent.value)?);
    if !sent.delivered {
        return Err(not_connected(client, &draw.whiteboard_id));
    }

    tokio::time::sleep(Duration::from_millis(draw.linger_ms)).await;
    Ok(())
}

async fn run_clear(client: &mut SyncClient, whiteboard_id: &str) -> Result<(), CliError> {
    open(client, whiteboard_id).await?;

    let cleared = client.clear_whiteboard()?;
    if !cleared.delivered {
        return Err(not_connected(client, whiteboard_id));
    }
    println!("cleared {whiteboard_id} ({} local elements)", cleared.value.len());
    Ok(())
}

/// Connect and apply the queued connect transitions so the join goes out.
async fn open(client: &mut SyncClient, whiteboard_id: &str) -> Result<(), CliError> {
    client.set_current_whiteboard(Some(whiteboard_id)).await?;
    while let Some(event) = client.try_next_event() {
        tracing::debug!(?event, "applied startup event");
    }
    Ok(())
}

fn not_connected(client: &SyncClient, whiteboard_id: &str) -> CliError {
    CliError::NotConnected { whiteboard_id: whiteboard_id.to_owned(), state: client.state() }
}

// =============================================================================
// OUTPUT
// =============================================================================

fn print_event(client: &SyncClient, event: SyncEvent) {
    match event {
        SyncEvent::Connection(state) => {
            println!("connection: {state:?}");
            if state == ConnectionState::Failed {
                if let Some(error) = client.last_error() {
                    println!("  last error: {error}");
                }
            }
        }
        SyncEvent::Message(MessageType::Draw | MessageType::Erase | MessageType::Clear) => {
            println!("elements: {}", client.elements().len());
            for element in client.elements() {
                println!("  {}", describe(element));
            }
        }
        SyncEvent::Message(MessageType::UserJoin | MessageType::UserLeave) => {
            let names: Vec<&str> = client.presence().peers().iter().map(|p| p.display_name.as_str()).collect();
            println!("peers: [{}]", names.join(", "));
        }
        SyncEvent::Message(MessageType::Cursor) => {
            for peer in client.presence().peers() {
                if let Some(cursor) = peer.cursor {
                    tracing::trace!(user_id = %peer.user_id, x = cursor.x, y = cursor.y, "cursor");
                }
            }
        }
        SyncEvent::Message(kind) => tracing::trace!(%kind, "message"),
        SyncEvent::Dropped => eprintln!("dropped a malformed frame"),
    }
}

fn describe(element: &DrawingElement) -> String {
    match &element.text {
        Some(text) => format!("{} {} at ({}, {}) {text:?}", element.kind, element.id, element.x, element.y),
        None => format!("{} {} at ({}, {}) by {}", element.kind, element.id, element.x, element.y, element.origin_user_id),
    }
}
