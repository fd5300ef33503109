//! `tardichat` — terminal client for the Tardigrade chat service.
//!
//! ```bash
//! # Log in and print a token
//! tardichat --username ann --password hunter2 login
//!
//! # List channels
//! TARDICHAT_TOKEN=... tardichat channels
//!
//! # Follow channel 7; every stdin line is sent as a message
//! TARDICHAT_TOKEN=... tardichat chat 7
//! ```

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_appender::non_blocking::WorkerGuard;

use tardichat::api::{ApiError, Endpoints, HttpApi};
use tardichat::auth::TokenStore;
use tardichat::config::{CliArgs, ClientConfig, Command, Credentials};
use tardichat::session::{SessionController, SessionError, SessionState};
use tardichat::transport::ConnectionState;
use tardichat_proto::message::{ChannelId, Message, MessageContent, MessageId};

/// Failures reported to the user before exiting non-zero.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] tardichat::config::ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("login needs --username and --password")]
    MissingCredentials,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    let Some(command) = cli.command.clone() else {
        let _ = CliArgs::command().print_help();
        return ExitCode::from(2);
    };

    tracing::info!(?command, "tardichat starting");
    let result = match ClientConfig::load(&cli) {
        Ok(config) => run(command, &config).await,
        Err(e) => Err(e.into()),
    };
    tracing::info!("tardichat exiting");

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Logs go to a file so stdout stays free for chat output. Returns a
/// [`WorkerGuard`] that must be held until shutdown to flush buffered
/// entries.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("tardichat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(command: Command, config: &ClientConfig) -> Result<(), CliError> {
    let endpoints = config.endpoints()?;
    let tokens = TokenStore::new();
    let api = HttpApi::new(endpoints.clone(), tokens, config.request_timeout)?;

    match command {
        Command::Login => {
            let Credentials::Login { username, password } = &config.credentials else {
                return Err(CliError::MissingCredentials);
            };
            let token = api.login(username, password).await?;
            println!("{token}");
        }
        Command::Channels => {
            authenticate(&api, &config.credentials).await?;
            for channel in api.list_channels().await? {
                let lock = if channel.is_private { " (private)" } else { "" };
                if channel.description.is_empty() {
                    println!("{:>6}  {}{lock}", channel.id, channel.name);
                } else {
                    println!(
                        "{:>6}  {}{lock}  {}",
                        channel.id, channel.name, channel.description
                    );
                }
            }
        }
        Command::Chat { channel } => {
            authenticate(&api, &config.credentials).await?;
            chat(api, endpoints, config, channel).await?;
        }
    }
    Ok(())
}

/// Put a bearer token into the API's store, logging in if needed.
async fn authenticate(api: &HttpApi, credentials: &Credentials) -> Result<(), ApiError> {
    match credentials {
        Credentials::Token(token) => api.tokens().set(token.clone()),
        Credentials::Login { username, password } => {
            api.login(username, password).await?;
        }
        Credentials::Anonymous => {
            tracing::warn!("no credentials configured, protected routes will be rejected");
        }
    }
    Ok(())
}

/// Follow `channel` until stdin closes or Ctrl-C is pressed.
async fn chat(
    api: HttpApi,
    endpoints: Endpoints,
    config: &ClientConfig,
    channel: ChannelId,
) -> Result<(), CliError> {
    let tokens = api.tokens().clone();
    let connector = config.ws_connector(endpoints);
    let controller = SessionController::new(api, connector, tokens, config.session_config());

    let printer = tokio::spawn(print_updates(
        controller.subscribe(),
        config.timestamp_format.clone(),
    ));

    if let Err(e) = controller.activate(channel).await {
        printer.abort();
        return Err(e.into());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let result = loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    // Failures are already surfaced through the state error.
                    if let Err(e) = controller.send_text(&line).await {
                        tracing::debug!(err = %e, "send failed");
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e.into()),
            },
            _ = tokio::signal::ctrl_c() => break Ok(()),
        }
    };

    controller.teardown();
    printer.abort();
    result
}

/// Print new messages, connection changes and errors as they are published.
async fn print_updates(mut rx: watch::Receiver<SessionState>, timestamp_format: String) {
    let mut printed: HashSet<MessageId> = HashSet::new();
    let mut connection = ConnectionState::Disconnected;
    let mut error: Option<String> = None;

    loop {
        {
            let state = rx.borrow_and_update();
            for message in state.messages.iter() {
                if printed.insert(message.id.clone()) {
                    println!("{}", format_message(message, &timestamp_format));
                }
            }
            if state.connection != connection {
                connection = state.connection;
                eprintln!("-- {connection}");
            }
            if state.error != error {
                if let Some(e) = &state.error {
                    eprintln!("!! {e}");
                }
                error.clone_from(&state.error);
            }
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}

fn format_message(message: &Message, timestamp_format: &str) -> String {
    let millis = message.timestamp.as_millis();
    let mut line = String::new();
    let formatted = chrono::DateTime::from_timestamp_millis(millis).is_some_and(|at| {
        write!(
            line,
            "{}",
            at.with_timezone(&chrono::Local).format(timestamp_format)
        )
        .is_ok()
    });
    if !formatted {
        line = millis.to_string();
    }

    match &message.content {
        MessageContent::Text(text) => format!("[{line}] {text}"),
        MessageContent::Other { kind, .. } => format!("[{line}] <{kind}>"),
    }
}
