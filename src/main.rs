//! Proposal Chat terminal client
//!
//! Binds to one client/proposal conversation, prints what the advisor sends
//! and forwards each line typed on stdin.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use proposal_chat::adapters::{
    HttpDirectoryConfig, HttpProposalDirectory, IdTokenSource, TungsteniteConnector,
};
use proposal_chat::application::{
    ConnectionManager, ConnectionSettings, MessageRouter, SessionCoordinator, SessionEvent,
    SessionSettings,
};
use proposal_chat::config::AppConfig;
use proposal_chat::domain::conversation::{ConversationIdentity, Sender};
use proposal_chat::domain::foundation::Timestamp;
use proposal_chat::ports::{ClientDirectory, DirectoryError, ProposalDirectory, TokenSource};

#[derive(Parser)]
#[command(name = "proposal-chat")]
#[command(about = "Chat with the proposal advisor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a proposal conversation and chat on stdin
    Chat {
        /// Client name
        client: String,
        /// Proposal name
        proposal: String,
        /// Start a new proposal (sends the initialization message)
        #[arg(long)]
        new: bool,
    },
    /// List proposals known to the directory
    Proposals {
        /// Only list proposals of this client
        #[arg(long)]
        client: Option<String>,
    },
    /// List clients known to the directory
    Clients,
    /// Register a new client
    AddClient {
        /// Client name
        name: String,
        /// Short description
        #[arg(long, default_value = "")]
        description: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load()?;
    init_tracing(&config);
    config.validate()?;

    let tokens = Arc::new(match config.auth.id_token.clone() {
        Some(token) => IdTokenSource::with_token(token),
        None => IdTokenSource::new(),
    });
    let tokens: Arc<dyn TokenSource> = tokens;

    let http_directory = match &config.directory.api_url {
        Some(url) => {
            let directory_config = HttpDirectoryConfig::new(url.clone())
                .with_timeout(config.directory.request_timeout());
            Some(Arc::new(HttpProposalDirectory::new(
                directory_config,
                tokens.clone(),
            )?))
        }
        None => None,
    };
    let directory = http_directory
        .clone()
        .map(|directory| directory as Arc<dyn ProposalDirectory>);
    let clients = http_directory.map(|directory| directory as Arc<dyn ClientDirectory>);

    let connection = Arc::new(ConnectionManager::new(
        Arc::new(TungsteniteConnector::default()),
        tokens,
        Arc::new(MessageRouter::new()),
        ConnectionSettings::new(config.connection.websocket_url.clone())
            .with_connect_timeout(config.connection.connect_timeout())
            .with_ping_debounce(config.connection.ping_debounce())
            .with_reuse_policy(config.connection.reuse_policy),
    ));

    let coordinator = SessionCoordinator::new(
        connection,
        directory,
        SessionSettings {
            keep_alive_interval: config.session.keep_alive_interval(),
            settle_delay: config.session.settle_delay(),
            initialization_message: config.session.initialization_message.clone(),
        },
    );

    let result = match cli.command {
        Commands::Chat {
            client,
            proposal,
            new,
        } => chat(&coordinator, ConversationIdentity::new(client, proposal)?, new).await,
        Commands::Proposals { client } => list_proposals(&coordinator, client.as_deref()).await,
        Commands::Clients => list_clients(clients.as_deref()).await,
        Commands::AddClient { name, description } => {
            add_client(clients.as_deref(), &name, &description).await
        }
    };

    coordinator.shutdown();
    result
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.client.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.is_production() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn chat(
    coordinator: &SessionCoordinator,
    identity: ConversationIdentity,
    new: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let id = if new {
        coordinator.create_conversation(identity.clone())
    } else {
        let id = coordinator.open_conversation(identity.clone(), Timestamp::now());
        match coordinator.load_history(id).await {
            Ok(count) => {
                if let Some(conversation) = coordinator.conversation(id) {
                    for message in conversation.messages().iter().take(count) {
                        print_message(message.sender(), message.content());
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "History unavailable"),
        }
        id
    };

    let listener = coordinator.subscribe(move |event| match event {
        SessionEvent::ConnectionChanged { connected } => {
            println!("-- {}", if *connected { "connected" } else { "disconnected" });
        }
        SessionEvent::StatusChanged {
            status: Some(status),
        } => println!("-- {}", status),
        SessionEvent::MessageAppended {
            conversation_id,
            message,
        } if *conversation_id == id && message.sender() == Sender::Ai => {
            print_message(message.sender(), message.content());
        }
        _ => {}
    });

    if !coordinator.activate(id).await? {
        println!("-- could not reach {}, retrying in the background", identity);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let receipt = coordinator.send(&line).await?;
                if let Some(failure) = receipt.failure {
                    println!("-- not delivered: {}", failure);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    coordinator.unsubscribe(listener);
    Ok(())
}

async fn list_proposals(
    coordinator: &SessionCoordinator,
    client: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    coordinator.load_proposals(client).await?;
    for conversation in coordinator.conversations() {
        println!(
            "{}\t{}",
            conversation.identity(),
            conversation.created_at().to_rfc3339()
        );
    }
    Ok(())
}

async fn list_clients(
    clients: Option<&dyn ClientDirectory>,
) -> Result<(), Box<dyn std::error::Error>> {
    let clients = clients.ok_or(DirectoryError::NotConfigured)?;
    for client in clients.list_clients().await? {
        println!("{}\t{}", client.name, client.description);
    }
    Ok(())
}

async fn add_client(
    clients: Option<&dyn ClientDirectory>,
    name: &str,
    description: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let clients = clients.ok_or(DirectoryError::NotConfigured)?;
    let client = clients.add_client(name, description).await?;
    println!("Added {}", client.name);
    Ok(())
}

fn print_message(sender: Sender, content: &str) {
    match sender {
        Sender::User => println!("you> {}", content),
        Sender::Ai => println!("advisor> {}", content),
    }
}
