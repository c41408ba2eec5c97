use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use roster_core::config::Config;
use roster_core::core_access::{
    Action, ActionKind, AddPolicy, Conversation, ConversationAccessService, ConversationId,
    ConversationSettings, ConversationType, JoinToken, NewConversation, Participant,
    ParticipantRole, SqlConversationStore, Timestamp, UserId,
};
use roster_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use roster_core::AccessError;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "roster")]
#[command(author, version, about = "Conversation access control", long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// SQLite database, overrides the configured path
    #[arg(long)]
    db: Option<String>,

    /// Set the log level (trace, debug, info, warn, error); overrides the config
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Acting user
    #[arg(long = "as", global = true)]
    acting: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage known users
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    /// Create a conversation; the acting user becomes its creator
    Create {
        #[arg(long, default_value = "group")]
        kind: ConversationType,
        #[arg(long)]
        name: Option<String>,
        /// Initial member (repeatable)
        #[arg(long = "member")]
        members: Vec<String>,
        #[arg(long, default_value = "admins_only")]
        policy: AddPolicy,
    },
    /// Show a conversation
    Show { conversation: String },
    /// Add a participant
    Add {
        conversation: String,
        user: String,
        #[arg(long, default_value = "member")]
        role: ParticipantRole,
    },
    /// Invite a participant
    Invite {
        conversation: String,
        user: String,
        #[arg(long, default_value = "member")]
        role: ParticipantRole,
    },
    /// Accept a pending invitation as the acting user
    Accept { conversation: String },
    /// Remove a participant
    Remove { conversation: String, user: String },
    /// Change a participant's role
    Role {
        conversation: String,
        user: String,
        role: ParticipantRole,
    },
    /// Generate a join link, replacing any previous one
    Link {
        conversation: String,
        /// Days until expiry
        #[arg(long)]
        days: Option<u32>,
        /// Maximum number of joins
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Join through a token or share URL
    Join { token: String },
    /// Ask whether the acting user may perform an action
    Can {
        conversation: String,
        action: ActionKind,
        #[arg(long)]
        target: Option<String>,
        #[arg(long)]
        role: Option<ParticipantRole>,
    },
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Register users
    Add {
        #[arg(required = true)]
        users: Vec<String>,
    },
}

/// Join link as shown to operators; the token itself is never printed here
#[derive(Serialize)]
struct LinkView {
    fingerprint: String,
    created_by: UserId,
    created_at: Timestamp,
    expires_at: Timestamp,
    usage_limit: Option<u32>,
    usage_count: u32,
    valid: bool,
}

#[derive(Serialize)]
struct ConversationView<'a> {
    id: &'a ConversationId,
    kind: ConversationType,
    name: Option<&'a str>,
    settings: &'a ConversationSettings,
    participants: &'a [Participant],
    join_link: Option<LinkView>,
    created_by: &'a UserId,
    version: u64,
}

impl<'a> From<&'a Conversation> for ConversationView<'a> {
    fn from(conversation: &'a Conversation) -> Self {
        let now = Timestamp::now();
        ConversationView {
            id: &conversation.id,
            kind: conversation.kind,
            name: conversation.name.as_deref(),
            settings: &conversation.settings,
            participants: conversation.participants.records(),
            join_link: conversation.join_link().map(|link| LinkView {
                fingerprint: link.token.fingerprint(),
                created_by: link.created_by.clone(),
                created_at: link.created_at,
                expires_at: link.expires_at,
                usage_limit: link.usage_limit,
                usage_count: link.usage_count,
                valid: link.is_valid_at(now),
            }),
            created_by: &conversation.created_by,
            version: conversation.version,
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(shellexpand::tilde(path).into_owned())
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => Config::from_env()?,
    };
    if let Some(db) = &args.db {
        config.store.database_path = PathBuf::from(shellexpand::tilde(db).into_owned());
    }
    Ok(config)
}

fn open_store(config: &Config) -> Result<Arc<SqlConversationStore>> {
    let path = &config.store.database_path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let store = SqlConversationStore::open(path, config.store.pool_size)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    debug!(path = %path.display(), "Database opened");
    Ok(Arc::new(store))
}

fn acting_user(args: &Args) -> Result<UserId> {
    match &args.acting {
        Some(user) => Ok(UserId::new(user.as_str())),
        None => bail!("this command needs an acting user, pass --as <user>"),
    }
}

/// Accept either a bare token or a share URL ending in `/join/<token>`
fn parse_token(raw: &str) -> JoinToken {
    let token = raw
        .rsplit_once("/join/")
        .map(|(_, tail)| tail)
        .unwrap_or(raw)
        .trim_end_matches('/');
    JoinToken::new(token)
}

async fn execute(args: &Args, config: &Config) -> Result<Value> {
    let store = open_store(config)?;
    let service =
        ConversationAccessService::new(store.clone(), store.clone(), config.access.clone());

    let value = match &args.command {
        Command::User {
            command: UserCommand::Add { users },
        } => {
            for user in users {
                store.register_user(&UserId::new(user.as_str()))?;
            }
            info!(count = users.len(), "Users registered");
            json!({ "registered": users })
        }
        Command::Create {
            kind,
            name,
            members,
            policy,
        } => {
            let request = NewConversation {
                kind: *kind,
                name: name.clone(),
                creator: acting_user(args)?,
                members: members.iter().map(|m| UserId::new(m.as_str())).collect(),
                settings: ConversationSettings {
                    who_can_add_participants: *policy,
                },
            };
            let conversation = service.create_conversation(request).await?;
            serde_json::to_value(ConversationView::from(&conversation))?
        }
        Command::Show { conversation } => {
            let conversation = service
                .get_conversation(&ConversationId::new(conversation.as_str()))
                .await?;
            serde_json::to_value(ConversationView::from(&conversation))?
        }
        Command::Add {
            conversation,
            user,
            role,
        } => {
            let participant = service
                .add_participant(
                    &ConversationId::new(conversation.as_str()),
                    &UserId::new(user.as_str()),
                    &acting_user(args)?,
                    *role,
                )
                .await?;
            serde_json::to_value(participant)?
        }
        Command::Invite {
            conversation,
            user,
            role,
        } => {
            let participant = service
                .invite_participant(
                    &ConversationId::new(conversation.as_str()),
                    &UserId::new(user.as_str()),
                    &acting_user(args)?,
                    *role,
                )
                .await?;
            serde_json::to_value(participant)?
        }
        Command::Accept { conversation } => {
            let participant = service
                .accept_invitation(&ConversationId::new(conversation.as_str()), &acting_user(args)?)
                .await?;
            serde_json::to_value(participant)?
        }
        Command::Remove { conversation, user } => {
            service
                .remove_participant(
                    &ConversationId::new(conversation.as_str()),
                    &UserId::new(user.as_str()),
                    &acting_user(args)?,
                )
                .await?;
            json!({ "removed": user })
        }
        Command::Role {
            conversation,
            user,
            role,
        } => {
            let participant = service
                .update_participant_role(
                    &ConversationId::new(conversation.as_str()),
                    &UserId::new(user.as_str()),
                    *role,
                    &acting_user(args)?,
                )
                .await?;
            serde_json::to_value(participant)?
        }
        Command::Link {
            conversation,
            days,
            limit,
        } => {
            let link = service
                .generate_join_link(
                    &ConversationId::new(conversation.as_str()),
                    &acting_user(args)?,
                    *days,
                    *limit,
                )
                .await?;
            json!({
                "url": service.share_url(&link),
                "token": link.token.expose_secret(),
                "expires_at": link.expires_at,
                "usage_limit": link.usage_limit,
            })
        }
        Command::Join { token } => {
            let outcome = service
                .join_by_token(&parse_token(token), &acting_user(args)?)
                .await?;
            serde_json::to_value(outcome)?
        }
        Command::Can {
            conversation,
            action,
            target,
            role,
        } => {
            let action = Action::from_parts(
                *action,
                target.as_deref().map(UserId::new),
                *role,
            )?;
            let allowed = service
                .evaluate(
                    &ConversationId::new(conversation.as_str()),
                    &acting_user(args)?,
                    &action,
                )
                .await?;
            json!({ "action": action.kind(), "allowed": allowed })
        }
    };
    Ok(value)
}

/// Exit code per error category
fn exit_code(err: &anyhow::Error) -> u8 {
    use roster_core::ErrorKind;
    match err.downcast_ref::<AccessError>().map(AccessError::kind) {
        Some(ErrorKind::Validation) => 2,
        Some(ErrorKind::Authorization) => 3,
        Some(ErrorKind::NotFound) => 4,
        Some(ErrorKind::Conflict) => 5,
        Some(ErrorKind::InvariantViolation) | Some(ErrorKind::Storage) => 6,
        None => 1,
    }
}

fn report(err: &anyhow::Error) {
    let kind = err
        .downcast_ref::<AccessError>()
        .map(|e| e.kind().to_string())
        .unwrap_or_else(|| "error".to_string());
    eprintln!("{}", json!({ "error": kind, "message": format!("{:#}", err) }));
}

/// Logging setup from the config file, with command-line flags on top
fn log_config(args: &Args, config: &Config) -> Result<LogConfig> {
    let mut log_config =
        LogConfig::try_from(&config.logging).context("invalid logging configuration")?;
    if let Some(level) = &args.log_level {
        log_config.level = level
            .parse::<LogLevel>()
            .with_context(|| format!("invalid log level '{}'", level))?;
    }
    if args.json_logs {
        log_config = log_config.json_format(true);
    }
    Ok(log_config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            report(&err);
            return ExitCode::from(exit_code(&err));
        }
    };

    let log_config = match log_config(&args, &config) {
        Ok(log_config) => log_config,
        Err(err) => {
            report(&err);
            return ExitCode::from(exit_code(&err));
        }
    };
    if let Err(err) = init_logging_with_config(log_config) {
        eprintln!("{}", err);
    }
    roster_core::metrics::init_metrics();

    match execute(&args, &config).await {
        Ok(value) => {
            match serde_json::to_string_pretty(&value) {
                Ok(out) => println!("{}", out),
                Err(err) => {
                    eprintln!("{}", err);
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            report(&err);
            ExitCode::from(exit_code(&err))
        }
    }
}
