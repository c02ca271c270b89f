use std::sync::Arc;

use anyhow::{anyhow, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use serde::Serialize;

use laceup::client::services::{
    load_profile_for_viewer, resolve_contact_visibility, update_contact_privacy, InboxService, MessageDraft,
};
use laceup::common::{new_identifier, require_identifier, ContactPrivacy, ConversationKey, Profile, ProfileRole};
use laceup::server::{
    config::AppConfig,
    database::Database,
    sqlite_store::SqliteStore,
    store::{ConnectionStore, ProfileStore},
};
use laceup::utils::logger::LaceUpLogger;

#[derive(Parser)]
#[command(name = "laceup")]
#[command(about = "LaceUp messaging and contact privacy tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Selects a 1:1 conversation (`--with`) or a group thread (`--thread`).
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct ConversationArg {
    #[arg(long)]
    with: Option<String>,
    #[arg(long)]
    thread: Option<String>,
}

impl ConversationArg {
    fn key(&self) -> anyhow::Result<ConversationKey> {
        match (&self.with, &self.thread) {
            (Some(user_id), None) => Ok(ConversationKey::direct(user_id.clone())),
            (None, Some(thread_id)) => Ok(ConversationKey::thread(thread_id.clone())),
            _ => Err(anyhow!("pass exactly one of --with or --thread")),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database tables
    Migrate,
    /// Insert a profile and print its id
    AddProfile {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        avatar_url: Option<String>,
        /// public, private or connections
        #[arg(long)]
        privacy: Option<String>,
        /// athlete, alumni, mentor or employer
        #[arg(long)]
        role: Option<String>,
    },
    /// Connect two profiles
    Connect { a: String, b: String },
    /// Show which contact fields `viewer` may see on `target`
    Visibility {
        #[arg(long)]
        target: String,
        #[arg(long)]
        viewer: String,
    },
    /// Change the contact privacy of your own profile
    SetPrivacy {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        profile: String,
        setting: String,
    },
    /// Print a profile as `viewer` sees it
    Profile {
        id: String,
        #[arg(long)]
        viewer: String,
    },
    /// Print the conversation list of `viewer`
    Inbox {
        #[arg(long)]
        viewer: String,
    },
    /// Print the messages of one conversation
    Messages {
        #[arg(long)]
        viewer: String,
        #[command(flatten)]
        conversation: ConversationArg,
    },
    /// Send a message
    Send {
        #[arg(long)]
        viewer: String,
        #[command(flatten)]
        conversation: ConversationArg,
        #[arg(long, default_value = "")]
        text: String,
        #[arg(long)]
        image_url: Option<String>,
        #[arg(long)]
        file_url: Option<String>,
        #[arg(long)]
        file_name: Option<String>,
    },
    /// Mark a conversation read
    Read {
        #[arg(long)]
        viewer: String,
        #[command(flatten)]
        conversation: ConversationArg,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    LaceUpLogger::init(&config.log_level);

    let database = Arc::new(
        Database::connect(&config.database_url, config.db_max_connections)
            .await
            .with_context(|| format!("cannot open {}", config.database_url))?,
    );
    database.migrate().await.map_err(|e| {
        error!("Database migration failed: {}", e);
        e
    })?;

    let store = Arc::new(SqliteStore::new(database));
    let inbox = InboxService::new(store.clone(), config);

    match cli.command {
        Commands::Migrate => {
            info!("✅ Database migrations completed successfully");
        }
        Commands::AddProfile { id, first_name, last_name, email, phone, avatar_url, privacy, role } => {
            let id = id.unwrap_or_else(new_identifier);
            require_identifier(&id)?;
            let profile = Profile {
                id,
                first_name,
                last_name,
                avatar_url,
                email,
                phone,
                contact_privacy: ContactPrivacy::from_setting(privacy.as_deref()),
                role: ProfileRole::from_setting(role.as_deref()),
                created_at: Utc::now(),
            };
            store.insert_profile(&profile).await?;
            println!("{}", profile.id);
        }
        Commands::Connect { a, b } => {
            require_identifier(&a)?;
            require_identifier(&b)?;
            store.insert_connection(&a, &b).await?;
            println!("connected {} <-> {}", a, b);
        }
        Commands::Visibility { target, viewer } => {
            let privacy = store
                .fetch_profile(&target)
                .await?
                .map(|p| p.contact_privacy)
                .unwrap_or_default();
            let visibility = resolve_contact_visibility(store.as_ref(), &target, &viewer, privacy).await;
            print_json(&visibility)?;
        }
        Commands::SetPrivacy { actor, profile, setting } => {
            let setting = ContactPrivacy::from_setting(Some(&setting));
            update_contact_privacy(store.as_ref(), &actor, &profile, setting).await?;
            println!("{} is now {}", profile, setting.as_str());
        }
        Commands::Profile { id, viewer } => match load_profile_for_viewer(store.as_ref(), &id, &viewer).await? {
            Some(profile) => print_json(&profile)?,
            None => println!("profile {} not found", id),
        },
        Commands::Inbox { viewer } => {
            print_json(&inbox.load_inbox(&viewer).await?)?;
        }
        Commands::Messages { viewer, conversation } => {
            let key = conversation.key()?;
            print_json(&inbox.load_messages(&viewer, &key).await?)?;
        }
        Commands::Send { viewer, conversation, text, image_url, file_url, file_name } => {
            let key = conversation.key()?;
            let draft = MessageDraft { text, image_url, file_url, file_name };
            let message = inbox.send_message(&viewer, &key, draft).await?;
            println!("{}", message.id);
        }
        Commands::Read { viewer, conversation } => {
            let key = conversation.key()?;
            let marked = inbox.mark_conversation_read(&viewer, &key).await?;
            println!("marked {} messages read", marked);
        }
    }

    Ok(())
}
