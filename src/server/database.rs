use std::str::FromStr;
use std::time::Duration;

use log::{debug, info, error};
use sqlx::{SqlitePool, sqlite::{SqliteConnectOptions, SqlitePoolOptions}};

#[derive(Debug, Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        info!("🔗 Connecting to database: {}", database_url);

        if !database_url.contains(":memory:") {
            // Extract file path from database URL to create directory if needed
            let file_path = if let Some(path_part) = database_url.strip_prefix("sqlite://") {
                path_part.split('?').next().unwrap_or(path_part)
            } else if let Some(path_part) = database_url.strip_prefix("sqlite:") {
                path_part.split('?').next().unwrap_or(path_part)
            } else {
                database_url
            };

            if let Some(parent) = std::path::Path::new(file_path).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    debug!("📁 Creating database directory {:?}", parent);
                    std::fs::create_dir_all(parent).map_err(|e| {
                        error!("❌ Failed to create directory {:?}: {}", parent, e);
                        sqlx::Error::Configuration(Box::new(e))
                    })?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("❌ SQLite connection failed: {}", e);
                e
            })?;

        info!("✅ Database connection successful");
        Ok(Self { pool })
    }

    /// Opens an existing database without creating or writing anything.
    pub async fn connect_read_only(database_url: &str) -> Result<Self, sqlx::Error> {
        info!("🔗 Opening database read-only: {}", database_url);
        let options = SqliteConnectOptions::from_str(database_url)?.read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("❌ SQLite connection failed: {}", e);
                e
            })?;
        Ok(Self { pool })
    }

    /// Private in-memory database on a single connection that is never recycled.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        // Profiles
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                first_name TEXT,
                last_name TEXT,
                avatar_url TEXT,
                email TEXT,
                phone TEXT,
                contact_privacy TEXT NOT NULL DEFAULT 'connections',
                role TEXT NOT NULL DEFAULT 'athlete',
                created_at INTEGER NOT NULL
            );
        "#).execute(&self.pool).await?;

        // Connections, one row per unordered pair (user_a < user_b)
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS connections (
                user_a TEXT NOT NULL,
                user_b TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (user_a, user_b)
            );
        "#).execute(&self.pool).await?;

        // Group threads
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS threads (
                id TEXT PRIMARY KEY,
                name TEXT,
                created_by TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
        "#).execute(&self.pool).await?;

        // Thread members
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS thread_participants (
                thread_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                joined_at INTEGER NOT NULL,
                PRIMARY KEY (thread_id, user_id)
            );
        "#).execute(&self.pool).await?;

        // Messages: exactly one of receiver_id / thread_id is set
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                sender_id TEXT NOT NULL,
                receiver_id TEXT,
                thread_id TEXT,
                text TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                read_at INTEGER,
                image_url TEXT,
                file_url TEXT,
                file_name TEXT,
                system_message_type TEXT,
                CHECK ((receiver_id IS NULL) <> (thread_id IS NULL))
            );
        "#).execute(&self.pool).await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages (sender_id);")
            .execute(&self.pool).await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_receiver ON messages (receiver_id);")
            .execute(&self.pool).await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages (thread_id, created_at);")
            .execute(&self.pool).await?;

        // Typing status (ephemeral)
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS typing_status (
                user_id TEXT NOT NULL,
                conversation_id TEXT NOT NULL,
                started_at INTEGER NOT NULL,
                PRIMARY KEY (user_id, conversation_id)
            );
        "#).execute(&self.pool).await?;

        Ok(())
    }
}
