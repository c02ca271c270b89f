use laceup::server::{config::AppConfig, database::Database};
use sqlx::Row;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    println!("Connecting to {}", config.database_url);
    let db = Database::connect_read_only(&config.database_url).await?;

    println!("\n-- profiles --");
    let rows = sqlx::query("SELECT id, first_name, last_name, contact_privacy, role FROM profiles ORDER BY created_at")
        .fetch_all(&db.pool)
        .await?;
    for r in rows.iter() {
        let id: String = r.try_get("id").unwrap_or_default();
        let first_name: Option<String> = r.try_get("first_name").unwrap_or(None);
        let last_name: Option<String> = r.try_get("last_name").unwrap_or(None);
        let privacy: String = r.try_get("contact_privacy").unwrap_or_default();
        let role: String = r.try_get("role").unwrap_or_default();
        println!(
            "id={} name={} {} privacy={} role={}",
            id,
            first_name.unwrap_or_default(),
            last_name.unwrap_or_default(),
            privacy,
            role
        );
    }

    println!("\n-- connections --");
    let rows = sqlx::query("SELECT user_a, user_b, created_at FROM connections")
        .fetch_all(&db.pool)
        .await?;
    for r in rows.iter() {
        let user_a: String = r.try_get("user_a").unwrap_or_default();
        let user_b: String = r.try_get("user_b").unwrap_or_default();
        let created_at: i64 = r.try_get("created_at").unwrap_or(0);
        println!("user_a={} user_b={} created_at={}", user_a, user_b, created_at);
    }

    println!("\n-- thread_participants --");
    let rows = sqlx::query("SELECT thread_id, user_id, joined_at FROM thread_participants ORDER BY thread_id, joined_at")
        .fetch_all(&db.pool)
        .await?;
    for r in rows.iter() {
        let thread_id: String = r.try_get("thread_id").unwrap_or_default();
        let user_id: String = r.try_get("user_id").unwrap_or_default();
        let joined_at: i64 = r.try_get("joined_at").unwrap_or(0);
        println!("thread_id={} user_id={} joined_at={}", thread_id, user_id, joined_at);
    }

    println!("\n-- messages (last 10) --");
    let rows = sqlx::query(
        "SELECT id, sender_id, receiver_id, thread_id, text, created_at, read_at, system_message_type
         FROM messages ORDER BY created_at DESC LIMIT 10",
    )
    .fetch_all(&db.pool)
    .await?;
    for r in rows.iter() {
        let id: String = r.try_get("id").unwrap_or_default();
        let sender_id: String = r.try_get("sender_id").unwrap_or_default();
        let receiver_id: Option<String> = r.try_get("receiver_id").unwrap_or(None);
        let thread_id: Option<String> = r.try_get("thread_id").unwrap_or(None);
        let text: String = r.try_get("text").unwrap_or_default();
        let created_at: i64 = r.try_get("created_at").unwrap_or(0);
        let read_at: Option<i64> = r.try_get("read_at").unwrap_or(None);
        let system: Option<String> = r.try_get("system_message_type").unwrap_or(None);
        println!(
            "id={} sender_id={} to={} text_len={} created_at={} read_at={:?} system={:?}",
            id,
            sender_id,
            receiver_id.or(thread_id).unwrap_or_default(),
            text.chars().count(),
            created_at,
            read_at,
            system
        );
    }

    println!("\n-- typing_status --");
    let rows = sqlx::query("SELECT user_id, conversation_id, started_at FROM typing_status")
        .fetch_all(&db.pool)
        .await?;
    for r in rows.iter() {
        let user_id: String = r.try_get("user_id").unwrap_or_default();
        let conversation_id: String = r.try_get("conversation_id").unwrap_or_default();
        let started_at: i64 = r.try_get("started_at").unwrap_or(0);
        println!("user_id={} conversation_id={} started_at={}", user_id, conversation_id, started_at);
    }

    Ok(())
}
