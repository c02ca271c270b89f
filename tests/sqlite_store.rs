use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use laceup::common::{new_identifier, MessageRow, MessageTarget, Profile, SystemMessageType, Thread, ThreadMember};
use laceup::server::{Database, MessageStore, ProfileStore, SqliteStore, ThreadStore};

async fn store() -> SqliteStore {
    let db = Database::in_memory().await.unwrap();
    db.migrate().await.unwrap();
    SqliteStore::new(Arc::new(db))
}

fn at(minutes: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap() + Duration::minutes(minutes)
}

fn row(id: &str, target: MessageTarget, minutes: i64, system: Option<SystemMessageType>) -> MessageRow {
    MessageRow {
        id: id.to_string(),
        sender_id: new_identifier(),
        target,
        text: format!("at {}", minutes),
        created_at: at(minutes),
        read_at: None,
        image_url: None,
        file_url: None,
        file_name: None,
        system_message_type: system,
    }
}

async fn thread_with(store: &SqliteStore, members: &[&str]) -> String {
    let thread = Thread {
        id: new_identifier(),
        name: None,
        created_by: members[0].to_string(),
        created_at: at(0),
        participants: members
            .iter()
            .map(|m| ThreadMember { user_id: m.to_string(), joined_at: at(0) })
            .collect(),
    };
    store.insert_thread(&thread).await.unwrap();
    thread.id
}

async fn member_ids(store: &SqliteStore, thread_id: &str) -> Vec<String> {
    let thread = store.fetch_thread(thread_id).await.unwrap().unwrap();
    thread.participants.into_iter().map(|m| m.user_id).collect()
}

#[tokio::test]
async fn failed_notice_rolls_back_the_membership_change() {
    let store = store().await;
    let (me, amy, yan) = (new_identifier(), new_identifier(), new_identifier());
    let thread_id = thread_with(&store, &[&me, &amy]).await;
    let target = MessageTarget::Thread { thread_id: thread_id.clone() };

    // A notice reusing an existing message id cannot be stored.
    let taken = new_identifier();
    store.insert_message(&row(&taken, target.clone(), 1, None)).await.unwrap();

    let leaving = row(&taken, target.clone(), 2, Some(SystemMessageType::UserLeft));
    assert!(store.remove_participant(&thread_id, &amy, &leaving).await.is_err());
    assert_eq!(member_ids(&store, &thread_id).await, vec![me.clone(), amy.clone()]);

    let joining = row(&taken, target.clone(), 3, Some(SystemMessageType::UserJoined));
    let member = ThreadMember { user_id: yan.clone(), joined_at: at(3) };
    assert!(store.add_participant(&thread_id, &member, &joining).await.is_err());
    assert_eq!(member_ids(&store, &thread_id).await, vec![me.clone(), amy.clone()]);

    let stored = store.fetch_thread_messages(&[thread_id.clone()]).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].system_message_type, None);
}

#[tokio::test]
async fn removing_a_non_member_writes_nothing() {
    let store = store().await;
    let me = new_identifier();
    let thread_id = thread_with(&store, &[&me]).await;
    let notice = row(
        &new_identifier(),
        MessageTarget::Thread { thread_id: thread_id.clone() },
        1,
        Some(SystemMessageType::UserLeft),
    );

    assert!(!store.remove_participant(&thread_id, &new_identifier(), &notice).await.unwrap());
    assert!(store.fetch_thread_messages(&[thread_id.clone()]).await.unwrap().is_empty());
    assert_eq!(member_ids(&store, &thread_id).await, vec![me]);
}

#[tokio::test]
async fn long_id_lists_are_split_across_queries() {
    let store = store().await;

    let mut profile_ids: Vec<String> = (0..1200).map(|_| new_identifier()).collect();
    for slot in [0, 600, 1199] {
        let profile = Profile {
            id: profile_ids[slot].clone(),
            first_name: None,
            last_name: None,
            avatar_url: None,
            email: None,
            phone: None,
            contact_privacy: Default::default(),
            role: Default::default(),
            created_at: at(0),
        };
        store.insert_profile(&profile).await.unwrap();
    }
    assert_eq!(store.fetch_profiles(&profile_ids).await.unwrap().len(), 3);
    profile_ids.truncate(1);
    assert_eq!(store.fetch_profiles(&profile_ids).await.unwrap().len(), 1);

    // Two threads land in different chunks; the later chunk holds the older message.
    let mut thread_ids: Vec<String> = (0..1001).map(|_| new_identifier()).collect();
    let (first, last) = (thread_ids[0].clone(), thread_ids[1000].clone());
    store
        .insert_message(&row(&new_identifier(), MessageTarget::Thread { thread_id: first.clone() }, 5, None))
        .await
        .unwrap();
    store
        .insert_message(&row(&new_identifier(), MessageTarget::Thread { thread_id: last.clone() }, 1, None))
        .await
        .unwrap();
    let messages = store.fetch_thread_messages(&thread_ids).await.unwrap();
    let order: Vec<_> = messages.iter().map(|m| m.created_at).collect();
    assert_eq!(order, vec![at(1), at(5)]);

    let mut read_ids: Vec<String> = (0..1001).map(|_| new_identifier()).collect();
    read_ids[3] = messages[0].id.clone();
    read_ids[999] = messages[1].id.clone();
    assert_eq!(store.mark_messages_read(&read_ids, at(10)).await.unwrap(), 2);

    thread_ids.clear();
    assert!(store.fetch_thread_messages(&thread_ids).await.unwrap().is_empty());
}

#[tokio::test]
async fn read_only_open_never_creates_a_database() {
    let path = std::env::temp_dir().join(format!("laceup-missing-{}.db", new_identifier()));
    let url = format!("sqlite://{}", path.display());

    assert!(Database::connect_read_only(&url).await.is_err());
    assert!(!path.exists());

    let db = Database::connect(&url, 1).await.unwrap();
    db.migrate().await.unwrap();
    db.pool.close().await;

    let inspect = Database::connect_read_only(&url).await.unwrap();
    let write = sqlx::query("INSERT INTO threads (id, created_by, created_at) VALUES ('t', 'u', 0)")
        .execute(&inspect.pool)
        .await;
    assert!(write.is_err());
    inspect.pool.close().await;
    std::fs::remove_file(&path).unwrap();
}
