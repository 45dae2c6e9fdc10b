//! `smartseva sessions` — Inspect and prune the session log.

use smartseva_core::message::SessionId;
use smartseva_core::session::SessionStore;
use smartseva_memory::FileSessionStore;

use super::{CmdResult, load_config};

fn open_store() -> CmdResult<FileSessionStore> {
    let config = load_config()?;
    Ok(FileSessionStore::new(config.storage.chat_history_path()))
}

pub async fn list() -> CmdResult {
    let store = open_store()?;
    let sessions = store.list().await?;
    if sessions.is_empty() {
        println!("  No sessions stored at {}", store.path().display());
        return Ok(());
    }

    println!("  {:<38} {:>5}  {:<16}  TITLE", "ID", "MSGS", "UPDATED");
    for s in sessions {
        println!(
            "  {:<38} {:>5}  {:<16}  {}",
            s.id.as_str(),
            s.message_count,
            s.updated_at.format("%Y-%m-%d %H:%M"),
            s.title
        );
    }
    Ok(())
}

pub async fn show(id: &str) -> CmdResult {
    let store = open_store()?;
    let id = SessionId::parse(id)?;
    let record = store
        .get(&id)
        .await?
        .ok_or_else(|| format!("Session '{id}' not found"))?;

    println!("  {} ({} messages)", record.title, record.message_count);
    println!("  created {}", record.created_at.to_rfc3339());
    println!();
    for message in &record.messages {
        println!(
            "  [{}] {} > {}",
            message.timestamp.format("%H:%M:%S"),
            message.role,
            message.content
        );
    }
    Ok(())
}

pub async fn delete(id: &str) -> CmdResult {
    let store = open_store()?;
    let id = SessionId::parse(id)?;
    if store.delete(&id).await? {
        println!("  Deleted session {id}");
        Ok(())
    } else {
        Err(format!("Session '{id}' not found").into())
    }
}

pub async fn cleanup() -> CmdResult {
    let store = open_store()?;
    let removed = store.cleanup_empty().await?;
    println!("  Removed {removed} empty sessions");
    Ok(())
}
