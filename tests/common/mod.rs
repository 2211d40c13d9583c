#![allow(dead_code)]

use std::sync::Arc;

use site_ledger::database::Database;
use site_ledger::ledger::{ActorContext, ChainHasher, Ledger};

/// Setup an in-memory SQLite database for testing
pub async fn setup_test_db() -> Database {
    Database::new_in_memory()
        .await
        .expect("Failed to create test database")
}

/// Ledger over a fresh in-memory database, returned with the database for direct access
pub async fn setup_test_ledger() -> (Ledger, Database) {
    let db = setup_test_db().await;
    let ledger = Ledger::new(Arc::new(db.clone()), ChainHasher::default());
    (ledger, db)
}

pub fn test_actor() -> ActorContext {
    ActorContext::new("alice", "203.0.113.7", "Firefox 121", "Linux")
}

/// Remove the append-only guard, as someone with raw database access could.
pub async fn allow_raw_rewrites(db: &Database) {
    sqlx::query("DROP TRIGGER IF EXISTS ledger_entries_no_update")
        .execute(db.pool())
        .await
        .expect("Failed to drop update trigger");
}

pub async fn overwrite_payload(db: &Database, id: i64, payload: &serde_json::Value) {
    allow_raw_rewrites(db).await;
    sqlx::query("UPDATE ledger_entries SET payload = ? WHERE id = ?")
        .bind(payload.to_string())
        .bind(id)
        .execute(db.pool())
        .await
        .expect("Failed to overwrite payload");
}
