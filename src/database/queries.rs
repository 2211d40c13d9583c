use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite};

use super::Database;
use crate::error::LedgerError;
use crate::ledger::entry::{format_timestamp, LedgerEntry, PendingEntry};
use crate::ledger::store::{LedgerBackend, ScannedEntry};

const ENTRY_COLUMNS: &str = r#"
    id, tenant_id, sequence, actor_name, source_ip, browser, operating_system,
    entity_kind, operation_kind, payload, status, previous_hash, current_hash, timestamp
"#;

/// Decode a column, recording a defect instead of failing when the stored value no longer fits.
fn lenient_column<'r, T>(row: &'r SqliteRow, column: &str, defects: &mut Vec<String>) -> T
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite> + Default,
{
    row.try_get(column).unwrap_or_else(|e| {
        defects.push(format!("{} does not decode: {}", column, e));
        T::default()
    })
}

fn scanned_from_row(row: &SqliteRow) -> Result<ScannedEntry, LedgerError> {
    let mut defects = Vec::new();
    let raw_payload: String = lenient_column(row, "payload", &mut defects);
    let raw_timestamp: String = lenient_column(row, "timestamp", &mut defects);

    let payload = match serde_json::from_str(&raw_payload) {
        Ok(payload) => payload,
        Err(e) => {
            defects.push(format!("payload is not JSON: {}", e));
            Value::String(raw_payload)
        }
    };
    let timestamp = match DateTime::parse_from_rfc3339(&raw_timestamp) {
        Ok(timestamp) => timestamp.with_timezone(&Utc),
        Err(e) => {
            defects.push(format!("invalid timestamp {:?}: {}", raw_timestamp, e));
            DateTime::<Utc>::default()
        }
    };

    let entry = LedgerEntry {
        id: row.try_get("id")?,
        tenant_id: lenient_column(row, "tenant_id", &mut defects),
        sequence: lenient_column(row, "sequence", &mut defects),
        actor_name: lenient_column(row, "actor_name", &mut defects),
        source_ip: lenient_column(row, "source_ip", &mut defects),
        browser: lenient_column(row, "browser", &mut defects),
        operating_system: lenient_column(row, "operating_system", &mut defects),
        entity_kind: lenient_column(row, "entity_kind", &mut defects),
        operation_kind: lenient_column(row, "operation_kind", &mut defects),
        payload,
        status: lenient_column(row, "status", &mut defects),
        previous_hash: lenient_column(row, "previous_hash", &mut defects),
        current_hash: lenient_column(row, "current_hash", &mut defects),
        timestamp,
    };

    Ok(ScannedEntry {
        entry,
        defect: (!defects.is_empty()).then(|| defects.join("; ")),
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, LedgerError> {
    let scanned = scanned_from_row(row)?;
    match scanned.defect {
        Some(defect) => Err(LedgerError::Serialization(format!(
            "entry {}: {}",
            scanned.entry.id, defect
        ))),
        None => Ok(scanned.entry),
    }
}

#[async_trait]
impl LedgerBackend for Database {
    async fn latest(&self, tenant_id: &str) -> Result<Option<LedgerEntry>, LedgerError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM ledger_entries
            WHERE tenant_id = ?
            ORDER BY timestamp DESC, sequence DESC
            LIMIT 1
            "#,
            ENTRY_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(entry_from_row).transpose()
    }

    async fn append(&self, entry: PendingEntry) -> Result<LedgerEntry, LedgerError> {
        let result = sqlx::query(
            r#"
            INSERT INTO ledger_entries
            (tenant_id, sequence, actor_name, source_ip, browser, operating_system,
             entity_kind, operation_kind, payload, status, previous_hash, current_hash, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.tenant_id)
        .bind(entry.sequence)
        .bind(&entry.actor_name)
        .bind(&entry.source_ip)
        .bind(&entry.browser)
        .bind(&entry.operating_system)
        .bind(&entry.entity_kind)
        .bind(&entry.operation_kind)
        .bind(serde_json::to_string(&entry.payload)?)
        .bind(&entry.status)
        .bind(entry.previous_hash.as_deref())
        .bind(&entry.current_hash)
        .bind(format_timestamp(&entry.timestamp))
        .execute(self.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                LedgerError::ConcurrentAppend {
                    tenant_id: entry.tenant_id.clone(),
                }
            }
            other => LedgerError::from(other),
        })?;

        Ok(entry.into_entry(result.last_insert_rowid()))
    }

    async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM ledger_entries
            WHERE tenant_id = ?
            ORDER BY timestamp ASC, sequence ASC
            "#,
            ENTRY_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn scan_by_tenant(&self, tenant_id: &str) -> Result<Vec<ScannedEntry>, LedgerError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM ledger_entries
            WHERE tenant_id = ?
            ORDER BY timestamp ASC, sequence ASC
            "#,
            ENTRY_COLUMNS
        ))
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(scanned_from_row).collect()
    }

    async fn list_tenants(&self) -> Result<Vec<String>, LedgerError> {
        let rows = sqlx::query("SELECT DISTINCT tenant_id FROM ledger_entries ORDER BY tenant_id")
            .fetch_all(self.pool())
            .await?;

        rows.iter()
            .map(|row| row.try_get("tenant_id").map_err(LedgerError::from))
            .collect()
    }

    async fn entry_count(&self, tenant_id: &str) -> Result<u64, LedgerError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM ledger_entries WHERE tenant_id = ?")
            .bind(tenant_id)
            .fetch_one(self.pool())
            .await?;

        let count: i64 = row.try_get("count")?;
        Ok(count as u64)
    }
}
