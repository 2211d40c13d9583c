// Database schema for the tenant ledger

pub const LEDGER_SCHEMA: &str = include_str!("../../migrations/001_ledger_entries.sql");
