//! Ordered schema migrations
//!
//! Each migration runs in its own transaction and records itself under the
//! `migration` key of the metadata table, so the migrator can be re-run at
//! every startup. The metadata table itself is bootstrapped outside the
//! numbered sequence with `CREATE TABLE IF NOT EXISTS`.

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::info;

/// A single numbered schema change
struct Migration {
    id: i64,
    name: &'static str,
    apply: fn(&Transaction<'_>) -> Result<()>,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        name: "prizes",
        apply: prizes,
    },
    Migration {
        id: 2,
        name: "destinations",
        apply: destinations,
    },
    Migration {
        id: 3,
        name: "cycles",
        apply: cycles,
    },
    Migration {
        id: 4,
        name: "entries",
        apply: entries,
    },
];

/// Bring the schema up to date, skipping already-applied migrations
pub fn apply(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    let applied = last_applied(conn)?;

    for migration in MIGRATIONS.iter().filter(|m| m.id > applied) {
        let tx = conn.transaction()?;
        (migration.apply)(&tx)?;
        record(&tx, migration.id)?;
        tx.commit()?;
        info!(id = migration.id, name = migration.name, "applied migration");
    }

    Ok(())
}

/// The id of the newest applied migration, or 0 on a fresh database
fn last_applied(conn: &Connection) -> Result<i64> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = 'migration'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    let Some(value) = value else { return Ok(0) };
    let parsed: serde_json::Value = serde_json::from_str(&value).unwrap_or_default();
    Ok(parsed.get("id").and_then(|id| id.as_i64()).unwrap_or(0))
}

fn record(tx: &Transaction<'_>, id: i64) -> Result<()> {
    let value = serde_json::json!({
        "id": id,
        "timestamp": time::OffsetDateTime::now_utc().unix_timestamp(),
    });
    tx.execute(
        "INSERT INTO metadata (key, value) VALUES ('migration', ?1)
            ON CONFLICT (key) DO UPDATE SET value = ?1",
        params![value.to_string()],
    )?;
    Ok(())
}

fn prizes(tx: &Transaction<'_>) -> Result<()> {
    tx.execute(
        "CREATE TABLE prizes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            payload TEXT UNIQUE NOT NULL,
            message TEXT,
            claimed INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    tx.execute("CREATE INDEX claimable_prizes_idx ON prizes (claimed)", [])?;
    Ok(())
}

fn destinations(tx: &Transaction<'_>) -> Result<()> {
    tx.execute(
        "CREATE TABLE destinations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            group_id TEXT UNIQUE NOT NULL,
            delivery_id TEXT UNIQUE NOT NULL,
            delivery_token TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

fn cycles(tx: &Transaction<'_>) -> Result<()> {
    tx.execute(
        "CREATE TABLE cycles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            prize_id INTEGER UNIQUE NOT NULL REFERENCES prizes (id),
            winner TEXT,
            state INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )",
        [],
    )?;
    // At most one cycle may be non-closed: the indexed expression is 1 for
    // every row the predicate keeps, so a second active row is a conflict.
    tx.execute(
        "CREATE UNIQUE INDEX active_cycle_idx ON cycles ((state != -1)) WHERE state != -1",
        [],
    )?;
    Ok(())
}

fn entries(tx: &Transaction<'_>) -> Result<()> {
    tx.execute(
        "CREATE TABLE entries (
            cycle_id INTEGER NOT NULL REFERENCES cycles (id),
            group_id TEXT NOT NULL,
            participant_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (cycle_id, participant_id)
        )",
        [],
    )?;
    Ok(())
}
