//! The destination registry
//!
//! One delivery endpoint per subscribed group. The engine only reads this
//! table (and prunes rows whose endpoints turned out to be gone); rows are
//! written by the setup flow through [`upsert`].

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tombola_core::{DestinationId, DestinationRecord, GroupId};

fn from_row(row: &Row<'_>) -> rusqlite::Result<DestinationRecord> {
    Ok(DestinationRecord {
        id: DestinationId(row.get(0)?),
        group_id: GroupId(row.get(1)?),
        delivery_id: row.get(2)?,
        delivery_token: row.get(3)?,
    })
}

const COLUMNS: &str = "id, group_id, delivery_id, delivery_token";

/// Insert or replace a group's delivery endpoint
pub fn upsert(
    conn: &Connection,
    group_id: &GroupId,
    delivery_id: &str,
    delivery_token: &str,
) -> Result<DestinationRecord> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO destinations (group_id, delivery_id, delivery_token)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (group_id) DO UPDATE SET delivery_id = ?2, delivery_token = ?3
            RETURNING id, group_id, delivery_id, delivery_token",
    )?;
    Ok(stmt.query_row(params![group_id.as_str(), delivery_id, delivery_token], from_row)?)
}

/// Look up the destination serving a group
pub fn get_by_group(conn: &Connection, group_id: &GroupId) -> Result<Option<DestinationRecord>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {COLUMNS} FROM destinations WHERE group_id = ?1 LIMIT 1"
    ))?;
    Ok(stmt
        .query_row(params![group_id.as_str()], from_row)
        .optional()?)
}

/// Read one page of destinations, ordered by id
///
/// Keyset pagination: pass the last id of the previous page (or `None` for
/// the first page) to stream the whole registry in bounded batches.
pub fn page(
    conn: &Connection,
    after: Option<DestinationId>,
    limit: usize,
) -> Result<Vec<DestinationRecord>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {COLUMNS} FROM destinations WHERE id > ?1 ORDER BY id LIMIT ?2"
    ))?;
    let after = after.map(|id| id.0).unwrap_or(0);
    let rows = stmt.query_map(params![after, limit as i64], from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Remove a destination whose endpoint is gone for good
pub fn remove(conn: &Connection, id: DestinationId) -> Result<()> {
    let mut stmt = conn.prepare_cached("DELETE FROM destinations WHERE id = ?1")?;
    stmt.execute(params![id.0])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    fn database() -> Database {
        let db = Database::in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    #[test]
    fn upsert_replaces_credentials() {
        let db = database();
        let group = GroupId::new("g1");

        db.with(|conn| {
            let first = upsert(conn, &group, "hook-1", "token-1")?;
            let second = upsert(conn, &group, "hook-2", "token-2")?;
            assert_eq!(first.id, second.id);

            let found = get_by_group(conn, &group)?.unwrap();
            assert_eq!(found.delivery_id, "hook-2");
            assert_eq!(found.delivery_token, "token-2");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn pagination_streams_the_registry() {
        let db = database();
        db.with(|conn| {
            for i in 0..7 {
                upsert(conn, &GroupId::new(format!("g{i}")), &format!("hook-{i}"), "t")?;
            }

            let mut seen = Vec::new();
            let mut after = None;
            loop {
                let batch = page(conn, after, 3)?;
                if batch.is_empty() {
                    break;
                }
                assert!(batch.len() <= 3);
                after = batch.last().map(|record| record.id);
                seen.extend(batch);
            }
            assert_eq!(seen.len(), 7);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn removed_destinations_disappear() {
        let db = database();
        let group = GroupId::new("g1");
        db.with(|conn| {
            let record = upsert(conn, &group, "hook", "token")?;
            remove(conn, record.id)?;
            assert!(get_by_group(conn, &group)?.is_none());
            Ok(())
        })
        .unwrap();
    }
}
