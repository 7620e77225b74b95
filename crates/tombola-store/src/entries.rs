//! The participation ledger
//!
//! Append-only registrations of "who entered which cycle". Uniqueness is
//! the composite primary key, never an application-level check-then-insert,
//! so simultaneous registrations of the same participant race safely.

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tombola_core::{CycleId, Entry, GroupId, ParticipantId};

fn from_row(row: &Row<'_>) -> rusqlite::Result<Entry> {
    Ok(Entry {
        cycle_id: CycleId(row.get(0)?),
        group_id: GroupId(row.get(1)?),
        participant_id: ParticipantId(row.get(2)?),
        created_at: row.get(3)?,
    })
}

/// Register a participant for a cycle
///
/// Returns whether a new row was created; `false` means the participant had
/// already entered.
pub fn register(
    conn: &Connection,
    cycle_id: CycleId,
    group_id: &GroupId,
    participant_id: &ParticipantId,
) -> Result<bool> {
    let created_at = time::OffsetDateTime::now_utc().unix_timestamp();
    let mut stmt = conn.prepare_cached(
        "INSERT INTO entries (cycle_id, group_id, participant_id, created_at)
            VALUES (?1, ?2, ?3, ?4) ON CONFLICT DO NOTHING",
    )?;
    let inserted = stmt.execute(params![
        cycle_id.0,
        group_id.as_str(),
        participant_id.as_str(),
        created_at
    ])?;
    Ok(inserted > 0)
}

/// Pick one entry for the cycle uniformly at random
pub fn pick_random(conn: &Connection, cycle_id: CycleId) -> Result<Option<Entry>> {
    let mut stmt = conn.prepare_cached(
        "SELECT cycle_id, group_id, participant_id, created_at FROM entries
            WHERE cycle_id = ?1 ORDER BY RANDOM() LIMIT 1",
    )?;
    Ok(stmt.query_row(params![cycle_id.0], from_row).optional()?)
}

/// Pick a random entry, skipping the given participants
///
/// Backs the exclude-failed re-pick policy. The exclusion list is tiny (one
/// participant per failed confirmation), so the dynamic `NOT IN` is fine.
pub fn pick_random_excluding(
    conn: &Connection,
    cycle_id: CycleId,
    excluded: &[ParticipantId],
) -> Result<Option<Entry>> {
    if excluded.is_empty() {
        return pick_random(conn, cycle_id);
    }

    let placeholders = vec!["?"; excluded.len()].join(", ");
    let sql = format!(
        "SELECT cycle_id, group_id, participant_id, created_at FROM entries
            WHERE cycle_id = ?1 AND participant_id NOT IN ({placeholders})
            ORDER BY RANDOM() LIMIT 1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut values: Vec<&dyn rusqlite::ToSql> = vec![&cycle_id.0];
    for participant in excluded {
        values.push(&participant.0);
    }
    Ok(stmt.query_row(values.as_slice(), from_row).optional()?)
}

/// Delete one entry, used when its destination no longer exists
pub fn remove(conn: &Connection, entry: &Entry) -> Result<()> {
    let mut stmt = conn
        .prepare_cached("DELETE FROM entries WHERE cycle_id = ?1 AND participant_id = ?2")?;
    stmt.execute(params![entry.cycle_id.0, entry.participant_id.as_str()])?;
    Ok(())
}

/// Number of entries registered for a cycle
pub fn count(conn: &Connection, cycle_id: CycleId) -> Result<u64> {
    let mut stmt =
        conn.prepare_cached("SELECT COUNT(*) FROM entries WHERE cycle_id = ?1")?;
    Ok(stmt.query_row(params![cycle_id.0], |row| row.get::<_, i64>(0))? as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cycles, prizes, Database};

    fn with_cycle() -> (Database, CycleId) {
        let db = Database::in_memory().unwrap();
        db.migrate().unwrap();
        let cycle = db
            .transaction(|tx| {
                let prize = prizes::add(tx, "KEY-1", None)?;
                cycles::create(tx, prize.id)
            })
            .unwrap();
        (db, cycle.id)
    }

    #[test]
    fn duplicate_registration_is_reported() {
        let (db, cycle_id) = with_cycle();
        let group = GroupId::new("g1");
        let alice = ParticipantId::new("alice");

        db.with(|conn| {
            assert!(register(conn, cycle_id, &group, &alice)?);
            assert!(!register(conn, cycle_id, &group, &alice)?);
            assert_eq!(count(conn, cycle_id)?, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn pick_random_over_empty_ledger() {
        let (db, cycle_id) = with_cycle();
        assert!(db
            .with(|conn| pick_random(conn, cycle_id))
            .unwrap()
            .is_none());
    }

    #[test]
    fn exclusion_skips_failed_participants() {
        let (db, cycle_id) = with_cycle();
        let group = GroupId::new("g1");
        let alice = ParticipantId::new("alice");
        let bob = ParticipantId::new("bob");

        db.with(|conn| {
            register(conn, cycle_id, &group, &alice)?;
            register(conn, cycle_id, &group, &bob)?;

            for _ in 0..16 {
                let picked = pick_random_excluding(conn, cycle_id, &[alice.clone()])?.unwrap();
                assert_eq!(picked.participant_id, bob);
            }
            let none = pick_random_excluding(conn, cycle_id, &[alice.clone(), bob.clone()])?;
            assert!(none.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn remove_deletes_a_single_entry() {
        let (db, cycle_id) = with_cycle();
        let group = GroupId::new("g1");

        db.with(|conn| {
            register(conn, cycle_id, &group, &ParticipantId::new("alice"))?;
            register(conn, cycle_id, &group, &ParticipantId::new("bob"))?;

            let entry = pick_random(conn, cycle_id)?.unwrap();
            remove(conn, &entry)?;
            assert_eq!(count(conn, cycle_id)?, 1);

            let left = pick_random(conn, cycle_id)?.unwrap();
            assert_ne!(left.participant_id, entry.participant_id);
            Ok(())
        })
        .unwrap();
    }
}
