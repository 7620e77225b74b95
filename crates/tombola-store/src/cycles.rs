//! Cycle records
//!
//! The durable representation of giveaway cycles. The `active_cycle_idx`
//! partial unique index makes creating a second non-closed cycle a hard
//! constraint failure, which is the guard against two lifecycle loops
//! running at once.

use crate::error::{Result, StoreError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tombola_core::{Cycle, CycleId, CycleState, ParticipantId, PrizeId};

fn from_row(row: &Row<'_>) -> rusqlite::Result<(Cycle, i64)> {
    let raw_state: i64 = row.get(3)?;
    let cycle = Cycle {
        id: CycleId(row.get(0)?),
        prize_id: PrizeId(row.get(1)?),
        winner: row.get::<_, Option<String>>(2)?.map(ParticipantId),
        // Placeholder until the raw value is checked by `decode`.
        state: CycleState::Closed,
        created_at: row.get(4)?,
    };
    Ok((cycle, raw_state))
}

fn decode((mut cycle, raw_state): (Cycle, i64)) -> Result<Cycle> {
    cycle.state = CycleState::from_i64(raw_state).ok_or_else(|| StoreError::CorruptRow {
        table: "cycles",
        detail: format!("unknown state {raw_state}"),
    })?;
    Ok(cycle)
}

const COLUMNS: &str = "id, prize_id, winner, state, created_at";

/// Create a new cycle in the initial state
///
/// Must run in the same transaction as the prize claim. Fails with a
/// constraint violation if another non-closed cycle exists.
pub fn create(conn: &Connection, prize_id: PrizeId) -> Result<Cycle> {
    let created_at = time::OffsetDateTime::now_utc().unix_timestamp();
    let mut stmt = conn.prepare_cached(
        "INSERT INTO cycles (prize_id, state, created_at) VALUES (?1, ?2, ?3)
            RETURNING id, prize_id, winner, state, created_at",
    )?;
    let row = stmt.query_row(
        params![prize_id.0, CycleState::Announcing.as_i64(), created_at],
        from_row,
    )?;
    decode(row)
}

/// Look up a cycle by id
pub fn get(conn: &Connection, id: CycleId) -> Result<Option<Cycle>> {
    let mut stmt =
        conn.prepare_cached(&format!("SELECT {COLUMNS} FROM cycles WHERE id = ?1 LIMIT 1"))?;
    stmt.query_row(params![id.0], from_row)
        .optional()?
        .map(decode)
        .transpose()
}

/// The recovery query: the single non-closed cycle, if one exists
pub fn unfinished(conn: &Connection) -> Result<Option<Cycle>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {COLUMNS} FROM cycles WHERE state != -1 LIMIT 1"
    ))?;
    stmt.query_row([], from_row)
        .optional()?
        .map(decode)
        .transpose()
}

/// Persist a state transition
pub fn set_state(conn: &Connection, id: CycleId, state: CycleState) -> Result<()> {
    let mut stmt = conn.prepare_cached("UPDATE cycles SET state = ?2 WHERE id = ?1")?;
    stmt.execute(params![id.0, state.as_i64()])?;
    Ok(())
}

/// Persist the confirmed winner
pub fn set_winner(conn: &Connection, id: CycleId, winner: &ParticipantId) -> Result<()> {
    let mut stmt = conn.prepare_cached("UPDATE cycles SET winner = ?2 WHERE id = ?1")?;
    stmt.execute(params![id.0, winner.as_str()])?;
    Ok(())
}

/// The most recent cycle a participant won, if any
pub fn last_won(conn: &Connection, participant: &ParticipantId) -> Result<Option<Cycle>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {COLUMNS} FROM cycles WHERE winner = ?1 ORDER BY created_at DESC LIMIT 1"
    ))?;
    stmt.query_row(params![participant.as_str()], from_row)
        .optional()?
        .map(decode)
        .transpose()
}
