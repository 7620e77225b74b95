//! The prize pool
//!
//! Donated tokens waiting to be given away. [`claimable`] deliberately does
//! not mark the token: the caller claims it with [`mark_claimed`] inside the
//! same transaction that creates the owning cycle, so a failed cycle
//! creation never strands a claimed token.

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tombola_core::{PrizeId, PrizeToken};

fn from_row(row: &Row<'_>) -> rusqlite::Result<PrizeToken> {
    Ok(PrizeToken {
        id: PrizeId(row.get(0)?),
        payload: row.get(1)?,
        message: row.get(2)?,
        claimed: row.get::<_, i64>(3)? != 0,
    })
}

/// Insert a donated token into the pool
pub fn add(conn: &Connection, payload: &str, message: Option<&str>) -> Result<PrizeToken> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO prizes (payload, message) VALUES (?1, ?2)
            RETURNING id, payload, message, claimed",
    )?;
    Ok(stmt.query_row(params![payload, message], from_row)?)
}

/// Look up a token by id
pub fn get(conn: &Connection, id: PrizeId) -> Result<Option<PrizeToken>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, payload, message, claimed FROM prizes WHERE id = ?1 LIMIT 1",
    )?;
    Ok(stmt.query_row(params![id.0], from_row).optional()?)
}

/// Select one unclaimed token uniformly at random
///
/// An empty pool returns `None`; that is the normal end-of-stock condition,
/// not an error.
pub fn claimable(conn: &Connection) -> Result<Option<PrizeToken>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, payload, message, claimed FROM prizes
            WHERE claimed = 0 ORDER BY RANDOM() LIMIT 1",
    )?;
    Ok(stmt.query_row([], from_row).optional()?)
}

/// Mark a token claimed; idempotent
pub fn mark_claimed(conn: &Connection, id: PrizeId) -> Result<()> {
    let mut stmt = conn.prepare_cached("UPDATE prizes SET claimed = 1 WHERE id = ?1")?;
    stmt.execute(params![id.0])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn add_and_claim() {
        let db = Database::in_memory().unwrap();
        db.migrate().unwrap();

        db.with(|conn| {
            let token = add(conn, "ABCD-1234", Some("have fun"))?;
            assert!(!token.claimed);

            let picked = claimable(conn)?.unwrap();
            assert_eq!(picked.id, token.id);

            mark_claimed(conn, token.id)?;
            mark_claimed(conn, token.id)?; // idempotent
            assert!(claimable(conn)?.is_none());
            assert!(get(conn, token.id)?.unwrap().claimed);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn empty_pool_is_not_an_error() {
        let db = Database::in_memory().unwrap();
        db.migrate().unwrap();
        db.with(|conn| {
            assert!(claimable(conn)?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn duplicate_payloads_are_rejected() {
        let db = Database::in_memory().unwrap();
        db.migrate().unwrap();
        db.with(|conn| {
            add(conn, "SAME", None)?;
            Ok(())
        })
        .unwrap();
        let err = db.with(|conn| add(conn, "SAME", None)).unwrap_err();
        assert!(err.is_constraint_violation());
    }
}
