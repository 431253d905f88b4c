//! Price history query functions.

use rusqlite::Connection;

use depeg_types::price::PricePoint;

use crate::Result;

/// Insert a sample. A second sample at the same timestamp replaces the first.
pub fn insert(conn: &Connection, symbol: &str, point: &PricePoint) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO price_history (symbol, timestamp, price) VALUES (?1, ?2, ?3)",
        rusqlite::params![symbol, point.timestamp as i64, point.price],
    )?;
    Ok(())
}

/// Delete samples of `symbol` older than `cutoff`. Returns the number removed.
pub fn prune_before(conn: &Connection, symbol: &str, cutoff: u64) -> Result<usize> {
    let removed = conn.execute(
        "DELETE FROM price_history WHERE symbol = ?1 AND timestamp < ?2",
        rusqlite::params![symbol, cutoff as i64],
    )?;
    Ok(removed)
}

/// All samples at or after `since`, grouped by symbol, oldest first.
pub fn load_since(conn: &Connection, since: u64) -> Result<Vec<(String, Vec<PricePoint>)>> {
    let mut stmt = conn.prepare(
        "SELECT symbol, timestamp, price FROM price_history
         WHERE timestamp >= ?1 ORDER BY symbol, timestamp",
    )?;
    let rows = stmt.query_map([since as i64], |row| {
        Ok((
            row.get::<_, String>(0)?,
            PricePoint::new(row.get::<_, i64>(1)? as u64, row.get(2)?),
        ))
    })?;

    let mut out: Vec<(String, Vec<PricePoint>)> = Vec::new();
    for row in rows {
        let (symbol, point) = row?;
        match out.last_mut() {
            Some((s, points)) if *s == symbol => points.push(point),
            _ => out.push((symbol, vec![point])),
        }
    }
    Ok(out)
}

pub fn count(conn: &Connection, symbol: &str) -> Result<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM price_history WHERE symbol = ?1",
        [symbol],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}
