//! Signed attestation log.

use rusqlite::Connection;
use serde::Serialize;

use depeg_types::attestation::SignedAttestation;

use crate::{DbError, Result};

/// A logged attestation as stored.
#[derive(Debug, Clone, Serialize)]
pub struct AttestationRow {
    pub id: i64,
    pub tag: String,
    pub market: String,
    pub chain_id: u64,
    pub feed_id: String,
    pub digest: String,
    pub issued_at: u64,
    pub signature: String,
    pub signer: String,
    pub payload: serde_json::Value,
}

/// Log a signed attestation. Returns the row id.
pub fn insert(conn: &Connection, signed: &SignedAttestation) -> Result<i64> {
    let payload = serde_json::to_string(&signed.attestation)
        .map_err(|e| DbError::Serialization(e.to_string()))?;
    let digest = signed.attestation.digest(&signed.context);
    conn.execute(
        "INSERT INTO attestations
         (tag, market, chain_id, feed_id, digest, issued_at, signature, signer, payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            signed.attestation.tag(),
            signed.context.market_address.to_string(),
            signed.context.chain_id as i64,
            signed.context.feed_id.to_string(),
            digest.as_slice(),
            signed.attestation.issued_at() as i64,
            signed.signature.to_string(),
            signed.signer.to_string(),
            payload,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recent attestations for `market`, newest first.
pub fn recent_for_market(conn: &Connection, market: &str, limit: u32) -> Result<Vec<AttestationRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, tag, market, chain_id, feed_id, digest, issued_at, signature, signer, payload
         FROM attestations WHERE market = ?1 ORDER BY issued_at DESC, id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(rusqlite::params![market, limit], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Vec<u8>>(5)?,
            row.get::<_, i64>(6)?,
            row.get::<_, String>(7)?,
            row.get::<_, String>(8)?,
            row.get::<_, String>(9)?,
        ))
    })?;

    let mut out = Vec::new();
    for row in rows {
        let (id, tag, market, chain_id, feed_id, digest, issued_at, signature, signer, payload) = row?;
        let payload = serde_json::from_str(&payload)
            .map_err(|e| DbError::Serialization(e.to_string()))?;
        out.push(AttestationRow {
            id,
            tag,
            market,
            chain_id: chain_id as u64,
            feed_id,
            digest: hex::encode(digest),
            issued_at: issued_at as u64,
            signature,
            signer,
            payload,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use depeg_crypto::ed25519::SigningKey;
    use depeg_types::attestation::{Attestation, AttestationContext};
    use depeg_types::{Address, FeedId};

    fn signed(issued_at: u64) -> SignedAttestation {
        let key = SigningKey::from_bytes(&[2u8; 32]);
        let context = AttestationContext {
            market_address: Address([0x44; 20]),
            chain_id: 114,
            feed_id: FeedId::for_symbol("USDC"),
        };
        let attestation = Attestation::ProbabilityQuote {
            horizon_sec: 604_800,
            p_bps: 150,
            issued_at,
        };
        let signature = key.sign(&attestation.signing_message(&context));
        SignedAttestation {
            context,
            attestation,
            signature,
            signer: key.verifying_key(),
        }
    }

    #[test]
    fn test_insert_and_list() {
        let conn = crate::open_memory().expect("open");
        insert(&conn, &signed(100)).expect("insert");
        insert(&conn, &signed(200)).expect("insert");

        let market = Address([0x44; 20]).to_string();
        let rows = recent_for_market(&conn, &market, 10).expect("list");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].issued_at, 200);
        assert_eq!(rows[0].tag, "FDC:PROB_V1");
        assert_eq!(rows[0].payload["pBps"], 150);
        assert_eq!(rows[0].digest.len(), 64);

        let other = recent_for_market(&conn, &Address::ZERO.to_string(), 10).expect("list");
        assert!(other.is_empty());
    }
}
