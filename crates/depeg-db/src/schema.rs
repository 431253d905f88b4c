//! SQL schema definitions.

pub const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS price_history (
    symbol TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    price REAL NOT NULL,
    PRIMARY KEY (symbol, timestamp)
);

CREATE INDEX IF NOT EXISTS idx_price_history_ts ON price_history(timestamp);

CREATE TABLE IF NOT EXISTS attestations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tag TEXT NOT NULL,
    market TEXT NOT NULL,
    chain_id INTEGER NOT NULL,
    feed_id TEXT NOT NULL,
    digest BLOB NOT NULL,
    issued_at INTEGER NOT NULL,
    signature TEXT NOT NULL,
    signer TEXT NOT NULL,
    payload TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_attestations_market ON attestations(market, issued_at);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
