//! Schema definition. Applied idempotently on every open.
//!
//! Indexes exist for the discovery queries' benefit; correctness never
//! depends on them.

use crate::{db, Result};
use rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS attestations (
    id                 TEXT PRIMARY KEY,
    attestation_hash   TEXT NOT NULL,
    owner_address      TEXT NOT NULL,
    domain             TEXT NOT NULL,
    provider           TEXT NOT NULL,
    flow_type          TEXT NOT NULL,
    attested_at_input  INTEGER NOT NULL,
    valid_from         INTEGER NOT NULL,
    valid_until        INTEGER,
    tee_signature      TEXT NOT NULL,
    status             TEXT NOT NULL DEFAULT 'active',
    freshness_score    INTEGER NOT NULL DEFAULT 100,
    superseded_by      TEXT,
    created_input      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS attestation_buckets (
    attestation_id  TEXT NOT NULL REFERENCES attestations(id) ON DELETE CASCADE,
    bucket_key      TEXT NOT NULL,
    bucket_value    TEXT NOT NULL,
    PRIMARY KEY (attestation_id, bucket_key)
);

CREATE TABLE IF NOT EXISTS attestation_data (
    attestation_id     TEXT NOT NULL REFERENCES attestations(id) ON DELETE CASCADE,
    data_key           TEXT NOT NULL,
    encrypted_value    BLOB NOT NULL,
    encryption_key_id  TEXT NOT NULL,
    PRIMARY KEY (attestation_id, data_key)
);

CREATE TABLE IF NOT EXISTS access_grants (
    id                TEXT PRIMARY KEY,
    attestation_id    TEXT NOT NULL REFERENCES attestations(id),
    grantee_address   TEXT NOT NULL,
    granted_by        TEXT NOT NULL,
    data_keys         TEXT,
    grant_type        TEXT NOT NULL,
    granted_at_input  INTEGER NOT NULL,
    expires_at_input  INTEGER,
    revoked_at_input  INTEGER,
    status            TEXT NOT NULL DEFAULT 'active'
);

CREATE TABLE IF NOT EXISTS provider_schemas (
    provider             TEXT NOT NULL,
    flow_type            TEXT NOT NULL,
    version              INTEGER NOT NULL,
    domain               TEXT NOT NULL,
    registered_by        TEXT NOT NULL,
    registered_at_input  INTEGER NOT NULL,
    bucket_definitions   TEXT NOT NULL,
    data_keys            TEXT NOT NULL,
    freshness_half_life  INTEGER NOT NULL,
    min_freshness        INTEGER NOT NULL DEFAULT 0,
    status               TEXT NOT NULL DEFAULT 'active',
    PRIMARY KEY (provider, flow_type, version)
);

CREATE TABLE IF NOT EXISTS schema_admins (
    wallet_address     TEXT PRIMARY KEY,
    added_by           TEXT NOT NULL,
    added_at_input     INTEGER NOT NULL,
    can_add_providers  INTEGER NOT NULL,
    can_add_admins     INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS device_attestations (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    device_did   TEXT NOT NULL,
    data         TEXT NOT NULL,
    timestamp    INTEGER NOT NULL,
    source       TEXT,
    input_index  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS identity_attestations (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    user_did            TEXT NOT NULL,
    provider            TEXT NOT NULL,
    country_code        TEXT NOT NULL,
    verification_level  TEXT NOT NULL,
    verified            INTEGER NOT NULL,
    issued_at           INTEGER NOT NULL,
    expires_at          INTEGER,
    attestor_signature  TEXT NOT NULL,
    session_id          TEXT NOT NULL,
    revoked             INTEGER NOT NULL DEFAULT 0,
    input_index         INTEGER NOT NULL,
    UNIQUE (user_did, provider, session_id)
);

CREATE TABLE IF NOT EXISTS encryption_configs (
    key_id      TEXT PRIMARY KEY,
    public_key  TEXT NOT NULL,
    algorithm   TEXT NOT NULL DEFAULT 'nacl-box',
    created_at  INTEGER NOT NULL,
    status      TEXT NOT NULL DEFAULT 'active'
);

CREATE TABLE IF NOT EXISTS engine_meta (
    key    TEXT PRIMARY KEY,
    value  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_attestations_domain
    ON attestations(domain, status, freshness_score);
CREATE INDEX IF NOT EXISTS idx_attestations_provider
    ON attestations(provider, flow_type, status);
CREATE INDEX IF NOT EXISTS idx_attestations_owner
    ON attestations(owner_address);
CREATE INDEX IF NOT EXISTS idx_buckets_lookup
    ON attestation_buckets(bucket_key, bucket_value);
CREATE INDEX IF NOT EXISTS idx_grants_attestation
    ON access_grants(attestation_id, grantee_address, status);
CREATE INDEX IF NOT EXISTS idx_schemas_status
    ON provider_schemas(provider, flow_type, status);
";

/// Creates every table and index if absent.
pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA).map_err(db)
}

#[cfg(test)]
mod tests {
    use crate::Store;

    #[test]
    fn initialization_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        // Re-applying the DDL on a live database must be a no-op.
        super::initialize(store.conn()).unwrap();
    }

    #[test]
    fn cascade_is_declared() {
        let store = Store::open_in_memory().unwrap();
        let fk: bool = store
            .conn()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert!(fk, "foreign key enforcement must be on");
    }
}
