//! Append-only device and identity attestation logs.

use crate::{db, Result, Store};
use lcore_types::entity::{DeviceAttestation, IdentityAttestation, VerificationLevel};
use lcore_types::InputIndex;
use rusqlite::{params, types::Type, Row};

fn row_to_identity(row: &Row<'_>) -> rusqlite::Result<IdentityAttestation> {
    let level: String = row.get(4)?;
    let verification_level = VerificationLevel::parse(&level).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown verification level {level:?}").into(),
        )
    })?;
    Ok(IdentityAttestation {
        id: row.get(0)?,
        user_did: row.get(1)?,
        provider: row.get(2)?,
        country_code: row.get(3)?,
        verification_level,
        verified: row.get(5)?,
        issued_at: row.get(6)?,
        expires_at: row.get(7)?,
        attestor_signature: row.get(8)?,
        session_id: row.get(9)?,
        revoked: row.get(10)?,
        input_index: row.get(11)?,
    })
}

/// Everything of a device attestation except the autoincrement id.
pub struct NewDeviceAttestation<'a> {
    pub device_did: &'a str,
    pub data: &'a str,
    pub timestamp: i64,
    pub source: Option<&'a str>,
    pub input_index: InputIndex,
}

/// Everything of an identity attestation except the autoincrement id.
pub struct NewIdentityAttestation<'a> {
    pub user_did: &'a str,
    pub provider: &'a str,
    pub country_code: &'a str,
    pub verification_level: VerificationLevel,
    pub verified: bool,
    pub issued_at: i64,
    pub expires_at: Option<i64>,
    pub attestor_signature: &'a str,
    pub session_id: &'a str,
    pub input_index: InputIndex,
}

impl Store {
    /// Appends a device reading and returns its row id.
    pub fn insert_device_attestation(&self, row: &NewDeviceAttestation<'_>) -> Result<i64> {
        self.conn()
            .execute(
                "INSERT INTO device_attestations (device_did, data, timestamp, source, \
                 input_index) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    row.device_did,
                    row.data,
                    row.timestamp,
                    row.source,
                    row.input_index,
                ],
            )
            .map_err(db)?;
        Ok(self.conn().last_insert_rowid())
    }

    pub fn device_attestation(&self, id: i64) -> Result<Option<DeviceAttestation>> {
        self.conn()
            .query_row(
                "SELECT id, device_did, data, timestamp, source, input_index \
                 FROM device_attestations WHERE id = ?1",
                [id],
                |row| {
                    Ok(DeviceAttestation {
                        id: row.get(0)?,
                        device_did: row.get(1)?,
                        data: row.get(2)?,
                        timestamp: row.get(3)?,
                        source: row.get(4)?,
                        input_index: row.get(5)?,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db(other)),
            })
    }

    /// The existing row for the idempotency key, if any.
    pub fn identity_attestation_by_session(
        &self,
        user_did: &str,
        provider: &str,
        session_id: &str,
    ) -> Result<Option<IdentityAttestation>> {
        self.conn()
            .query_row(
                "SELECT id, user_did, provider, country_code, verification_level, verified, \
                 issued_at, expires_at, attestor_signature, session_id, revoked, input_index \
                 FROM identity_attestations \
                 WHERE user_did = ?1 AND provider = ?2 AND session_id = ?3",
                params![user_did, provider, session_id],
                row_to_identity,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db(other)),
            })
    }

    /// Appends an identity attestation and returns its row id. The caller
    /// has already applied the idempotency rule.
    pub fn insert_identity_attestation(&self, row: &NewIdentityAttestation<'_>) -> Result<i64> {
        self.conn()
            .execute(
                "INSERT INTO identity_attestations (user_did, provider, country_code, \
                 verification_level, verified, issued_at, expires_at, attestor_signature, \
                 session_id, revoked, input_index) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)",
                params![
                    row.user_did,
                    row.provider,
                    row.country_code,
                    row.verification_level.as_str(),
                    row.verified,
                    row.issued_at,
                    row.expires_at,
                    row.attestor_signature,
                    row.session_id,
                    row.input_index,
                ],
            )
            .map_err(db)?;
        Ok(self.conn().last_insert_rowid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_rows_append() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .insert_device_attestation(&NewDeviceAttestation {
                device_did: "did:key:zExample",
                data: r#"{"t":23.4}"#,
                timestamp: 1_700_000_000,
                source: Some("sensor-1"),
                input_index: 4,
            })
            .unwrap();
        let row = store.device_attestation(id).unwrap().unwrap();
        assert_eq!(row.data, r#"{"t":23.4}"#);
        assert_eq!(row.source.as_deref(), Some("sensor-1"));
    }

    #[test]
    fn session_lookup_finds_existing_row() {
        let store = Store::open_in_memory().unwrap();
        let new_row = NewIdentityAttestation {
            user_did: "did:key:zUser",
            provider: "smile_id",
            country_code: "ET",
            verification_level: VerificationLevel::Basic,
            verified: true,
            issued_at: 1,
            expires_at: Some(10_000),
            attestor_signature: "sig",
            session_id: "s1",
            input_index: 5,
        };
        let id = store.insert_identity_attestation(&new_row).unwrap();

        let found = store
            .identity_attestation_by_session("did:key:zUser", "smile_id", "s1")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.country_code, "ET");
        assert!(store
            .identity_attestation_by_session("did:key:zUser", "smile_id", "s2")
            .unwrap()
            .is_none());
    }
}
