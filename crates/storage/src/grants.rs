//! CRUD for access grants.
//!
//! `data_keys` is stored as canonical JSON text, NULL meaning every key of
//! the attestation.

use crate::{db, Result, Store};
use lcore_types::entity::{AccessGrant, GrantStatus, GrantType};
use lcore_types::error::StorageError;
use lcore_types::InputIndex;
use rusqlite::{params, types::Type, Row};

const GRANT_COLUMNS: &str = "id, attestation_id, grantee_address, granted_by, data_keys, \
     grant_type, granted_at_input, expires_at_input, revoked_at_input, status";

fn row_to_grant(row: &Row<'_>) -> rusqlite::Result<AccessGrant> {
    let data_keys: Option<String> = row.get(4)?;
    let data_keys = match data_keys {
        None => None,
        Some(json) => Some(serde_json::from_str(&json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
        })?),
    };
    let grant_type: String = row.get(5)?;
    let grant_type = GrantType::parse(&grant_type).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            Type::Text,
            format!("unknown grant type {grant_type:?}").into(),
        )
    })?;
    let status: String = row.get(9)?;
    let status = GrantStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            9,
            Type::Text,
            format!("unknown grant status {status:?}").into(),
        )
    })?;
    Ok(AccessGrant {
        id: row.get(0)?,
        attestation_id: row.get(1)?,
        grantee_address: row.get(2)?,
        granted_by: row.get(3)?,
        data_keys,
        grant_type,
        granted_at_input: row.get(6)?,
        expires_at_input: row.get(7)?,
        revoked_at_input: row.get(8)?,
        status,
    })
}

impl Store {
    pub fn insert_grant(&self, grant: &AccessGrant) -> Result<()> {
        let data_keys = grant
            .data_keys
            .as_ref()
            .map(|keys| serde_json::to_string(keys))
            .transpose()
            .map_err(|e| StorageError::Corrupt(format!("data_keys: {e}")))?;
        self.conn()
            .execute(
                "INSERT INTO access_grants (id, attestation_id, grantee_address, granted_by, \
                 data_keys, grant_type, granted_at_input, expires_at_input, revoked_at_input, \
                 status) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    grant.id,
                    grant.attestation_id,
                    grant.grantee_address,
                    grant.granted_by,
                    data_keys,
                    grant.grant_type.as_str(),
                    grant.granted_at_input,
                    grant.expires_at_input,
                    grant.revoked_at_input,
                    grant.status.as_str(),
                ],
            )
            .map(|_| ())
            .map_err(db)
    }

    pub fn grant(&self, id: &str) -> Result<Option<AccessGrant>> {
        let sql = format!("SELECT {GRANT_COLUMNS} FROM access_grants WHERE id = ?1");
        self.conn()
            .query_row(&sql, [id], row_to_grant)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db(other)),
            })
    }

    pub fn revoke_grant(&self, id: &str, revoked_at: InputIndex) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE access_grants SET status = 'revoked', revoked_at_input = ?1 WHERE id = ?2",
                params![revoked_at, id],
            )
            .map(|_| ())
            .map_err(db)
    }

    /// Grants with `status = active` for an `(attestation, grantee)` pair, in
    /// grant-id order. Expiry against the current input is the caller's rule.
    pub fn active_grants_for(
        &self,
        attestation_id: &str,
        grantee: &str,
    ) -> Result<Vec<AccessGrant>> {
        let sql = format!(
            "SELECT {GRANT_COLUMNS} FROM access_grants \
             WHERE attestation_id = ?1 AND grantee_address = ?2 AND status = 'active' \
             ORDER BY id ASC"
        );
        let mut stmt = self.conn().prepare(&sql).map_err(db)?;
        let rows = stmt
            .query_map(params![attestation_id, grantee], row_to_grant)
            .map_err(db)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcore_types::entity::{AttestationStatus, Attestation};

    fn store() -> Store {
        let mut store = Store::open_in_memory().unwrap();
        let att = Attestation {
            id: "att-1".into(),
            attestation_hash: "0xhash".into(),
            owner_address: "0xbbbb".into(),
            domain: "finance".into(),
            provider: "chase".into(),
            flow_type: "web_request".into(),
            attested_at_input: 1,
            valid_from: 100,
            valid_until: None,
            tee_signature: "sig".into(),
            status: AttestationStatus::Active,
            freshness_score: 100,
            superseded_by: None,
            created_input: 1,
        };
        store.insert_attestation(&att, &[], &[]).unwrap();
        store
    }

    fn sample_grant(id: &str, keys: Option<Vec<String>>) -> AccessGrant {
        AccessGrant {
            id: id.to_string(),
            attestation_id: "att-1".into(),
            grantee_address: "0xcccc".into(),
            granted_by: "0xbbbb".into(),
            data_keys: keys,
            grant_type: GrantType::Partial,
            granted_at_input: 3,
            expires_at_input: None,
            revoked_at_input: None,
            status: GrantStatus::Active,
        }
    }

    #[test]
    fn data_keys_round_trip() {
        let store = store();
        store
            .insert_grant(&sample_grant("g1", Some(vec!["parameters".into()])))
            .unwrap();
        store.insert_grant(&sample_grant("g2", None)).unwrap();

        let g1 = store.grant("g1").unwrap().unwrap();
        assert_eq!(g1.data_keys, Some(vec!["parameters".to_string()]));
        let g2 = store.grant("g2").unwrap().unwrap();
        assert_eq!(g2.data_keys, None);
    }

    #[test]
    fn revocation_excludes_from_active_set() {
        let store = store();
        store.insert_grant(&sample_grant("g1", None)).unwrap();
        assert_eq!(store.active_grants_for("att-1", "0xcccc").unwrap().len(), 1);

        store.revoke_grant("g1", 9).unwrap();
        assert!(store.active_grants_for("att-1", "0xcccc").unwrap().is_empty());
        let g = store.grant("g1").unwrap().unwrap();
        assert_eq!(g.status, GrantStatus::Revoked);
        assert_eq!(g.revoked_at_input, Some(9));
    }
}
