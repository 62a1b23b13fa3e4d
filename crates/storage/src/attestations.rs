//! CRUD for attestations and their owned buckets and data chunks.

use crate::{db, Result, Store};
use lcore_types::entity::{Attestation, AttestationStatus, BucketEntry, DataChunk};
use lcore_types::error::StorageError;
use lcore_types::InputIndex;
use rusqlite::{params, types::Type, Row};

pub(crate) const ATTESTATION_COLUMNS: &str = "id, attestation_hash, owner_address, domain, \
     provider, flow_type, attested_at_input, valid_from, valid_until, tee_signature, status, \
     freshness_score, superseded_by, created_input";

pub(crate) fn row_to_attestation(row: &Row<'_>) -> rusqlite::Result<Attestation> {
    let status: String = row.get(10)?;
    let status = AttestationStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            Type::Text,
            format!("unknown attestation status {status:?}").into(),
        )
    })?;
    Ok(Attestation {
        id: row.get(0)?,
        attestation_hash: row.get(1)?,
        owner_address: row.get(2)?,
        domain: row.get(3)?,
        provider: row.get(4)?,
        flow_type: row.get(5)?,
        attested_at_input: row.get(6)?,
        valid_from: row.get(7)?,
        valid_until: row.get(8)?,
        tee_signature: row.get(9)?,
        status,
        freshness_score: row.get(11)?,
        superseded_by: row.get(12)?,
        created_input: row.get(13)?,
    })
}

/// Input row for the bulk freshness pass: everything the decay function
/// needs besides the schema parameters.
#[derive(Debug, Clone)]
pub struct FreshnessRow {
    pub id: String,
    pub provider: String,
    pub flow_type: String,
    pub attested_at_input: InputIndex,
    pub freshness_score: u8,
}

impl Store {
    /// Inserts an attestation with its buckets and data chunks in one
    /// transaction. The caller has already validated everything; a duplicate
    /// id here is an internal error, not a user-facing conflict.
    pub fn insert_attestation(
        &mut self,
        attestation: &Attestation,
        buckets: &[BucketEntry],
        chunks: &[DataChunk],
    ) -> Result<()> {
        let tx = self.conn_mut().transaction().map_err(db)?;
        tx.execute(
            "INSERT INTO attestations (id, attestation_hash, owner_address, domain, provider, \
             flow_type, attested_at_input, valid_from, valid_until, tee_signature, status, \
             freshness_score, superseded_by, created_input) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                attestation.id,
                attestation.attestation_hash,
                attestation.owner_address,
                attestation.domain,
                attestation.provider,
                attestation.flow_type,
                attestation.attested_at_input,
                attestation.valid_from,
                attestation.valid_until,
                attestation.tee_signature,
                attestation.status.as_str(),
                attestation.freshness_score,
                attestation.superseded_by,
                attestation.created_input,
            ],
        )
        .map_err(db)?;
        for bucket in buckets {
            tx.execute(
                "INSERT INTO attestation_buckets (attestation_id, bucket_key, bucket_value) \
                 VALUES (?1, ?2, ?3)",
                params![attestation.id, bucket.bucket_key, bucket.bucket_value],
            )
            .map_err(db)?;
        }
        for chunk in chunks {
            tx.execute(
                "INSERT INTO attestation_data (attestation_id, data_key, encrypted_value, \
                 encryption_key_id) VALUES (?1, ?2, ?3, ?4)",
                params![
                    attestation.id,
                    chunk.data_key,
                    chunk.encrypted_value,
                    chunk.encryption_key_id,
                ],
            )
            .map_err(db)?;
        }
        tx.commit().map_err(db)
    }

    pub fn attestation(&self, id: &str) -> Result<Option<Attestation>> {
        let sql = format!("SELECT {ATTESTATION_COLUMNS} FROM attestations WHERE id = ?1");
        self.conn()
            .query_row(&sql, [id], row_to_attestation)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db(other)),
            })
    }

    pub fn attestation_exists(&self, id: &str) -> Result<bool> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM attestations WHERE id = ?1",
                [id],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n > 0)
            .map_err(db)
    }

    pub fn set_attestation_status(&self, id: &str, status: AttestationStatus) -> Result<()> {
        let changed = self
            .conn()
            .execute(
                "UPDATE attestations SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .map_err(db)?;
        if changed != 1 {
            return Err(StorageError::Backend(format!(
                "status update touched {changed} rows for attestation {id}"
            )));
        }
        Ok(())
    }

    pub fn mark_superseded(&self, old_id: &str, new_id: &str) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE attestations SET status = 'superseded', superseded_by = ?1 WHERE id = ?2",
                params![new_id, old_id],
            )
            .map(|_| ())
            .map_err(db)
    }

    pub fn buckets_for(&self, attestation_id: &str) -> Result<Vec<BucketEntry>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT attestation_id, bucket_key, bucket_value FROM attestation_buckets \
                 WHERE attestation_id = ?1 ORDER BY bucket_key ASC",
            )
            .map_err(db)?;
        let rows = stmt
            .query_map([attestation_id], |row| {
                Ok(BucketEntry {
                    attestation_id: row.get(0)?,
                    bucket_key: row.get(1)?,
                    bucket_value: row.get(2)?,
                })
            })
            .map_err(db)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db)
    }

    pub fn chunks_for(&self, attestation_id: &str) -> Result<Vec<DataChunk>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT attestation_id, data_key, encrypted_value, encryption_key_id \
                 FROM attestation_data WHERE attestation_id = ?1 ORDER BY data_key ASC",
            )
            .map_err(db)?;
        let rows = stmt
            .query_map([attestation_id], row_to_chunk)
            .map_err(db)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db)
    }

    pub fn chunk(&self, attestation_id: &str, data_key: &str) -> Result<Option<DataChunk>> {
        self.conn()
            .query_row(
                "SELECT attestation_id, data_key, encrypted_value, encryption_key_id \
                 FROM attestation_data WHERE attestation_id = ?1 AND data_key = ?2",
                params![attestation_id, data_key],
                row_to_chunk,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db(other)),
            })
    }

    /// Every active attestation, in id order, with what the decay pass needs.
    pub fn freshness_rows(&self) -> Result<Vec<FreshnessRow>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT id, provider, flow_type, attested_at_input, freshness_score \
                 FROM attestations WHERE status = 'active' ORDER BY id ASC",
            )
            .map_err(db)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(FreshnessRow {
                    id: row.get(0)?,
                    provider: row.get(1)?,
                    flow_type: row.get(2)?,
                    attested_at_input: row.get(3)?,
                    freshness_score: row.get(4)?,
                })
            })
            .map_err(db)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db)
    }

    /// Applies a batch of freshness updates in one transaction.
    pub fn apply_freshness(&mut self, updates: &[(String, u8)]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let tx = self.conn_mut().transaction().map_err(db)?;
        {
            let mut stmt = tx
                .prepare("UPDATE attestations SET freshness_score = ?1 WHERE id = ?2")
                .map_err(db)?;
            for (id, score) in updates {
                stmt.execute(params![score, id]).map_err(db)?;
            }
        }
        tx.commit().map_err(db)
    }
}

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<DataChunk> {
    Ok(DataChunk {
        attestation_id: row.get(0)?,
        data_key: row.get(1)?,
        encrypted_value: row.get(2)?,
        encryption_key_id: row.get(3)?,
    })
}
