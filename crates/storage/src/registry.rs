//! Provider schemas, schema admins, and encryption key configs.

use crate::{db, Result, Store};
use lcore_types::entity::{
    EncryptionConfig, KeyStatus, ProviderSchema, SchemaAdmin, SchemaStatus,
};
use lcore_types::error::StorageError;
use rusqlite::{params, types::Type, Row};

const SCHEMA_COLUMNS: &str = "provider, flow_type, version, domain, registered_by, \
     registered_at_input, bucket_definitions, data_keys, freshness_half_life, min_freshness, \
     status";

fn row_to_schema(row: &Row<'_>) -> rusqlite::Result<ProviderSchema> {
    let bucket_definitions: String = row.get(6)?;
    let bucket_definitions = serde_json::from_str(&bucket_definitions)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;
    let data_keys: String = row.get(7)?;
    let data_keys = serde_json::from_str(&data_keys)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;
    let status: String = row.get(10)?;
    let status = SchemaStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            10,
            Type::Text,
            format!("unknown schema status {status:?}").into(),
        )
    })?;
    Ok(ProviderSchema {
        provider: row.get(0)?,
        flow_type: row.get(1)?,
        version: row.get(2)?,
        domain: row.get(3)?,
        registered_by: row.get(4)?,
        registered_at_input: row.get(5)?,
        bucket_definitions,
        data_keys,
        freshness_half_life: row.get(8)?,
        min_freshness: row.get(9)?,
        status,
    })
}

fn row_to_admin(row: &Row<'_>) -> rusqlite::Result<SchemaAdmin> {
    Ok(SchemaAdmin {
        wallet_address: row.get(0)?,
        added_by: row.get(1)?,
        added_at_input: row.get(2)?,
        can_add_providers: row.get(3)?,
        can_add_admins: row.get(4)?,
    })
}

fn row_to_config(row: &Row<'_>) -> rusqlite::Result<EncryptionConfig> {
    let status: String = row.get(4)?;
    let status = KeyStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            Type::Text,
            format!("unknown key status {status:?}").into(),
        )
    })?;
    Ok(EncryptionConfig {
        key_id: row.get(0)?,
        public_key: row.get(1)?,
        algorithm: row.get(2)?,
        created_at: row.get(3)?,
        status,
    })
}

impl Store {
    // --- Provider schemas ---

    /// Inserts a new schema version and, in the same transaction, deprecates
    /// any previously active version of the pair. Keeps the invariant that at
    /// most one version is active and it is the maximal one.
    pub fn insert_schema(&mut self, schema: &ProviderSchema) -> Result<()> {
        let bucket_definitions = serde_json::to_string(&schema.bucket_definitions)
            .map_err(|e| StorageError::Corrupt(format!("bucket_definitions: {e}")))?;
        let data_keys = serde_json::to_string(&schema.data_keys)
            .map_err(|e| StorageError::Corrupt(format!("data_keys: {e}")))?;

        let tx = self.conn_mut().transaction().map_err(db)?;
        tx.execute(
            "UPDATE provider_schemas SET status = 'deprecated' \
             WHERE provider = ?1 AND flow_type = ?2 AND status = 'active'",
            params![schema.provider, schema.flow_type],
        )
        .map_err(db)?;
        tx.execute(
            "INSERT INTO provider_schemas (provider, flow_type, version, domain, registered_by, \
             registered_at_input, bucket_definitions, data_keys, freshness_half_life, \
             min_freshness, status) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                schema.provider,
                schema.flow_type,
                schema.version,
                schema.domain,
                schema.registered_by,
                schema.registered_at_input,
                bucket_definitions,
                data_keys,
                schema.freshness_half_life,
                schema.min_freshness,
                schema.status.as_str(),
            ],
        )
        .map_err(db)?;
        tx.commit().map_err(db)
    }

    pub fn active_schema(&self, provider: &str, flow_type: &str) -> Result<Option<ProviderSchema>> {
        let sql = format!(
            "SELECT {SCHEMA_COLUMNS} FROM provider_schemas \
             WHERE provider = ?1 AND flow_type = ?2 AND status = 'active' \
             ORDER BY version DESC LIMIT 1"
        );
        self.conn()
            .query_row(&sql, params![provider, flow_type], row_to_schema)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db(other)),
            })
    }

    pub fn schema_version(
        &self,
        provider: &str,
        flow_type: &str,
        version: u32,
    ) -> Result<Option<ProviderSchema>> {
        let sql = format!(
            "SELECT {SCHEMA_COLUMNS} FROM provider_schemas \
             WHERE provider = ?1 AND flow_type = ?2 AND version = ?3"
        );
        self.conn()
            .query_row(&sql, params![provider, flow_type, version], row_to_schema)
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db(other)),
            })
    }

    pub fn max_schema_version(&self, provider: &str, flow_type: &str) -> Result<u32> {
        self.conn()
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM provider_schemas \
                 WHERE provider = ?1 AND flow_type = ?2",
                params![provider, flow_type],
                |row| row.get(0),
            )
            .map_err(db)
    }

    pub fn deprecate_schema(&self, provider: &str, flow_type: &str, version: u32) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE provider_schemas SET status = 'deprecated' \
                 WHERE provider = ?1 AND flow_type = ?2 AND version = ?3",
                params![provider, flow_type, version],
            )
            .map(|_| ())
            .map_err(db)
    }

    /// Schemas, optionally filtered by domain and active status, ordered for
    /// stable discovery output.
    pub fn list_schemas(
        &self,
        domain: Option<&str>,
        active_only: bool,
    ) -> Result<Vec<ProviderSchema>> {
        let mut sql = format!("SELECT {SCHEMA_COLUMNS} FROM provider_schemas WHERE 1=1");
        let mut args: Vec<rusqlite::types::Value> = Vec::new();
        if let Some(domain) = domain {
            sql.push_str(" AND domain = ?");
            args.push(rusqlite::types::Value::Text(domain.to_string()));
        }
        if active_only {
            sql.push_str(" AND status = 'active'");
        }
        sql.push_str(" ORDER BY provider ASC, flow_type ASC, version ASC");

        let mut stmt = self.conn().prepare(&sql).map_err(db)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), row_to_schema)
            .map_err(db)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db)
    }

    // --- Schema admins ---

    pub fn admin_count(&self) -> Result<u64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM schema_admins", [], |row| row.get(0))
            .map_err(db)
    }

    pub fn admin(&self, wallet: &str) -> Result<Option<SchemaAdmin>> {
        self.conn()
            .query_row(
                "SELECT wallet_address, added_by, added_at_input, can_add_providers, \
                 can_add_admins FROM schema_admins WHERE wallet_address = ?1",
                [wallet],
                row_to_admin,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db(other)),
            })
    }

    pub fn insert_admin(&self, admin: &SchemaAdmin) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO schema_admins (wallet_address, added_by, added_at_input, \
                 can_add_providers, can_add_admins) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    admin.wallet_address,
                    admin.added_by,
                    admin.added_at_input,
                    admin.can_add_providers,
                    admin.can_add_admins,
                ],
            )
            .map(|_| ())
            .map_err(db)
    }

    pub fn remove_admin(&self, wallet: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM schema_admins WHERE wallet_address = ?1", [wallet])
            .map(|_| ())
            .map_err(db)
    }

    /// How many admins currently hold `can_add_admins`.
    pub fn admin_grantor_count(&self) -> Result<u64> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM schema_admins WHERE can_add_admins = 1",
                [],
                |row| row.get(0),
            )
            .map_err(db)
    }

    // --- Encryption configs ---

    pub fn active_encryption_config(&self) -> Result<Option<EncryptionConfig>> {
        self.conn()
            .query_row(
                "SELECT key_id, public_key, algorithm, created_at, status \
                 FROM encryption_configs WHERE status = 'active'",
                [],
                row_to_config,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(db(other)),
            })
    }

    /// Activates a new key config, deprecating any previous active one in the
    /// same transaction so the active set never exceeds one.
    pub fn set_encryption_config(&mut self, config: &EncryptionConfig) -> Result<()> {
        let tx = self.conn_mut().transaction().map_err(db)?;
        tx.execute(
            "UPDATE encryption_configs SET status = 'deprecated' WHERE status = 'active'",
            [],
        )
        .map_err(db)?;
        tx.execute(
            "INSERT INTO encryption_configs (key_id, public_key, algorithm, created_at, status) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(key_id) DO UPDATE SET status = 'active', created_at = excluded.created_at",
            params![
                config.key_id,
                config.public_key,
                config.algorithm,
                config.created_at,
                config.status.as_str(),
            ],
        )
        .map_err(db)?;
        tx.commit().map_err(db)
    }
}
