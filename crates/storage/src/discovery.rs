//! Read-only discovery queries over active attestations.
//!
//! Every multi-row query carries an explicit `ORDER BY`; nothing downstream
//! relies on implicit ordering. Results are paginated with a default limit
//! of 50.

use crate::attestations::{row_to_attestation, ATTESTATION_COLUMNS};
use crate::{db, Result, Store};
use lcore_types::entity::Attestation;
use lcore_types::request::{
    CountByBucketParams, QueryByBucketParams, QueryByDomainParams, QueryByMultipleBucketsParams,
};
use lcore_types::DEFAULT_QUERY_LIMIT;
use rusqlite::ToSql;

/// Aggregate freshness figures for a domain, plus the tier distribution.
/// Tier boundaries: `fresh >= 75 > recent >= 50 > aging >= 25 > stale`.
#[derive(Debug, Clone, PartialEq)]
pub struct FreshnessStats {
    pub count: u64,
    pub avg: f64,
    pub min: u8,
    pub max: u8,
    pub fresh: u64,
    pub recent: u64,
    pub aging: u64,
    pub stale: u64,
}

fn page(limit: Option<u64>, offset: Option<u64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_QUERY_LIMIT).min(i64::MAX as u64) as i64;
    let offset = offset.unwrap_or(0).min(i64::MAX as u64) as i64;
    (limit, offset)
}

impl Store {
    fn query_attestations(
        &self,
        sql: &str,
        args: &[&dyn ToSql],
    ) -> Result<Vec<Attestation>> {
        let mut stmt = self.conn().prepare(sql).map_err(db)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), row_to_attestation)
            .map_err(db)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db)
    }

    /// Active attestations whose bucket matches `(key, value)` in a domain,
    /// freshest first.
    pub fn query_by_bucket(&self, params: &QueryByBucketParams) -> Result<Vec<Attestation>> {
        let mut sql = format!(
            "SELECT {ATTESTATION_COLUMNS} FROM attestations a \
             JOIN attestation_buckets b ON b.attestation_id = a.id \
             WHERE a.status = 'active' AND a.domain = ?1 \
             AND b.bucket_key = ?2 AND b.bucket_value = ?3"
        );
        let (limit, offset) = page(params.limit, params.offset);
        let min_freshness = params.min_freshness.unwrap_or(0) as i64;
        let mut args: Vec<&dyn ToSql> = vec![
            &params.domain,
            &params.bucket_key,
            &params.bucket_value,
        ];
        if let Some(provider) = &params.provider {
            sql.push_str(&format!(" AND a.provider = ?{}", args.len() + 1));
            args.push(provider);
        }
        sql.push_str(&format!(" AND a.freshness_score >= ?{}", args.len() + 1));
        args.push(&min_freshness);
        sql.push_str(&format!(
            " ORDER BY a.freshness_score DESC, a.id ASC LIMIT ?{} OFFSET ?{}",
            args.len() + 1,
            args.len() + 2
        ));
        args.push(&limit);
        args.push(&offset);
        self.query_attestations(&sql, &args)
    }

    /// The AND-of-buckets form: one bucket join per criterion, each matching
    /// its key and any of its values.
    pub fn query_by_multiple_buckets(
        &self,
        params: &QueryByMultipleBucketsParams,
    ) -> Result<Vec<Attestation>> {
        use rusqlite::types::Value as Sql;

        let mut sql = format!("SELECT {ATTESTATION_COLUMNS} FROM attestations a");
        let mut owned: Vec<Sql> = Vec::new();

        for (i, criterion) in params.criteria.iter().enumerate() {
            owned.push(Sql::Text(criterion.bucket_key.clone()));
            let key_pos = owned.len();
            let mut value_slots = Vec::with_capacity(criterion.bucket_values.len());
            for value in &criterion.bucket_values {
                owned.push(Sql::Text(value.clone()));
                value_slots.push(format!("?{}", owned.len()));
            }
            let values = value_slots.join(", ");
            sql.push_str(&format!(
                " JOIN attestation_buckets b{i} ON b{i}.attestation_id = a.id \
                 AND b{i}.bucket_key = ?{key_pos} AND b{i}.bucket_value IN ({values})"
            ));
        }

        sql.push_str(" WHERE a.status = 'active'");
        owned.push(Sql::Text(params.domain.clone()));
        sql.push_str(&format!(" AND a.domain = ?{}", owned.len()));
        if let Some(provider) = &params.provider {
            owned.push(Sql::Text(provider.clone()));
            sql.push_str(&format!(" AND a.provider = ?{}", owned.len()));
        }
        owned.push(Sql::Integer(params.min_freshness.unwrap_or(0) as i64));
        sql.push_str(&format!(" AND a.freshness_score >= ?{}", owned.len()));

        let (limit, offset) = page(params.limit, params.offset);
        owned.push(Sql::Integer(limit));
        owned.push(Sql::Integer(offset));
        sql.push_str(&format!(
            " ORDER BY a.freshness_score DESC, a.id ASC LIMIT ?{} OFFSET ?{}",
            owned.len() - 1,
            owned.len()
        ));

        let mut stmt = self.conn().prepare(&sql).map_err(db)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(owned.iter()), row_to_attestation)
            .map_err(db)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db)
    }

    /// Attestations in a domain, optionally narrowed by provider, flow type,
    /// and status (default active), freshest first.
    pub fn query_by_domain(&self, params: &QueryByDomainParams) -> Result<Vec<Attestation>> {
        let status = params
            .status
            .unwrap_or(lcore_types::entity::AttestationStatus::Active);
        let status = status.as_str().to_string();
        let mut sql = format!(
            "SELECT {ATTESTATION_COLUMNS} FROM attestations a \
             WHERE a.domain = ?1 AND a.status = ?2"
        );
        let min_freshness = params.min_freshness.unwrap_or(0) as i64;
        let mut args: Vec<&dyn ToSql> = vec![&params.domain, &status];
        if let Some(provider) = &params.provider {
            sql.push_str(&format!(" AND a.provider = ?{}", args.len() + 1));
            args.push(provider);
        }
        if let Some(flow_type) = &params.flow_type {
            sql.push_str(&format!(" AND a.flow_type = ?{}", args.len() + 1));
            args.push(flow_type);
        }
        sql.push_str(&format!(" AND a.freshness_score >= ?{}", args.len() + 1));
        args.push(&min_freshness);
        let (limit, offset) = page(params.limit, params.offset);
        sql.push_str(&format!(
            " ORDER BY a.freshness_score DESC, a.id ASC LIMIT ?{} OFFSET ?{}",
            args.len() + 1,
            args.len() + 2
        ));
        args.push(&limit);
        args.push(&offset);
        self.query_attestations(&sql, &args)
    }

    /// Distinct owner counts per bucket value for one bucket key.
    pub fn count_by_bucket(&self, params: &CountByBucketParams) -> Result<Vec<(String, u64)>> {
        let mut sql = "SELECT b.bucket_value, COUNT(DISTINCT a.owner_address) \
             FROM attestations a \
             JOIN attestation_buckets b ON b.attestation_id = a.id \
             WHERE a.status = 'active' AND a.domain = ?1 AND b.bucket_key = ?2"
            .to_string();
        let min_freshness = params.min_freshness.unwrap_or(0) as i64;
        let mut args: Vec<&dyn ToSql> = vec![&params.domain, &params.bucket_key];
        if let Some(provider) = &params.provider {
            sql.push_str(&format!(" AND a.provider = ?{}", args.len() + 1));
            args.push(provider);
        }
        sql.push_str(&format!(" AND a.freshness_score >= ?{}", args.len() + 1));
        args.push(&min_freshness);
        sql.push_str(" GROUP BY b.bucket_value ORDER BY b.bucket_value ASC");

        let mut stmt = self.conn().prepare(&sql).map_err(db)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(db)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db)
    }

    /// Count of active attestations in a domain.
    pub fn count_by_domain(&self, domain: &str) -> Result<u64> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM attestations WHERE status = 'active' AND domain = ?1",
                [domain],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
            .map_err(db)
    }

    /// Active attestation counts per provider within a domain.
    pub fn count_by_provider(&self, domain: &str) -> Result<Vec<(String, u64)>> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT provider, COUNT(*) FROM attestations \
                 WHERE status = 'active' AND domain = ?1 \
                 GROUP BY provider ORDER BY provider ASC",
            )
            .map_err(db)?;
        let rows = stmt
            .query_map([domain], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })
            .map_err(db)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db)
    }

    /// Freshness aggregates over active attestations in a domain.
    pub fn freshness_stats(
        &self,
        domain: &str,
        provider: Option<&str>,
    ) -> Result<FreshnessStats> {
        let mut sql = "SELECT COUNT(*), COALESCE(SUM(freshness_score), 0), \
             COALESCE(MIN(freshness_score), 0), COALESCE(MAX(freshness_score), 0), \
             COALESCE(SUM(freshness_score >= 75), 0), \
             COALESCE(SUM(freshness_score >= 50 AND freshness_score < 75), 0), \
             COALESCE(SUM(freshness_score >= 25 AND freshness_score < 50), 0), \
             COALESCE(SUM(freshness_score < 25), 0) \
             FROM attestations WHERE status = 'active' AND domain = ?1"
            .to_string();
        let mut args: Vec<&dyn ToSql> = vec![&domain];
        if let Some(provider) = &provider {
            sql.push_str(" AND provider = ?2");
            args.push(provider);
        }
        self.conn()
            .query_row(&sql, rusqlite::params_from_iter(args.iter()), |row| {
                let count = row.get::<_, i64>(0)? as u64;
                let sum = row.get::<_, i64>(1)?;
                let avg = if count == 0 { 0.0 } else { sum as f64 / count as f64 };
                Ok(FreshnessStats {
                    count,
                    avg,
                    min: row.get::<_, i64>(2)? as u8,
                    max: row.get::<_, i64>(3)? as u8,
                    fresh: row.get::<_, i64>(4)? as u64,
                    recent: row.get::<_, i64>(5)? as u64,
                    aging: row.get::<_, i64>(6)? as u64,
                    stale: row.get::<_, i64>(7)? as u64,
                })
            })
            .map_err(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcore_types::entity::{Attestation, AttestationStatus, BucketEntry};
    use lcore_types::request::BucketCriterion;

    fn attestation(id: &str, owner: &str, score: u8) -> Attestation {
        Attestation {
            id: id.to_string(),
            attestation_hash: "0xhash".into(),
            owner_address: owner.to_string(),
            domain: "finance".into(),
            provider: "chase".into(),
            flow_type: "web_request".into(),
            attested_at_input: 1,
            valid_from: 100,
            valid_until: None,
            tee_signature: "sig".into(),
            status: AttestationStatus::Active,
            freshness_score: score,
            superseded_by: None,
            created_input: 1,
        }
    }

    fn bucket(id: &str, key: &str, value: &str) -> BucketEntry {
        BucketEntry {
            attestation_id: id.to_string(),
            bucket_key: key.to_string(),
            bucket_value: value.to_string(),
        }
    }

    fn seeded_store() -> Store {
        let mut store = Store::open_in_memory().unwrap();
        store
            .insert_attestation(
                &attestation("att-1", "0xbbbb", 90),
                &[bucket("att-1", "balance", "1k-5k"), bucket("att-1", "tier", "gold")],
                &[],
            )
            .unwrap();
        store
            .insert_attestation(
                &attestation("att-2", "0xcccc", 40),
                &[bucket("att-2", "balance", "1k-5k"), bucket("att-2", "tier", "silver")],
                &[],
            )
            .unwrap();
        store
            .insert_attestation(
                &attestation("att-3", "0xbbbb", 70),
                &[bucket("att-3", "balance", ">5k")],
                &[],
            )
            .unwrap();
        store
    }

    fn by_bucket(value: &str, min_freshness: Option<u8>) -> QueryByBucketParams {
        QueryByBucketParams {
            domain: "finance".into(),
            provider: None,
            bucket_key: "balance".into(),
            bucket_value: value.into(),
            min_freshness,
            limit: None,
            offset: None,
        }
    }

    #[test]
    fn bucket_query_orders_by_freshness() {
        let store = seeded_store();
        let hits = store.query_by_bucket(&by_bucket("1k-5k", None)).unwrap();
        assert_eq!(
            hits.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
            vec!["att-1", "att-2"]
        );
    }

    #[test]
    fn bucket_query_applies_min_freshness() {
        let store = seeded_store();
        let hits = store.query_by_bucket(&by_bucket("1k-5k", Some(50))).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "att-1");
    }

    #[test]
    fn revoked_attestations_never_surface() {
        let store = seeded_store();
        store
            .set_attestation_status("att-1", AttestationStatus::Revoked)
            .unwrap();
        let hits = store.query_by_bucket(&by_bucket("1k-5k", None)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "att-2");
    }

    #[test]
    fn multi_bucket_is_an_and_join() {
        let store = seeded_store();
        let params = QueryByMultipleBucketsParams {
            domain: "finance".into(),
            provider: None,
            criteria: vec![
                BucketCriterion {
                    bucket_key: "balance".into(),
                    bucket_values: vec!["1k-5k".into(), ">5k".into()],
                },
                BucketCriterion {
                    bucket_key: "tier".into(),
                    bucket_values: vec!["gold".into()],
                },
            ],
            min_freshness: None,
            limit: None,
            offset: None,
        };
        let hits = store.query_by_multiple_buckets(&params).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "att-1");
    }

    #[test]
    fn count_by_bucket_counts_distinct_owners() {
        let mut store = seeded_store();
        // A second attestation by the same owner in the same bucket must not
        // inflate the count.
        store
            .insert_attestation(
                &attestation("att-4", "0xbbbb", 80),
                &[bucket("att-4", "balance", "1k-5k")],
                &[],
            )
            .unwrap();
        let counts = store
            .count_by_bucket(&CountByBucketParams {
                domain: "finance".into(),
                provider: None,
                bucket_key: "balance".into(),
                min_freshness: None,
            })
            .unwrap();
        assert_eq!(counts, vec![("1k-5k".to_string(), 2), (">5k".to_string(), 1)]);
    }

    #[test]
    fn domain_counts_and_stats() {
        let store = seeded_store();
        assert_eq!(store.count_by_domain("finance").unwrap(), 3);
        assert_eq!(store.count_by_domain("health").unwrap(), 0);
        assert_eq!(
            store.count_by_provider("finance").unwrap(),
            vec![("chase".to_string(), 3)]
        );

        let stats = store.freshness_stats("finance", None).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 40);
        assert_eq!(stats.max, 90);
        assert_eq!((stats.fresh, stats.recent, stats.aging, stats.stale), (1, 1, 1, 0));
    }

    #[test]
    fn pagination_is_stable() {
        let store = seeded_store();
        let mut params = QueryByDomainParams {
            domain: "finance".into(),
            provider: None,
            flow_type: None,
            status: None,
            min_freshness: None,
            limit: Some(2),
            offset: None,
        };
        let first = store.query_by_domain(&params).unwrap();
        assert_eq!(
            first.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
            vec!["att-1", "att-3"]
        );
        params.offset = Some(2);
        let second = store.query_by_domain(&params).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, "att-2");
    }
}
