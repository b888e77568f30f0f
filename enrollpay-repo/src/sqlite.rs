//! SQLite ledger adapter.

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use std::str::FromStr;
use uuid::Uuid;

use enrollpay_types::{
    EnrollmentDirectory, EnrollmentId, EnrollmentRef, EventSource, Expected, Gateway,
    GatewayCredentials, LedgerError, NewPaymentRecord, PaymentId, PaymentLedger, PaymentRecord,
    PaymentStatus, ReportRow, SchoolId, TenantConfigStore, TransitionOutcome,
};

use crate::types::{DbCredentials, DbEnrollment, DbPaymentRecord, DbReportRow};

const RECORD_COLUMNS: &str = "id, external_id, gateway, enrollment_id, school_id, student_id, \
     amount, currency, status, payment_method, metadata, created_at, updated_at, \
     completed_at, last_reconciled_at";

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite ledger implementation.
pub struct SqliteRepo {
    pool: SqlitePool,
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        let ddl = include_str!("../migrations/0001_create_tables.sql");
        sqlx::raw_sql(ddl).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_record(&self, id: PaymentId) -> Result<Option<PaymentRecord>, LedgerError> {
        let row: Option<DbPaymentRecord> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM payment_records WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        row.map(DbPaymentRecord::into_domain).transpose()
    }

    /// Upserts tenant credentials (operator tooling and tests).
    pub async fn put_credentials(
        &self,
        school_id: SchoolId,
        gateway: Gateway,
        creds: &GatewayCredentials,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            r#"INSERT INTO gateway_credentials (school_id, gateway, api_key, webhook_secret, sandbox)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (school_id, gateway) DO UPDATE
               SET api_key = excluded.api_key,
                   webhook_secret = excluded.webhook_secret,
                   sandbox = excluded.sandbox"#,
        )
        .bind(school_id.to_string())
        .bind(gateway.to_string())
        .bind(&creds.api_key)
        .bind(&creds.webhook_secret)
        .bind(creds.sandbox as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Database(e.to_string()))?;
        Ok(())
    }

    /// Upserts an enrollment row (operator tooling and tests).
    pub async fn put_enrollment(&self, enrollment: &EnrollmentRef) -> Result<(), LedgerError> {
        sqlx::query(
            r#"INSERT INTO enrollments (id, school_id, student_id)
               VALUES (?, ?, ?)
               ON CONFLICT (id) DO UPDATE
               SET school_id = excluded.school_id, student_id = excluded.student_id"#,
        )
        .bind(enrollment.id.to_string())
        .bind(enrollment.school_id.to_string())
        .bind(enrollment.student_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Database(e.to_string()))?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ledger implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl PaymentLedger for SqliteRepo {
    async fn create(&self, new: NewPaymentRecord) -> Result<PaymentRecord, LedgerError> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let now_str = now.to_rfc3339();

        sqlx::query(
            r#"INSERT INTO payment_records
               (id, external_id, gateway, enrollment_id, school_id, student_id,
                amount, currency, status, payment_method, metadata, created_at, updated_at)
               VALUES (?, NULL, ?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?)"#,
        )
        .bind(id.to_string())
        .bind(new.gateway.to_string())
        .bind(new.enrollment_id.to_string())
        .bind(new.school_id.to_string())
        .bind(new.student_id.to_string())
        .bind(new.amount.amount())
        .bind(new.amount.currency().code())
        .bind(new.payment_method.to_string())
        .bind(new.metadata.to_string())
        .bind(&now_str)
        .bind(&now_str)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            // The insert carries a NULL external id, so a unique violation
            // here is the active-per-enrollment index.
            sqlx::Error::Database(db) if db.is_unique_violation() => LedgerError::Conflict(
                format!("enrollment {} already has an active payment", new.enrollment_id),
            ),
            _ => LedgerError::Database(e.to_string()),
        })?;

        Ok(PaymentRecord::from_parts(
            PaymentId::from_uuid(id),
            None,
            new.gateway,
            new.enrollment_id,
            new.school_id,
            new.student_id,
            new.amount,
            PaymentStatus::Pending,
            new.payment_method,
            new.metadata,
            now,
            now,
            None,
            None,
        ))
    }

    async fn assign_external_id(
        &self,
        id: PaymentId,
        external_id: &str,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(
            r#"UPDATE payment_records SET external_id = ?, updated_at = ? WHERE id = ?"#,
        )
        .bind(external_id)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => LedgerError::Conflict(
                format!("external id {external_id} already assigned for this gateway"),
            ),
            _ => LedgerError::Database(e.to_string()),
        })?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(id));
        }
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<PaymentRecord>, LedgerError> {
        self.fetch_record(id).await
    }

    async fn find_by_external(
        &self,
        gateway: Gateway,
        external_id: &str,
    ) -> Result<Option<PaymentRecord>, LedgerError> {
        let row: Option<DbPaymentRecord> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM payment_records WHERE gateway = ? AND external_id = ?"
        ))
        .bind(gateway.to_string())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        row.map(DbPaymentRecord::into_domain).transpose()
    }

    async fn find_active_for_enrollment(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<Option<PaymentRecord>, LedgerError> {
        // failed/canceled/refunded rows are superseded; everything else is
        // the enrollment's current attempt.
        let row: Option<DbPaymentRecord> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM payment_records
             WHERE enrollment_id = ?
               AND status IN ('pending', 'processing', 'paid', 'unknown')
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(enrollment_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        row.map(DbPaymentRecord::into_domain).transpose()
    }

    async fn transition(
        &self,
        id: PaymentId,
        expected: Expected,
        new_status: PaymentStatus,
        source: EventSource,
    ) -> Result<TransitionOutcome, LedgerError> {
        let now = chrono::Utc::now().to_rfc3339();
        let new_str = new_status.to_string();

        let result = match expected {
            Expected::Status(from) => {
                // The WHERE clause is the compare-and-set: zero rows means
                // someone else moved the record first.
                sqlx::query(
                    r#"UPDATE payment_records
                       SET status = ?,
                           updated_at = ?,
                           completed_at = CASE
                               WHEN ? = 'paid' AND completed_at IS NULL THEN ?
                               ELSE completed_at
                           END
                       WHERE id = ? AND status = ? AND status <> ?"#,
                )
                .bind(&new_str)
                .bind(&now)
                .bind(&new_str)
                .bind(&now)
                .bind(id.to_string())
                .bind(from.to_string())
                .bind(&new_str)
                .execute(&self.pool)
                .await
            }
            Expected::Any => {
                sqlx::query(
                    r#"UPDATE payment_records
                       SET status = ?,
                           updated_at = ?,
                           completed_at = CASE
                               WHEN ? = 'paid' AND completed_at IS NULL THEN ?
                               ELSE completed_at
                           END
                       WHERE id = ? AND status <> ?"#,
                )
                .bind(&new_str)
                .bind(&now)
                .bind(&new_str)
                .bind(&now)
                .bind(id.to_string())
                .bind(&new_str)
                .execute(&self.pool)
                .await
            }
        }
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        let record = self
            .fetch_record(id)
            .await?
            .ok_or(LedgerError::NotFound(id))?;

        if result.rows_affected() == 1 {
            tracing::debug!(
                payment_id = %id, status = %new_status, source = %source,
                "ledger transition applied"
            );
            Ok(TransitionOutcome::Applied(record))
        } else {
            tracing::debug!(
                payment_id = %id, status = %new_status, source = %source,
                current = %record.status, "ledger transition no-op"
            );
            Ok(TransitionOutcome::NoOp(record))
        }
    }

    async fn merge_metadata(
        &self,
        id: PaymentId,
        patch: serde_json::Value,
    ) -> Result<(), LedgerError> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        let current: Option<(String,)> =
            sqlx::query_as(r#"SELECT metadata FROM payment_records WHERE id = ?"#)
                .bind(id.to_string())
                .fetch_optional(&mut *db_tx)
                .await
                .map_err(|e| LedgerError::Database(e.to_string()))?;

        let (raw,) = current.ok_or(LedgerError::NotFound(id))?;
        let mut merged: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| LedgerError::Database(e.to_string()))?;

        if let (Some(base), Some(extra)) = (merged.as_object_mut(), patch.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        } else {
            merged = patch;
        }

        sqlx::query(r#"UPDATE payment_records SET metadata = ?, updated_at = ? WHERE id = ?"#)
            .bind(merged.to_string())
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&mut *db_tx)
            .await
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        db_tx
            .commit()
            .await
            .map_err(|e| LedgerError::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_stale(
        &self,
        older_than: chrono::DateTime<chrono::Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentRecord>, LedgerError> {
        let rows: Vec<DbPaymentRecord> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM payment_records
             WHERE status IN ('pending', 'processing')
               AND updated_at < ?
               AND external_id IS NOT NULL
             ORDER BY updated_at ASC
             LIMIT ?"
        ))
        .bind(older_than.to_rfc3339())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        rows.into_iter().map(DbPaymentRecord::into_domain).collect()
    }

    async fn mark_reconciled(
        &self,
        id: PaymentId,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), LedgerError> {
        let result =
            sqlx::query(r#"UPDATE payment_records SET last_reconciled_at = ? WHERE id = ?"#)
                .bind(at.to_rfc3339())
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .map_err(|e| LedgerError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(id));
        }
        Ok(())
    }

    async fn report_rows(
        &self,
        school_id: Option<SchoolId>,
        from: chrono::DateTime<chrono::Utc>,
        to: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<ReportRow>, LedgerError> {
        let base = "SELECT school_id, status, date(created_at) AS day, currency,
                    COUNT(*) AS count, SUM(amount) AS total_minor
             FROM payment_records
             WHERE created_at >= ? AND created_at < ?";
        let grouping = " GROUP BY school_id, status, day, currency ORDER BY day, school_id, status";

        let rows: Vec<DbReportRow> = match school_id {
            Some(school) => sqlx::query_as(&format!("{base} AND school_id = ?{grouping}"))
                .bind(from.to_rfc3339())
                .bind(to.to_rfc3339())
                .bind(school.to_string())
                .fetch_all(&self.pool)
                .await,
            None => sqlx::query_as(&format!("{base}{grouping}"))
                .bind(from.to_rfc3339())
                .bind(to.to_rfc3339())
                .fetch_all(&self.pool)
                .await,
        }
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        rows.into_iter().map(DbReportRow::into_domain).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tenant configuration
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl TenantConfigStore for SqliteRepo {
    async fn gateway_credentials(
        &self,
        school_id: SchoolId,
        gateway: Gateway,
    ) -> Result<Option<GatewayCredentials>, LedgerError> {
        let row: Option<DbCredentials> = sqlx::query_as(
            r#"SELECT api_key, webhook_secret, sandbox
               FROM gateway_credentials WHERE school_id = ? AND gateway = ?"#,
        )
        .bind(school_id.to_string())
        .bind(gateway.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(row.map(DbCredentials::into_domain))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Enrollment directory
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl EnrollmentDirectory for SqliteRepo {
    async fn get(&self, id: EnrollmentId) -> Result<Option<EnrollmentRef>, LedgerError> {
        let row: Option<DbEnrollment> =
            sqlx::query_as(r#"SELECT id, school_id, student_id FROM enrollments WHERE id = ?"#)
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| LedgerError::Database(e.to_string()))?;

        row.map(DbEnrollment::into_domain).transpose()
    }

    async fn set_payment_status(
        &self,
        id: EnrollmentId,
        status: PaymentStatus,
    ) -> Result<(), LedgerError> {
        let result = sqlx::query(r#"UPDATE enrollments SET payment_status = ? WHERE id = ?"#)
            .bind(status.to_string())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            tracing::warn!(enrollment_id = %id, "enrollment missing during status write-back");
        }
        Ok(())
    }
}
