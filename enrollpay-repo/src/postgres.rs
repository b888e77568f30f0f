//! PostgreSQL ledger adapter.

use async_trait::async_trait;
use sqlx::PgPool;
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

/// PostgreSQL ledger implementation.
pub struct PostgresRepo {
    pool: PgPool,
}

impl PostgresRepo {
    /// Creates a new PostgreSQL repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;

        let ddl = include_str!("../migrations/0001_create_tables_pg.sql");
        sqlx::raw_sql(ddl).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_record(&self, id: PaymentId) -> Result<Option<PaymentRecord>, LedgerError> {
        let row: Option<DbPaymentRecord> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM payment_records WHERE id = $1"
        ))
        .bind(id.as_uuid())
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
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (school_id, gateway) DO UPDATE
               SET api_key = EXCLUDED.api_key,
                   webhook_secret = EXCLUDED.webhook_secret,
                   sandbox = EXCLUDED.sandbox"#,
        )
        .bind(school_id.as_uuid())
        .bind(gateway.to_string())
        .bind(&creds.api_key)
        .bind(&creds.webhook_secret)
        .bind(creds.sandbox)
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Database(e.to_string()))?;
        Ok(())
    }

    /// Upserts an enrollment row (operator tooling and tests).
    pub async fn put_enrollment(&self, enrollment: &EnrollmentRef) -> Result<(), LedgerError> {
        sqlx::query(
            r#"INSERT INTO enrollments (id, school_id, student_id)
               VALUES ($1, $2, $3)
               ON CONFLICT (id) DO UPDATE
               SET school_id = EXCLUDED.school_id, student_id = EXCLUDED.student_id"#,
        )
        .bind(enrollment.id.as_uuid())
        .bind(enrollment.school_id.as_uuid())
        .bind(enrollment.student_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl PaymentLedger for PostgresRepo {
    async fn create(&self, new: NewPaymentRecord) -> Result<PaymentRecord, LedgerError> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();

        sqlx::query(
            r#"INSERT INTO payment_records
               (id, external_id, gateway, enrollment_id, school_id, student_id,
                amount, currency, status, payment_method, metadata, created_at, updated_at)
               VALUES ($1, NULL, $2, $3, $4, $5, $6, $7, 'pending', $8, $9, $10, $10)"#,
        )
        .bind(id)
        .bind(new.gateway.to_string())
        .bind(new.enrollment_id.as_uuid())
        .bind(new.school_id.as_uuid())
        .bind(new.student_id.as_uuid())
        .bind(new.amount.amount())
        .bind(new.amount.currency().code())
        .bind(new.payment_method.to_string())
        .bind(&new.metadata)
        .bind(now)
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
            r#"UPDATE payment_records SET external_id = $1, updated_at = $2 WHERE id = $3"#,
        )
        .bind(external_id)
        .bind(chrono::Utc::now())
        .bind(id.as_uuid())
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
            "SELECT {RECORD_COLUMNS} FROM payment_records WHERE gateway = $1 AND external_id = $2"
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
        let row: Option<DbPaymentRecord> = sqlx::query_as(&format!(
            "SELECT {RECORD_COLUMNS} FROM payment_records
             WHERE enrollment_id = $1
               AND status IN ('pending', 'processing', 'paid', 'unknown')
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(enrollment_id.as_uuid())
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
        let now = chrono::Utc::now();
        let new_str = new_status.to_string();

        let result = match expected {
            Expected::Status(from) => {
                sqlx::query(
                    r#"UPDATE payment_records
                       SET status = $1,
                           updated_at = $2,
                           completed_at = CASE
                               WHEN $1 = 'paid' AND completed_at IS NULL THEN $2
                               ELSE completed_at
                           END
                       WHERE id = $3 AND status = $4 AND status <> $1"#,
                )
                .bind(&new_str)
                .bind(now)
                .bind(id.as_uuid())
                .bind(from.to_string())
                .execute(&self.pool)
                .await
            }
            Expected::Any => {
                sqlx::query(
                    r#"UPDATE payment_records
                       SET status = $1,
                           updated_at = $2,
                           completed_at = CASE
                               WHEN $1 = 'paid' AND completed_at IS NULL THEN $2
                               ELSE completed_at
                           END
                       WHERE id = $3 AND status <> $1"#,
                )
                .bind(&new_str)
                .bind(now)
                .bind(id.as_uuid())
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
        // JSONB || is a shallow merge, matching the SQLite adapter.
        let result = sqlx::query(
            r#"UPDATE payment_records SET metadata = metadata || $1, updated_at = $2 WHERE id = $3"#,
        )
        .bind(&patch)
        .bind(chrono::Utc::now())
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::NotFound(id));
        }
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
               AND updated_at < $1
               AND external_id IS NOT NULL
             ORDER BY updated_at ASC
             LIMIT $2"
        ))
        .bind(older_than)
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
            sqlx::query(r#"UPDATE payment_records SET last_reconciled_at = $1 WHERE id = $2"#)
                .bind(at)
                .bind(id.as_uuid())
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
        let base = "SELECT school_id, status, created_at::date AS day, currency,
                    COUNT(*) AS count, SUM(amount) AS total_minor
             FROM payment_records
             WHERE created_at >= $1 AND created_at < $2";
        let grouping = " GROUP BY school_id, status, day, currency ORDER BY day, school_id, status";

        let rows: Vec<DbReportRow> = match school_id {
            Some(school) => sqlx::query_as(&format!("{base} AND school_id = $3{grouping}"))
                .bind(from)
                .bind(to)
                .bind(school.as_uuid())
                .fetch_all(&self.pool)
                .await,
            None => sqlx::query_as(&format!("{base}{grouping}"))
                .bind(from)
                .bind(to)
                .fetch_all(&self.pool)
                .await,
        }
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        rows.into_iter().map(DbReportRow::into_domain).collect()
    }
}

#[async_trait]
impl TenantConfigStore for PostgresRepo {
    async fn gateway_credentials(
        &self,
        school_id: SchoolId,
        gateway: Gateway,
    ) -> Result<Option<GatewayCredentials>, LedgerError> {
        let row: Option<DbCredentials> = sqlx::query_as(
            r#"SELECT api_key, webhook_secret, sandbox
               FROM gateway_credentials WHERE school_id = $1 AND gateway = $2"#,
        )
        .bind(school_id.as_uuid())
        .bind(gateway.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::Database(e.to_string()))?;

        Ok(row.map(DbCredentials::into_domain))
    }
}

#[async_trait]
impl EnrollmentDirectory for PostgresRepo {
    async fn get(&self, id: EnrollmentId) -> Result<Option<EnrollmentRef>, LedgerError> {
        let row: Option<DbEnrollment> =
            sqlx::query_as(r#"SELECT id, school_id, student_id FROM enrollments WHERE id = $1"#)
                .bind(id.as_uuid())
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
        let result = sqlx::query(r#"UPDATE enrollments SET payment_status = $1 WHERE id = $2"#)
            .bind(status.to_string())
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| LedgerError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            tracing::warn!(enrollment_id = %id, "enrollment missing during status write-back");
        }
        Ok(())
    }
}
