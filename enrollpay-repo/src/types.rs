//! Shared database types with feature-gated fields for SQLite and PostgreSQL.

use sqlx::FromRow;
use std::str::FromStr;

use enrollpay_types::{
    Currency, EnrollmentId, EnrollmentRef, Gateway, GatewayCredentials, LedgerError, Money,
    PaymentId, PaymentMethod, PaymentRecord, PaymentStatus, ReportRow, SchoolId, StudentId,
};

// ─────────────────────────────────────────────────────────────────────────────
// Feature-gated imports
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(not(feature = "sqlite"))]
use chrono::{DateTime, Utc};
#[cfg(not(feature = "sqlite"))]
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Database row structs (derive FromRow for automatic mapping)
// ─────────────────────────────────────────────────────────────────────────────

/// Payment ledger row from database.
#[derive(FromRow)]
pub struct DbPaymentRecord {
    #[cfg(not(feature = "sqlite"))]
    pub id: Uuid,
    #[cfg(feature = "sqlite")]
    pub id: String,

    pub external_id: Option<String>,
    pub gateway: String,

    #[cfg(not(feature = "sqlite"))]
    pub enrollment_id: Uuid,
    #[cfg(feature = "sqlite")]
    pub enrollment_id: String,

    #[cfg(not(feature = "sqlite"))]
    pub school_id: Uuid,
    #[cfg(feature = "sqlite")]
    pub school_id: String,

    #[cfg(not(feature = "sqlite"))]
    pub student_id: Uuid,
    #[cfg(feature = "sqlite")]
    pub student_id: String,

    pub amount: i64,
    pub currency: String,
    pub status: String,
    pub payment_method: String,

    #[cfg(not(feature = "sqlite"))]
    pub metadata: serde_json::Value,
    #[cfg(feature = "sqlite")]
    pub metadata: String,

    #[cfg(not(feature = "sqlite"))]
    pub created_at: DateTime<Utc>,
    #[cfg(feature = "sqlite")]
    pub created_at: String,

    #[cfg(not(feature = "sqlite"))]
    pub updated_at: DateTime<Utc>,
    #[cfg(feature = "sqlite")]
    pub updated_at: String,

    #[cfg(not(feature = "sqlite"))]
    pub completed_at: Option<DateTime<Utc>>,
    #[cfg(feature = "sqlite")]
    pub completed_at: Option<String>,

    #[cfg(not(feature = "sqlite"))]
    pub last_reconciled_at: Option<DateTime<Utc>>,
    #[cfg(feature = "sqlite")]
    pub last_reconciled_at: Option<String>,
}

/// Tenant gateway credentials row.
#[derive(FromRow)]
pub struct DbCredentials {
    pub api_key: String,
    pub webhook_secret: String,

    #[cfg(not(feature = "sqlite"))]
    pub sandbox: bool,
    #[cfg(feature = "sqlite")]
    pub sandbox: i64,
}

impl DbCredentials {
    pub fn into_domain(self) -> GatewayCredentials {
        GatewayCredentials {
            api_key: self.api_key,
            webhook_secret: self.webhook_secret,
            #[cfg(not(feature = "sqlite"))]
            sandbox: self.sandbox,
            #[cfg(feature = "sqlite")]
            sandbox: self.sandbox != 0,
        }
    }
}

/// Enrollment row (the subset owned by the wider platform that this
/// subsystem reads).
#[derive(FromRow)]
pub struct DbEnrollment {
    #[cfg(not(feature = "sqlite"))]
    pub id: Uuid,
    #[cfg(feature = "sqlite")]
    pub id: String,

    #[cfg(not(feature = "sqlite"))]
    pub school_id: Uuid,
    #[cfg(feature = "sqlite")]
    pub school_id: String,

    #[cfg(not(feature = "sqlite"))]
    pub student_id: Uuid,
    #[cfg(feature = "sqlite")]
    pub student_id: String,
}

/// One aggregated (school, status, day, currency) bucket.
#[derive(FromRow)]
pub struct DbReportRow {
    #[cfg(not(feature = "sqlite"))]
    pub school_id: Uuid,
    #[cfg(feature = "sqlite")]
    pub school_id: String,

    pub status: String,

    #[cfg(not(feature = "sqlite"))]
    pub day: chrono::NaiveDate,
    #[cfg(feature = "sqlite")]
    pub day: String,

    pub currency: String,
    pub count: i64,
    pub total_minor: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

pub fn parse_enum<T: FromStr>(s: &str, what: &str) -> Result<T, LedgerError> {
    s.parse()
        .map_err(|_| LedgerError::Database(format!("Unknown {what}: {s}")))
}

#[cfg(feature = "sqlite")]
pub fn parse_uuid(s: &str) -> Result<uuid::Uuid, LedgerError> {
    uuid::Uuid::parse_str(s).map_err(|e| LedgerError::Database(e.to_string()))
}

#[cfg(feature = "sqlite")]
pub fn parse_datetime(s: &str) -> Result<chrono::DateTime<chrono::Utc>, LedgerError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map_err(|e| LedgerError::Database(e.to_string()))
        .map(|dt| dt.with_timezone(&chrono::Utc))
}

// ─────────────────────────────────────────────────────────────────────────────
// Domain conversion (feature-gated implementations)
// ─────────────────────────────────────────────────────────────────────────────

impl DbPaymentRecord {
    /// Convert database row to domain PaymentRecord.
    pub fn into_domain(self) -> Result<PaymentRecord, LedgerError> {
        let gateway: Gateway = parse_enum(&self.gateway, "gateway")?;
        let currency: Currency = parse_enum(&self.currency, "currency")?;
        let status: PaymentStatus = parse_enum(&self.status, "status")?;
        let payment_method: PaymentMethod = parse_enum(&self.payment_method, "payment method")?;
        let amount = Money::new(self.amount, currency).map_err(LedgerError::Domain)?;

        #[cfg(not(feature = "sqlite"))]
        let (
            id,
            enrollment_id,
            school_id,
            student_id,
            metadata,
            created_at,
            updated_at,
            completed_at,
            last_reconciled_at,
        ) = (
            PaymentId::from_uuid(self.id),
            EnrollmentId::from_uuid(self.enrollment_id),
            SchoolId::from_uuid(self.school_id),
            StudentId::from_uuid(self.student_id),
            self.metadata,
            self.created_at,
            self.updated_at,
            self.completed_at,
            self.last_reconciled_at,
        );

        #[cfg(feature = "sqlite")]
        let (
            id,
            enrollment_id,
            school_id,
            student_id,
            metadata,
            created_at,
            updated_at,
            completed_at,
            last_reconciled_at,
        ) = {
            let metadata: serde_json::Value = serde_json::from_str(&self.metadata)
                .map_err(|e| LedgerError::Database(e.to_string()))?;
            (
                PaymentId::from_uuid(parse_uuid(&self.id)?),
                EnrollmentId::from_uuid(parse_uuid(&self.enrollment_id)?),
                SchoolId::from_uuid(parse_uuid(&self.school_id)?),
                StudentId::from_uuid(parse_uuid(&self.student_id)?),
                metadata,
                parse_datetime(&self.created_at)?,
                parse_datetime(&self.updated_at)?,
                self.completed_at.as_deref().map(parse_datetime).transpose()?,
                self.last_reconciled_at
                    .as_deref()
                    .map(parse_datetime)
                    .transpose()?,
            )
        };

        Ok(PaymentRecord::from_parts(
            id,
            self.external_id,
            gateway,
            enrollment_id,
            school_id,
            student_id,
            amount,
            status,
            payment_method,
            metadata,
            created_at,
            updated_at,
            completed_at,
            last_reconciled_at,
        ))
    }
}

impl DbEnrollment {
    pub fn into_domain(self) -> Result<EnrollmentRef, LedgerError> {
        #[cfg(not(feature = "sqlite"))]
        let (id, school_id, student_id) = (self.id, self.school_id, self.student_id);

        #[cfg(feature = "sqlite")]
        let (id, school_id, student_id) = (
            parse_uuid(&self.id)?,
            parse_uuid(&self.school_id)?,
            parse_uuid(&self.student_id)?,
        );

        Ok(EnrollmentRef {
            id: EnrollmentId::from_uuid(id),
            school_id: SchoolId::from_uuid(school_id),
            student_id: StudentId::from_uuid(student_id),
        })
    }
}

impl DbReportRow {
    pub fn into_domain(self) -> Result<ReportRow, LedgerError> {
        let status: PaymentStatus = parse_enum(&self.status, "status")?;
        let currency: Currency = parse_enum(&self.currency, "currency")?;

        #[cfg(not(feature = "sqlite"))]
        let (school_id, day) = (SchoolId::from_uuid(self.school_id), self.day);

        #[cfg(feature = "sqlite")]
        let (school_id, day) = (
            SchoolId::from_uuid(parse_uuid(&self.school_id)?),
            self.day
                .parse::<chrono::NaiveDate>()
                .map_err(|e| LedgerError::Database(e.to_string()))?,
        );

        Ok(ReportRow {
            school_id,
            status,
            day,
            currency,
            count: self.count,
            total_minor: self.total_minor,
        })
    }
}
