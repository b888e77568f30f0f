//! Financial report aggregation.
//!
//! The heavy lifting (GROUP BY school/status/day) happens in the ledger
//! query; this module rolls the buckets up, converts minor units for
//! display and renders the inline formats.

use chrono::{DateTime, Utc};

use enrollpay_types::{
    AppError, PaymentLedger, PaymentStatus, ReportRowView, ReportSummary, SchoolId,
};

use crate::PaymentService;

/// Inline report renderings. Spreadsheet and PDF exports are produced by
/// external formatters, not this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Csv,
}

impl std::str::FromStr for ReportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "csv" => Ok(ReportFormat::Csv),
            other => Err(AppError::BadRequest(format!(
                "Unsupported report format: {other}"
            ))),
        }
    }
}

/// Minor units to a major-unit decimal string ("1250.00").
fn display_minor(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let minor = minor.abs();
    format!("{sign}{}.{:02}", minor / 100, minor % 100)
}

impl<L: PaymentLedger> PaymentService<L> {
    /// Aggregated (school, status, day) buckets over `[from, to)`.
    #[tracing::instrument(skip(self))]
    pub async fn financial_report(
        &self,
        school_id: Option<SchoolId>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<ReportSummary, AppError> {
        if from >= to {
            return Err(AppError::BadRequest(
                "Report window start must precede its end".into(),
            ));
        }

        let rows = self.ledger().report_rows(school_id, from, to).await?;

        let mut paid_total_minor = 0;
        let mut paid_count = 0;
        let rows: Vec<ReportRowView> = rows
            .into_iter()
            .map(|r| {
                if r.status == PaymentStatus::Paid {
                    paid_total_minor += r.total_minor;
                    paid_count += r.count;
                }
                ReportRowView {
                    school_id: r.school_id,
                    status: r.status,
                    day: r.day,
                    currency: r.currency,
                    count: r.count,
                    total_minor: r.total_minor,
                    total_display: display_minor(r.total_minor),
                }
            })
            .collect();

        Ok(ReportSummary {
            from,
            to,
            rows,
            paid_total_minor,
            paid_count,
        })
    }
}

/// CSV rendering of a report summary.
pub fn render_csv(summary: &ReportSummary) -> String {
    let mut out = String::from("school_id,day,status,currency,count,total_minor,total\n");
    for row in &summary.rows {
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            row.school_id,
            row.day,
            row.status,
            row.currency.code(),
            row.count,
            row.total_minor,
            row.total_display,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse() {
        assert_eq!("json".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("CSV".parse::<ReportFormat>().unwrap(), ReportFormat::Csv);
        assert!("xlsx".parse::<ReportFormat>().is_err());
        assert!("pdf".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_display_minor() {
        assert_eq!(display_minor(125000), "1250.00");
        assert_eq!(display_minor(5), "0.05");
        assert_eq!(display_minor(0), "0.00");
    }
}
