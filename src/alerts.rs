// Certificate expiry alerts in the Alertmanager v1 format

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::SslCertificate;

pub const ALERT_NAME: &str = "SSLCertificateExpiring";
pub const CRITICAL_WITHIN_DAYS: i64 = 7;
pub const WARNING_WITHIN_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    Warning,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
        }
    }
}

/// Whole days left, truncated toward zero.
pub fn days_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_days()
}

/// `None` means the certificate is not alerted on.
pub fn classify(days_remaining: i64) -> Option<Severity> {
    if days_remaining <= CRITICAL_WITHIN_DAYS {
        Some(Severity::Critical)
    } else if days_remaining <= WARNING_WITHIN_DAYS {
        Some(Severity::Warning)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    #[serde(rename = "startsAt")]
    pub starts_at: DateTime<Utc>,
    #[serde(rename = "endsAt", default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
}

pub fn build_alert(cert: &SslCertificate, now: DateTime<Utc>) -> Option<Alert> {
    let days = days_until(cert.expires_at, now);
    let severity = classify(days)?;
    let issuer = cert.issuer.clone().unwrap_or_default();

    let summary = if cert.expires_at < now {
        format!("SSL certificate for {} has EXPIRED", cert.domain)
    } else {
        format!("SSL certificate for {} expires in {} days", cert.domain, days)
    };
    let description = format!(
        "Certificate issued by {} expires at {}",
        issuer,
        cert.expires_at.format("%Y-%m-%d %H:%M:%S")
    );

    let labels = BTreeMap::from([
        ("alertname".to_string(), ALERT_NAME.to_string()),
        ("severity".to_string(), severity.as_str().to_string()),
        ("domain".to_string(), cert.domain.clone()),
        ("issuer".to_string(), issuer),
        ("server_id".to_string(), cert.server_id.clone()),
    ]);
    let annotations = BTreeMap::from([
        ("summary".to_string(), summary),
        ("description".to_string(), description),
    ]);

    Some(Alert {
        labels,
        annotations,
        starts_at: now,
        ends_at: None,
    })
}

/// One alert per certificate inside the warning window, all stamped with `now`.
pub fn build_alerts(certs: &[SslCertificate], now: DateTime<Utc>) -> Vec<Alert> {
    certs.iter().filter_map(|cert| build_alert(cert, now)).collect()
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to send alerts: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Alertmanager returned status: {0}")]
    Status(u16),
}

/// Posts alert batches to an Alertmanager instance. No retries.
#[derive(Clone, Default)]
pub struct AlertPublisher {
    client: reqwest::Client,
}

impl AlertPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts_endpoint(base_url: &str) -> String {
        format!("{}/api/v1/alerts", base_url.trim_end_matches('/'))
    }

    pub async fn publish(&self, base_url: &str, alerts: &[Alert]) -> Result<(), PublishError> {
        let endpoint = Self::alerts_endpoint(base_url);
        let response = self.client.post(&endpoint).json(alerts).send().await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(PublishError::Status(status.as_u16()));
        }

        tracing::info!(endpoint = %endpoint, count = alerts.len(), "Published certificate alerts");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn cert(expires_at: DateTime<Utc>) -> SslCertificate {
        SslCertificate {
            id: "c1".into(),
            server_id: "s1".into(),
            domain: "example.com".into(),
            issuer: Some("Let's Encrypt".into()),
            issued_at: expires_at - Duration::days(90),
            expires_at,
            status: "active".into(),
            auto_renew: true,
            last_checked_at: None,
            created_at: expires_at,
            updated_at: expires_at,
        }
    }

    #[test]
    fn classification_boundaries() {
        assert_eq!(classify(-1), Some(Severity::Critical));
        assert_eq!(classify(0), Some(Severity::Critical));
        assert_eq!(classify(7), Some(Severity::Critical));
        assert_eq!(classify(8), Some(Severity::Warning));
        assert_eq!(classify(30), Some(Severity::Warning));
        assert_eq!(classify(31), None);
    }

    #[test]
    fn day_count_truncates_toward_zero() {
        let now = Utc::now();
        assert_eq!(days_until(now + Duration::hours(7 * 24 + 23), now), 7);
        assert_eq!(days_until(now - Duration::hours(12), now), 0);
        assert_eq!(days_until(now - Duration::hours(25), now), -1);
    }

    #[test]
    fn alert_labels_and_annotations() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let expired = build_alert(&cert(now - Duration::days(2)), now).unwrap();
        assert_eq!(expired.labels["alertname"], ALERT_NAME);
        assert_eq!(expired.labels["severity"], "critical");
        assert_eq!(expired.labels["issuer"], "Let's Encrypt");
        assert_eq!(expired.annotations["summary"], "SSL certificate for example.com has EXPIRED");
        assert_eq!(
            expired.annotations["description"],
            "Certificate issued by Let's Encrypt expires at 2024-04-29 12:00:00"
        );

        let soon = build_alert(&cert(now + Duration::days(20)), now).unwrap();
        assert_eq!(soon.labels["severity"], "warning");
        assert_eq!(soon.annotations["summary"], "SSL certificate for example.com expires in 20 days");

        assert!(build_alert(&cert(now + Duration::days(90)), now).is_none());
    }

    #[test]
    fn expired_within_the_last_day_reads_as_expired() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let alert = build_alert(&cert(now - Duration::hours(12)), now).unwrap();
        assert_eq!(alert.labels["severity"], "critical");
        assert_eq!(alert.annotations["summary"], "SSL certificate for example.com has EXPIRED");

        let today = build_alert(&cert(now + Duration::hours(12)), now).unwrap();
        assert_eq!(today.annotations["summary"], "SSL certificate for example.com expires in 0 days");
    }

    #[test]
    fn wire_format_uses_camel_case_timestamps() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let alerts = build_alerts(&[cert(now + Duration::days(3))], now);
        let json = serde_json::to_value(&alerts).unwrap();

        assert_eq!(json[0]["startsAt"], "2024-05-01T12:00:00Z");
        assert!(json[0].get("endsAt").is_none());
        assert_eq!(json[0]["labels"]["domain"], "example.com");
    }

    #[test]
    fn endpoint_joins_cleanly() {
        assert_eq!(
            AlertPublisher::alerts_endpoint("http://am:9093/"),
            "http://am:9093/api/v1/alerts"
        );
        assert_eq!(
            AlertPublisher::alerts_endpoint("http://am:9093"),
            "http://am:9093/api/v1/alerts"
        );
    }
}
