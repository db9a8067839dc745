// Certificate gauges in the Prometheus text exposition format

use chrono::{DateTime, Utc};

use crate::models::SslCertificate;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Escapes a label value: backslash, double quote and newline.
pub fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Fractional days until expiry; negative once expired.
pub fn expiry_days(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let remaining = expires_at - now;
    remaining.num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY
}

pub fn render_certificate_metrics(certs: &[SslCertificate], now: DateTime<Utc>) -> String {
    let mut out = String::new();

    out.push_str("# HELP ssl_certificate_expiry_days Days until SSL certificate expires\n");
    out.push_str("# TYPE ssl_certificate_expiry_days gauge\n");
    for cert in certs {
        out.push_str(&format!(
            "ssl_certificate_expiry_days{{domain=\"{}\",issuer=\"{}\",server_id=\"{}\"}} {:.2}\n",
            escape_label_value(&cert.domain),
            escape_label_value(cert.issuer.as_deref().unwrap_or_default()),
            escape_label_value(&cert.server_id),
            expiry_days(cert.expires_at, now)
        ));
    }

    out.push('\n');
    out.push_str(
        "# HELP ssl_certificate_auto_renew SSL certificate auto-renew status (1=enabled, 0=disabled)\n",
    );
    out.push_str("# TYPE ssl_certificate_auto_renew gauge\n");
    for cert in certs {
        out.push_str(&format!(
            "ssl_certificate_auto_renew{{domain=\"{}\",server_id=\"{}\"}} {}\n",
            escape_label_value(&cert.domain),
            escape_label_value(&cert.server_id),
            u8::from(cert.auto_renew)
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cert(domain: &str, expires_at: DateTime<Utc>, auto_renew: bool) -> SslCertificate {
        SslCertificate {
            id: "c".into(),
            server_id: "srv-1".into(),
            domain: domain.into(),
            issuer: None,
            issued_at: expires_at - Duration::days(90),
            expires_at,
            status: "active".into(),
            auto_renew,
            last_checked_at: None,
            created_at: expires_at,
            updated_at: expires_at,
        }
    }

    #[test]
    fn expired_certificates_report_negative_days() {
        let now = Utc::now();
        let body = render_certificate_metrics(&[cert("old.example", now - Duration::days(3), false)], now);

        assert!(body.contains(
            "ssl_certificate_expiry_days{domain=\"old.example\",issuer=\"\",server_id=\"srv-1\"} -3.00"
        ));
        assert!(body.contains("ssl_certificate_auto_renew{domain=\"old.example\",server_id=\"srv-1\"} 0"));
    }

    #[test]
    fn document_layout() {
        let now = Utc::now();
        let body = render_certificate_metrics(
            &[cert("a.example", now + Duration::hours(36), true)],
            now,
        );
        let lines: Vec<&str> = body.lines().collect();

        assert_eq!(lines[0], "# HELP ssl_certificate_expiry_days Days until SSL certificate expires");
        assert_eq!(lines[1], "# TYPE ssl_certificate_expiry_days gauge");
        assert!(lines[2].ends_with(" 1.50"));
        assert_eq!(lines[3], "");
        assert_eq!(lines[5], "# TYPE ssl_certificate_auto_renew gauge");
        assert!(lines[6].ends_with(" 1"));
        assert!(body.ends_with(" 1\n"));
    }

    #[test]
    fn label_values_are_escaped() {
        assert_eq!(escape_label_value(r#"a"b\c"#), r#"a\"b\\c"#);
        assert_eq!(escape_label_value("line\nbreak"), "line\\nbreak");
    }
}
