// src/cert/rotation.rs
use super::bundle::Bundle;
use super::signing::CertificateConfig;
use chrono::{DateTime, Duration, Utc};
use std::fmt::Display;

pub const DEFAULT_EXPIRY_WINDOW_DAYS: i64 = 90;

/// How close to expiry a leaf may get before it is replaced.
#[derive(Debug, Clone, Copy)]
pub struct RotationPolicy {
    pub expiry_window: Duration,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            expiry_window: Duration::days(DEFAULT_EXPIRY_WINDOW_DAYS),
        }
    }
}

impl RotationPolicy {
    pub fn with_expiry_window_days(days: i64) -> Self {
        Self {
            expiry_window: Duration::days(days),
        }
    }
}

/// Decides whether `existing` must be replaced by a certificate built from
/// `desired`. Returns the reason of the first check that fires.
///
/// SAN lists are compared as ordered sequences, so a reordering alone
/// triggers rotation.
pub fn needs_rotation(
    existing: &Bundle,
    desired: &CertificateConfig,
    issuer: &Bundle,
    policy: &RotationPolicy,
    now: DateTime<Utc>,
) -> Option<String> {
    let meta = existing.meta();

    if meta.dns_names != desired.dns_names {
        return Some(format!(
            "DNS names changed: {}",
            sequence_diff(&meta.dns_names, &desired.dns_names)
        ));
    }

    if meta.ip_addresses != desired.ip_addresses {
        return Some(format!(
            "IP addresses changed: {}",
            sequence_diff(&meta.ip_addresses, &desired.ip_addresses)
        ));
    }

    if now + policy.expiry_window > meta.not_after {
        return Some(format!(
            "certificate expires at {}",
            meta.not_after.to_rfc3339()
        ));
    }

    let verified = issuer
        .certificate()
        .public_key()
        .and_then(|key| existing.certificate().verify(&key))
        .unwrap_or(false);
    if !verified {
        return Some(format!(
            "signature does not verify against {}",
            issuer.common_name()
        ));
    }

    None
}

/// `+added` and `-removed` tokens between two sequences, or `reordered`
/// when both hold the same members.
fn sequence_diff<T: PartialEq + Display>(old: &[T], new: &[T]) -> String {
    let mut tokens: Vec<String> = new
        .iter()
        .filter(|item| !old.contains(item))
        .map(|item| format!("+{}", item))
        .collect();
    tokens.extend(
        old.iter()
            .filter(|item| !new.contains(item))
            .map(|item| format!("-{}", item)),
    );

    if tokens.is_empty() {
        "reordered".to_string()
    } else {
        tokens.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::ca::create_ca;
    use crate::cert::signing::sign;
    use std::net::IpAddr;

    fn server_config(dns: &[&str], ips: &[&str]) -> CertificateConfig {
        CertificateConfig::server(
            "apiserver",
            dns.iter().map(|s| s.to_string()).collect(),
            ips.iter().map(|s| s.parse::<IpAddr>().unwrap()).collect(),
        )
    }

    #[test]
    fn unchanged_certificate_is_kept() {
        let ca = create_ca("c1", "TLS").unwrap();
        let config = server_config(&["kubernetes"], &["10.0.0.1"]);
        let leaf = sign(&ca, &config).unwrap();

        let reason = needs_rotation(&leaf, &config, &ca, &RotationPolicy::default(), Utc::now());
        assert_eq!(reason, None);
    }

    #[test]
    fn dns_change_reports_diff() {
        let ca = create_ca("c1", "TLS").unwrap();
        let leaf = sign(&ca, &server_config(&["a", "b"], &[])).unwrap();

        let reason = needs_rotation(
            &leaf,
            &server_config(&["a", "c"], &[]),
            &ca,
            &RotationPolicy::default(),
            Utc::now(),
        )
        .expect("DNS drift rotates");
        assert!(reason.contains("+c"), "{reason}");
        assert!(reason.contains("-b"), "{reason}");
    }

    #[test]
    fn reordering_alone_rotates() {
        let ca = create_ca("c1", "TLS").unwrap();
        let leaf = sign(&ca, &server_config(&["a", "b"], &[])).unwrap();

        let reason = needs_rotation(
            &leaf,
            &server_config(&["b", "a"], &[]),
            &ca,
            &RotationPolicy::default(),
            Utc::now(),
        );
        assert_eq!(reason.as_deref(), Some("DNS names changed: reordered"));
    }

    #[test]
    fn ip_change_rotates() {
        let ca = create_ca("c1", "TLS").unwrap();
        let leaf = sign(&ca, &server_config(&["a"], &["10.0.0.1"])).unwrap();

        let reason = needs_rotation(
            &leaf,
            &server_config(&["a"], &["10.0.0.2"]),
            &ca,
            &RotationPolicy::default(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(reason, "IP addresses changed: +10.0.0.2 -10.0.0.1");
    }

    #[test]
    fn expiry_window_boundary() {
        let ca = create_ca("c1", "TLS").unwrap();
        let policy = RotationPolicy::default();

        let config = server_config(&["a"], &[]).with_validity(Duration::days(89));
        let soon = sign(&ca, &config).unwrap();
        let reason = needs_rotation(&soon, &config, &ca, &policy, Utc::now()).unwrap();
        assert!(reason.starts_with("certificate expires"), "{reason}");

        let config = server_config(&["a"], &[]).with_validity(Duration::days(91));
        let later = sign(&ca, &config).unwrap();
        assert_eq!(needs_rotation(&later, &config, &ca, &policy, Utc::now()), None);
    }

    #[test]
    fn foreign_issuer_rotates() {
        let old_ca = create_ca("c1", "TLS").unwrap();
        let new_ca = create_ca("c1", "TLS").unwrap();
        let config = server_config(&["a"], &[]);
        let leaf = sign(&old_ca, &config).unwrap();

        let reason = needs_rotation(&leaf, &config, &new_ca, &RotationPolicy::default(), Utc::now())
            .unwrap();
        assert!(reason.starts_with("signature does not verify"), "{reason}");
    }

    #[test]
    fn san_checks_win_over_expiry() {
        let ca = create_ca("c1", "TLS").unwrap();
        let expiring = server_config(&["a"], &[]).with_validity(Duration::days(1));
        let leaf = sign(&ca, &expiring).unwrap();

        let reason = needs_rotation(
            &leaf,
            &server_config(&["b"], &[]),
            &ca,
            &RotationPolicy::default(),
            Utc::now(),
        )
        .unwrap();
        assert!(reason.starts_with("DNS names changed"));
    }
}
