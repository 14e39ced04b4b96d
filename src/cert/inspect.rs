// src/cert/inspect.rs
use super::bundle::subject_fields;
use super::ca::ORGANIZATIONAL_UNIT_TAG;
use crate::error::{PkiError, Result};
use crate::store::CertStore;
use chrono::{DateTime, Duration, TimeZone, Utc};
use openssl::hash::MessageDigest;
use openssl::x509::X509;
use serde::{Deserialize, Serialize};
use std::fmt;
use x509_parser::prelude::{FromDer, ParsedExtension, X509Certificate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertStatus {
    Valid,
    ExpiringSoon,
    Expired,
}

impl fmt::Display for CertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "Valid"),
            Self::ExpiringSoon => write!(f, "ExpiringSoon"),
            Self::Expired => write!(f, "Expired"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub slot: String,
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub serial: String,
    pub fingerprint: String,
    pub is_ca: bool,
    /// Issued by, or itself, a CA tagged for the inspected cluster.
    pub managed: bool,
}

impl CertificateInfo {
    pub fn from_pem(slot: &str, pem: &str, cluster_name: &str) -> Result<Self> {
        let cert_der = X509::from_pem(pem.as_bytes())
            .and_then(|cert| cert.to_der())
            .map_err(|e| PkiError::parse(format!("certificate in slot {}", slot), e))?;

        let (_remainder, cert) = X509Certificate::from_der(&cert_der)
            .map_err(|e| PkiError::parse(format!("certificate in slot {}", slot), e))?;

        let not_before = Utc
            .timestamp_opt(cert.validity().not_before.timestamp(), 0)
            .single()
            .ok_or_else(|| PkiError::parse(slot, "invalid not_before timestamp"))?;
        let not_after = Utc
            .timestamp_opt(cert.validity().not_after.timestamp(), 0)
            .single()
            .ok_or_else(|| PkiError::parse(slot, "invalid not_after timestamp"))?;

        let is_ca = cert
            .extensions()
            .iter()
            .find_map(|ext| match ext.parsed_extension() {
                ParsedExtension::BasicConstraints(bc) => Some(bc.ca),
                _ => None,
            })
            .unwrap_or(false);

        let tagged = |units: &[String]| {
            units.iter().any(|u| u == ORGANIZATIONAL_UNIT_TAG)
                && units.iter().any(|u| u == cluster_name)
        };
        let managed = tagged(subject_fields(cert.subject()).organizational_unit.as_slice())
            || tagged(subject_fields(cert.issuer()).organizational_unit.as_slice());

        Ok(Self {
            slot: slot.to_string(),
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            not_before,
            not_after,
            serial: hex::encode(cert.raw_serial()),
            fingerprint: hex::encode(openssl::hash::hash(MessageDigest::sha256(), &cert_der)?),
            is_ca,
            managed,
        })
    }

    pub fn status(&self, now: DateTime<Utc>, window: Duration) -> CertStatus {
        if self.not_after < now {
            CertStatus::Expired
        } else if self.not_after - now < window {
            CertStatus::ExpiringSoon
        } else {
            CertStatus::Valid
        }
    }
}

/// Inspects every non-empty certificate slot of `store`. Key slots are
/// skipped.
pub fn inspect_store(store: &CertStore, cluster_name: &str) -> Result<Vec<CertificateInfo>> {
    store
        .slots()
        .filter(|(slot, pem)| !slot.ends_with("-key.pem") && !pem.is_empty())
        .map(|(slot, pem)| CertificateInfo::from_pem(slot, pem, cluster_name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::ensure;
    use crate::cert::rotation::DEFAULT_EXPIRY_WINDOW_DAYS;
    use crate::config::test_identity;

    #[test]
    fn reports_every_certificate_slot() {
        let identity = test_identity();
        let mut store = CertStore::new();
        ensure(&identity, &mut store).unwrap();

        let infos = inspect_store(&store, &identity.name).unwrap();
        assert_eq!(infos.len(), 22);
        assert_eq!(infos.iter().filter(|i| i.is_ca).count(), 8);
        assert!(infos.iter().all(|i| i.managed));
        assert!(infos.iter().all(|i| i.fingerprint.len() == 64));

        let window = Duration::days(DEFAULT_EXPIRY_WINDOW_DAYS);
        assert!(infos
            .iter()
            .all(|i| i.status(Utc::now(), window) == CertStatus::Valid));
    }

    #[test]
    fn foreign_cluster_is_not_managed() {
        let mut store = CertStore::new();
        ensure(&test_identity(), &mut store).unwrap();

        let infos = inspect_store(&store, "someone-else").unwrap();
        assert!(infos.iter().all(|i| !i.managed));
    }

    #[test]
    fn classifies_expiry() {
        let now = Utc::now();
        let mut info = CertificateInfo {
            slot: "tls-apiserver.pem".to_string(),
            subject: String::new(),
            issuer: String::new(),
            not_before: now - Duration::days(10),
            not_after: now + Duration::days(10),
            serial: String::new(),
            fingerprint: String::new(),
            is_ca: false,
            managed: true,
        };
        assert_eq!(info.status(now, Duration::days(30)), CertStatus::ExpiringSoon);
        assert_eq!(info.status(now, Duration::days(5)), CertStatus::Valid);
        info.not_after = now - Duration::days(1);
        assert_eq!(info.status(now, Duration::days(5)), CertStatus::Expired);
    }
}
