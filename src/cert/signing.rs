// src/cert/signing.rs
use super::bundle::Bundle;
use super::types::{ExtKeyUsage, SubjectFields};
use crate::error::{PkiError, Result};
use chrono::{DateTime, Duration, Utc};
use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAlternativeName,
};
use openssl::x509::{X509Builder, X509Name, X509NameBuilder};
use std::net::IpAddr;
use tracing::debug;

pub const KEY_BITS: u32 = 2048;

/// Validity applied when a config leaves it unset (2 years).
pub const DEFAULT_VALIDITY_DAYS: i64 = 2 * 365;

/// Allowance for clock skew between issuer and verifier.
pub const BACKDATE_HOURS: i64 = 1;

#[derive(Debug, Clone, Default)]
pub struct CertificateConfig {
    pub common_name: String,
    pub organization: Vec<String>,
    pub organizational_unit: Vec<String>,
    pub province: Vec<String>,
    pub locality: Vec<String>,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    pub usages: Vec<ExtKeyUsage>,
    pub validity: Option<Duration>,
}

impl CertificateConfig {
    pub fn client(common_name: impl Into<String>, groups: Vec<String>) -> Self {
        Self {
            common_name: common_name.into(),
            organization: groups,
            usages: vec![ExtKeyUsage::ClientAuth],
            ..Default::default()
        }
    }

    pub fn server(
        common_name: impl Into<String>,
        dns_names: Vec<String>,
        ip_addresses: Vec<IpAddr>,
    ) -> Self {
        Self {
            common_name: common_name.into(),
            dns_names,
            ip_addresses,
            usages: vec![ExtKeyUsage::ServerAuth],
            ..Default::default()
        }
    }

    pub fn with_subject(mut self, subject: SubjectFields) -> Self {
        self.common_name = subject.common_name;
        self.organization = subject.organization;
        self.organizational_unit = subject.organizational_unit;
        self.province = subject.province;
        self.locality = subject.locality;
        self
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = Some(validity);
        self
    }

    pub fn validity(&self) -> Duration {
        self.validity.unwrap_or_else(|| Duration::days(DEFAULT_VALIDITY_DAYS))
    }

    fn subject(&self) -> SubjectFields {
        SubjectFields {
            common_name: self.common_name.clone(),
            organization: self.organization.clone(),
            organizational_unit: self.organizational_unit.clone(),
            province: self.province.clone(),
            locality: self.locality.clone(),
        }
    }
}

/// Issues a new leaf certificate under `ca`. The store is never touched.
pub fn sign(ca: &Bundle, config: &CertificateConfig) -> Result<Bundle> {
    if !ca.is_ca() {
        return Err(PkiError::SigningPrecondition {
            issuer: ca.common_name().to_string(),
        });
    }

    debug!(
        common_name = %config.common_name,
        issuer = %ca.common_name(),
        "signing certificate"
    );

    let key = generate_key()?;
    let now = Utc::now();
    let not_before = std::cmp::max(now - Duration::hours(BACKDATE_HOURS), ca.not_before());
    let not_after = now + config.validity();

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    builder.set_serial_number(random_serial()?.as_ref())?;
    let subject = build_name(&config.subject())?;
    builder.set_subject_name(&subject)?;
    builder.set_issuer_name(ca.certificate().subject_name())?;
    builder.set_not_before(asn1_time(not_before)?.as_ref())?;
    builder.set_not_after(asn1_time(not_after)?.as_ref())?;
    builder.set_pubkey(&key)?;

    builder.append_extension(BasicConstraints::new().critical().build()?)?;
    builder.append_extension(
        KeyUsage::new()
            .critical()
            .key_encipherment()
            .digital_signature()
            .build()?,
    )?;
    if !config.usages.is_empty() {
        let mut eku = ExtendedKeyUsage::new();
        for usage in &config.usages {
            match usage {
                ExtKeyUsage::ServerAuth => eku.server_auth(),
                ExtKeyUsage::ClientAuth => eku.client_auth(),
            };
        }
        builder.append_extension(eku.build()?)?;
    }

    let aki = {
        let ctx = builder.x509v3_context(Some(ca.certificate()), None);
        AuthorityKeyIdentifier::new().keyid(false).build(&ctx)?
    };
    builder.append_extension(aki)?;

    if !config.dns_names.is_empty() || !config.ip_addresses.is_empty() {
        let mut san = SubjectAlternativeName::new();
        for dns in &config.dns_names {
            san.dns(dns);
        }
        for ip in &config.ip_addresses {
            san.ip(&ip.to_string());
        }
        let san = {
            let ctx = builder.x509v3_context(Some(ca.certificate()), None);
            san.build(&ctx)?
        };
        builder.append_extension(san)?;
    }

    builder.sign(ca.private_key(), MessageDigest::sha256())?;
    Bundle::new(key, builder.build())
}

pub(crate) fn generate_key() -> Result<PKey<Private>> {
    Ok(PKey::from_rsa(Rsa::generate(KEY_BITS)?)?)
}

/// Random positive serial number of at most 63 bits.
pub(crate) fn random_serial() -> Result<Asn1Integer> {
    let mut serial = BigNum::new()?;
    serial.rand(62, MsbOption::MAYBE_ZERO, false)?;
    serial.add_word(1)?;
    Ok(serial.to_asn1_integer()?)
}

pub(crate) fn asn1_time(at: DateTime<Utc>) -> Result<Asn1Time> {
    Ok(Asn1Time::from_unix(at.timestamp())?)
}

/// Empty values are skipped; openssl rejects zero-length entries.
pub(crate) fn build_name(subject: &SubjectFields) -> Result<X509Name> {
    let mut name = X509NameBuilder::new()?;
    let entries = [
        (Nid::ORGANIZATIONNAME, &subject.organization),
        (Nid::ORGANIZATIONALUNITNAME, &subject.organizational_unit),
        (Nid::STATEORPROVINCENAME, &subject.province),
        (Nid::LOCALITYNAME, &subject.locality),
    ];
    for (nid, values) in entries {
        for value in values.iter().filter(|v| !v.is_empty()) {
            name.append_entry_by_nid(nid, value)?;
        }
    }
    if !subject.common_name.is_empty() {
        name.append_entry_by_nid(Nid::COMMONNAME, &subject.common_name)?;
    }
    Ok(name.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::ca::create_ca;

    #[test]
    fn signs_leaf_under_ca() {
        let ca = create_ca("test-cluster", "TLS").expect("CA creation should succeed");
        let config = CertificateConfig::server(
            "apiserver",
            vec!["kubernetes".to_string(), "kubernetes.default".to_string()],
            vec!["10.0.0.1".parse().unwrap()],
        );

        let leaf = sign(&ca, &config).expect("signing should succeed");

        assert!(!leaf.is_ca());
        assert_eq!(leaf.common_name(), "apiserver");
        assert_eq!(leaf.meta().dns_names, config.dns_names);
        assert_eq!(leaf.meta().ip_addresses, config.ip_addresses);
        let ca_key = ca.certificate().public_key().unwrap();
        assert!(leaf.certificate().verify(&ca_key).unwrap());
    }

    #[test]
    fn leaf_is_never_valid_before_its_ca() {
        let ca = create_ca("test-cluster", "TLS").unwrap();
        let leaf = sign(&ca, &CertificateConfig::client("kube-proxy", vec![])).unwrap();
        assert!(leaf.not_before() >= ca.not_before());
        assert!(leaf.not_before() <= Utc::now());
    }

    #[test]
    fn default_validity_is_two_years() {
        let ca = create_ca("test-cluster", "TLS").unwrap();
        let before = Utc::now();
        let leaf = sign(&ca, &CertificateConfig::client("kube-proxy", vec![])).unwrap();
        let expected = before + Duration::days(DEFAULT_VALIDITY_DAYS);
        let drift = (leaf.not_after() - expected).num_seconds().abs();
        assert!(drift < 60, "not_after drifted by {drift}s");
    }

    #[test]
    fn subject_fields_are_preserved() {
        let ca = create_ca("test-cluster", "Apiserver-Clients").unwrap();
        let config = CertificateConfig::client(
            "cluster-admin",
            vec!["system:masters".to_string(), "admins".to_string()],
        );
        let leaf = sign(&ca, &config).unwrap();
        assert_eq!(
            leaf.subject().organization,
            vec!["system:masters".to_string(), "admins".to_string()]
        );
    }

    #[test]
    fn refuses_to_sign_with_non_ca_bundle() {
        let ca = create_ca("test-cluster", "TLS").unwrap();
        let leaf = sign(&ca, &CertificateConfig::client("kube-proxy", vec![])).unwrap();

        let err = sign(&leaf, &CertificateConfig::client("other", vec![])).unwrap_err();
        match err {
            PkiError::SigningPrecondition { issuer } => assert_eq!(issuer, "kube-proxy"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn serial_fits_in_63_bits() {
        for _ in 0..64 {
            let serial = random_serial().unwrap().to_bn().unwrap();
            assert!(serial.num_bits() <= 63);
            assert!(serial.num_bits() > 0);
        }
    }
}
