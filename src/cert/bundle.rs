// src/cert/bundle.rs
use super::types::SubjectFields;
use crate::error::{PkiError, Result};
use chrono::{DateTime, TimeZone, Utc};
use openssl::pkey::{Id, PKey, Private};
use openssl::x509::X509;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use x509_parser::prelude::{FromDer, GeneralName, ParsedExtension, X509Certificate, X509Name};
use x509_parser::x509::AttributeTypeAndValue;

/// A private key together with the certificate issued for it.
///
/// Bundles are rebuilt from PEM on every call and never cached.
pub struct Bundle {
    key: PKey<Private>,
    certificate: X509,
    meta: CertMeta,
}

/// Fields extracted once from the DER encoding of a certificate.
#[derive(Debug, Clone)]
pub struct CertMeta {
    pub is_ca: bool,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub subject: SubjectFields,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
}

impl Bundle {
    pub fn new(key: PKey<Private>, certificate: X509) -> Result<Self> {
        if key.id() != Id::RSA {
            return Err(PkiError::parse("private key", "key is not an RSA key"));
        }
        let der = certificate.to_der()?;
        let meta = CertMeta::from_der(&der)?;
        Ok(Self {
            key,
            certificate,
            meta,
        })
    }

    /// Decodes a bundle from a PEM private key and a PEM certificate chain.
    /// Only the first certificate block is kept.
    pub fn decode(key_pem: &str, cert_pem: &str) -> Result<Self> {
        let key = PKey::private_key_from_pem(key_pem.as_bytes())
            .map_err(|e| PkiError::parse("private key", e))?;
        let certificate = X509::stack_from_pem(cert_pem.as_bytes())
            .map_err(|e| PkiError::parse("certificate", e))?
            .into_iter()
            .next()
            .ok_or_else(|| PkiError::parse("certificate", "no certificate blocks found"))?;
        Self::new(key, certificate)
    }

    /// PEM block of type `CERTIFICATE`.
    pub fn encode_cert(&self) -> Result<String> {
        pem_string(self.certificate.to_pem()?)
    }

    /// PKCS#1 PEM block of type `RSA PRIVATE KEY`.
    pub fn encode_key(&self) -> Result<String> {
        pem_string(self.key.rsa()?.private_key_to_pem()?)
    }

    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }

    pub fn private_key(&self) -> &PKey<Private> {
        &self.key
    }

    pub fn meta(&self) -> &CertMeta {
        &self.meta
    }

    pub fn is_ca(&self) -> bool {
        self.meta.is_ca
    }

    pub fn not_before(&self) -> DateTime<Utc> {
        self.meta.not_before
    }

    pub fn not_after(&self) -> DateTime<Utc> {
        self.meta.not_after
    }

    pub fn subject(&self) -> &SubjectFields {
        &self.meta.subject
    }

    pub fn common_name(&self) -> &str {
        &self.meta.subject.common_name
    }
}

impl std::fmt::Debug for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bundle")
            .field("common_name", &self.meta.subject.common_name)
            .field("is_ca", &self.meta.is_ca)
            .field("not_after", &self.meta.not_after)
            .finish_non_exhaustive()
    }
}

fn pem_string(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| PkiError::parse("PEM output", e))
}

impl CertMeta {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_remainder, cert) =
            X509Certificate::from_der(der).map_err(|e| PkiError::parse("certificate", e))?;

        let not_before = timestamp(cert.validity().not_before.timestamp())?;
        let not_after = timestamp(cert.validity().not_after.timestamp())?;

        let mut is_ca = false;
        let mut dns_names = Vec::new();
        let mut ip_addresses = Vec::new();
        for ext in cert.extensions() {
            match ext.parsed_extension() {
                ParsedExtension::BasicConstraints(bc) => is_ca = bc.ca,
                ParsedExtension::SubjectAlternativeName(san) => {
                    for name in &san.general_names {
                        match name {
                            GeneralName::DNSName(dns) => dns_names.push(dns.to_string()),
                            GeneralName::IPAddress(raw) => ip_addresses.push(ip_from_bytes(raw)?),
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            is_ca,
            not_before,
            not_after,
            subject: subject_fields(cert.subject()),
            dns_names,
            ip_addresses,
        })
    }
}

pub(crate) fn subject_fields(name: &X509Name<'_>) -> SubjectFields {
    fn collect<'a, 'b: 'a>(
        iter: impl Iterator<Item = &'a AttributeTypeAndValue<'b>>,
    ) -> Vec<String> {
        iter.filter_map(|attr| attr.as_str().ok().map(str::to_string))
            .collect()
    }

    SubjectFields {
        common_name: collect(name.iter_common_name())
            .into_iter()
            .next()
            .unwrap_or_default(),
        organization: collect(name.iter_organization()),
        organizational_unit: collect(name.iter_organizational_unit()),
        province: collect(name.iter_state_or_province()),
        locality: collect(name.iter_locality()),
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| PkiError::parse("certificate", "invalid validity timestamp"))
}

fn ip_from_bytes(raw: &[u8]) -> Result<IpAddr> {
    match raw.len() {
        4 => {
            let octets: [u8; 4] = raw
                .try_into()
                .map_err(|_| PkiError::parse("certificate", "invalid IPv4 SAN"))?;
            Ok(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = raw
                .try_into()
                .map_err(|_| PkiError::parse("certificate", "invalid IPv6 SAN"))?;
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        n => Err(PkiError::parse(
            "certificate",
            format!("IP SAN with unexpected length {}", n),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::ca::create_ca;

    #[test]
    fn pem_round_trip_reproduces_bundle() {
        let ca = create_ca("test-cluster", "TLS").expect("CA creation should succeed");
        let key_pem = ca.encode_key().unwrap();
        let cert_pem = ca.encode_cert().unwrap();

        assert!(key_pem.contains("BEGIN RSA PRIVATE KEY"));
        assert!(cert_pem.contains("BEGIN CERTIFICATE"));

        let decoded = Bundle::decode(&key_pem, &cert_pem).expect("decode should succeed");
        assert_eq!(
            decoded.certificate().to_der().unwrap(),
            ca.certificate().to_der().unwrap()
        );
        assert_eq!(
            decoded.private_key().private_key_to_der().unwrap(),
            ca.private_key().private_key_to_der().unwrap()
        );
        assert!(decoded.is_ca());
    }

    #[test]
    fn decode_rejects_missing_certificate() {
        let ca = create_ca("test-cluster", "TLS").unwrap();
        let err = Bundle::decode(&ca.encode_key().unwrap(), "").unwrap_err();
        assert!(matches!(err, PkiError::Parse { .. }));
    }

    #[test]
    fn decode_rejects_garbage_key() {
        let ca = create_ca("test-cluster", "TLS").unwrap();
        let err = Bundle::decode("not a key", &ca.encode_cert().unwrap()).unwrap_err();
        assert!(matches!(err, PkiError::Parse { .. }));
    }

    #[test]
    fn decode_rejects_non_rsa_key() {
        use openssl::ec::{EcGroup, EcKey};
        use openssl::nid::Nid;

        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let ec = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();
        let ec_pem = String::from_utf8(ec.private_key_to_pem_pkcs8().unwrap()).unwrap();
        let ca = create_ca("test-cluster", "TLS").unwrap();

        let err = Bundle::decode(&ec_pem, &ca.encode_cert().unwrap()).unwrap_err();
        match err {
            PkiError::Parse { reason, .. } => assert!(reason.contains("not an RSA key")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
