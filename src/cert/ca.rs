// src/cert/ca.rs
use super::bundle::Bundle;
use super::signing::{asn1_time, build_name, generate_key, random_serial, BACKDATE_HOURS};
use super::types::{CertKind, CertUpdate, SubjectFields};
use crate::error::{PkiError, Result};
use crate::store::CertStore;
use chrono::{Duration, Utc};
use openssl::hash::MessageDigest;
use openssl::x509::extension::{BasicConstraints, KeyUsage, SubjectKeyIdentifier};
use openssl::x509::X509Builder;
use tracing::{debug, info};

/// Organizational unit stamped on every CA next to the cluster name, so
/// certificates issued by this engine can be recognized by inspection.
pub const ORGANIZATIONAL_UNIT_TAG: &str = "kluster-pki";

pub const CA_VALIDITY_DAYS: i64 = 10 * 365;

pub const TLS_ETCD: &str = "TLS-Etcd";
pub const ETCD_CLIENTS: &str = "Etcd-Clients";
pub const ETCD_PEERS: &str = "Etcd-Peers";
pub const APISERVER_CLIENTS: &str = "Apiserver-Clients";
pub const APISERVER_NODES: &str = "Apiserver-Nodes";
pub const KUBELET_CLIENTS: &str = "Kubelet-Clients";
pub const TLS: &str = "TLS";
pub const AGGREGATION: &str = "Aggregation";

/// One independent trust root and the store slots it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    pub name: String,
    /// Prefix shared by the CA slots and every leaf issued under it.
    pub slot_prefix: String,
    pub cert_slot: String,
    pub key_slot: String,
}

impl Authority {
    pub fn new(name: impl Into<String>, slot_prefix: impl Into<String>) -> Self {
        let slot_prefix = slot_prefix.into();
        Self {
            name: name.into(),
            cert_slot: format!("{}-ca.pem", slot_prefix),
            key_slot: format!("{}-ca-key.pem", slot_prefix),
            slot_prefix,
        }
    }

    pub fn leaf_cert_slot(&self, leaf: &str) -> String {
        format!("{}-{}.pem", self.slot_prefix, leaf)
    }

    pub fn leaf_key_slot(&self, leaf: &str) -> String {
        format!("{}-{}-key.pem", self.slot_prefix, leaf)
    }
}

/// The table of authorities a cluster PKI is built from.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    authorities: Vec<Authority>,
}

impl Hierarchy {
    pub fn new(authorities: Vec<Authority>) -> Self {
        Self { authorities }
    }

    pub fn standard() -> Self {
        Self::new(vec![
            Authority::new(TLS_ETCD, "tls-etcd"),
            Authority::new(ETCD_CLIENTS, "etcd-clients"),
            Authority::new(ETCD_PEERS, "etcd-peers"),
            Authority::new(APISERVER_CLIENTS, "apiserver-clients"),
            Authority::new(APISERVER_NODES, "apiserver-nodes"),
            Authority::new(KUBELET_CLIENTS, "kubelet-clients"),
            Authority::new(TLS, "tls"),
            Authority::new(AGGREGATION, "aggregation"),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&Authority> {
        self.authorities.iter().find(|a| a.name == name)
    }

    pub fn require(&self, name: &str) -> Result<&Authority> {
        self.get(name).ok_or_else(|| {
            PkiError::Configuration(format!("authority {} is not part of the hierarchy", name))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Authority> {
        self.authorities.iter()
    }
}

impl Default for Hierarchy {
    fn default() -> Self {
        Self::standard()
    }
}

/// Generates a fresh self-signed CA for `authority`.
pub fn create_ca(cluster_name: &str, authority: &str) -> Result<Bundle> {
    let key = generate_key()?;
    let now = Utc::now();
    let subject = build_name(&SubjectFields {
        common_name: format!("{} CA", authority),
        organizational_unit: vec![
            ORGANIZATIONAL_UNIT_TAG.to_string(),
            cluster_name.to_string(),
        ],
        ..Default::default()
    })?;

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    builder.set_serial_number(random_serial()?.as_ref())?;
    builder.set_subject_name(&subject)?;
    builder.set_issuer_name(&subject)?;
    builder.set_not_before(asn1_time(now - Duration::hours(BACKDATE_HOURS))?.as_ref())?;
    builder.set_not_after(asn1_time(now + Duration::days(CA_VALIDITY_DAYS))?.as_ref())?;
    builder.set_pubkey(&key)?;

    builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
    builder.append_extension(
        KeyUsage::new()
            .critical()
            .key_encipherment()
            .digital_signature()
            .key_cert_sign()
            .build()?,
    )?;
    let ski = {
        let ctx = builder.x509v3_context(None, None);
        SubjectKeyIdentifier::new().build(&ctx)?
    };
    builder.append_extension(ski)?;

    builder.sign(&key, MessageDigest::sha256())?;
    Bundle::new(key, builder.build())
}

/// Decodes the bundle held in a slot pair, naming the slot on failure.
pub fn decode_slots(store: &CertStore, cert_slot: &str, key_slot: &str) -> Result<Bundle> {
    Bundle::decode(store.get(key_slot), store.get(cert_slot)).map_err(|e| match e {
        PkiError::Parse { what, reason } => PkiError::Parse {
            what: format!("{} in slot {}", what, cert_slot),
            reason,
        },
        other => other,
    })
}

/// Returns the CA stored for `authority`, creating and storing it when
/// either slot is empty.
pub fn load_or_create_ca(
    store: &mut CertStore,
    cluster_name: &str,
    authority: &Authority,
) -> Result<(Bundle, Option<CertUpdate>)> {
    if !store.get(&authority.cert_slot).is_empty() && !store.get(&authority.key_slot).is_empty() {
        debug!(authority = %authority.name, "loading existing CA");
        let ca = decode_slots(store, &authority.cert_slot, &authority.key_slot)?;
        return Ok((ca, None));
    }

    info!(cluster = %cluster_name, authority = %authority.name, "creating CA");
    let ca = create_ca(cluster_name, &authority.name)?;
    store.set(&authority.cert_slot, ca.encode_cert()?);
    store.set(&authority.key_slot, ca.encode_key()?);

    let update = CertUpdate::new(CertKind::CA, &authority.name, "CA missing");
    Ok((ca, Some(update)))
}
