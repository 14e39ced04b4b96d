// src/cert/orchestrator.rs
use super::bundle::Bundle;
use super::ca::{
    decode_slots, load_or_create_ca, Authority, Hierarchy, AGGREGATION, APISERVER_CLIENTS,
    ETCD_CLIENTS, KUBELET_CLIENTS, TLS, TLS_ETCD,
};
use super::rotation::{needs_rotation, RotationPolicy};
use super::signing::{sign, CertificateConfig};
use super::types::{CertKind, CertUpdate};
use crate::config::{ClusterIdentity, SanList};
use crate::error::{PkiError, Result};
use crate::store::CertStore;
use chrono::Utc;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, info};

/// A leaf certificate the engine keeps converged.
#[derive(Debug, Clone)]
pub struct LeafCertificate {
    /// Name reported in [`CertUpdate`]s.
    pub name: String,
    pub authority: &'static str,
    /// Slot suffix below the authority prefix, e.g. `apiserver` in
    /// `tls-apiserver.pem`.
    pub slot: &'static str,
    pub kind: CertKind,
    pub config: CertificateConfig,
}

impl LeafCertificate {
    fn client(
        name: &str,
        authority: &'static str,
        slot: &'static str,
        common_name: &str,
        groups: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            authority,
            slot,
            kind: CertKind::ClientCertificate,
            config: CertificateConfig::client(
                common_name,
                groups.iter().map(|g| g.to_string()).collect(),
            ),
        }
    }

    fn server(name: &str, authority: &'static str, slot: &'static str, sans: SanList) -> Self {
        Self {
            name: name.to_string(),
            authority,
            slot,
            kind: CertKind::ServerCertificate,
            config: CertificateConfig::server(name, sans.dns_names, sans.ip_addresses),
        }
    }
}

/// Client-auth leaves. Organization carries the RBAC groups.
pub fn client_certificates() -> Vec<LeafCertificate> {
    vec![
        LeafCertificate::client("etcd-client-apiserver", ETCD_CLIENTS, "apiserver", "apiserver", &[]),
        LeafCertificate::client("etcd-client-dex", ETCD_CLIENTS, "dex", "dex", &[]),
        LeafCertificate::client("etcd-backup-client", ETCD_CLIENTS, "backup", "backup", &[]),
        LeafCertificate::client(
            "cluster-admin",
            APISERVER_CLIENTS,
            "cluster-admin",
            "cluster-admin",
            &["system:masters"],
        ),
        LeafCertificate::client(
            "kube-controller-manager",
            APISERVER_CLIENTS,
            "kube-controller-manager",
            "system:kube-controller-manager",
            &[],
        ),
        LeafCertificate::client(
            "kube-proxy",
            APISERVER_CLIENTS,
            "kube-proxy",
            "system:kube-proxy",
            &[],
        ),
        LeafCertificate::client(
            "kube-scheduler",
            APISERVER_CLIENTS,
            "kube-scheduler",
            "system:kube-scheduler",
            &[],
        ),
        LeafCertificate::client(
            "tunnel-client",
            APISERVER_CLIENTS,
            "tunnel-client",
            "kluster:tunnel-client",
            &[],
        ),
        LeafCertificate::client(
            "csi-controller",
            APISERVER_CLIENTS,
            "csi-controller",
            "kluster:csi-controller",
            &[],
        ),
        LeafCertificate::client(
            "kubelet-client-apiserver",
            KUBELET_CLIENTS,
            "apiserver",
            "apiserver",
            &["system:masters"],
        ),
        LeafCertificate::client("aggregator", AGGREGATION, "aggregator", "aggregator", &[]),
    ]
}

/// Server-auth leaves, with SANs derived from the identity plus any
/// annotation-supplied extensions.
pub fn server_certificates(identity: &ClusterIdentity) -> Result<Vec<LeafCertificate>> {
    let advertise_ip = identity.advertise_ip()?;
    let service_ip = identity.api_service_ip()?;
    let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
    let name = &identity.name;
    let namespace = &identity.namespace;

    let mut apiserver = SanList {
        dns_names: vec![
            "kubernetes".to_string(),
            "kubernetes.default".to_string(),
            "kubernetes.default.svc".to_string(),
            "apiserver".to_string(),
            name.clone(),
            format!("{}.{}", name, namespace),
            format!("{}.{}.svc", name, namespace),
            format!("{}.{}", name, identity.domain),
        ],
        ip_addresses: vec![localhost, service_ip, advertise_ip],
    };
    apiserver.extend(identity.apiserver_sans()?);

    let mut tunnel = SanList {
        dns_names: vec![format!("{}-tunnel.{}", name, identity.domain)],
        ip_addresses: Vec::new(),
    };
    tunnel.extend(identity.tunnel_sans()?);

    let etcd = SanList {
        dns_names: vec![
            format!("{}-etcd", name),
            format!("{}-etcd.{}", name, namespace),
            "localhost".to_string(),
        ],
        ip_addresses: vec![localhost],
    };

    Ok(vec![
        LeafCertificate::server("apiserver", TLS, "apiserver", apiserver),
        LeafCertificate::server("tunnel-server", TLS, "tunnel-server", tunnel),
        LeafCertificate::server("etcd", TLS_ETCD, "etcd", etcd),
    ])
}

/// Drives the PKI of one cluster to its desired state.
#[derive(Debug, Clone, Default)]
pub struct CertificateEngine {
    hierarchy: Hierarchy,
    policy: RotationPolicy,
}

impl CertificateEngine {
    pub fn new(hierarchy: Hierarchy, policy: RotationPolicy) -> Self {
        Self { hierarchy, policy }
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// Creates missing CAs, then creates or rotates every leaf. Returns one
    /// [`CertUpdate`] per slot pair that was written.
    ///
    /// Configuration errors abort before the store is touched. Any other
    /// error leaves already written slots in place.
    pub fn ensure(
        &self,
        identity: &ClusterIdentity,
        store: &mut CertStore,
    ) -> Result<Vec<CertUpdate>> {
        identity.validate()?;
        let mut leaves = client_certificates();
        leaves.extend(server_certificates(identity)?);
        for leaf in &leaves {
            self.hierarchy.require(leaf.authority)?;
        }

        let mut updates = Vec::new();
        let mut authorities: HashMap<&str, Bundle> = HashMap::new();
        for authority in self.hierarchy.iter() {
            let (ca, update) = load_or_create_ca(store, &identity.name, authority)?;
            updates.extend(update);
            authorities.insert(authority.name.as_str(), ca);
        }

        for leaf in &leaves {
            let authority = self.hierarchy.require(leaf.authority)?;
            let ca = authorities.get(authority.name.as_str()).ok_or_else(|| {
                PkiError::Configuration(format!("no CA loaded for authority {}", authority.name))
            })?;
            if let Some(update) = self.ensure_leaf(store, authority, ca, leaf)? {
                updates.push(update);
            }
        }

        info!(
            cluster = %identity.name,
            updates = updates.len(),
            "certificates ensured"
        );
        Ok(updates)
    }

    fn ensure_leaf(
        &self,
        store: &mut CertStore,
        authority: &Authority,
        ca: &Bundle,
        leaf: &LeafCertificate,
    ) -> Result<Option<CertUpdate>> {
        let cert_slot = authority.leaf_cert_slot(leaf.slot);
        let key_slot = authority.leaf_key_slot(leaf.slot);

        let reason = if store.get(&cert_slot).is_empty() || store.get(&key_slot).is_empty() {
            Some("certificate missing".to_string())
        } else {
            let existing = decode_slots(store, &cert_slot, &key_slot)?;
            needs_rotation(&existing, &leaf.config, ca, &self.policy, Utc::now())
        };

        let Some(reason) = reason else {
            debug!(certificate = %leaf.name, "certificate up to date");
            return Ok(None);
        };

        info!(certificate = %leaf.name, reason = %reason, "issuing certificate");
        let bundle = sign(ca, &leaf.config)
            .map_err(|e| with_leaf_context(e, &leaf.name, &authority.name))?;
        store.set(&cert_slot, bundle.encode_cert()?);
        store.set(&key_slot, bundle.encode_key()?);
        Ok(Some(CertUpdate::new(leaf.kind, &leaf.name, reason)))
    }
}

/// Names the leaf and its authority on crypto failures raised while signing.
fn with_leaf_context(err: PkiError, certificate: &str, authority: &str) -> PkiError {
    match err {
        PkiError::Crypto(source) => PkiError::Issue {
            certificate: certificate.to_string(),
            authority: authority.to_string(),
            source,
        },
        other => other,
    }
}

/// [`CertificateEngine::ensure`] with the standard hierarchy and policy.
pub fn ensure(identity: &ClusterIdentity, store: &mut CertStore) -> Result<Vec<CertUpdate>> {
    CertificateEngine::default().ensure(identity, store)
}
