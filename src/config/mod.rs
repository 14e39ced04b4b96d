mod types;

pub use types::{
    parse_san_annotation, ClusterIdentity, SanEntry, SanList, APISERVER_SANS_ANNOTATION,
    TUNNEL_SANS_ANNOTATION,
};

#[cfg(test)]
pub(crate) fn test_identity() -> ClusterIdentity {
    ClusterIdentity {
        name: "demo".to_string(),
        namespace: "tenant-a".to_string(),
        advertise_address: "10.0.0.1".to_string(),
        service_cidr: "198.18.128.0/17".to_string(),
        domain: "kluster.example.com".to_string(),
        annotations: Default::default(),
    }
}
