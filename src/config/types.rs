// config/types.rs
use crate::error::{PkiError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

/// Extra API-server SANs, as a JSON array of IPs and DNS names.
pub const APISERVER_SANS_ANNOTATION: &str = "pki.kluster.io/apiserver-sans";

/// Extra tunnel-server SANs, same format as [`APISERVER_SANS_ANNOTATION`].
pub const TUNNEL_SANS_ANNOTATION: &str = "pki.kluster.io/tunnel-sans";

/// Read-only description of one managed cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterIdentity {
    pub name: String,
    pub namespace: String,
    pub advertise_address: String,
    pub service_cidr: String,
    pub domain: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// A subject alternative name; IP literals win over DNS names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SanEntry {
    Ip(IpAddr),
    Dns(String),
}

impl SanEntry {
    pub fn parse(value: &str) -> Self {
        match value.parse::<IpAddr>() {
            Ok(ip) => SanEntry::Ip(ip),
            Err(_) => SanEntry::Dns(value.to_string()),
        }
    }
}

/// SANs split into the DNS and IP sequences a certificate carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanList {
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
}

impl SanList {
    pub fn extend(&mut self, entries: impl IntoIterator<Item = SanEntry>) {
        for entry in entries {
            match entry {
                SanEntry::Ip(ip) => self.ip_addresses.push(ip),
                SanEntry::Dns(dns) => self.dns_names.push(dns),
            }
        }
    }
}

impl ClusterIdentity {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Checks every derived value the engine needs before it mutates anything.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(PkiError::Configuration("cluster name is empty".to_string()));
        }
        self.advertise_ip()?;
        self.api_service_ip()?;
        self.apiserver_sans()?;
        self.tunnel_sans()?;
        Ok(())
    }

    pub fn advertise_ip(&self) -> Result<IpAddr> {
        self.advertise_address.parse().map_err(|_| {
            PkiError::Configuration(format!(
                "advertise address {:?} is not an IP address",
                self.advertise_address
            ))
        })
    }

    /// First host address of the service CIDR, where the `kubernetes`
    /// service is allocated.
    pub fn api_service_ip(&self) -> Result<IpAddr> {
        first_host_ip(&self.service_cidr).ok_or_else(|| {
            PkiError::Configuration(format!(
                "cannot determine API service IP from service CIDR {:?}",
                self.service_cidr
            ))
        })
    }

    pub fn apiserver_sans(&self) -> Result<Vec<SanEntry>> {
        self.annotation_sans(APISERVER_SANS_ANNOTATION)
    }

    pub fn tunnel_sans(&self) -> Result<Vec<SanEntry>> {
        self.annotation_sans(TUNNEL_SANS_ANNOTATION)
    }

    fn annotation_sans(&self, key: &str) -> Result<Vec<SanEntry>> {
        match self.annotations.get(key) {
            None => Ok(Vec::new()),
            Some(value) if value.trim().is_empty() => Ok(Vec::new()),
            Some(value) => parse_san_annotation(value)
                .map_err(|e| PkiError::Configuration(format!("annotation {}: {}", key, e))),
        }
    }
}

/// Parses a JSON array of strings, each an IP literal or a DNS name.
pub fn parse_san_annotation(value: &str) -> std::result::Result<Vec<SanEntry>, String> {
    let raw: Vec<String> = serde_json::from_str(value).map_err(|e| e.to_string())?;
    raw.iter()
        .map(|v| {
            let v = v.trim();
            if v.is_empty() {
                Err("empty SAN entry".to_string())
            } else {
                Ok(SanEntry::parse(v))
            }
        })
        .collect()
}

fn first_host_ip(cidr: &str) -> Option<IpAddr> {
    let (addr, prefix) = cidr.trim().split_once('/')?;
    let prefix: u32 = prefix.parse().ok()?;
    match addr.parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) => {
            if prefix > 30 {
                return None;
            }
            let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
            let network = u32::from(v4) & mask;
            Some(IpAddr::V4(Ipv4Addr::from(network + 1)))
        }
        IpAddr::V6(v6) => {
            if prefix > 126 {
                return None;
            }
            let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
            let network = u128::from(v6) & mask;
            Some(IpAddr::V6(Ipv6Addr::from(network + 1)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_identity as identity;

    #[test]
    fn derives_api_service_ip() {
        let ip = identity().api_service_ip().unwrap();
        assert_eq!(ip, "198.18.128.1".parse::<IpAddr>().unwrap());

        let mut v6 = identity();
        v6.service_cidr = "fd00:10:96::/112".to_string();
        assert_eq!(
            v6.api_service_ip().unwrap(),
            "fd00:10:96::1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn host_bits_in_cidr_are_masked() {
        let mut id = identity();
        id.service_cidr = "10.96.0.17/12".to_string();
        assert_eq!(
            id.api_service_ip().unwrap(),
            "10.96.0.1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn rejects_bad_addresses() {
        let mut id = identity();
        id.advertise_address = "not-an-ip".to_string();
        assert!(matches!(id.validate(), Err(PkiError::Configuration(_))));

        let mut id = identity();
        id.service_cidr = "10.0.0.0".to_string();
        assert!(matches!(id.validate(), Err(PkiError::Configuration(_))));

        let mut id = identity();
        id.service_cidr = "10.0.0.0/32".to_string();
        assert!(id.api_service_ip().is_err());
    }

    #[test]
    fn annotation_entries_prefer_ip() {
        let mut id = identity();
        id.annotations.insert(
            APISERVER_SANS_ANNOTATION.to_string(),
            r#"["1.2.3.4", "api.example.com", "::1"]"#.to_string(),
        );
        let sans = id.apiserver_sans().unwrap();
        assert_eq!(
            sans,
            vec![
                SanEntry::Ip("1.2.3.4".parse().unwrap()),
                SanEntry::Dns("api.example.com".to_string()),
                SanEntry::Ip("::1".parse().unwrap()),
            ]
        );
        assert!(id.tunnel_sans().unwrap().is_empty());
    }

    #[test]
    fn malformed_annotation_is_configuration_error() {
        let mut id = identity();
        id.annotations
            .insert(TUNNEL_SANS_ANNOTATION.to_string(), "{not json".to_string());
        assert!(matches!(id.tunnel_sans(), Err(PkiError::Configuration(_))));
    }

    #[test]
    fn loads_identity_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("identity.json");
        identity().save_to_file(&path).unwrap();

        let loaded = ClusterIdentity::load_from_file(&path).unwrap();
        assert_eq!(loaded.name, "demo");
        assert_eq!(loaded.service_cidr, "198.18.128.0/17");
    }
}
