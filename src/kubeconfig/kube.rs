// src/kubeconfig/kube.rs
use crate::cert::Bundle;
use crate::error::Result;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct KubeConfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub clusters: Vec<NamedCluster>,
    pub users: Vec<NamedUser>,
    pub contexts: Vec<NamedContext>,
    #[serde(rename = "current-context")]
    pub current_context: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: ClusterConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub server: String,
    #[serde(rename = "certificate-authority-data")]
    pub certificate_authority_data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NamedUser {
    pub name: String,
    pub user: UserConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(rename = "client-certificate-data")]
    pub client_certificate_data: String,
    #[serde(rename = "client-key-data")]
    pub client_key_data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: ContextConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContextConfig {
    pub cluster: String,
    pub user: String,
}

/// Builds kubeconfig documents that embed a user certificate.
pub struct KubeConfigGenerator {
    cluster_name: String,
    api_url: String,
    ca_pem: String,
}

impl KubeConfigGenerator {
    /// `ca_pem` is the certificate of the authority that serves the API
    /// (the TLS CA), not the one that issued the user certificate.
    pub fn new(cluster_name: String, api_url: String, ca_pem: String) -> Self {
        Self {
            cluster_name,
            api_url,
            ca_pem,
        }
    }

    pub fn generate(&self, user: &Bundle) -> Result<KubeConfig> {
        let encode = |pem: &str| general_purpose::STANDARD.encode(pem.as_bytes());
        let user_name = format!("{}@{}", user.common_name(), self.cluster_name);

        Ok(KubeConfig {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            clusters: vec![NamedCluster {
                name: self.cluster_name.clone(),
                cluster: ClusterConfig {
                    server: self.api_url.clone(),
                    certificate_authority_data: encode(&self.ca_pem),
                },
            }],
            users: vec![NamedUser {
                name: user_name.clone(),
                user: UserConfig {
                    client_certificate_data: encode(&user.encode_cert()?),
                    client_key_data: encode(&user.encode_key()?),
                },
            }],
            contexts: vec![NamedContext {
                name: self.cluster_name.clone(),
                context: ContextConfig {
                    cluster: self.cluster_name.clone(),
                    user: user_name,
                },
            }],
            current_context: self.cluster_name.clone(),
        })
    }

    pub fn render(&self, user: &Bundle) -> Result<String> {
        Ok(serde_yaml::to_string(&self.generate(user)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::{ensure, user_cert, Principal};
    use crate::config::test_identity;
    use crate::store::CertStore;

    #[test]
    fn embeds_user_certificate() {
        let identity = test_identity();
        let mut store = CertStore::new();
        ensure(&identity, &mut store).unwrap();
        let principal = Principal {
            name: "alice".to_string(),
            ..Default::default()
        };
        let bundle = user_cert(&store, &principal, "https://api", "").unwrap();

        let generator = KubeConfigGenerator::new(
            identity.name.clone(),
            "https://api".to_string(),
            store.get("tls-ca.pem").to_string(),
        );
        let yaml = generator.render(&bundle).unwrap();
        let parsed: KubeConfig = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed.current_context, "demo");
        assert_eq!(parsed.users[0].name, "alice@demo");
        let cert = general_purpose::STANDARD
            .decode(&parsed.users[0].user.client_certificate_data)
            .unwrap();
        assert_eq!(String::from_utf8(cert).unwrap(), bundle.encode_cert().unwrap());
        let ca = general_purpose::STANDARD
            .decode(&parsed.clusters[0].cluster.certificate_authority_data)
            .unwrap();
        assert_eq!(String::from_utf8(ca).unwrap(), store.get("tls-ca.pem"));
    }
}
