// src/cert/user.rs
use super::bundle::Bundle;
use super::ca::{decode_slots, APISERVER_CLIENTS};
use super::orchestrator::CertificateEngine;
use super::signing::{sign, CertificateConfig};
use super::subject::UserSubject;
use super::types::ExtKeyUsage;
use crate::error::{PkiError, Result};
use crate::store::CertStore;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const USER_CERT_VALIDITY_HOURS: i64 = 24;

/// The authenticated end user a certificate is issued for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Principal {
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Principal {
    pub fn subject(&self, api_url: &str, auth_url: &str) -> UserSubject {
        UserSubject {
            name: self.name.clone(),
            domain: self.domain.clone(),
            project_id: self.project_id.clone(),
            groups: self.groups.clone(),
            roles: self.roles.clone(),
            auth_url: (!auth_url.is_empty()).then(|| auth_url.to_string()),
            api_url: api_url.to_string(),
        }
    }
}

impl CertificateEngine {
    /// Issues a short-lived client certificate for `principal`. The store is
    /// only read; the Apiserver-Clients CA is never created here.
    ///
    /// `api_url` is required: the Locality entry carrying it is what
    /// [`UserSubject::decode`] keys on.
    pub fn user_cert(
        &self,
        store: &CertStore,
        principal: &Principal,
        api_url: &str,
        auth_url: &str,
    ) -> Result<Bundle> {
        if api_url.trim().is_empty() {
            return Err(PkiError::Configuration(
                "user certificates need a non-empty API URL".to_string(),
            ));
        }
        let authority = self.hierarchy().require(APISERVER_CLIENTS)?;
        let ca = decode_slots(store, &authority.cert_slot, &authority.key_slot)?;

        let subject = principal.subject(api_url, auth_url);
        let config = CertificateConfig {
            usages: vec![ExtKeyUsage::ClientAuth],
            ..Default::default()
        }
        .with_subject(subject.encode())
        .with_validity(Duration::hours(USER_CERT_VALIDITY_HOURS));

        info!(user = %config.common_name, "issuing user certificate");
        sign(&ca, &config)
    }
}

/// [`CertificateEngine::user_cert`] with the standard hierarchy.
pub fn user_cert(
    store: &CertStore,
    principal: &Principal,
    api_url: &str,
    auth_url: &str,
) -> Result<Bundle> {
    CertificateEngine::default().user_cert(store, principal, api_url, auth_url)
}
