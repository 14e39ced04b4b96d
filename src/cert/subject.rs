//! Identity carried in the Subject of end-user certificates.
//!
//! A user certificate is self-describing: a holder of only the certificate
//! can recover the authentication endpoint, project, user name and the API
//! URL by decoding its Subject. The layout is a wire contract shared with
//! client tooling and must not change without bumping
//! [`SUBJECT_CONTRACT_VERSION`]:
//!
//! | Field        | Content                                            |
//! |--------------|----------------------------------------------------|
//! | CommonName   | `name`, or `name@domain` when a domain is present  |
//! | Organization | groups, then roles each prefixed with `os:`        |
//! | Province     | `[auth_url, project_id]`, or `[project_id]`        |
//! | Locality     | `[api_url]`                                        |
use super::types::SubjectFields;
use crate::error::{PkiError, Result};
use serde::{Deserialize, Serialize};
use url::Url;

pub const SUBJECT_CONTRACT_VERSION: u32 = 1;

/// Prefix that turns a role name into an RBAC subject name.
pub const ROLE_PREFIX: &str = "os:";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSubject {
    pub name: String,
    pub domain: Option<String>,
    pub project_id: String,
    pub groups: Vec<String>,
    pub roles: Vec<String>,
    pub auth_url: Option<String>,
    pub api_url: String,
}

impl UserSubject {
    pub fn common_name(&self) -> String {
        match self.domain.as_deref().filter(|d| !d.is_empty()) {
            Some(domain) => format!("{}@{}", self.name, domain),
            None => self.name.clone(),
        }
    }

    pub fn encode(&self) -> SubjectFields {
        let organization = self
            .groups
            .iter()
            .cloned()
            .chain(self.roles.iter().map(|r| format!("{}{}", ROLE_PREFIX, r)))
            .collect();

        let province = match self.auth_url.as_deref().filter(|u| !u.is_empty()) {
            Some(auth_url) => vec![auth_url.to_string(), self.project_id.clone()],
            None => vec![self.project_id.clone()],
        };

        SubjectFields {
            common_name: self.common_name(),
            organization,
            organizational_unit: Vec::new(),
            province,
            locality: vec![self.api_url.clone()],
        }
    }

    pub fn decode(fields: &SubjectFields) -> Result<Self> {
        if fields.common_name.is_empty() {
            return Err(PkiError::parse("user subject", "common name is empty"));
        }
        let (name, domain) = match fields.common_name.rsplit_once('@') {
            Some((name, domain)) => (name.to_string(), Some(domain.to_string())),
            None => (fields.common_name.clone(), None),
        };

        let mut groups = Vec::new();
        let mut roles = Vec::new();
        for entry in &fields.organization {
            match entry.strip_prefix(ROLE_PREFIX) {
                Some(role) => roles.push(role.to_string()),
                None => groups.push(entry.clone()),
            }
        }

        let auth_url = fields.province.iter().find(|p| looks_like_url(p)).cloned();
        let project_id = fields
            .province
            .iter()
            .find(|p| !looks_like_url(p))
            .cloned()
            .unwrap_or_default();

        let api_url = fields
            .locality
            .first()
            .cloned()
            .ok_or_else(|| PkiError::parse("user subject", "locality carries no API URL"))?;

        Ok(Self {
            name,
            domain,
            project_id,
            groups,
            roles,
            auth_url,
            api_url,
        })
    }
}

fn looks_like_url(value: &str) -> bool {
    Url::parse(value)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
        .unwrap_or(false)
}
