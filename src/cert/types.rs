// cert/types.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Extended key usages the engine issues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExtKeyUsage {
    ServerAuth,
    ClientAuth,
}

/// Category of a slot that was created or rotated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CertKind {
    CA,
    ClientCertificate,
    ServerCertificate,
}

impl fmt::Display for CertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CA => write!(f, "CA"),
            Self::ClientCertificate => write!(f, "ClientCertificate"),
            Self::ServerCertificate => write!(f, "ServerCertificate"),
        }
    }
}

/// Audit record for one created or rotated slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertUpdate {
    pub kind: CertKind,
    pub name: String,
    pub reason: String,
}

impl CertUpdate {
    pub fn new(kind: CertKind, name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CertUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.name, self.reason)
    }
}

/// The distinguished-name fields the engine reads and writes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectFields {
    pub common_name: String,
    pub organization: Vec<String>,
    pub organizational_unit: Vec<String>,
    pub province: Vec<String>,
    pub locality: Vec<String>,
}
