// src/cert/mod.rs
mod bundle;
pub mod ca;
mod orchestrator;
pub mod inspect;
pub mod rotation;
mod signing;
pub mod subject;
mod types;
mod user;

pub use bundle::{Bundle, CertMeta};
pub use ca::{create_ca, decode_slots, load_or_create_ca, Authority, Hierarchy};
pub use orchestrator::{
    client_certificates, ensure, server_certificates, CertificateEngine, LeafCertificate,
};
pub use inspect::{inspect_store, CertStatus, CertificateInfo};
pub use rotation::{needs_rotation, RotationPolicy};
pub use signing::{sign, CertificateConfig};
pub use subject::UserSubject;
pub use types::{CertKind, CertUpdate, ExtKeyUsage, SubjectFields};
pub use user::{user_cert, Principal};
