//! Certificate lifecycle engine for managed Kubernetes clusters.
//!
//! Creates, audits and rotates the per-cluster PKI (eight independent
//! certificate authorities and their leaf certificates) held in a
//! [`store::CertStore`], and issues short-lived end-user client
//! certificates whose Subject encodes the user's identity.
//!
//! The engine is synchronous and performs no I/O on its own; loading and
//! persisting the store is up to the caller.
pub mod cert;
pub mod config;
pub mod error;
pub mod kubeconfig;
pub mod store;
pub mod utils;

pub use cert::{ensure, user_cert, CertUpdate, CertificateEngine, Principal};
pub use config::ClusterIdentity;
pub use error::{PkiError, Result};
pub use store::CertStore;
