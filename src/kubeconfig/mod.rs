mod kube;

pub use kube::{KubeConfig, KubeConfigGenerator};
