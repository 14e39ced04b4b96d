// src/main.rs
use clap::{Parser, Subcommand};
use kluster_pki::cert::{inspect_store, CertificateEngine, Hierarchy, Principal, RotationPolicy};
use kluster_pki::cert::rotation::DEFAULT_EXPIRY_WINDOW_DAYS;
use kluster_pki::kubeconfig::KubeConfigGenerator;
use kluster_pki::store::{file_name_component, write_private};
use kluster_pki::utils::logging;
use kluster_pki::{CertStore, ClusterIdentity, Result};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create missing CAs and create or rotate leaf certificates
    Ensure {
        #[arg(short, long, default_value = "cluster_identity.json")]
        identity: String,
        /// Store directory, or a `.json` file
        #[arg(short, long, default_value = "certs")]
        store: String,
        #[arg(long, default_value_t = DEFAULT_EXPIRY_WINDOW_DAYS)]
        expiry_window_days: i64,
        /// Report updates without persisting the store
        #[arg(long)]
        dry_run: bool,
    },
    /// Issue a short-lived user certificate
    UserCert {
        #[arg(short, long, default_value = "certs")]
        store: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long, default_value = "")]
        project_id: String,
        #[arg(long = "group")]
        groups: Vec<String>,
        #[arg(long = "role")]
        roles: Vec<String>,
        #[arg(long)]
        api_url: String,
        #[arg(long, default_value = "")]
        auth_url: String,
        #[arg(short, long, default_value = ".")]
        out_dir: String,
        /// Also write a kubeconfig for this cluster name
        #[arg(long)]
        kubeconfig: Option<String>,
    },
    /// Show validity of every certificate in the store
    Status {
        #[arg(short, long, default_value = "certs")]
        store: String,
        #[arg(short, long)]
        cluster_name: String,
        #[arg(long, default_value_t = DEFAULT_EXPIRY_WINDOW_DAYS)]
        window_days: i64,
        #[arg(long)]
        json: bool,
    },
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Ensure {
            identity,
            store,
            expiry_window_days,
            dry_run,
        } => {
            let identity = ClusterIdentity::load_from_file(&expand(&identity))?;
            let store_path = expand(&store);
            let mut store = CertStore::load(&store_path)?;

            let engine = CertificateEngine::new(
                Hierarchy::standard(),
                RotationPolicy::with_expiry_window_days(expiry_window_days),
            );
            let updates = engine.ensure(&identity, &mut store)?;
            for update in &updates {
                println!("{}", update);
            }

            if updates.is_empty() {
                info!(cluster = %identity.name, "all certificates up to date");
            } else if dry_run {
                info!(updates = updates.len(), "dry run, store not written");
            } else {
                store.save(&store_path)?;
                info!(path = %store_path.display(), "store written");
            }
        }
        Command::UserCert {
            store,
            name,
            domain,
            project_id,
            groups,
            roles,
            api_url,
            auth_url,
            out_dir,
            kubeconfig,
        } => {
            let store = CertStore::load(&expand(&store))?;
            let principal = Principal {
                name,
                domain,
                project_id,
                groups,
                roles,
            };
            let engine = CertificateEngine::default();
            let bundle = engine.user_cert(&store, &principal, &api_url, &auth_url)?;

            let out_dir = expand(&out_dir);
            fs::create_dir_all(&out_dir)?;
            let file_name = file_name_component(&principal.name)?;
            let cert_path = out_dir.join(format!("{}.pem", file_name));
            let key_path = out_dir.join(format!("{}-key.pem", file_name));
            fs::write(&cert_path, bundle.encode_cert()?)?;
            write_private(&key_path, &bundle.encode_key()?)?;

            if let Some(cluster_name) = kubeconfig {
                let tls_ca = engine.hierarchy().require(kluster_pki::cert::ca::TLS)?;
                let generator = KubeConfigGenerator::new(
                    cluster_name.clone(),
                    api_url,
                    store.get(&tls_ca.cert_slot).to_string(),
                );
                let path = out_dir.join(format!(
                    "{}.kubeconfig",
                    file_name_component(&cluster_name)?
                ));
                write_private(&path, &generator.render(&bundle)?)?;
                info!(path = %path.display(), "kubeconfig written");
            }

            info!(
                certificate = %cert_path.display(),
                not_after = %bundle.not_after(),
                "user certificate written"
            );
        }
        Command::Status {
            store,
            cluster_name,
            window_days,
            json,
        } => {
            let store = CertStore::load(&expand(&store))?;
            let infos = inspect_store(&store, &cluster_name)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&infos)?);
                return Ok(());
            }

            let now = chrono::Utc::now();
            let window = chrono::Duration::days(window_days);
            for info in &infos {
                println!(
                    "{:<48} {:<13} {:<25} ca={} managed={}",
                    info.slot,
                    info.status(now, window).to_string(),
                    info.not_after.to_rfc3339(),
                    info.is_ca,
                    info.managed
                );
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.debug);

    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
