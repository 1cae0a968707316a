// src/lib.rs

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod fs;
pub mod fsm;
pub mod lifecycle;
pub mod logging;
pub mod poll;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::{BootstrapSection, ConfigFile};
use crate::config::{validate_hosts, validate_run_id};
use crate::dispatch::Dispatcher;
use crate::errors::ClustertrackError;
use crate::fs::{FileSystem, RealFileSystem};
use crate::poll::{BootstrapReport, BootstrapRequest, Secret, ShellLauncher, StatusPoller};
use crate::types::now_millis;

/// What [`run`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    DryRun,
    Finished(BootstrapReport),
}

impl RunOutcome {
    /// A dry run counts as success.
    pub fn is_success(&self) -> bool {
        match self {
            RunOutcome::DryRun => true,
            RunOutcome::Finished(report) => report.is_success(),
        }
    }
}

/// High-level entry point used by `main.rs`.
///
/// This is the composition root: it wires together
/// - config loading and CLI overrides
/// - the filesystem, launcher and dispatcher
/// - the status poller for one bootstrap run
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<RunOutcome> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {:?}", config_path))?;
    let plan = Plan::resolve(&cfg, &args)?;

    if args.dry_run {
        print_dry_run(&cfg, &plan);
        return Ok(RunOutcome::DryRun);
    }

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let secrets = read_secrets(fs.as_ref(), &plan.bootstrap)?;

    let dispatcher = Dispatcher::new(cfg.dispatcher.queue_capacity);
    let launcher = Arc::new(ShellLauncher::new(plan.bootstrap.cmd.clone()));
    let poller = StatusPoller::new(
        cfg.poller,
        plan.bootstrap.bootdir.clone(),
        Arc::clone(&fs),
        launcher,
        dispatcher.clone(),
    )?;

    let mut request = BootstrapRequest::new(plan.run_id.clone(), plan.hosts.clone()).with_secrets(secrets);
    if let Some(watchdog) = args.watchdog {
        request = request.with_watchdog(watchdog);
    }

    let handle = poller.start(request)?;
    let abort = handle.abort_handle();
    let report = tokio::select! {
        report = handle.join() => report?,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for Ctrl+C");
            }
            abort.abort();
            dispatcher.shutdown().await;
            return Err(anyhow!("bootstrap run '{}' interrupted", plan.run_id));
        }
    };

    dispatcher.shutdown().await;
    println!("{report}");
    info!(run_id = %report.run_id, status = %report.status, "run complete");
    Ok(RunOutcome::Finished(report))
}

/// Everything resolved from config + CLI before anything is launched.
#[derive(Debug, Clone)]
struct Plan {
    run_id: String,
    hosts: Vec<String>,
    bootstrap: BootstrapSection,
}

impl Plan {
    fn resolve(cfg: &ConfigFile, args: &CliArgs) -> Result<Self> {
        let bootstrap = cfg.bootstrap.clone().ok_or_else(|| {
            ClustertrackError::ConfigError("config has no [bootstrap] section".to_string())
        })?;

        let hosts = if args.hosts.is_empty() {
            bootstrap.hosts.clone()
        } else {
            validate_hosts(&args.hosts)?;
            args.hosts.clone()
        };

        let run_id = args
            .run_id
            .clone()
            .unwrap_or_else(|| format!("run-{}", now_millis()));
        validate_run_id(&run_id)?;

        Ok(Self {
            run_id,
            hosts,
            bootstrap,
        })
    }
}

fn read_secrets(fs: &dyn FileSystem, bootstrap: &BootstrapSection) -> Result<Vec<Secret>> {
    bootstrap
        .secrets
        .iter()
        .map(|(name, path)| {
            let contents = fs
                .read_to_string(path)
                .with_context(|| format!("reading secret '{name}'"))?;
            debug!(secret = %name, "loaded secret");
            Ok(Secret::new(name.clone(), contents))
        })
        .collect()
}

fn print_dry_run(cfg: &ConfigFile, plan: &Plan) {
    println!("clustertrack dry-run");
    println!("  run_id: {}", plan.run_id);
    println!("  cmd: {}", plan.bootstrap.cmd);
    println!("  run_dir: {}", plan.bootstrap.bootdir.join(&plan.run_id).display());
    println!("  hosts ({}):", plan.hosts.len());
    for host in &plan.hosts {
        println!("    - {host}");
    }
    if !plan.bootstrap.secrets.is_empty() {
        let names: Vec<_> = plan.bootstrap.secrets.keys().collect();
        println!("  secrets: {:?}", names);
    }
    println!("  poller.scan_interval = {:?}", cfg.poller.scan_interval);
    println!("  poller.watchdog = {:?}", cfg.poller.watchdog);
    println!("  poller.launch_timeout = {:?}", cfg.poller.launch_timeout);
    println!("  poller.max_parallel_reads = {}", cfg.poller.max_parallel_reads);
    println!("  dispatcher.queue_capacity = {}", cfg.dispatcher.queue_capacity);

    debug!("dry-run complete (no execution)");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cfg_with_hosts(hosts: &[&str]) -> ConfigFile {
        let toml = format!(
            "[bootstrap]\ncmd = \"true\"\nbootdir = \"/tmp/ct\"\nhosts = [{}]\n",
            hosts.iter().map(|h| format!("\"{h}\"")).collect::<Vec<_>>().join(", ")
        );
        ConfigFile::try_from(config::load_from_str(&toml).unwrap()).unwrap()
    }

    #[test]
    fn cli_hosts_override_config() {
        let cfg = cfg_with_hosts(&["a", "b"]);
        let args = CliArgs::try_parse_from(["clustertrack", "--hosts", "c", "--run-id", "r1"]).unwrap();

        let plan = Plan::resolve(&cfg, &args).unwrap();

        assert_eq!(plan.hosts, vec!["c".to_string()]);
        assert_eq!(plan.run_id, "r1");
    }

    #[test]
    fn invalid_cli_hosts_are_rejected() {
        let cfg = cfg_with_hosts(&["a"]);
        let args = CliArgs::try_parse_from(["clustertrack", "--hosts", "a,a"]).unwrap();
        assert!(Plan::resolve(&cfg, &args).is_err());
    }

    #[test]
    fn missing_bootstrap_section_is_an_error() {
        let args = CliArgs::try_parse_from(["clustertrack"]).unwrap();
        assert!(Plan::resolve(&ConfigFile::default(), &args).is_err());
    }

    #[test]
    fn run_id_outside_the_bootdir_is_rejected() {
        let cfg = cfg_with_hosts(&["a"]);
        let args = CliArgs::try_parse_from(["clustertrack", "--run-id", "../etc"]).unwrap();
        assert!(Plan::resolve(&cfg, &args).is_err());
    }
}
