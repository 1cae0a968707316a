// tests/shell_end_to_end.rs
#![cfg(unix)]

use std::sync::Arc;

use clap::Parser;

use clustertrack::cli::CliArgs;
use clustertrack::dispatch::Dispatcher;
use clustertrack::fs::{FileSystem, RealFileSystem};
use clustertrack::poll::{BootstrapRequest, Secret, ShellLauncher, StatusPoller};
use clustertrack::types::ReportStatus;
use clustertrack::{run, RunOutcome};
use clustertrack_test_utils::builders::fast_settings;
use clustertrack_test_utils::{init_tracing, with_timeout};

const WRITE_MARKERS: &str = r#"for h in $(echo "$CLUSTERTRACK_HOSTS" | tr ',' ' '); do
  echo "bootstrapping $h" >> "$CLUSTERTRACK_BOOTDIR/$h.log"
  echo 0 > "$CLUSTERTRACK_BOOTDIR/$h.done"
done"#;

#[tokio::test]
async fn shell_launcher_drives_a_real_run() {
    init_tracing();
    let bootdir = tempfile::tempdir().unwrap();
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let cmd = format!("{WRITE_MARKERS}\ncat \"$CLUSTERTRACK_SECRET_TOKEN\" >> \"$CLUSTERTRACK_BOOTDIR/h1.log\"");
    let poller = StatusPoller::new(
        fast_settings(),
        bootdir.path(),
        fs,
        Arc::new(ShellLauncher::new(cmd)),
        Dispatcher::default(),
    )
    .unwrap();

    let request = BootstrapRequest::new("run-sh", vec!["h1".into(), "h2".into()])
        .with_secrets(vec![Secret::new("token", "s3cret")]);
    let report = with_timeout(poller.run(request)).await.unwrap();

    assert_eq!(report.status, ReportStatus::Success, "log:\n{}", report.log);
    assert!(report.log.contains("bootstrapping h1\ns3cret"));
    assert!(report.log.contains("bootstrapping h2"));
    assert!(!bootdir.path().join("run-sh").join("token.secret").exists());
}

#[tokio::test]
async fn shell_failure_maps_to_error() {
    init_tracing();
    let bootdir = tempfile::tempdir().unwrap();
    let poller = StatusPoller::new(
        fast_settings(),
        bootdir.path(),
        Arc::new(RealFileSystem),
        Arc::new(ShellLauncher::new(format!("{WRITE_MARKERS}\nexit 3"))),
        Dispatcher::default(),
    )
    .unwrap();

    let report = with_timeout(poller.run(BootstrapRequest::new("run-sh-fail", vec!["h1".into()])))
        .await
        .unwrap();

    assert_eq!(report.status, ReportStatus::Error);
    assert_eq!(report.process_exit, Some(3));
}

#[tokio::test]
async fn run_entry_point_reads_config_and_reports() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let bootdir = dir.path().join("boot");
    let config_path = dir.path().join("Clustertrack.toml");
    std::fs::write(
        &config_path,
        format!(
            "[poller]\nscan_interval = \"10ms\"\nwatchdog = \"200ms\"\n\n\
             [bootstrap]\ncmd = '''{WRITE_MARKERS}'''\nbootdir = {:?}\nhosts = [\"h1\"]\n",
            bootdir.display().to_string()
        ),
    )
    .unwrap();

    let args = CliArgs::try_parse_from([
        "clustertrack",
        "--config",
        config_path.to_str().unwrap(),
        "--hosts",
        "h1,h2",
        "--run-id",
        "cli-run",
    ])
    .unwrap();

    let outcome = with_timeout(run(args)).await.unwrap();

    let RunOutcome::Finished(report) = outcome else {
        panic!("expected a finished run");
    };
    assert!(report.is_success(), "log:\n{}", report.log);
    assert!(bootdir.join("cli-run").join("h2.done").exists());
}

#[tokio::test]
async fn dry_run_launches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let bootdir = dir.path().join("boot");
    let config_path = dir.path().join("Clustertrack.toml");
    std::fs::write(
        &config_path,
        format!(
            "[bootstrap]\ncmd = \"touch marker\"\nbootdir = {:?}\nhosts = [\"h1\"]\n",
            bootdir.display().to_string()
        ),
    )
    .unwrap();

    let args = CliArgs::try_parse_from([
        "clustertrack",
        "--config",
        config_path.to_str().unwrap(),
        "--dry-run",
    ])
    .unwrap();

    let outcome = run(args).await.unwrap();
    assert_eq!(outcome, RunOutcome::DryRun);
    assert!(outcome.is_success());
    assert!(!bootdir.exists());
}
