//! Process-level behaviour of the `lease-hosts` binary.

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use std::time::Duration;

use lease_hosts::libvirt::protocol::Procedure;

use common::*;

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("lease-hosts.yaml");
    std::fs::write(&path, body).unwrap();
    path
}

fn lease_hosts() -> Command {
    let mut cmd = Command::cargo_bin("lease-hosts").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_requires_config_argument() {
    lease_hosts().assert().failure();
}

#[test]
fn test_missing_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    lease_hosts()
        .arg(dir.path().join("absent.yaml"))
        .assert()
        .failure();
}

#[test]
fn test_zero_interval_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        &format!("interval: 0\nhostfile: {}\n", dir.path().join("hosts").display()),
    );

    lease_hosts()
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("interval must be"));
}

#[test]
fn test_unreachable_socket_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        &format!(
            "socket: {}\ninterval: 100\nhostfile: {}\n",
            dir.path().join("libvirt-sock").display(),
            dir.path().join("hosts").display()
        ),
    );

    lease_hosts()
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Connect"));
    assert!(!dir.path().join("hosts").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_network_exits_without_watching() {
    let daemon = FakeLibvirtd::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hostfile = dir.path().join("hosts");
    let config = write_config(
        dir.path(),
        &format!(
            "socket: {}\nnetwork: isolated\ninterval: 100\nhostfile: {}\n",
            daemon.socket.display(),
            hostfile.display()
        ),
    );

    tokio::task::spawn_blocking(move || {
        lease_hosts()
            .arg(&config)
            .assert()
            .failure()
            .stderr(predicate::str::contains("isolated"));
    })
    .await
    .unwrap();

    assert!(!hostfile.exists());
    assert_eq!(daemon.count(Procedure::NetworkGetDhcpLeases), 0);
    assert_eq!(daemon.count(Procedure::ConnectClose), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sigterm_during_wait_exits_cleanly() {
    let daemon = FakeLibvirtd::start().await;
    daemon.with_state(|s| s.leases = vec![dhcp_lease("192.168.122.10", Some("web"))]);

    let dir = tempfile::tempdir().unwrap();
    let hostfile = dir.path().join("hosts");
    let config = write_config(
        dir.path(),
        &format!(
            "socket: {}\ninterval: 50\nhostfile: {}\ndomain: vm.lan\n",
            daemon.socket.display(),
            hostfile.display()
        ),
    );

    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("lease-hosts"))
        .arg(&config)
        .env_remove("RUST_LOG")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !hostfile.exists() {
        if tokio::time::Instant::now() >= deadline {
            let _ = child.kill();
            panic!("hosts file never written");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let status = std::process::Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());

    let exit = tokio::task::spawn_blocking(move || child.wait())
        .await
        .unwrap()
        .unwrap();

    assert!(exit.success(), "daemon exited with {:?}", exit);
    assert_eq!(read_hosts(&hostfile), "192.168.122.10\tweb.vm.lan\n");
    assert_eq!(daemon.count(Procedure::ConnectClose), 1);
}
