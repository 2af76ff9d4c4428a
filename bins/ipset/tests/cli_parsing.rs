//! CLI argument parsing tests for the ipset command.
//!
//! Everything here runs with `--dry-run`, so no socket is opened and no
//! root privileges are needed.

use assert_cmd::Command;
use predicates::prelude::*;

fn ipset_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_ipset"))
}

mod global_flags {
    use super::*;

    #[test]
    fn test_help() {
        ipset_cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Manage ipset entries"))
            .stdout(predicate::str::contains("--dry-run"))
            .stdout(predicate::str::contains("--max-attempts"));
    }

    #[test]
    fn test_version() {
        ipset_cmd()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("ipset"));
    }

    #[test]
    fn test_invalid_subcommand() {
        ipset_cmd()
            .arg("invalid_command")
            .assert()
            .failure()
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn test_max_attempts_must_be_positive() {
        ipset_cmd()
            .args(["--dry-run", "--max-attempts", "0", "flush", "blocked"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn test_missing_config_file() {
        ipset_cmd()
            .args([
                "--dry-run",
                "--config",
                "/nonexistent/nfset-retry.json",
                "flush",
                "blocked",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("nfset-retry.json"));
    }

    #[test]
    fn test_config_file() {
        let path = std::env::temp_dir().join(format!("nfset-cli-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"max_attempts": 5, "backoff_us": 20}"#).unwrap();

        ipset_cmd()
            .arg("--dry-run")
            .arg("--config")
            .arg(&path)
            .args(["flush", "blocked"])
            .assert()
            .success();

        std::fs::remove_file(&path).unwrap();
    }
}

mod add_command {
    use super::*;

    #[test]
    fn test_add_help() {
        ipset_cmd()
            .args(["add", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--timeout"));
    }

    #[test]
    fn test_add_requires_value() {
        ipset_cmd()
            .args(["--dry-run", "add", "blocked"])
            .assert()
            .failure();
    }

    #[test]
    fn test_add_ipv4_dry_run() {
        ipset_cmd()
            .args(["--dry-run", "add", "blocked", "192.0.2.7"])
            .assert()
            .success()
            .stdout(predicate::str::contains("len=56"))
            .stdout(predicate::str::contains("cmd=9"))
            .stdout(predicate::str::contains("\"blocked\""))
            .stdout(predicate::str::contains("192.0.2.7"));
    }

    #[test]
    fn test_add_ipv6_dry_run() {
        ipset_cmd()
            .args(["--dry-run", "add", "blocked", "2001:db8::1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("family=10"))
            .stdout(predicate::str::contains("2001:db8::1"));
    }

    #[test]
    fn test_add_mac_dry_run() {
        ipset_cmd()
            .args(["--dry-run", "add", "macs", "aa:bb:cc:dd:ee:ff"])
            .assert()
            .success()
            .stdout(predicate::str::contains("attr type=17"))
            .stdout(predicate::str::contains("aabbccddeeff"));
    }

    #[test]
    fn test_add_json_dry_run() {
        ipset_cmd()
            .args(["--dry-run", "--json", "add", "blocked", "10.0.0.1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"command\": 9"))
            .stdout(predicate::str::contains("\"attrs\""));
    }

    #[test]
    fn test_add_with_deadline_dry_run() {
        ipset_cmd()
            .args(["--dry-run", "--deadline-ms", "1000", "add", "blocked", "10.0.0.1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("10.0.0.1"));
    }

    #[test]
    fn test_add_name_too_long() {
        ipset_cmd()
            .args(["--dry-run", "add", &"x".repeat(32), "10.0.0.1"])
            .assert()
            .failure()
            .stdout(predicate::str::is_empty())
            .stderr(predicate::str::contains("set name too long"));
    }

    #[test]
    fn test_add_unclassified_value() {
        ipset_cmd()
            .args(["--dry-run", "add", "blocked", "example.com"])
            .assert()
            .failure()
            .stderr(predicate::str::contains(
                "neither an IP address nor a MAC address",
            ));
    }

    #[test]
    fn test_add_mac_timeout_not_supported() {
        ipset_cmd()
            .args([
                "--dry-run",
                "add",
                "macs",
                "aa:bb:cc:dd:ee:ff",
                "--timeout",
                "60",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not supported"));
    }
}

mod del_command {
    use super::*;

    #[test]
    fn test_del_dry_run() {
        ipset_cmd()
            .args(["--dry-run", "del", "blocked", "192.0.2.7"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cmd=10"));
    }

    #[test]
    fn test_delete_alias() {
        ipset_cmd()
            .args(["--dry-run", "delete", "macs", "aa:bb:cc:dd:ee:ff"])
            .assert()
            .success()
            .stdout(predicate::str::contains("cmd=10"))
            .stdout(predicate::str::contains("attr type=17"));
    }
}

mod flush_command {
    use super::*;

    #[test]
    fn test_flush_dry_run() {
        ipset_cmd()
            .args(["--dry-run", "flush", "blocked"])
            .assert()
            .success()
            .stdout(predicate::str::contains("len=40"))
            .stdout(predicate::str::contains("cmd=4"));
    }

    #[test]
    fn test_flush_requires_set() {
        ipset_cmd().args(["--dry-run", "flush"]).assert().failure();
    }
}
