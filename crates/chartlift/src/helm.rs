//! `helm` subprocess adapters: registry login and OCI push.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chartlift_config::MigrationConfig;
use chartlift_process::{CommandInput, CommandResult, run_command_with_timeout};
use chartlift_types::RegistryEndpoint;

use crate::auth::{Authenticator, RegistrySession};
use crate::transfer::ChartPusher;

#[derive(Debug, Clone)]
pub struct HelmCli {
    binary: String,
    login_timeout: Duration,
    push_timeout: Duration,
}

impl HelmCli {
    pub fn new(binary: impl Into<String>, login_timeout: Duration, push_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            login_timeout,
            push_timeout,
        }
    }

    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(
            config.helm_binary.clone(),
            config.login_timeout,
            config.push_timeout,
        )
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Whether the configured binary can be found (on PATH or as a path).
    pub fn is_available(&self) -> bool {
        chartlift_process::command_exists(&self.binary) || Path::new(&self.binary).is_file()
    }

    fn run(&self, args: &[&str], input: CommandInput<'_>, timeout: Duration) -> Result<CommandResult> {
        run_command_with_timeout(&self.binary, args, input, Some(timeout))
    }
}

/// Arguments of `helm registry login`; the password goes through stdin.
pub fn login_args(endpoint: &RegistryEndpoint) -> Vec<String> {
    vec![
        "registry".to_string(),
        "login".to_string(),
        endpoint.host().to_string(),
        "--username".to_string(),
        endpoint.username.clone(),
        "--password-stdin".to_string(),
    ]
}

/// Arguments of `helm push`. Plain-HTTP destinations get `--plain-http`.
pub fn push_args(destination: &RegistryEndpoint, artifact: &Path, reference: &str) -> Vec<String> {
    let mut args = vec![
        "push".to_string(),
        artifact.display().to_string(),
        reference.to_string(),
    ];
    if destination.base_url.trim().starts_with("http://") {
        args.push("--plain-http".to_string());
    }
    args
}

impl Authenticator for HelmCli {
    fn login(&self, endpoint: &RegistryEndpoint) -> Result<()> {
        // helm cannot log in without a username; anonymous access needs no login.
        if !endpoint.has_credentials() {
            return Ok(());
        }

        let args = login_args(endpoint);
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self
            .run(
                &argv,
                CommandInput::Bytes(endpoint.password.as_bytes()),
                self.login_timeout,
            )
            .context("failed to execute helm registry login")?;

        if !out.success {
            bail!("helm registry login failed: {}", out.diagnostic());
        }
        Ok(())
    }
}

impl ChartPusher for HelmCli {
    fn push(&self, destination: &RegistrySession, artifact: &Path, reference: &str) -> Result<()> {
        let args = push_args(destination.endpoint(), artifact, reference);
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self
            .run(&argv, CommandInput::None, self.push_timeout)
            .context("failed to execute helm push")?;

        if !out.success {
            bail!("helm push failed: {}", out.diagnostic());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn login_args_use_host_and_stdin_password() {
        let endpoint = RegistryEndpoint::new("https://harbor.example.com/", "admin", "s3cret");
        let args = login_args(&endpoint);
        assert_eq!(
            args,
            vec![
                "registry",
                "login",
                "harbor.example.com",
                "--username",
                "admin",
                "--password-stdin"
            ]
        );
        assert!(!args.iter().any(|a| a.contains("s3cret")));
    }

    #[test]
    fn push_args_reference_staged_file() {
        let dest = RegistryEndpoint::anonymous("https://new.example.com");
        let args = push_args(
            &dest,
            &PathBuf::from("/tmp/stage/redis-1.0.0.tgz"),
            "oci://new.example.com/db",
        );
        assert_eq!(
            args,
            vec!["push", "/tmp/stage/redis-1.0.0.tgz", "oci://new.example.com/db"]
        );
    }

    #[test]
    fn push_args_add_plain_http_for_http_destinations() {
        let dest = RegistryEndpoint::anonymous("http://127.0.0.1:5000");
        let args = push_args(&dest, Path::new("a.tgz"), "oci://127.0.0.1:5000/db");
        assert_eq!(args.last().map(String::as_str), Some("--plain-http"));
    }

    #[test]
    fn anonymous_login_is_skipped() {
        let helm = HelmCli::new(
            "this-command-does-not-exist-xyz123",
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert!(helm.login(&RegistryEndpoint::anonymous("https://h")).is_ok());
    }

    #[test]
    fn missing_binary_fails_login() {
        let helm = HelmCli::new(
            "this-command-does-not-exist-xyz123",
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert!(!helm.is_available());
        let err = helm
            .login(&RegistryEndpoint::new("https://h", "admin", "pw"))
            .expect_err("should fail");
        assert!(format!("{err:#}").contains("helm registry login"));
    }

    #[cfg(unix)]
    mod unix {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        use tempfile::tempdir;

        use super::super::*;

        fn fake_helm(dir: &Path, script: &str) -> String {
            let path = dir.join("helm");
            fs::write(&path, format!("#!/bin/sh\n{script}\n")).expect("write");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
            path.display().to_string()
        }

        #[test]
        fn login_passes_password_on_stdin() {
            let td = tempdir().expect("tempdir");
            let capture = td.path().join("stdin");
            let bin = fake_helm(td.path(), &format!("cat > {}", capture.display()));
            let helm = HelmCli::new(bin, Duration::from_secs(5), Duration::from_secs(5));

            helm.login(&RegistryEndpoint::new("https://h", "admin", "pw"))
                .expect("login");
            assert_eq!(fs::read_to_string(&capture).expect("read"), "pw");
        }

        #[test]
        fn push_failure_carries_stderr_verbatim() {
            let td = tempdir().expect("tempdir");
            let bin = fake_helm(
                td.path(),
                "echo 'Error: unexpected status from HEAD request: 403 Forbidden' >&2; exit 1",
            );
            let helm = HelmCli::new(bin, Duration::from_secs(5), Duration::from_secs(5));
            let session =
                RegistrySession::new(RegistryEndpoint::new("https://new", "robot", "pw"));

            let err = helm
                .push(&session, Path::new("redis-1.0.0.tgz"), "oci://new/db")
                .expect_err("should fail");
            assert!(
                err.to_string()
                    .contains("Error: unexpected status from HEAD request: 403 Forbidden")
            );
        }

        #[test]
        fn push_success() {
            let td = tempdir().expect("tempdir");
            let bin = fake_helm(td.path(), "exit 0");
            let helm = HelmCli::new(bin, Duration::from_secs(5), Duration::from_secs(5));
            assert!(helm.is_available());
            let session = RegistrySession::new(RegistryEndpoint::anonymous("https://new"));

            helm.push(&session, Path::new("redis-1.0.0.tgz"), "oci://new/db")
                .expect("push");
        }
    }
}
