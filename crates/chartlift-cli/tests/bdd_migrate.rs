//! Behaviour tests for a full `chartlift` run.
//!
//! Each scenario is written Given-When-Then against a fake Harbor served by
//! `tiny_http` and a fake `helm` script that logs its arguments.
#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::{TempDir, tempdir};
use tiny_http::{Response, Server, StatusCode};

struct TestHarbor {
    base_url: String,
    handle: thread::JoinHandle<Vec<String>>,
}

impl TestHarbor {
    fn join(self) -> Vec<String> {
        self.handle.join().expect("join server")
    }
}

fn spawn_harbor(routes: Vec<(String, u16, String)>, expected_requests: usize) -> TestHarbor {
    let server = Server::http("127.0.0.1:0").expect("server");
    let base_url = format!("http://{}", server.server_addr());
    let handle = thread::spawn(move || {
        let mut seen = Vec::new();
        for _ in 0..expected_requests {
            let Some(req) = server
                .recv_timeout(Duration::from_secs(10))
                .expect("recv")
            else {
                break;
            };
            let url = req.url().to_string();
            let (status, body) = routes
                .iter()
                .find(|(path, _, _)| *path == url)
                .map(|(_, status, body)| (*status, body.clone()))
                .unwrap_or((404, String::new()));
            req.respond(Response::from_string(body).with_status_code(StatusCode(status)))
                .expect("respond");
            seen.push(url);
        }
        seen
    });
    TestHarbor { base_url, handle }
}

/// Routes for a ChartMuseum project holding one version per chart, every
/// archive downloadable.
fn project_routes(project: &str, charts: &[(&str, &str)]) -> Vec<(String, u16, String)> {
    let names: Vec<String> = charts
        .iter()
        .map(|(name, _)| format!(r#"{{"name":"{name}"}}"#))
        .collect();
    let mut routes = vec![(
        format!("/api/chartrepo/{project}/charts"),
        200,
        format!("[{}]", names.join(",")),
    )];
    for (name, version) in charts {
        routes.push((
            format!("/api/chartrepo/{project}/charts/{name}"),
            200,
            format!(r#"[{{"name":"{name}","version":"{version}"}}]"#),
        ));
        routes.push((
            format!("/chartrepo/{project}/charts/{name}-{version}.tgz"),
            200,
            format!("{name}-archive"),
        ));
    }
    routes
}

struct Sandbox {
    td: TempDir,
    helm: PathBuf,
}

impl Sandbox {
    /// `push_fails_for` makes the fake helm reject pushes whose file name
    /// contains that text; `login_fails` rejects every login.
    fn new(push_fails_for: Option<&str>, login_fails: bool) -> Self {
        use std::os::unix::fs::PermissionsExt;

        let td = tempdir().expect("tempdir");
        let helm = td.path().join("helm");
        let push_check = match push_fails_for {
            Some(pattern) => format!(
                "case \"$2\" in *{pattern}*) echo \"Error: failed to push $2\" >&2; exit 1;; esac\n"
            ),
            None => String::new(),
        };
        let login_exit = if login_fails {
            "echo 'Error: unauthorized: incorrect username or password' >&2; exit 1"
        } else {
            "exit 0"
        };
        fs::write(
            &helm,
            format!(
                "#!/usr/bin/env sh\n\
                 echo \"$@\" >> \"{log}\"\n\
                 if [ \"$1\" = \"registry\" ]; then cat > /dev/null; {login_exit}; fi\n\
                 {push_check}\
                 exit 0\n",
                log = td.path().join("helm.log").display(),
            ),
        )
        .expect("write fake helm");
        let mut perms = fs::metadata(&helm).expect("meta").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&helm, perms).expect("chmod");

        Self { td, helm }
    }

    fn root(&self) -> &Path {
        self.td.path()
    }

    fn helm_calls(&self) -> Vec<String> {
        fs::read_to_string(self.root().join("helm.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn command(&self, source_url: &str, projects: &[&str]) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("chartlift"));
        cmd.current_dir(self.root())
            .env_remove("CHARTLIFT_SOURCE_URL")
            .env_remove("CHARTLIFT_DESTINATION_URL")
            .arg("--source-url")
            .arg(source_url)
            .arg("--source-username")
            .arg("admin")
            .arg("--source-password")
            .arg("secret")
            .arg("--destination-url")
            .arg("https://oci.example.com")
            .arg("--destination-username")
            .arg("robot")
            .arg("--destination-password")
            .arg("pw")
            .arg("--helm-bin")
            .arg(&self.helm)
            .arg("--staging-dir")
            .arg(self.root().join("staging"))
            .arg("--no-progress");
        for project in projects {
            cmd.arg("--project").arg(project);
        }
        cmd
    }
}

// Scenario: every chart migrates
// Given a source project with two charts
// When chartlift runs
// Then both are pushed and the run exits 0
#[test]
fn given_healthy_registries_when_migrating_then_all_charts_are_pushed() {
    let sandbox = Sandbox::new(None, false);
    let harbor = spawn_harbor(
        project_routes("db", &[("redis", "1.0.0"), ("postgres", "12.1.0")]),
        5,
    );

    sandbox
        .command(&harbor.base_url, &["db"])
        .assert()
        .success()
        .stdout(contains("migrated 2/2 Helm charts (0 failed)"));
    harbor.join();

    let pushes: Vec<String> = sandbox
        .helm_calls()
        .into_iter()
        .filter(|c| c.starts_with("push "))
        .collect();
    assert_eq!(pushes.len(), 2);
    assert!(pushes[0].ends_with("redis-1.0.0.tgz oci://oci.example.com/db"));
    assert!(pushes[1].ends_with("postgres-12.1.0.tgz oci://oci.example.com/db"));
}

// Scenario: both registries are logged in before anything else
// Given credentials for source and destination
// When chartlift runs
// Then helm logs in to the source host first, then the destination host
#[test]
fn given_credentials_when_migrating_then_both_registries_are_logged_in_first() {
    let sandbox = Sandbox::new(None, false);
    let harbor = spawn_harbor(project_routes("db", &[("redis", "1.0.0")]), 3);
    let source_host = harbor.base_url.trim_start_matches("http://").to_string();

    sandbox
        .command(&harbor.base_url, &["db"])
        .assert()
        .success();
    harbor.join();

    let calls = sandbox.helm_calls();
    assert_eq!(
        calls[0],
        format!("registry login {source_host} --username admin --password-stdin")
    );
    assert_eq!(
        calls[1],
        "registry login oci.example.com --username robot --password-stdin"
    );
    assert!(calls[2].starts_with("push "));
    assert!(!calls.iter().any(|c| c.contains("secret") || c.contains(" pw")));
}

// Scenario: one push failure does not stop the run
// Given helm rejects the redis archive
// When chartlift runs
// Then postgres is still pushed, the failure is listed and the exit code is 3
#[test]
fn given_a_rejected_push_when_migrating_then_later_charts_still_migrate() {
    let sandbox = Sandbox::new(Some("redis"), false);
    let harbor = spawn_harbor(
        project_routes("db", &[("redis", "1.0.0"), ("postgres", "12.1.0")]),
        5,
    );

    sandbox
        .command(&harbor.base_url, &["db"])
        .assert()
        .code(3)
        .stdout(contains(
            "failed: db/redis@1.0.0 (redis-1.0.0.tgz): push to oci://oci.example.com/db failed",
        ))
        .stdout(contains("Error: failed to push"))
        .stdout(contains("migrated 1/2 Helm charts (1 failed)"));
    harbor.join();

    let pushes = sandbox
        .helm_calls()
        .into_iter()
        .filter(|c| c.starts_with("push "))
        .count();
    assert_eq!(pushes, 2);
    assert_eq!(
        fs::read_dir(sandbox.root().join("staging"))
            .expect("staging")
            .count(),
        0
    );
}

// Scenario: nothing to migrate
// Given a project without charts
// When chartlift runs
// Then it reports 0/0 and exits 0 without pushing
#[test]
fn given_an_empty_project_when_migrating_then_nothing_is_pushed() {
    let sandbox = Sandbox::new(None, false);
    let harbor = spawn_harbor(project_routes("empty", &[]), 1);

    sandbox
        .command(&harbor.base_url, &["empty"])
        .assert()
        .success()
        .stdout(contains("migrated 0/0 Helm charts (0 failed)"));
    harbor.join();

    assert!(!sandbox.helm_calls().iter().any(|c| c.starts_with("push ")));
}

// Scenario: login is rejected
// Given helm refuses the credentials
// When chartlift runs
// Then the run aborts with exit 1 before any download or push
#[test]
fn given_rejected_credentials_when_migrating_then_run_aborts_before_transfers() {
    let sandbox = Sandbox::new(None, true);
    // Nothing listens here; any request would fail the run differently.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let base_url = format!("http://{}", listener.local_addr().expect("addr"));
    drop(listener);

    sandbox
        .command(&base_url, &["db"])
        .assert()
        .code(1)
        .stderr(contains("failed to authenticate against"))
        .stderr(contains("incorrect username or password"));

    let calls = sandbox.helm_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].starts_with("registry login "));
    assert!(!sandbox.root().join("staging").exists());
}
