//! Package-manager collaborators (§10.6): a `NullPackageManager` and
//! `InMemoryPackageManager` for running the event loop without a real
//! cluster, and a `HelmPackageManager` that shells out to a `helm`-compatible
//! binary the way `supervisor::launch_supervised` and
//! `replay::execute_direct` build up and run a `Command`.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;

use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use modctl_core::collaborators::{PackageManager, ReleaseStatus, UpgradeRequest};

/// Reports no releases and fails any mutating call. Useful for a dry
/// reconciliation run (`--package-manager=null`, the daemon's default) where
/// no chart is ever actually installed.
pub struct NullPackageManager;

#[async_trait]
impl PackageManager for NullPackageManager {
    async fn list_release_names(&self, _cancel: CancellationToken) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn history(
        &self,
        _release: &str,
        _cancel: CancellationToken,
    ) -> anyhow::Result<(u64, ReleaseStatus)> {
        Ok((0, ReleaseStatus::Unknown))
    }

    async fn upgrade(&self, request: &UpgradeRequest, _cancel: CancellationToken) -> anyhow::Result<()> {
        bail!("null package manager cannot upgrade release `{}`", request.release)
    }

    async fn delete(&self, release: &str, _cancel: CancellationToken) -> anyhow::Result<()> {
        bail!("null package manager cannot delete release `{release}`")
    }

    async fn get_values(&self, _release: &str, _cancel: CancellationToken) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({}))
    }
}

#[derive(Clone)]
struct Release {
    revisions: Vec<(u64, ReleaseStatus)>,
    values: serde_json::Value,
}

/// A fake backed by process memory, for integration tests and for
/// exercising the event loop end-to-end without a real cluster. Release
/// identity is the module name, matching §6; each `upgrade` appends a new
/// revision the way `<release>.v<n>` storage would.
#[derive(Default)]
pub struct InMemoryPackageManager {
    releases: Mutex<HashMap<String, Release>>,
}

impl InMemoryPackageManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, release: &str, revision: u64, status: ReleaseStatus) {
        let mut releases = self.releases.lock().expect("package manager lock poisoned");
        releases
            .entry(release.to_string())
            .or_insert_with(|| Release {
                revisions: Vec::new(),
                values: serde_json::json!({}),
            })
            .revisions
            .push((revision, status));
    }
}

#[async_trait]
impl PackageManager for InMemoryPackageManager {
    async fn list_release_names(&self, _cancel: CancellationToken) -> anyhow::Result<Vec<String>> {
        let releases = self.releases.lock().expect("package manager lock poisoned");
        Ok(releases.keys().cloned().collect())
    }

    async fn history(
        &self,
        release: &str,
        _cancel: CancellationToken,
    ) -> anyhow::Result<(u64, ReleaseStatus)> {
        let releases = self.releases.lock().expect("package manager lock poisoned");
        Ok(releases
            .get(release)
            .and_then(|r| r.revisions.last().cloned())
            .unwrap_or((0, ReleaseStatus::Unknown)))
    }

    async fn upgrade(&self, request: &UpgradeRequest, _cancel: CancellationToken) -> anyhow::Result<()> {
        let mut releases = self.releases.lock().expect("package manager lock poisoned");
        let entry = releases.entry(request.release.clone()).or_insert_with(|| Release {
            revisions: Vec::new(),
            values: serde_json::json!({}),
        });
        let next_revision = entry.revisions.last().map(|(rev, _)| rev + 1).unwrap_or(1);
        entry.revisions.push((next_revision, ReleaseStatus::Deployed));
        Ok(())
    }

    async fn delete(&self, release: &str, _cancel: CancellationToken) -> anyhow::Result<()> {
        let mut releases = self.releases.lock().expect("package manager lock poisoned");
        releases.remove(release);
        Ok(())
    }

    async fn get_values(&self, release: &str, _cancel: CancellationToken) -> anyhow::Result<serde_json::Value> {
        let releases = self.releases.lock().expect("package manager lock poisoned");
        Ok(releases
            .get(release)
            .map(|r| r.values.clone())
            .unwrap_or_else(|| serde_json::json!({})))
    }
}

/// Shells out to a `helm`-compatible binary for every operation, matching
/// the `Command`-based process-spawn idiom in `supervisor` and `replay`.
pub struct HelmPackageManager {
    binary: String,
    namespace: String,
}

impl HelmPackageManager {
    pub fn new(binary: String, namespace: String) -> Self {
        Self { binary, namespace }
    }

    async fn run(&self, args: &[String], cancel: CancellationToken) -> anyhow::Result<Vec<u8>> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let run = async {
            let child = cmd
                .spawn()
                .with_context(|| format!("failed to spawn `{}`", self.binary))?;
            Ok::<_, anyhow::Error>(child.wait_with_output().await?)
        };

        let output = tokio::select! {
            result = run => result?,
            _ = cancel.cancelled() => bail!("`{}` invocation cancelled", self.binary),
        };

        if !output.status.success() {
            bail!(
                "`{} {}` exited with {}: {}",
                self.binary,
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl PackageManager for HelmPackageManager {
    async fn list_release_names(&self, cancel: CancellationToken) -> anyhow::Result<Vec<String>> {
        let out = self
            .run(
                &[
                    "list".into(),
                    "--namespace".into(),
                    self.namespace.clone(),
                    "--output".into(),
                    "json".into(),
                ],
                cancel,
            )
            .await?;
        let entries: Vec<serde_json::Value> =
            serde_json::from_slice(&out).context("failed to parse `helm list` output")?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| entry.get("name").and_then(|n| n.as_str()).map(str::to_string))
            .collect())
    }

    async fn history(
        &self,
        release: &str,
        cancel: CancellationToken,
    ) -> anyhow::Result<(u64, ReleaseStatus)> {
        let out = self
            .run(
                &[
                    "history".into(),
                    release.to_string(),
                    "--namespace".into(),
                    self.namespace.clone(),
                    "--output".into(),
                    "json".into(),
                    "--max".into(),
                    "1".into(),
                ],
                cancel,
            )
            .await;
        let out = match out {
            Ok(out) => out,
            // Absence is `(revision=0, Unknown)`, not an error (§9 open question).
            Err(_) => return Ok((0, ReleaseStatus::Unknown)),
        };
        let entries: Vec<serde_json::Value> =
            serde_json::from_slice(&out).context("failed to parse `helm history` output")?;
        let Some(last) = entries.last() else {
            return Ok((0, ReleaseStatus::Unknown));
        };
        let revision = last.get("revision").and_then(|r| r.as_u64()).unwrap_or(0);
        let status = last
            .get("status")
            .and_then(|s| s.as_str())
            .map(ReleaseStatus::from_raw)
            .unwrap_or(ReleaseStatus::Unknown);
        Ok((revision, status))
    }

    async fn upgrade(&self, request: &UpgradeRequest, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            request.release.clone(),
            request.chart.display().to_string(),
            "--namespace".to_string(),
            request.namespace.clone(),
            "--create-namespace".to_string(),
        ];
        for value_file in &request.value_files {
            args.push("--values".to_string());
            args.push(value_file.display().to_string());
        }
        for set_arg in &request.set_args {
            args.push("--set".to_string());
            args.push(set_arg.clone());
        }
        self.run(&args, cancel).await?;
        Ok(())
    }

    async fn delete(&self, release: &str, cancel: CancellationToken) -> anyhow::Result<()> {
        self.run(
            &[
                "uninstall".to_string(),
                release.to_string(),
                "--namespace".to_string(),
                self.namespace.clone(),
            ],
            cancel,
        )
        .await?;
        Ok(())
    }

    async fn get_values(&self, release: &str, cancel: CancellationToken) -> anyhow::Result<serde_json::Value> {
        let out = self
            .run(
                &[
                    "get".to_string(),
                    "values".to_string(),
                    release.to_string(),
                    "--namespace".to_string(),
                    self.namespace.clone(),
                    "--output".to_string(),
                    "json".to_string(),
                ],
                cancel,
            )
            .await?;
        serde_json::from_slice(&out).context("failed to parse `helm get values` output")
    }
}
