//! `ProcessHookExecutor` (§10.6): spawns a hook as a child process, writing
//! the binding-context document and creating the patch-output directory
//! first, the way `replay::execute_direct` spawns and waits on a command
//! with a timeout, and `supervisor::launch_supervised` builds up its
//! environment before spawning.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use modctl_core::collaborators::{HookExecutor, HookInvocation, HookOutcome};

pub struct ProcessHookExecutor {
    timeout: Duration,
}

impl ProcessHookExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ProcessHookExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

#[async_trait]
impl HookExecutor for ProcessHookExecutor {
    async fn execute(
        &self,
        hook_path: &Path,
        invocation: &HookInvocation,
        cancel: CancellationToken,
    ) -> anyhow::Result<HookOutcome> {
        std::fs::create_dir_all(&invocation.working_dir).with_context(|| {
            format!(
                "failed to create hook working directory {}",
                invocation.working_dir.display()
            )
        })?;
        std::fs::create_dir_all(&invocation.patch_output_dir).with_context(|| {
            format!(
                "failed to create patch output directory {}",
                invocation.patch_output_dir.display()
            )
        })?;

        let context_json = serde_json::to_vec_pretty(&invocation.binding_context)
            .context("failed to render binding context document")?;
        if let Some(parent) = invocation.binding_context_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create binding context directory {}", parent.display())
            })?;
        }
        std::fs::write(&invocation.binding_context_path, context_json).with_context(|| {
            format!(
                "failed to write binding context document {}",
                invocation.binding_context_path.display()
            )
        })?;

        let mut cmd = Command::new(hook_path);
        cmd.current_dir(&invocation.working_dir);
        cmd.env("MODCTL_BINDING_CONTEXT", &invocation.binding_context_path);
        cmd.env("MODCTL_PATCH_OUTPUT_DIR", &invocation.patch_output_dir);
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }
        for (key, value) in &invocation.labels {
            cmd.env(format!("MODCTL_LABEL_{key}"), value);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let run = async {
            let child = cmd.spawn().with_context(|| {
                format!("failed to spawn hook {}", hook_path.display())
            })?;
            Ok::<_, anyhow::Error>(child.wait_with_output().await?)
        };

        let output = tokio::select! {
            result = timeout(self.timeout, run) => match result {
                Ok(inner) => inner?,
                Err(_) => anyhow::bail!("hook {} timed out after {:?}", hook_path.display(), self.timeout),
            },
            _ = cancel.cancelled() => anyhow::bail!("hook {} cancelled", hook_path.display()),
        };

        let patch_files = collect_patch_files(&invocation.patch_output_dir)?;

        Ok(HookOutcome {
            exit_status: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
            patch_files,
        })
    }
}

fn collect_patch_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(files),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to list patch directory {}", dir.display()))
        }
    };
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use modctl_core::collaborators::BindingContext;
    use modctl_core::module::Binding;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[tokio::test]
    async fn runs_hook_and_collects_emitted_patch_files() {
        let dir = tempdir().unwrap();
        let hook_path = dir.path().join("hook.sh");
        let working_dir = dir.path().join("work");
        let patch_dir = working_dir.join("patches");
        std::fs::write(
            &hook_path,
            format!(
                "#!/bin/sh\nmkdir -p \"$MODCTL_PATCH_OUTPUT_DIR\"\necho '[]' > \"$MODCTL_PATCH_OUTPUT_DIR/p.json\"\n"
            ),
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&hook_path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let invocation = HookInvocation {
            working_dir: working_dir.clone(),
            env: HashMap::new(),
            binding_context: BindingContext {
                binding: Binding::Schedule,
                values: serde_json::json!({}),
                contexts: Vec::new(),
            },
            binding_context_path: working_dir.join("binding-context.json"),
            patch_output_dir: patch_dir.clone(),
            labels: HashMap::new(),
        };

        let executor = ProcessHookExecutor::default();
        let outcome = executor
            .execute(&hook_path, &invocation, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.exit_status, 0);
        assert_eq!(outcome.patch_files, vec![patch_dir.join("p.json")]);
    }
}
