mod align_image_stack;
mod enfuse;

pub use align_image_stack::AlignImageStack;
pub use enfuse::Enfuse;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::ToolsConfig;

/// Geometric registration of one group's exposures.
///
/// Implement this trait to plug in a different aligner (or a fake in tests).
/// The library ships with [`AlignImageStack`].
///
/// # Example
///
/// ```rust,no_run
/// use bracket_hdr::tools::{AlignImageStack, Aligner};
/// use std::path::{Path, PathBuf};
///
/// # async fn example() -> anyhow::Result<()> {
/// let aligner = AlignImageStack::new("align_image_stack", "aligned_", None);
/// let files = vec![PathBuf::from("Group_1_E1.jpg"), PathBuf::from("Group_1_E2.jpg")];
/// let aligned = aligner.align(&files, Path::new("./aligned/Group_1")).await?;
/// println!("{} aligned image(s)", aligned.len());
/// # Ok(())
/// # }
/// ```
#[async_trait::async_trait]
pub trait Aligner: Send + Sync {
    /// The display name of this aligner.
    fn name(&self) -> &str;
    /// Align `files` and return the produced images, in production order.
    ///
    /// `out_dir` exists and belongs to this call alone. An error means the
    /// group cannot be fused.
    async fn align(&self, files: &[PathBuf], out_dir: &Path) -> Result<Vec<PathBuf>>;
}

/// Merging one batch of aligned exposures into a single image.
///
/// The library ships with [`Enfuse`].
#[async_trait::async_trait]
pub trait Fuser: Send + Sync {
    /// The display name of this fuser.
    fn name(&self) -> &str;
    /// Fuse `batch` into the image at `output`.
    async fn fuse(&self, batch: &[PathBuf], output: &Path) -> Result<()>;
}

/// Build the default aligner and fuser from configuration.
pub fn build_toolchain(config: &ToolsConfig) -> (AlignImageStack, Enfuse) {
    (AlignImageStack::from_config(config), Enfuse::from_config(config))
}

/// Run an external tool to completion, failing on a non-zero exit.
///
/// With a `timeout`, the child is killed once the limit passes and the call
/// fails as if the tool had exited non-zero.
pub(crate) async fn run_tool(mut cmd: Command, timeout: Option<Duration>) -> Result<()> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    log::debug!("Command: {:?}", cmd.as_std());

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, cmd.output())
            .await
            .map_err(|_| anyhow::anyhow!("{program} timed out after {limit:?}"))?,
        None => cmd.output().await,
    }
    .with_context(|| format!("Failed to execute {program}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("{program} failed ({}): {}", output.status, stderr.trim());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        log::debug!("{program} output:\n{}", stdout.trim_end());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_executable_is_an_error() {
        let cmd = Command::new("definitely-not-a-real-tool-4f1c");
        let err = run_tool(cmd, None).await.unwrap_err();
        assert!(format!("{err:#}").contains("definitely-not-a-real-tool-4f1c"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        assert!(run_tool(Command::new("false"), None).await.is_err());
        assert!(run_tool(Command::new("true"), None).await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_tool_is_killed_after_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let started = std::time::Instant::now();
        let err = run_tool(cmd, Some(Duration::from_millis(200))).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn toolchain_uses_configured_programs() {
        let config = ToolsConfig {
            align_program: "my_align".into(),
            fuse_program: "my_fuse".into(),
            ..ToolsConfig::default()
        };
        let (aligner, fuser) = build_toolchain(&config);
        assert_eq!(aligner.name(), "my_align");
        assert_eq!(fuser.name(), "my_fuse");
    }
}
