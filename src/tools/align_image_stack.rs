use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

use super::{Aligner, run_tool};
use crate::config::ToolsConfig;
use crate::scan::collect_files;

/// Hugin's `align_image_stack`, invoked as
/// `align_image_stack -a <out_dir>/<prefix> <files...>`.
///
/// The tool writes `<prefix>0000.tif`, `<prefix>0001.tif`, … into `out_dir`.
pub struct AlignImageStack {
    program: String,
    artifact_prefix: String,
    timeout: Option<Duration>,
}

impl AlignImageStack {
    pub fn new(program: impl Into<String>, artifact_prefix: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            artifact_prefix: artifact_prefix.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(
            config.align_program.clone(),
            config.align_artifact_prefix.clone(),
            config.timeout(),
        )
    }

    fn command(&self, files: &[PathBuf], out_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-a").arg(out_dir.join(&self.artifact_prefix)).args(files);
        cmd
    }

    /// Aligned TIFFs in `out_dir`, sorted by name.
    pub fn collect_artifacts(&self, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut artifacts: Vec<PathBuf> = collect_files(out_dir, &["tif".to_string()])?
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&self.artifact_prefix))
            })
            .collect();
        artifacts.sort();
        Ok(artifacts)
    }
}

#[async_trait::async_trait]
impl Aligner for AlignImageStack {
    fn name(&self) -> &str {
        &self.program
    }

    async fn align(&self, files: &[PathBuf], out_dir: &Path) -> Result<Vec<PathBuf>> {
        run_tool(self.command(files, out_dir), self.timeout).await?;
        self.collect_artifacts(out_dir)
    }
}
