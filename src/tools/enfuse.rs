use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

use super::{Fuser, run_tool};
use crate::config::ToolsConfig;

/// `enfuse`, invoked as `enfuse -o <output> -g <files...>`.
pub struct Enfuse {
    program: String,
    timeout: Option<Duration>,
}

impl Enfuse {
    pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ToolsConfig) -> Self {
        Self::new(config.fuse_program.clone(), config.timeout())
    }

    fn command(&self, batch: &[PathBuf], output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-o").arg(output).arg("-g").args(batch);
        cmd
    }
}

#[async_trait::async_trait]
impl Fuser for Enfuse {
    fn name(&self) -> &str {
        &self.program
    }

    async fn fuse(&self, batch: &[PathBuf], output: &Path) -> Result<()> {
        run_tool(self.command(batch, output), self.timeout).await
    }
}
