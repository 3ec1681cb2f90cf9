use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::discovery::{GroupLabel, GroupMap, ImageGroup};
use crate::tools::{Aligner, Fuser};

/// How a group ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GroupStatus {
    /// Alignment produced images and every batch was attempted.
    Fused,
    /// Alignment failed or produced nothing; the group was skipped.
    AlignmentFailed { error: String },
}

/// The outcome of one fusion invocation.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// 1-based position of the batch within its group.
    pub index: usize,
    pub inputs: Vec<PathBuf>,
    pub output: PathBuf,
    pub error: Option<String>,
}

impl BatchReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything that happened to one group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub label: GroupLabel,
    pub inputs: Vec<PathBuf>,
    pub aligned: Vec<PathBuf>,
    #[serde(flatten)]
    pub status: GroupStatus,
    pub batches: Vec<BatchReport>,
}

/// Audit log of a pipeline run, one entry per group in processing order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub groups: Vec<GroupReport>,
}

impl RunReport {
    pub fn succeeded_batches(&self) -> usize {
        self.all_batches().filter(|b| b.succeeded()).count()
    }

    pub fn failed_batches(&self) -> usize {
        self.all_batches().filter(|b| !b.succeeded()).count()
    }

    pub fn skipped_groups(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| matches!(g.status, GroupStatus::AlignmentFailed { .. }))
            .count()
    }

    /// Paths of every fused image that was written.
    pub fn outputs(&self) -> Vec<&Path> {
        self.all_batches()
            .filter(|b| b.succeeded())
            .map(|b| b.output.as_path())
            .collect()
    }

    fn all_batches(&self) -> impl Iterator<Item = &BatchReport> {
        self.groups.iter().flat_map(|g| g.batches.iter())
    }
}

/// Split aligned images into consecutive batches of at most `batch_size`.
///
/// Order is preserved and only the last batch may be short. A `batch_size`
/// of zero is treated as one.
///
/// ```rust
/// use bracket_hdr::pipeline::batches;
/// use std::path::PathBuf;
///
/// let aligned: Vec<PathBuf> = (0..5).map(|i| PathBuf::from(format!("aligned_{i:04}.tif"))).collect();
/// let sizes: Vec<usize> = batches(&aligned, 3).map(|b| b.len()).collect();
/// assert_eq!(sizes, vec![3, 2]);
/// ```
pub fn batches(artifacts: &[PathBuf], batch_size: usize) -> std::slice::Chunks<'_, PathBuf> {
    artifacts.chunks(batch_size.max(1))
}

/// `HDR_{label}_batch_{index}.{ext}`, with a 1-based batch index.
pub fn batch_output_name(label: &GroupLabel, batch_index: usize, extension: &str) -> String {
    format!("HDR_{label}_batch_{batch_index}.{extension}")
}

/// The scratch folder a group aligns into: `<aligned_root>/<label>`.
pub fn group_scratch_dir(aligned_root: &Path, label: &GroupLabel) -> PathBuf {
    aligned_root.join(label.as_str())
}

/// Marker file identifying a folder created by [`prepare_scratch_dir`].
pub const SCRATCH_MARKER: &str = ".bracket-hdr-scratch";

/// Empty (or create) a group's scratch folder so it holds only this run's output.
///
/// Only folders carrying [`SCRATCH_MARKER`], or empty ones, are reused. Any
/// other existing folder is left untouched and the group fails.
fn prepare_scratch_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        let is_empty = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read {}", dir.display()))?
            .next()
            .is_none();
        if !is_empty {
            if !dir.join(SCRATCH_MARKER).is_file() {
                anyhow::bail!(
                    "{} already exists and is not a scratch folder; refusing to clear it",
                    dir.display()
                );
            }
            std::fs::remove_dir_all(dir)
                .with_context(|| format!("Failed to clear {}", dir.display()))?;
        }
    }
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    std::fs::write(dir.join(SCRATCH_MARKER), b"")
        .with_context(|| format!("Failed to mark {} as scratch", dir.display()))
}

/// Align one group, then fuse its aligned images batch by batch.
///
/// Never fails: an alignment problem marks the group as skipped and a fusion
/// problem is recorded on its batch, after which the next batch still runs.
pub async fn process_group(
    group: &ImageGroup,
    aligner: &dyn Aligner,
    fuser: &dyn Fuser,
    config: &PipelineConfig,
) -> GroupReport {
    let mut report = GroupReport {
        label: group.label.clone(),
        inputs: group.files.clone(),
        aligned: Vec::new(),
        status: GroupStatus::Fused,
        batches: Vec::new(),
    };

    let scratch = group_scratch_dir(&config.aligned_dir, &group.label);
    let aligned = match prepare_scratch_dir(&scratch) {
        Ok(()) => aligner.align(&group.files, &scratch).await,
        Err(e) => Err(e),
    };

    let aligned = match aligned {
        Ok(files) if !files.is_empty() => files,
        Ok(_) => {
            log::warn!("Skipping group {} due to alignment failure: no aligned images produced", group.label);
            report.status = GroupStatus::AlignmentFailed {
                error: "no aligned images produced".to_string(),
            };
            return report;
        }
        Err(e) => {
            log::error!("Skipping group {} due to alignment failure: {e:#}", group.label);
            report.status = GroupStatus::AlignmentFailed { error: format!("{e:#}") };
            return report;
        }
    };

    log::info!(
        "  {} aligned {} image(s) into {}",
        aligner.name(),
        aligned.len(),
        scratch.display()
    );

    let total_batches = aligned.len().div_ceil(config.batch_size.max(1));
    log::info!("  Total batches: {total_batches}");

    for (i, batch) in batches(&aligned, config.batch_size).enumerate() {
        let index = i + 1;
        let output = config
            .output_dir
            .join(batch_output_name(&group.label, index, &config.output_extension));

        let error = match fuser.fuse(batch, &output).await {
            Ok(()) => {
                log::info!(
                    "  Created HDR image: {} (Batch {index}/{total_batches})",
                    output.display()
                );
                None
            }
            Err(e) => {
                log::error!("  Error processing {} batch {index}: {e:#}", group.label);
                Some(format!("{e:#}"))
            }
        };

        report.batches.push(BatchReport {
            index,
            inputs: batch.to_vec(),
            output,
            error,
        });
    }

    report.aligned = aligned;
    report
}

/// Run every discovered group through alignment and batched fusion.
///
/// Groups are handled one at a time in `groups` order, and a failing group
/// never stops the run. The only hard error is being unable to create the
/// output or scratch folders.
///
/// # Example
///
/// ```rust,no_run
/// use bracket_hdr::config::Config;
/// use bracket_hdr::discovery::discover_groups;
/// use bracket_hdr::pipeline::run_pipeline;
/// use bracket_hdr::tools::build_toolchain;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::default();
/// let groups = discover_groups(
///     Path::new("."),
///     &config.discovery.prefix,
///     &config.discovery.image_extensions,
/// )?;
/// let (aligner, fuser) = build_toolchain(&config.tools);
///
/// let report = run_pipeline(&groups, &aligner, &fuser, &config.pipeline).await?;
/// println!("{} HDR image(s) written", report.succeeded_batches());
/// # Ok(())
/// # }
/// ```
pub async fn run_pipeline(
    groups: &GroupMap,
    aligner: &dyn Aligner,
    fuser: &dyn Fuser,
    config: &PipelineConfig,
) -> Result<RunReport> {
    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Failed to create output folder {}", config.output_dir.display()))?;
    std::fs::create_dir_all(&config.aligned_dir)
        .with_context(|| format!("Failed to create aligned folder {}", config.aligned_dir.display()))?;

    let total = groups.len();
    log::info!("Total groups to process: {total}");

    let mut report = RunReport::default();
    for (i, group) in groups.iter().enumerate() {
        log::info!(
            "[{}/{}] Processing group {} ({} image(s))",
            i + 1,
            total,
            group.label,
            group.files.len()
        );
        report.groups.push(process_group(group, aligner, fuser, config).await);
    }

    Ok(report)
}
