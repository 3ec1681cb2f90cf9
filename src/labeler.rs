//! Bracket labeling: group RAW captures by time proximity and rename them.
//!
//! Files are sorted by modification time and walked once. A new bracket starts
//! at the first file and wherever the gap to the previous capture is strictly
//! greater than the time window; everything else extends the current bracket.
//! Each file is then renamed in place to `{prefix}_{group}_E{exposure}.{ext}`.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::config::LabelerConfig;
use crate::scan::collect_files;

/// A candidate file and the timestamp used to order it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl SourceFile {
    pub fn new(path: PathBuf, modified: SystemTime) -> Self {
        Self { path, modified }
    }

    /// Read the modification time from filesystem metadata.
    pub fn from_path(path: &Path) -> Result<Self> {
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .with_context(|| format!("Failed to read modification time of {}", path.display()))?;
        Ok(Self::new(path.to_path_buf(), modified))
    }
}

/// A file placed in a bracket, with its 1-based position in capture order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledFile {
    pub source: SourceFile,
    pub exposure_index: usize,
}

/// One exposure bracket. `files[i].exposure_index == i + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bracket {
    pub group_index: usize,
    pub files: Vec<LabeledFile>,
}

impl Bracket {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// What happened to one file during [`apply_labels`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RenameOutcome {
    Renamed,
    /// The file already carried its target name.
    Unchanged,
    /// Dry run: the rename was computed but not performed.
    Planned,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RenameEntry {
    pub from: PathBuf,
    pub to: PathBuf,
    pub group_index: usize,
    pub exposure_index: usize,
    #[serde(flatten)]
    pub outcome: RenameOutcome,
}

/// Per-file log of a labeling pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LabelReport {
    pub brackets: usize,
    pub entries: Vec<RenameEntry>,
}

impl LabelReport {
    pub fn renamed(&self) -> usize {
        self.count(|o| matches!(o, RenameOutcome::Renamed))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RenameOutcome::Failed { .. }))
    }

    pub fn planned(&self) -> usize {
        self.count(|o| matches!(o, RenameOutcome::Planned))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, RenameOutcome::Unchanged))
    }

    fn count(&self, pred: impl Fn(&RenameOutcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }
}

/// Scan `folder` for files with one of `extensions` and read their timestamps.
///
/// Files whose metadata cannot be read are logged and left out.
pub fn scan_sources(folder: &Path, extensions: &[String]) -> Result<Vec<SourceFile>> {
    let paths = collect_files(folder, extensions)?;
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        match SourceFile::from_path(&path) {
            Ok(source) => sources.push(source),
            Err(e) => log::warn!("Skipping {}: {e:#}", path.display()),
        }
    }
    Ok(sources)
}

/// Partition `files` into brackets by capture-time gaps.
///
/// The sort is stable, so files with equal timestamps keep their input order.
/// A gap exactly equal to `window` stays in the current bracket.
pub fn plan_brackets(mut files: Vec<SourceFile>, window: Duration) -> Vec<Bracket> {
    files.sort_by_key(|f| f.modified);

    let (brackets, _last) = files.into_iter().fold(
        (Vec::<Bracket>::new(), None::<SystemTime>),
        |(mut brackets, last), file| {
            let modified = file.modified;
            let extends_current = last.is_some_and(|last| gap(last, modified) <= window);

            match brackets.last_mut() {
                Some(current) if extends_current => {
                    let exposure_index = current.files.len() + 1;
                    current.files.push(LabeledFile { source: file, exposure_index });
                }
                _ => {
                    let group_index = brackets.len() + 1;
                    brackets.push(Bracket {
                        group_index,
                        files: vec![LabeledFile { source: file, exposure_index: 1 }],
                    });
                }
            }

            (brackets, Some(modified))
        },
    );

    brackets
}

fn gap(earlier: SystemTime, later: SystemTime) -> Duration {
    later.duration_since(earlier).unwrap_or(Duration::ZERO)
}

/// Build the bracket filename for `original`, keeping its extension as-is.
///
/// ```rust
/// use bracket_hdr::labeler::label_name;
/// use std::path::Path;
///
/// assert_eq!(label_name("Group", 2, 3, Path::new("DSC0042.ARW")), "Group_2_E3.ARW");
/// ```
pub fn label_name(prefix: &str, group_index: usize, exposure_index: usize, original: &Path) -> String {
    match original.extension() {
        Some(ext) => format!(
            "{prefix}_{group_index}_E{exposure_index}.{}",
            ext.to_string_lossy()
        ),
        None => format!("{prefix}_{group_index}_E{exposure_index}"),
    }
}

/// Rename every file of `brackets` in place.
///
/// Each rename stands alone: a failure is recorded for that file and the
/// remaining files keep the names computed by [`plan_brackets`].
///
/// Renames happen in two phases. Every moving file is first parked under a
/// temporary name next to it, then each parked file takes its final name. A
/// target held by another file of the same plan is therefore never a
/// collision; only files outside the plan block a rename.
pub fn apply_labels(brackets: &[Bracket], prefix: &str, dry_run: bool) -> LabelReport {
    let mut entries: Vec<RenameEntry> = brackets
        .iter()
        .flat_map(|bracket| {
            bracket.files.iter().map(move |file| {
                let from = file.source.path.clone();
                let to = from.with_file_name(label_name(
                    prefix,
                    bracket.group_index,
                    file.exposure_index,
                    &from,
                ));
                let outcome = if to == from {
                    log::debug!("Unchanged: {}", display_name(&from));
                    RenameOutcome::Unchanged
                } else {
                    RenameOutcome::Planned
                };
                RenameEntry {
                    from,
                    to,
                    group_index: bracket.group_index,
                    exposure_index: file.exposure_index,
                    outcome,
                }
            })
        })
        .collect();

    if dry_run {
        for entry in entries.iter().filter(|e| e.outcome == RenameOutcome::Planned) {
            log::info!("Would rename: {} -> {}", display_name(&entry.from), display_name(&entry.to));
        }
    } else {
        relocate(&mut entries);
    }

    LabelReport {
        brackets: brackets.len(),
        entries,
    }
}

/// Move every `Planned` entry to its target, updating its outcome.
fn relocate(entries: &mut [RenameEntry]) {
    let sources: HashSet<PathBuf> = entries.iter().map(|e| e.from.clone()).collect();

    let mut parked = Vec::new();
    for (i, entry) in entries.iter_mut().enumerate() {
        if entry.outcome != RenameOutcome::Planned {
            continue;
        }
        if !sources.contains(&entry.to) && path_exists(&entry.to) {
            let error = anyhow::anyhow!("target {} already exists", entry.to.display());
            fail(entry, error);
            continue;
        }
        let temp = entry
            .from
            .with_file_name(format!(".bracket-hdr-{i}-{}", display_name(&entry.from)));
        match rename_file(&entry.from, &temp) {
            Ok(()) => parked.push((i, temp)),
            Err(e) => fail(entry, e),
        }
    }

    for (i, temp) in parked {
        let entry = &mut entries[i];
        match rename_file(&temp, &entry.to) {
            Ok(()) => {
                log::info!("Renamed: {} -> {}", display_name(&entry.from), display_name(&entry.to));
                entry.outcome = RenameOutcome::Renamed;
            }
            Err(e) => {
                let e = match rename_file(&temp, &entry.from) {
                    Ok(()) => e,
                    Err(restore) => e.context(format!(
                        "left as {} ({restore:#})",
                        temp.display()
                    )),
                };
                fail(entry, e);
            }
        }
    }
}

fn fail(entry: &mut RenameEntry, error: anyhow::Error) {
    log::error!(
        "Failed to rename {} -> {}: {error:#}",
        display_name(&entry.from),
        display_name(&entry.to)
    );
    entry.outcome = RenameOutcome::Failed { error: format!("{error:#}") };
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn path_exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

/// Rename without clobbering: `std::fs::rename` silently replaces on Unix.
fn rename_file(from: &Path, to: &Path) -> Result<()> {
    if path_exists(to) {
        anyhow::bail!("target {} already exists", to.display());
    }
    std::fs::rename(from, to).context("rename failed")
}

/// Scan, plan and rename in one pass.
///
/// An empty folder is not an error: a notice is logged and an empty report
/// is returned without touching the filesystem.
///
/// # Example
///
/// ```rust,no_run
/// use bracket_hdr::config::LabelerConfig;
/// use bracket_hdr::labeler::label_folder;
/// use std::path::Path;
///
/// let report = label_folder(Path::new("./shoot"), &LabelerConfig::default(), false)?;
/// println!("{} brackets, {} files renamed", report.brackets, report.renamed());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn label_folder(folder: &Path, config: &LabelerConfig, dry_run: bool) -> Result<LabelReport> {
    let sources = scan_sources(folder, &config.raw_extensions)?;
    if sources.is_empty() {
        log::warn!("No RAW files found in {}", folder.display());
        return Ok(LabelReport::default());
    }

    log::info!("Found {} RAW file(s) in {}", sources.len(), folder.display());
    let brackets = plan_brackets(sources, config.time_window());
    log::info!("Detected {} bracket(s)", brackets.len());

    Ok(apply_labels(&brackets, &config.prefix, dry_run))
}
