//! # bracket-hdr
//!
//! Organize a folder of bracketed exposures into groups and merge each group into
//! HDR-style images with Hugin's `align_image_stack` and `enfuse`.
//!
//! The work happens in two independent passes, linked only by filenames:
//!
//! 1. **Label** — RAW files are sorted by modification time and split into
//!    brackets wherever the gap between two captures exceeds a time window.
//!    Each file is renamed to `Group_<bracket>_E<exposure>.<ext>`.
//! 2. **Fuse** — images whose names start with a `Group_<N>` label are grouped,
//!    aligned into a per-group scratch folder and fused in fixed-size batches
//!    into `HDR_Group_<N>_batch_<i>.<ext>`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bracket_hdr::config::Config;
//! use bracket_hdr::discovery::discover_groups;
//! use bracket_hdr::labeler::label_folder;
//! use bracket_hdr::pipeline::run_pipeline;
//! use bracket_hdr::tools::build_toolchain;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!     config.validate()?;
//!
//!     // 1. Rename RAW captures into brackets
//!     let labels = label_folder(Path::new("./raw"), &config.labeler, false)?;
//!     println!("{} bracket(s), {} file(s) renamed", labels.brackets, labels.renamed());
//!
//!     // ... export the RAWs to JPEG, keeping their names ...
//!
//!     // 2. Align and fuse each group
//!     let groups = discover_groups(
//!         Path::new("./export"),
//!         &config.discovery.prefix,
//!         &config.discovery.image_extensions,
//!     )?;
//!     let (aligner, fuser) = build_toolchain(&config.tools);
//!     let report = run_pipeline(&groups, &aligner, &fuser, &config.pipeline).await?;
//!     println!("{} HDR image(s), {} group(s) skipped", report.succeeded_batches(), report.skipped_groups());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`] — Configuration types and loading/saving
//! - [`scan`] — Folder listing filtered by extension
//! - [`labeler`] — Bracket detection and renaming
//! - [`discovery`] — Group labels and grouping of labeled images
//! - [`tools`] — Aligner/fuser traits and the `align_image_stack`/`enfuse` wrappers
//! - [`pipeline`] — Batching and the align → fuse orchestrator

pub mod config;
pub mod discovery;
pub mod labeler;
pub mod pipeline;
pub mod scan;
pub mod tools;
