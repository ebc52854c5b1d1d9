// src/lib.rs

//! Archivist: incremental preservation pipeline
//!
//! Turns a source folder of photos, recordings, documents and DVD images
//! into a normalized, converted and fixity-checked preservation copy.
//!
//! # Architecture
//!
//! - Identity by path: a file is known by its normalized relative path,
//!   never by content
//! - Names as state: a converted file carries a profile suffix
//!   (`_tiff`, `_ffv1`, ...) and there is no other record of progress, so
//!   every phase can be re-run against a partially processed tree
//! - External encoders: conversion is delegated to command-line tools
//!   behind the [`Encoder`] trait
//! - Packages: the result is wrapped into directories carrying a checksum
//!   manifest that can be validated and incrementally updated

pub mod config;
pub mod convert;
mod error;
pub mod hash;
pub mod media;
pub mod mirror;
pub mod naming;
pub mod package;
pub mod pipeline;
pub mod progress;
pub mod reaper;

pub use config::{EncoderPrograms, PipelineConfig, Timeouts};
pub use convert::{
    convert_all, output_conflicts, CommandEncoder, ConversionReport, ConvertOptions, EncodeJob,
    Encoder, EncoderError, SkipReason, UnitError, UnitReport, UnitState, UnitStatus,
};
pub use error::{Error, Result};
pub use hash::{HashAlgorithm, Hasher};
pub use media::{
    classify, predict, predict_dvd, ClassFilter, ConversionSuffix, MediaClass,
    PreservationProfile,
};
pub use mirror::{count_items, mirror, MirrorAction, MirrorEntry, MirrorMode, MirrorReport};
pub use naming::{normalize, normalize_tree, RenameReport};
pub use package::{
    is_package, merge_metadata, package_tree, validate, validate_tree, FileListing, Package,
    PackageManifest, PackageScope, PayloadListing, Problem, ValidationReport,
};
pub use pipeline::{destination_for, Phase, Pipeline, ProgressSink, RunRequest, RunSummary};
pub use progress::{CallbackProgress, LogProgress, ProgressEvent, ProgressTracker, SilentProgress};
pub use reaper::{reap_empty_dirs, ReapReport};
