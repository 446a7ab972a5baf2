//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{Result, WorkerError};

/// Default seconds to sleep between poll cycles.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Default minimum upload size; smaller objects are treated as truncated.
pub const DEFAULT_MIN_UPLOAD_SIZE: u64 = 1024;

/// Default prefix scanned for new uploads.
pub const DEFAULT_UPLOADS_PREFIX: &str = "uploads/";

/// Default prefix results are published under.
pub const DEFAULT_RESULTS_PREFIX: &str = "results/";

/// Default prefix for completion markers kept in the object store.
pub const DEFAULT_MARKERS_PREFIX: &str = "markers/";

/// Default extension of documents to process.
pub const DEFAULT_DOCUMENT_EXTENSION: &str = "pdf";

/// Where completion markers are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(Serialize, Deserialize, Display, EnumString, IntoStaticStr)]
#[cfg_attr(feature = "config", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MarkerStoreKind {
    /// One `.done_{doc_id}` file per job in a local directory.
    #[default]
    Fs,
    /// One object per job under the markers prefix of the bucket.
    Object,
}

/// Complete worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct WorkerConfig {
    /// Seconds to sleep between poll cycles.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "poll-interval",
            env = "POLL_INTERVAL",
            default_value_t = DEFAULT_POLL_INTERVAL_SECS
        )
    )]
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Uploads smaller than this many bytes are skipped.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "min-upload-size",
            env = "MIN_UPLOAD_SIZE",
            default_value_t = DEFAULT_MIN_UPLOAD_SIZE
        )
    )]
    #[serde(default = "default_min_upload_size")]
    pub min_upload_size: u64,

    /// Object store prefix scanned for uploads.
    #[cfg_attr(
        feature = "config",
        arg(long = "uploads-prefix", env = "UPLOADS_PREFIX", default_value = DEFAULT_UPLOADS_PREFIX)
    )]
    #[serde(default = "default_uploads_prefix")]
    pub uploads_prefix: String,

    /// Object store prefix results are published under.
    #[cfg_attr(
        feature = "config",
        arg(long = "results-prefix", env = "RESULTS_PREFIX", default_value = DEFAULT_RESULTS_PREFIX)
    )]
    #[serde(default = "default_results_prefix")]
    pub results_prefix: String,

    /// Extension of documents to process, matched case-insensitively.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "document-extension",
            env = "DOCUMENT_EXTENSION",
            default_value = DEFAULT_DOCUMENT_EXTENSION
        )
    )]
    #[serde(default = "default_document_extension")]
    pub document_extension: String,

    /// Local directory downloads are staged in.
    #[cfg_attr(
        feature = "config",
        arg(long = "staging-dir", env = "STAGING_DIR", default_value = "input_pdfs")
    )]
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Where completion markers are kept.
    #[cfg_attr(
        feature = "config",
        arg(long = "marker-store", env = "MARKER_STORE", value_enum, default_value_t = MarkerStoreKind::Fs)
    )]
    #[serde(default)]
    pub marker_store: MarkerStoreKind,

    /// Directory for fs completion markers; defaults to the staging directory.
    #[cfg_attr(feature = "config", arg(long = "marker-dir", env = "MARKER_DIR"))]
    #[serde(default)]
    pub marker_dir: Option<PathBuf>,

    /// Object store prefix for object completion markers.
    #[cfg_attr(
        feature = "config",
        arg(long = "markers-prefix", env = "MARKERS_PREFIX", default_value = DEFAULT_MARKERS_PREFIX)
    )]
    #[serde(default = "default_markers_prefix")]
    pub markers_prefix: String,

    /// Remove the staged download once a job is committed.
    #[cfg_attr(feature = "config", arg(long = "clean-staging", env = "CLEAN_STAGING"))]
    #[serde(default)]
    pub clean_staging: bool,

    /// External tool configuration.
    #[cfg_attr(feature = "config", command(flatten))]
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_min_upload_size() -> u64 {
    DEFAULT_MIN_UPLOAD_SIZE
}

fn default_uploads_prefix() -> String {
    DEFAULT_UPLOADS_PREFIX.to_owned()
}

fn default_results_prefix() -> String {
    DEFAULT_RESULTS_PREFIX.to_owned()
}

fn default_document_extension() -> String {
    DEFAULT_DOCUMENT_EXTENSION.to_owned()
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("input_pdfs")
}

fn default_markers_prefix() -> String {
    DEFAULT_MARKERS_PREFIX.to_owned()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL_SECS,
            min_upload_size: DEFAULT_MIN_UPLOAD_SIZE,
            uploads_prefix: default_uploads_prefix(),
            results_prefix: default_results_prefix(),
            document_extension: default_document_extension(),
            staging_dir: default_staging_dir(),
            marker_store: MarkerStoreKind::default(),
            marker_dir: None,
            markers_prefix: default_markers_prefix(),
            clean_staging: false,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Returns the poll interval as a Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    /// Returns the directory fs completion markers are written to.
    pub fn marker_dir(&self) -> PathBuf {
        self.marker_dir
            .clone()
            .unwrap_or_else(|| self.staging_dir.clone())
    }

    /// Returns the document extension without a leading dot.
    pub fn document_extension(&self) -> &str {
        self.document_extension.trim_start_matches('.')
    }

    /// Sets the staging directory.
    pub fn with_staging_dir(mut self, staging_dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = staging_dir.into();
        self
    }

    /// Sets the pipeline configuration.
    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Checks the configuration for values the worker cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval == 0 {
            return Err(WorkerError::configuration(
                "poll interval must be at least one second",
            ));
        }

        for (name, prefix) in [
            ("uploads prefix", &self.uploads_prefix),
            ("results prefix", &self.results_prefix),
            ("markers prefix", &self.markers_prefix),
        ] {
            if prefix.is_empty() || !prefix.ends_with('/') || prefix.starts_with('/') {
                return Err(WorkerError::configuration(format!(
                    "{name} '{prefix}' must be relative and end with '/'"
                )));
            }
        }

        if self.results_prefix.starts_with(&self.uploads_prefix)
            || self.uploads_prefix.starts_with(&self.results_prefix)
        {
            return Err(WorkerError::configuration(
                "uploads and results prefixes must not overlap",
            ));
        }

        if self.marker_store == MarkerStoreKind::Object {
            for (name, prefix) in [
                ("uploads", &self.uploads_prefix),
                ("results", &self.results_prefix),
            ] {
                if self.markers_prefix.starts_with(prefix.as_str())
                    || prefix.starts_with(&self.markers_prefix)
                {
                    return Err(WorkerError::configuration(format!(
                        "{name} and markers prefixes must not overlap"
                    )));
                }
            }
        }

        if self.document_extension().is_empty() {
            return Err(WorkerError::configuration(
                "document extension must not be empty",
            ));
        }

        self.pipeline.validate()
    }
}

/// Configuration of the external extraction and rendering tools.
///
/// Each tool is launched as `program args... <input>` from `working_dir`,
/// where the input is the staged file for extraction and the document
/// identifier for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct PipelineConfig {
    /// Directory the tools run in; their output directories live here.
    #[cfg_attr(
        feature = "config",
        arg(long = "working-dir", env = "WORKING_DIR", default_value = ".")
    )]
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Program that extracts images and tables from a document.
    #[cfg_attr(
        feature = "config",
        arg(long = "extract-program", env = "EXTRACT_PROGRAM", default_value = "python")
    )]
    #[serde(default = "default_program")]
    pub extract_program: String,

    /// Leading arguments for the extraction program (space separated).
    #[cfg_attr(
        feature = "config",
        arg(
            long = "extract-args",
            env = "EXTRACT_ARGS",
            value_delimiter = ' ',
            allow_hyphen_values = true,
            default_value = "extract_cli.py"
        )
    )]
    #[serde(default = "default_extract_args")]
    pub extract_args: Vec<String>,

    /// Program that renders the report for a document identifier.
    #[cfg_attr(
        feature = "config",
        arg(long = "render-program", env = "RENDER_PROGRAM", default_value = "python")
    )]
    #[serde(default = "default_program")]
    pub render_program: String,

    /// Leading arguments for the rendering program (space separated).
    #[cfg_attr(
        feature = "config",
        arg(
            long = "render-args",
            env = "RENDER_ARGS",
            value_delimiter = ' ',
            allow_hyphen_values = true,
            default_value = "make_pdf.py"
        )
    )]
    #[serde(default = "default_render_args")]
    pub render_args: Vec<String>,

    /// Images output directory, relative to the working directory.
    #[cfg_attr(
        feature = "config",
        arg(long = "images-dir", env = "IMAGES_DIR", default_value = "output_images")
    )]
    #[serde(default = "default_images_dir")]
    pub images_dir: PathBuf,

    /// Tables output directory, relative to the working directory.
    #[cfg_attr(
        feature = "config",
        arg(long = "tables-dir", env = "TABLES_DIR", default_value = "output_csv")
    )]
    #[serde(default = "default_tables_dir")]
    pub tables_dir: PathBuf,

    /// Directory holding the per-document report folder.
    #[cfg_attr(
        feature = "config",
        arg(long = "report-dir", env = "REPORT_DIR", default_value = "output_images")
    )]
    #[serde(default = "default_images_dir")]
    pub report_dir: PathBuf,

    /// File name of the rendered report.
    #[cfg_attr(
        feature = "config",
        arg(long = "report-name", env = "REPORT_NAME", default_value = "report.pdf")
    )]
    #[serde(default = "default_report_name")]
    pub report_name: String,
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_program() -> String {
    "python".to_owned()
}

fn default_extract_args() -> Vec<String> {
    vec!["extract_cli.py".to_owned()]
}

fn default_render_args() -> Vec<String> {
    vec!["make_pdf.py".to_owned()]
}

fn default_images_dir() -> PathBuf {
    PathBuf::from("output_images")
}

fn default_tables_dir() -> PathBuf {
    PathBuf::from("output_csv")
}

fn default_report_name() -> String {
    "report.pdf".to_owned()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            extract_program: default_program(),
            extract_args: default_extract_args(),
            render_program: default_program(),
            render_args: default_render_args(),
            images_dir: default_images_dir(),
            tables_dir: default_tables_dir(),
            report_dir: default_images_dir(),
            report_name: default_report_name(),
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with the given tool root and default layout.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the extraction command.
    pub fn with_extract_command<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extract_program = program.into();
        self.extract_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the rendering command.
    pub fn with_render_command<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.render_program = program.into();
        self.render_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Checks that both tools are named and the report has a file name.
    pub fn validate(&self) -> Result<()> {
        if self.extract_program.trim().is_empty() {
            return Err(WorkerError::configuration(
                "extraction program must not be empty",
            ));
        }

        if self.render_program.trim().is_empty() {
            return Err(WorkerError::configuration(
                "rendering program must not be empty",
            ));
        }

        if self.report_name.is_empty() || self.report_name.contains('/') {
            return Err(WorkerError::configuration(
                "report name must be a plain file name",
            ));
        }

        Ok(())
    }
}
