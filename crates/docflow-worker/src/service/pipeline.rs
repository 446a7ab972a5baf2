//! External extraction and rendering tools.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;

use super::PipelineConfig;
use crate::job::{JobId, PipelineStage};
use crate::{PipelineFailure, Result, TRACING_TARGET, WorkerError};

/// Longest stderr excerpt carried in a failure, in bytes.
const STDERR_TAIL_BYTES: usize = 2048;

/// The two external steps of a job.
///
/// Extraction writes images and tables for a document; rendering turns them
/// into a report. Both write into the [`OutputLayout`] directories, which the
/// publisher then reads.
#[async_trait::async_trait]
pub trait Pipeline: Send + Sync {
    /// Extracts images and tables from the staged source file.
    async fn extract(&self, job_id: &JobId, source: &Path) -> Result<()>;

    /// Renders the report for a job whose extraction succeeded.
    async fn render(&self, job_id: &JobId) -> Result<()>;
}

/// Where the tools leave their output for a job.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    images_root: PathBuf,
    tables_root: PathBuf,
    report_root: PathBuf,
    report_name: String,
}

impl OutputLayout {
    /// Resolves the output directories of `config` against its working directory.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            images_root: config.working_dir.join(&config.images_dir),
            tables_root: config.working_dir.join(&config.tables_dir),
            report_root: config.working_dir.join(&config.report_dir),
            report_name: config.report_name.clone(),
        }
    }

    /// `{images_dir}/{job_id}`
    pub fn images_dir(&self, job_id: &JobId) -> PathBuf {
        self.images_root.join(job_id.as_str())
    }

    /// `{tables_dir}/{job_id}`
    pub fn tables_dir(&self, job_id: &JobId) -> PathBuf {
        self.tables_root.join(job_id.as_str())
    }

    /// `{report_dir}/{job_id}/{report_name}`
    pub fn report_path(&self, job_id: &JobId) -> PathBuf {
        self.report_root
            .join(job_id.as_str())
            .join(&self.report_name)
    }

    /// Returns the report file name.
    pub fn report_name(&self) -> &str {
        &self.report_name
    }
}

/// A program plus the arguments placed before the per-job input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    /// Creates a command, dropping empty arguments.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args
                .into_iter()
                .map(Into::into)
                .filter(|arg: &String| !arg.is_empty())
                .collect(),
        }
    }
}

/// [`Pipeline`] that runs the configured tools as child processes.
///
/// Tools run from the working directory with stdin closed. A child whose
/// future is dropped, e.g. on shutdown, is killed.
#[derive(Debug, Clone)]
pub struct CommandPipeline {
    extract: ToolCommand,
    render: ToolCommand,
    working_dir: PathBuf,
}

impl CommandPipeline {
    /// Creates a pipeline from configuration.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            extract: ToolCommand::new(&config.extract_program, &config.extract_args),
            render: ToolCommand::new(&config.render_program, &config.render_args),
            working_dir: config.working_dir.clone(),
        }
    }

    /// Returns the working directory the tools run in.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    async fn run(&self, stage: PipelineStage, tool: &ToolCommand, input: &str) -> Result<()> {
        let started_at = Instant::now();

        tracing::debug!(
            target: TRACING_TARGET,
            stage = %stage,
            program = %tool.program,
            input = %input,
            "Running pipeline tool"
        );

        let output = Command::new(&tool.program)
            .args(&tool.args)
            .arg(input)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| {
                WorkerError::pipeline(
                    stage,
                    PipelineFailure::Launch {
                        program: tool.program.clone(),
                        source,
                    },
                )
            })?;

        if !output.status.success() {
            return Err(WorkerError::pipeline(
                stage,
                PipelineFailure::ExitStatus {
                    program: tool.program.clone(),
                    code: output.status.code(),
                    stderr: stderr_tail(&output.stderr),
                },
            ));
        }

        tracing::debug!(
            target: TRACING_TARGET,
            stage = %stage,
            program = %tool.program,
            elapsed_ms = started_at.elapsed().as_millis(),
            "Pipeline tool finished"
        );

        Ok(())
    }
}

#[async_trait::async_trait]
impl Pipeline for CommandPipeline {
    async fn extract(&self, _job_id: &JobId, source: &Path) -> Result<()> {
        // The tool runs elsewhere, so relative staging paths must be resolved here.
        let source = std::path::absolute(source).map_err(|source| {
            WorkerError::pipeline(
                PipelineStage::Extract,
                PipelineFailure::Launch {
                    program: self.extract.program.clone(),
                    source,
                },
            )
        })?;

        self.run(
            PipelineStage::Extract,
            &self.extract,
            &source.to_string_lossy(),
        )
        .await
    }

    async fn render(&self, job_id: &JobId) -> Result<()> {
        self.run(PipelineStage::Render, &self.render, job_id.as_str())
            .await
    }
}

/// Returns the trimmed end of a tool's stderr.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_owned();
    }

    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> JobId {
        JobId::from_key(id).unwrap()
    }

    #[test]
    fn test_output_layout() {
        let layout = OutputLayout::new(&PipelineConfig::new("/srv/tools"));
        let doc = job("doc1");

        assert_eq!(layout.images_dir(&doc), PathBuf::from("/srv/tools/output_images/doc1"));
        assert_eq!(layout.tables_dir(&doc), PathBuf::from("/srv/tools/output_csv/doc1"));
        assert_eq!(
            layout.report_path(&doc),
            PathBuf::from("/srv/tools/output_images/doc1/report.pdf")
        );
    }

    #[test]
    fn test_tool_command_drops_empty_args() {
        let tool = ToolCommand::new("python", ["", "extract_cli.py"]);
        assert_eq!(tool.args, vec!["extract_cli.py".to_owned()]);
    }

    #[test]
    fn test_stderr_tail() {
        assert_eq!(stderr_tail(b"  boom\n"), "boom");

        let long = "é".repeat(STDERR_TAIL_BYTES);
        let tail = stderr_tail(long.as_bytes());
        assert!(tail.starts_with("..."));
        assert!(tail.len() <= STDERR_TAIL_BYTES + 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tools_run_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::new(dir.path())
            .with_extract_command("sh", ["-c", "cp \"$0\" copied.pdf"])
            .with_render_command("sh", ["-c", "echo \"$0\" > rendered.txt"]);
        let pipeline = CommandPipeline::new(&config);

        let source = dir.path().join("input.pdf");
        std::fs::write(&source, b"%PDF").unwrap();

        pipeline.extract(&job("doc1"), &source).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("copied.pdf")).unwrap(), b"%PDF");

        pipeline.render(&job("doc1")).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("rendered.txt")).unwrap(),
            "doc1\n"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::new(dir.path())
            .with_render_command("sh", ["-c", "echo 'no tables' >&2; exit 3"]);
        let pipeline = CommandPipeline::new(&config);

        let err = pipeline.render(&job("doc1")).await.unwrap_err();
        match err {
            WorkerError::PipelineExecution {
                stage: PipelineStage::Render,
                failure: PipelineFailure::ExitStatus { code, stderr, .. },
            } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "no tables");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_a_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::new(dir.path())
            .with_extract_command("docflow-no-such-tool", Vec::<String>::new());
        let pipeline = CommandPipeline::new(&config);

        let err = pipeline
            .extract(&job("doc1"), &dir.path().join("doc1.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkerError::PipelineExecution {
                stage: PipelineStage::Extract,
                failure: PipelineFailure::Launch { .. },
            }
        ));
    }
}
