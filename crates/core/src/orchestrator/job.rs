use futures::{FutureExt, Stream};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::package::package_outputs;
use super::state::JobState;
use super::types::{content_type_for, Artifact, ConversionResult, DeliveryGuard, InFlight};
use crate::converter::{panic_message, ConversionContext, ConverterError};
use crate::error::ConversionError;
use crate::metrics::{CONVERSIONS_TOTAL, CONVERSION_DURATION};
use crate::registry::{OutputKind, RegisteredConversion};
use crate::retention::{RetentionHandle, RetentionPolicy};
use crate::upload::{ClientFilename, JobPaths, UploadManager, UploadedAsset};

/// Owns a job directory until it is handed to a retention policy.
///
/// Dropped without being released, it schedules immediate removal. This
/// covers failures and requests abandoned mid-flight alike.
struct JobWorkspace {
    job_id: String,
    root: PathBuf,
    retention: RetentionHandle,
    armed: bool,
}

impl JobWorkspace {
    fn new(job_id: &str, root: PathBuf, retention: RetentionHandle) -> Self {
        retention.track(job_id, root.clone());
        Self {
            job_id: job_id.to_string(),
            root,
            retention,
            armed: true,
        }
    }

    /// Keep the directory until delivery or the retention delay, whichever comes first.
    fn release(mut self, delay: Duration) {
        self.armed = false;
        self.retention.schedule(
            &self.job_id,
            self.root.clone(),
            RetentionPolicy::DeliveryOrDeadline(delay),
        );
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if self.armed {
            self.retention
                .schedule(&self.job_id, self.root.clone(), RetentionPolicy::Immediate);
        }
    }
}

/// One conversion request moving through the job state machine.
///
/// Created by [`Orchestrator::begin`](super::Orchestrator::begin). Files are
/// added one at a time as they arrive, then [`run`](Self::run) converts and
/// packages them. Dropping the job before it finishes removes everything it
/// staged.
pub struct ConversionJob {
    id: String,
    conversion: RegisteredConversion,
    uploads: UploadManager,
    retention: RetentionHandle,
    retention_delay: Duration,
    paths: JobPaths,
    state: JobState,
    assets: Vec<UploadedAsset>,
    workspace: Option<JobWorkspace>,
    in_flight: InFlight,
}

impl ConversionJob {
    pub(crate) fn new(
        id: String,
        conversion: RegisteredConversion,
        uploads: UploadManager,
        retention: RetentionHandle,
        retention_delay: Duration,
    ) -> Self {
        let paths = uploads.job_paths(&id);
        debug!(
            job_id = %id,
            conversion = %conversion.spec.identifier,
            state = %JobState::Received,
            "Job received"
        );
        Self {
            id,
            conversion,
            uploads,
            retention,
            retention_delay,
            paths,
            state: JobState::Received,
            assets: Vec::new(),
            workspace: None,
            in_flight: InFlight::start(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn identifier(&self) -> &str {
        &self.conversion.spec.identifier
    }

    pub fn file_count(&self) -> usize {
        self.assets.len()
    }

    /// Validate and stage one uploaded file.
    ///
    /// The filename, extension and file count are checked before anything is
    /// written. Any error moves the job to `Failed`.
    pub async fn add_file<S, B>(&mut self, filename: &str, stream: S) -> Result<(), ConversionError>
    where
        S: Stream<Item = Result<B, ConversionError>>,
        B: AsRef<[u8]>,
    {
        if !matches!(self.state, JobState::Received | JobState::Staged) {
            return Err(ConversionError::internal(format!(
                "job {} cannot accept files in state {}",
                self.id, self.state
            )));
        }

        let result = self.validate_and_stage(filename, stream).await;
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }

    async fn validate_and_stage<S, B>(
        &mut self,
        filename: &str,
        stream: S,
    ) -> Result<(), ConversionError>
    where
        S: Stream<Item = Result<B, ConversionError>>,
        B: AsRef<[u8]>,
    {
        let filename = ClientFilename::parse(filename)?;
        let spec = self.conversion.spec.clone();
        spec.check_extension(&filename)?;
        spec.arity.check_not_exceeded(self.assets.len() + 1)?;
        self.transition(JobState::Validated)?;

        if self.workspace.is_none() {
            self.uploads.prepare(&self.paths).await?;
            self.workspace = Some(JobWorkspace::new(
                &self.id,
                self.paths.root.clone(),
                self.retention.clone(),
            ));
        }

        let asset = self
            .uploads
            .stage(&self.paths, self.assets.len(), &filename, stream)
            .await?;
        self.assets.push(asset);
        self.transition(JobState::Staged)
    }

    /// Convert the staged files and package the result.
    ///
    /// Never panics and never lets a backend error type escape: every failure
    /// is a [`ConversionError`] in the returned result, and the job directory
    /// is scheduled for removal.
    pub async fn run(mut self) -> ConversionResult {
        let started = Instant::now();
        match self.convert_and_package().await {
            Ok((path, download_name, size_bytes)) => {
                let identifier = self.identifier().to_string();
                CONVERSIONS_TOTAL
                    .with_label_values(&[&identifier, "success"])
                    .inc();
                CONVERSION_DURATION
                    .with_label_values(&[&identifier])
                    .observe(started.elapsed().as_secs_f64());
                info!(
                    job_id = %self.id,
                    conversion = %identifier,
                    files = self.assets.len(),
                    size_bytes,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Conversion packaged"
                );

                let ConversionJob {
                    id,
                    retention,
                    retention_delay,
                    workspace,
                    in_flight,
                    ..
                } = self;
                if let Some(workspace) = workspace {
                    workspace.release(retention_delay);
                }
                let delivery = DeliveryGuard::new(id.clone(), identifier, retention, in_flight);
                let artifact = Artifact {
                    content_type: content_type_for(&path),
                    path,
                    download_name,
                    size_bytes,
                    delivery,
                };
                ConversionResult::succeeded(id, artifact)
            }
            Err(e) => {
                self.fail(&e);
                ConversionResult::failed(Some(self.id.clone()), e)
            }
        }
    }

    async fn convert_and_package(&mut self) -> Result<(PathBuf, String, u64), ConversionError> {
        self.conversion.spec.arity.check(self.assets.len())?;
        self.transition(JobState::Converting)?;

        let ctx = ConversionContext {
            job_id: self.id.clone(),
            output_dir: self.paths.output_dir.clone(),
            work_dir: self.paths.work_dir.clone(),
        };
        let converter = self.conversion.converter.clone();
        let outcome = AssertUnwindSafe(converter.convert(&self.assets, &ctx))
            .catch_unwind()
            .await;
        let outputs = match outcome {
            Ok(result) => result?,
            Err(payload) => {
                return Err(ConverterError::Panicked {
                    reason: panic_message(payload),
                }
                .into())
            }
        };

        if outputs.is_empty() {
            return Err(ConverterError::empty_output("converter returned no outputs").into());
        }
        for output in &outputs {
            if !tokio::fs::try_exists(output).await.unwrap_or(false) {
                return Err(ConverterError::empty_output(format!(
                    "converter reported a missing output: {}",
                    output.display()
                ))
                .into());
            }
        }

        let archive = self.conversion.spec.output_kind == OutputKind::ArchiveOfFiles
            || outputs.len() > 1;
        let path = if archive {
            let stem = self.assets.first().map(|a| a.stem.as_str()).unwrap_or("file");
            package_outputs(outputs, &self.paths.output_dir, stem).await?
        } else {
            outputs.into_iter().next().ok_or_else(|| {
                ConversionError::internal("single output disappeared during packaging")
            })?
        };

        let size_bytes = tokio::fs::metadata(&path)
            .await
            .map_err(|e| ConversionError::internal(format!("failed to stat artifact: {e}")))?
            .len();
        let download_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "download".to_string());

        self.transition(JobState::Packaged)?;
        Ok((path, download_name, size_bytes))
    }

    fn transition(&mut self, next: JobState) -> Result<(), ConversionError> {
        if self.state == next {
            return Ok(());
        }
        if !self.state.can_transition_to(next) {
            return Err(ConversionError::internal(format!(
                "invalid job transition {} -> {}",
                self.state, next
            )));
        }
        debug!(
            job_id = %self.id,
            conversion = %self.identifier(),
            from = %self.state,
            to = %next,
            "Job state transition"
        );
        self.state = next;
        Ok(())
    }

    /// Move to `Failed` and schedule immediate cleanup. Only the first call counts.
    fn fail(&mut self, error: &ConversionError) {
        if self.state.is_terminal() {
            return;
        }
        let from = self.state;
        self.state = JobState::Failed;
        CONVERSIONS_TOTAL
            .with_label_values(&[self.identifier(), error.kind().as_str()])
            .inc();
        warn!(
            job_id = %self.id,
            conversion = %self.identifier(),
            from = %from,
            kind = %error.kind(),
            reason = ?error.failure_reason(),
            diagnostic = ?error.diagnostic(),
            "Job failed: {}",
            error
        );
        // Dropping the workspace schedules immediate removal.
        self.workspace = None;
    }
}

impl std::fmt::Debug for ConversionJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionJob")
            .field("id", &self.id)
            .field("conversion", &self.conversion.spec.identifier)
            .field("state", &self.state)
            .field("files", &self.assets.len())
            .finish()
    }
}
