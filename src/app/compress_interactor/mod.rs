// Compress interactor - Orchestrates one batch of video compressions

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn, Instrument};

use crate::domain::errors::DomainError;
use crate::domain::model::*;
use crate::domain::rules::{BitratePlanner, PlanBuilder, MIN_SOURCE_BITRATE};
use crate::engine::progress::ProgressReporter;
use crate::engine::{PumpConfig, PumpOutcome, TranscodeJob, Transcoder};
use crate::output::{finalize_streamable, remove_quietly, validated_file_name};
use crate::ports::*;
use crate::probe::{MetadataProber, FALLBACK_HEIGHT, FALLBACK_WIDTH};

/// Tunables shared by every batch a compressor runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressorOptions {
    /// Items of one batch allowed to transcode at the same time
    pub max_concurrent_jobs: usize,
    pub min_source_bitrate: u64,
    pub fallback_width: f64,
    pub fallback_height: f64,
    pub pump: PumpConfig,
}

impl Default for CompressorOptions {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: num_cpus::get().max(1),
            min_source_bitrate: MIN_SOURCE_BITRATE,
            fallback_width: FALLBACK_WIDTH,
            fallback_height: FALLBACK_HEIGHT,
            pump: PumpConfig::default(),
        }
    }
}

/// One batch: sources paired 1:1 with `config.video_names`
#[derive(Clone)]
pub struct CompressionRequest {
    pub sources: Vec<SourceHandle>,
    pub config: Configuration,
    /// Rewrite outputs so the index precedes the media data
    pub streamable: bool,
    pub storage: Arc<dyn StorageDestination>,
}

/// Running batch returned by [`VideoCompressor::start`]
pub struct BatchHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<JobResult>>,
}

impl BatchHandle {
    /// Cancel every item of this batch
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every item; results are in source order
    pub async fn wait(self) -> Vec<JobResult> {
        let mut results = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            let result = match task.await {
                Ok(result) => result,
                Err(err) => JobResult::failure(join_error_message(err)),
            };
            results.push(result);
        }
        results
    }
}

/// Everything one item needs, cheap to clone into its task
#[derive(Clone)]
struct ItemContext {
    resolver: Arc<dyn SourceResolver>,
    prober: Arc<MetadataProber>,
    planner: PlanBuilder,
    transcoder: Arc<Transcoder>,
    finalizer: Arc<dyn StreamFinalizer>,
    storage: Arc<dyn StorageDestination>,
    listener: Arc<dyn CompressionListener>,
    config: Arc<Configuration>,
    streamable: bool,
    cancel: CancellationToken,
}

/// Interactor for the video compression use case
pub struct VideoCompressor {
    resolver: Arc<dyn SourceResolver>,
    prober: Arc<MetadataProber>,
    planner: PlanBuilder,
    transcoder: Arc<Transcoder>,
    finalizer: Arc<dyn StreamFinalizer>,
    max_concurrent_jobs: usize,
    current: Mutex<CancellationToken>,
}

impl VideoCompressor {
    /// Create new compressor with injected ports
    pub fn new(
        resolver: Arc<dyn SourceResolver>,
        media_info: Arc<dyn MediaInfoPort>,
        backend: Arc<dyn CodecBackend>,
        finalizer: Arc<dyn StreamFinalizer>,
        options: CompressorOptions,
    ) -> Self {
        let prober = MetadataProber::new(media_info)
            .with_fallback_dimensions(options.fallback_width, options.fallback_height);
        Self {
            resolver,
            prober: Arc::new(prober),
            planner: PlanBuilder::new(BitratePlanner::new(options.min_source_bitrate)),
            transcoder: Arc::new(Transcoder::new(backend, options.pump)),
            finalizer,
            max_concurrent_jobs: options.max_concurrent_jobs.max(1),
            current: Mutex::new(CancellationToken::new()),
        }
    }

    /// Start compressing every source of `request`.
    ///
    /// The request is validated before any task starts, so a rejected request
    /// produces no events at all. Must be called from within a tokio runtime.
    pub fn start(
        &self,
        request: CompressionRequest,
        listener: Arc<dyn CompressionListener>,
    ) -> Result<BatchHandle, DomainError> {
        request.config.validate(request.sources.len())?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DomainError::Internal(format!("no async runtime to run compressions on: {}", e)))?;

        let cancel = CancellationToken::new();
        *self.current_token() = cancel.clone();

        info!(
            items = request.sources.len(),
            streamable = request.streamable,
            quality = %request.config.quality,
            "Starting compression batch"
        );

        let limit = Arc::new(Semaphore::new(self.max_concurrent_jobs));
        let context = ItemContext {
            resolver: Arc::clone(&self.resolver),
            prober: Arc::clone(&self.prober),
            planner: self.planner,
            transcoder: Arc::clone(&self.transcoder),
            finalizer: Arc::clone(&self.finalizer),
            storage: request.storage,
            listener,
            config: Arc::new(request.config),
            streamable: request.streamable,
            cancel: cancel.clone(),
        };

        let tasks = request
            .sources
            .into_iter()
            .enumerate()
            .map(|(index, source)| {
                let context = context.clone();
                let limit = Arc::clone(&limit);
                let span = tracing::info_span!("item", index, source = %source);
                runtime.spawn(supervise(index, source, context, limit).instrument(span))
            })
            .collect();

        Ok(BatchHandle { cancel, tasks })
    }

    /// Cancel the batch most recently started
    pub fn cancel(&self) {
        debug!("Cancelling current batch");
        self.current_token().cancel();
    }

    fn current_token(&self) -> MutexGuard<'_, CancellationToken> {
        match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Run one item in its own task and turn a crash of that task into a failure
async fn supervise(index: usize, source: SourceHandle, context: ItemContext, limit: Arc<Semaphore>) -> JobResult {
    let listener = Arc::clone(&context.listener);
    let item = tokio::spawn(run_item(index, source, context, limit).in_current_span());
    match item.await {
        Ok(result) => result,
        Err(err) => {
            let message = join_error_message(err);
            warn!(index, message = %message, "Compression task crashed");
            listener.on_failure(index, &message);
            JobResult::failure(message)
        }
    }
}

async fn run_item(index: usize, source: SourceHandle, context: ItemContext, limit: Arc<Semaphore>) -> JobResult {
    context.listener.on_start(index);

    let _permit = tokio::select! {
        permit = limit.acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(err) => return report(index, &context, Err(DomainError::Internal(err.to_string()))),
        },
        _ = context.cancel.cancelled() => return report(index, &context, Ok(None)),
    };

    let outcome = compress(index, &source, &context).await;
    report(index, &context, outcome)
}

/// Emit the terminal event for `index` and build its result
fn report(index: usize, context: &ItemContext, outcome: Result<Option<(PathBuf, u64)>, DomainError>) -> JobResult {
    match outcome {
        Ok(Some((path, size))) => {
            info!(index, size, path = %path.display(), "Compression succeeded");
            context.listener.on_success(index, size, &path);
            JobResult::Success { path, size }
        }
        Ok(None) => {
            info!(index, "Compression cancelled");
            context.listener.on_cancelled(index);
            JobResult::Cancelled
        }
        Err(err) => {
            let message = err.to_string();
            warn!(index, error = %message, "Compression failed");
            context.listener.on_failure(index, &message);
            JobResult::Failure { message }
        }
    }
}

/// Resolve, probe, plan, transcode and store one item; `None` means cancelled
#[instrument(skip(source, context))]
async fn compress(
    index: usize,
    source: &SourceHandle,
    context: &ItemContext,
) -> Result<Option<(PathBuf, u64)>, DomainError> {
    if context.cancel.is_cancelled() {
        return Ok(None);
    }

    let name = context
        .config
        .video_names
        .get(index)
        .cloned()
        .ok_or_else(|| DomainError::BadArgs(format!("no video name for item {}", index)))?;

    let source_path = context.resolver.resolve(source).await?;
    let report = context.prober.probe(&source_path, &context.config).await?;
    let plan = context.planner.build(&report.metadata, report.window, &context.config)?;
    info!(
        width = plan.width,
        height = plan.height,
        bitrate = plan.bitrate,
        quality = %plan.quality,
        estimated_mb = plan.estimated_size_mb(),
        "Planned encoding"
    );

    let storage = &context.storage;
    let working = storage
        .create_output(&source_path, &validated_file_name(&name, context.streamable), false)
        .await?;
    let streaming_target = if context.streamable {
        Some(
            storage
                .create_output(&source_path, &validated_file_name(&name, false), false)
                .await?,
        )
    } else {
        None
    };

    let produced = match transcode(index, source_path, working.clone(), streaming_target.clone(), plan, context).await {
        Ok(Some(path)) => path,
        Ok(None) => {
            discard(&working, streaming_target.as_deref()).await;
            return Ok(None);
        }
        Err(err) => {
            discard(&working, streaming_target.as_deref()).await;
            return Err(err);
        }
    };

    let saved = storage
        .create_output(&produced, &validated_file_name(&name, false), true)
        .await?;
    let size = tokio::fs::metadata(&saved)
        .await
        .map_err(|e| DomainError::Storage(format!("Failed to stat {}: {}", saved.display(), e)))?
        .len();

    Ok(Some((saved, size)))
}

/// Run the blocking pump and, when requested, the streaming rewrite
async fn transcode(
    index: usize,
    source: PathBuf,
    working: PathBuf,
    streaming_target: Option<PathBuf>,
    plan: EncodingPlan,
    context: &ItemContext,
) -> Result<Option<PathBuf>, DomainError> {
    let transcoder = Arc::clone(&context.transcoder);
    let finalizer = Arc::clone(&context.finalizer);
    let listener = Arc::clone(&context.listener);
    let cancel = context.cancel.clone();
    let disable_audio = context.config.disable_audio;
    let span = tracing::Span::current();

    let task = tokio::task::spawn_blocking(move || -> Result<Option<PathBuf>, DomainError> {
        let _entered = span.enter();
        let job = TranscodeJob {
            index,
            source: &source,
            output: &working,
            plan: &plan,
            disable_audio,
        };
        let mut progress = ProgressReporter::new(index, listener);

        match transcoder.run(&job, &cancel, &mut progress)? {
            PumpOutcome::Cancelled => Ok(None),
            PumpOutcome::Completed => Ok(Some(match &streaming_target {
                Some(target) => finalize_streamable(finalizer.as_ref(), &working, target),
                None => working.clone(),
            })),
        }
    });

    match task.await {
        Ok(result) => result,
        Err(err) => Err(DomainError::Internal(join_error_message(err))),
    }
}

async fn discard(working: &Path, streaming_target: Option<&Path>) {
    let working = working.to_path_buf();
    let target = streaming_target.map(Path::to_path_buf);
    let removal = tokio::task::spawn_blocking(move || {
        remove_quietly(&working);
        if let Some(target) = target {
            remove_quietly(&target);
        }
    });
    if let Err(err) = removal.await {
        warn!(error = %err, "Removing partial output failed");
    }
}

fn join_error_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "compression task was aborted".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => format!("compression task panicked: {}", panic_message(payload.as_ref())),
        Err(err) => err.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
