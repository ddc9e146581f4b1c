//! Job lifecycle: build the graph, run it to a terminal state, finalize the
//! outputs.

use std::sync::Arc;

use gst::prelude::*;
use gstjob_common::config::RunnerConfig;
use gstjob_common::error::{JobError, JobResult};
use gstjob_graph::{init_gstreamer, watch_deferred_outputs, GstGraph, Topology};
use gstjob_model::JobSpec;
use gstreamer as gst;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::endpoints::{BoundWriter, ObjectEndpoints, ObjectRole, StoreProvider};
use crate::monitor::{Monitor, SnapshotTarget};

/// How long to wait for the pipeline to settle in NULL before giving up.
const STOP_TIMEOUT_SECS: u64 = 30;

/// State of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Graph built, not started.
    Idle,
    Running,
    /// End of stream reached and every output finalized.
    Completed,
    Failed,
}

/// Process exit status reported to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// The job inputs could not be read.
    SpecUnreadable,
    /// The graph could not be built.
    BuildFailed,
    /// Processing failed after the graph started.
    RuntimeFailed,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::SpecUnreadable => 1,
            Self::BuildFailed => 2,
            Self::RuntimeFailed => 3,
        }
    }
}

/// Terminal result of [`JobRunner::run`].
#[derive(Debug)]
pub struct JobOutcome {
    pub state: JobState,
    pub error: Option<JobError>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.state == JobState::Completed
    }

    pub fn exit_status(&self) -> ExitStatus {
        if self.is_success() {
            ExitStatus::Success
        } else {
            ExitStatus::RuntimeFailed
        }
    }
}

/// Owns one job's pipeline from construction to finalization.
pub struct JobRunner {
    job: JobSpec,
    state: JobState,
    graph: Arc<GstGraph>,
    // Deferred-link handlers only hold weak references to these two.
    topology: Arc<Topology<gst::Element>>,
    writers: Vec<BoundWriter>,
    snapshots: Option<SnapshotTarget>,
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("source", &self.job.source.key)
            .field("state", &self.state)
            .field("nodes", &self.topology.nodes().len())
            .field("writers", &self.writers.len())
            .finish()
    }
}

impl JobRunner {
    /// Build the job's graph with every element created, configured and
    /// linked, and every sink bound to its output writer.
    ///
    /// Must be called from within a multi-threaded tokio runtime; sink
    /// elements drive their writers through it from streaming threads.
    pub async fn build(
        job: JobSpec,
        config: &RunnerConfig,
        provider: &dyn StoreProvider,
    ) -> JobResult<Self> {
        job.validate()?;
        init_gstreamer()?;
        if let Some(level) = job.pipeline.gst_debug_level() {
            gst::log::set_default_threshold(debug_level(level));
            debug!(level, "Applied GStreamer debug threshold");
        }

        info!(
            source = %job.source.key,
            sinks = job.sinks.len(),
            elements = job.pipeline.elements.len(),
            "Building pipeline"
        );

        let source = provider.source_element(&job.source).await?;
        let sink_stores = job
            .sinks
            .iter()
            .map(|sink| provider.store(sink, ObjectRole::Sink))
            .collect::<JobResult<Vec<_>>>()?;

        let endpoints = Arc::new(ObjectEndpoints::new(
            source,
            sink_stores,
            config.part_size,
            Handle::current(),
        ));
        let graph = Arc::new(GstGraph::new("gstjob", endpoints.clone())?);
        let topology = Arc::new(Topology::build(
            graph.as_ref(),
            &job.pipeline,
            &job.source,
            &job.sinks,
        )?);
        watch_deferred_outputs(&topology, &graph);

        let snapshots = match job.pipeline.dot() {
            Some(dot) => match provider.store(&job.source, ObjectRole::Source) {
                Ok(store) => Some(SnapshotTarget::new(store, dot, &job.source.key)),
                Err(e) => {
                    warn!(error = %e, "Cannot reach the source bucket, pipeline snapshots disabled");
                    None
                }
            },
            None => None,
        };

        let writers = endpoints.bound_writers();
        info!(
            nodes = topology.nodes().len(),
            outputs = writers.len(),
            implicit_sink = topology.implicit_sink().is_some(),
            "Pipeline built"
        );

        Ok(Self {
            job,
            state: JobState::Idle,
            graph,
            topology,
            writers,
            snapshots,
        })
    }

    /// Build and run `job`, mapping the stage a failure happens in to the
    /// exit status reported to the scheduler.
    pub async fn execute(
        job: JobSpec,
        config: &RunnerConfig,
        provider: &dyn StoreProvider,
    ) -> ExitStatus {
        let runner = match Self::build(job, config, provider).await {
            Ok(runner) => runner,
            Err(e) => {
                error!(error = %e, category = ?e.category(), "Failed to build pipeline from job spec");
                return ExitStatus::BuildFailed;
            }
        };
        let outcome = runner.run().await;
        match &outcome.error {
            Some(e) => error!(error = %e, "Pipeline failed"),
            None => info!("Pipeline finished"),
        }
        outcome.exit_status()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn pipeline(&self) -> &gst::Pipeline {
        self.graph.pipeline()
    }

    pub fn topology(&self) -> &Topology<gst::Element> {
        &self.topology
    }

    pub fn writers(&self) -> &[BoundWriter] {
        &self.writers
    }

    /// Run until end of stream or the first error, then stop the pipeline
    /// and finalize (or abort) every output.
    pub async fn run(mut self) -> JobOutcome {
        self.state = JobState::Running;
        let pipeline = self.graph.pipeline().clone();
        info!(source = %self.job.source.key, "Starting pipeline");

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            return self
                .fail(JobError::runtime(format!("Failed to start pipeline: {e}")))
                .await;
        }

        let monitor = Monitor::spawn(
            &pipeline,
            self.job.pipeline.dot_interval(),
            self.snapshots.take(),
        );

        let result = match pipeline.bus() {
            Some(bus) => tokio::task::spawn_blocking(move || watch_bus(&bus))
                .await
                .unwrap_or_else(|e| Err(JobError::runtime(format!("Bus watcher failed: {e}")))),
            None => Err(JobError::runtime("Pipeline has no bus")),
        };
        monitor.stop().await;

        match result {
            Ok(()) => self.complete().await,
            Err(e) => self.fail(e).await,
        }
    }

    async fn complete(mut self) -> JobOutcome {
        info!("Received end of stream, stopping pipeline");
        if let Err(e) = self.stop_pipeline().await {
            return self.fail(e).await;
        }

        let mut failure = None;
        for bound in &self.writers {
            let mut writer = bound.writer.lock().await;
            match writer.close().await {
                Ok(()) => info!(key = %bound.key, position = writer.position(), "Output finalized"),
                Err(e) => {
                    failure = Some(JobError::runtime(format!(
                        "Failed to finalize output {}: {e}",
                        bound.key
                    )));
                    break;
                }
            }
        }
        if let Some(error) = failure {
            return self.fail(error).await;
        }

        self.state = JobState::Completed;
        info!(source = %self.job.source.key, "Job completed");
        JobOutcome {
            state: JobState::Completed,
            error: None,
        }
    }

    async fn fail(mut self, error: JobError) -> JobOutcome {
        error!(error = %error, "Job failed");
        if let Err(e) = self.stop_pipeline().await {
            warn!(error = %e, "Pipeline did not stop cleanly");
        }
        for bound in &self.writers {
            bound.writer.lock().await.abort().await;
        }
        self.state = JobState::Failed;
        JobOutcome {
            state: JobState::Failed,
            error: Some(error),
        }
    }

    /// Set the pipeline to NULL and wait for the change to settle, so no
    /// buffer reaches a writer after this returns.
    async fn stop_pipeline(&self) -> JobResult<()> {
        let pipeline = self.graph.pipeline().clone();
        tokio::task::spawn_blocking(move || {
            pipeline
                .set_state(gst::State::Null)
                .map_err(|e| JobError::runtime(format!("Failed to stop pipeline: {e}")))?;
            match pipeline.state(gst::ClockTime::from_seconds(STOP_TIMEOUT_SECS)) {
                (Ok(_), gst::State::Null, _) => Ok(()),
                (Ok(_), state, _) => Err(JobError::runtime(format!(
                    "Pipeline stuck in {state:?} while stopping"
                ))),
                (Err(e), _, _) => Err(JobError::runtime(format!(
                    "Pipeline failed to reach NULL: {e}"
                ))),
            }
        })
        .await
        .unwrap_or_else(|e| Err(JobError::runtime(format!("Stop task failed: {e}"))))
    }
}

/// Block on the bus until end of stream or an error.
fn watch_bus(bus: &gst::Bus) -> JobResult<()> {
    for msg in bus.iter_timed(gst::ClockTime::NONE) {
        let source = msg
            .src()
            .map(|s| s.path_string().to_string())
            .unwrap_or_default();
        match msg.view() {
            gst::MessageView::Eos(_) => return Ok(()),
            gst::MessageView::Error(err) => {
                let detail = err.debug().map(|d| d.to_string()).unwrap_or_default();
                return Err(JobError::runtime(format!(
                    "{source}: {} ({detail})",
                    err.error()
                )));
            }
            gst::MessageView::Warning(w) => {
                warn!(source = %source, warning = %w.error(), "Pipeline warning");
            }
            gst::MessageView::StateChanged(s) => {
                if msg.src().is_some_and(|src| src.is::<gst::Pipeline>()) {
                    info!(old = ?s.old(), new = ?s.current(), "Pipeline state changed");
                }
            }
            _ => {
                debug!(source = %source, kind = ?msg.type_(), "Bus message");
            }
        }
    }
    Err(JobError::runtime("Bus closed before end of stream"))
}

fn debug_level(level: u8) -> gst::DebugLevel {
    match level {
        0 => gst::DebugLevel::None,
        1 => gst::DebugLevel::Error,
        2 => gst::DebugLevel::Warning,
        3 => gst::DebugLevel::Fixme,
        4 => gst::DebugLevel::Info,
        5 => gst::DebugLevel::Debug,
        6 => gst::DebugLevel::Log,
        7 | 8 => gst::DebugLevel::Trace,
        _ => gst::DebugLevel::Memdump,
    }
}
