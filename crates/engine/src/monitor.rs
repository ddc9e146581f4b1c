//! Periodic progress reports and graph snapshots while a job runs.
//!
//! Everything here is best-effort: failures are logged and never change the
//! job outcome.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, SecondsFormat, Utc};
use gst::prelude::*;
use gstjob_model::{DotConfig, RenderFormat};
use gstjob_object_store::{ObjectStore, OCTET_STREAM};
use gstreamer as gst;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Where graph snapshots of one job are uploaded.
pub struct SnapshotTarget {
    store: Arc<dyn ObjectStore>,
    directory: String,
    timestamped: bool,
    render: Option<RenderFormat>,
}

impl SnapshotTarget {
    pub fn new(store: Arc<dyn ObjectStore>, dot: &DotConfig, src_key: &str) -> Self {
        Self {
            store,
            directory: dot.directory(src_key),
            timestamped: dot.timestamped,
            render: dot.render_format(),
        }
    }

    /// Object keys for a snapshot taken at `now`: the graph description and,
    /// when rendering is enabled, the image.
    pub fn keys(&self, now: DateTime<Utc>) -> (String, Option<String>) {
        let stem = if self.timestamped {
            format!(
                "{}/pipeline_{}",
                self.directory,
                now.to_rfc3339_opts(SecondsFormat::Secs, true)
            )
        } else {
            format!("{}/pipeline", self.directory)
        };
        let image = self
            .render
            .map(|format| format!("{stem}.{}", format.extension()));
        (format!("{stem}.dot"), image)
    }

    /// Upload the current shape of `pipeline`.
    pub async fn capture(&self, pipeline: &gst::Pipeline) -> anyhow::Result<()> {
        let dot = pipeline.debug_to_dot_data(gst::DebugGraphDetails::all());
        let (dot_key, image_key) = self.keys(Utc::now());

        let image = match (self.render, image_key) {
            (Some(format), Some(key)) => match render_dot(dot.as_bytes(), format).await {
                Ok(image) => Some((key, image)),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to render pipeline graph");
                    None
                }
            },
            _ => None,
        };

        self.store
            .put_object(&dot_key, dot.as_bytes().to_vec(), OCTET_STREAM)
            .await
            .with_context(|| format!("Failed to upload pipeline graph to {dot_key}"))?;
        tracing::debug!(bucket = %self.store.bucket(), key = %dot_key, "Uploaded pipeline graph");

        if let Some((key, image)) = image {
            self.store
                .put_object(&key, image, OCTET_STREAM)
                .await
                .with_context(|| format!("Failed to upload rendered pipeline graph to {key}"))?;
        }
        Ok(())
    }
}

/// Render Graphviz source with the `dot` binary.
async fn render_dot(dot: &[u8], format: RenderFormat) -> anyhow::Result<Vec<u8>> {
    let mut child = Command::new("dot")
        .arg(format!("-T{}", format.extension()))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("Failed to start graphviz dot")?;

    let mut stdin = child.stdin.take().context("dot stdin is not available")?;
    stdin.write_all(dot).await?;
    drop(stdin);

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        bail!(
            "dot exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output.stdout)
}

fn log_progress(pipeline: &gst::Pipeline) {
    let Some(position) = pipeline.query_position::<gst::ClockTime>() else {
        tracing::info!("Failed to query the pipeline for the current position");
        return;
    };
    let duration = pipeline.query_duration::<gst::ClockTime>();
    tracing::info!(
        position = %position,
        duration = %duration.display(),
        "Current position"
    );
}

/// Handle to a running monitor task.
pub struct Monitor {
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Monitor {
    /// Report progress every `interval` and upload a snapshot each time when
    /// `snapshots` is set. The task only holds a weak reference, so it ends
    /// on its own once the pipeline is dropped.
    pub fn spawn(
        pipeline: &gst::Pipeline,
        interval: Duration,
        snapshots: Option<SnapshotTarget>,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let weak = pipeline.downgrade();
        let task_stop = stop.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if task_stop.load(Ordering::SeqCst) {
                    break;
                }
                let Some(pipeline) = weak.upgrade() else {
                    break;
                };
                if let Some(target) = &snapshots {
                    if let Err(e) = target.capture(&pipeline).await {
                        tracing::warn!(error = %format!("{e:#}"), "Failed to take pipeline snapshot");
                    }
                }
                log_progress(&pipeline);
            }
            tracing::debug!("Monitor stopped");
        });

        Self { stop, task }
    }

    /// Stop the task, cancelling an in-flight snapshot.
    pub async fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
        self.task.abort();
        let _ = self.task.await;
    }
}
