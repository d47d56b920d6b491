//! Orchestrator
//!
//! Wires the registry, scheduler, generator, and sinks together and runs
//! the background loops: the debounced rebuild queue, the persons-file
//! modification poll, and the daily full refresh. Rebuild failures are
//! logged and absorbed so the loop keeps serving subsequent triggers.

use crate::area_map::{apply_overrides, AreaMapClient, AreaProvider};
use crate::dashboard::{build_documents, GenerationInput};
use crate::person_registry::{ListenerClass, PersonRegistry};
use crate::publisher::{DashboardPublisher, FileSink};
use crate::scheduler::RebuildScheduler;
use crate::state::{AppConfig, AppState};
use crate::supervision::SupervisionEvaluator;
use chrono::Local;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::interval;
use tracing::{error, info, warn};

pub struct Orchestrator<P: AreaProvider> {
    config: AppConfig,
    registry: Arc<PersonRegistry>,
    scheduler: Arc<RebuildScheduler>,
    evaluator: Arc<SupervisionEvaluator>,
    sink: Arc<FileSink>,
    publisher: Option<Arc<DashboardPublisher>>,
    area: Option<Arc<P>>,
}

impl Orchestrator<AreaMapClient> {
    /// Wire from the shared application state.
    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.config.clone(),
            Arc::clone(&state.registry),
            Arc::clone(&state.scheduler),
            Arc::clone(&state.evaluator),
            Arc::clone(&state.sink),
            state.publisher.clone(),
            state.area_client.clone(),
        )
    }
}

impl<P: AreaProvider + 'static> Orchestrator<P> {
    pub fn new(
        config: AppConfig,
        registry: Arc<PersonRegistry>,
        scheduler: Arc<RebuildScheduler>,
        evaluator: Arc<SupervisionEvaluator>,
        sink: Arc<FileSink>,
        publisher: Option<Arc<DashboardPublisher>>,
        area: Option<Arc<P>>,
    ) -> Self {
        Self {
            config,
            registry,
            scheduler,
            evaluator,
            sink,
            publisher,
            area,
        }
    }

    /// One full generation pass. A zero-person registry is a skipped run,
    /// not a failure; a rejected dashboard push degrades to the file sink.
    pub async fn regenerate(&self, reason: &str) -> crate::Result<()> {
        let snapshot = self.registry.snapshot().await;
        let queried = match &self.area {
            Some(provider) => provider.fetch().await,
            None => HashMap::new(),
        };
        let area_map = apply_overrides(queried, &self.config.camera_areas);

        let input = GenerationInput {
            snapshot,
            snapshot_source: self.config.snapshot_source,
            area_map,
            topic_prefix: self.config.topic_prefix.clone(),
            include_dir: self.config.include_dir.clone(),
            emit_package: self.config.emit_package,
        };

        let bundle = match build_documents(&input, &self.evaluator) {
            Ok(bundle) => bundle,
            Err(e) if e.is_skip() => {
                info!(reason, "generation skipped: {e}");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.sink.write(&bundle.files).await?;
        self.sink.prune(&bundle.files).await?;

        if let Some(publisher) = &self.publisher {
            // The view also landed in dashboard.yaml above, so a rejected
            // push is degraded service, not a failed run.
            if let Err(e) = publisher.push_view(&bundle.view).await {
                warn!(error = %e, "dashboard push failed, file sink holds the view");
            }
        }

        info!(reason, files = bundle.files.len(), "regeneration complete");
        Ok(())
    }

    /// Load metadata, run the startup generation, spawn the background
    /// loops, and serve the rebuild queue until the sender side closes.
    pub async fn run(self: Arc<Self>, mut rebuild_rx: UnboundedReceiver<String>) {
        if let Err(e) = self.registry.load_metadata(&self.config.persons_file).await {
            error!(error = %e, file = %self.config.persons_file.display(),
                "persons file rejected, continuing with prior state");
        }

        let scheduler = Arc::clone(&self.scheduler);
        self.registry.register_listener(ListenerClass::Structural, move || {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move {
                scheduler.trigger("person set changed").await;
            });
            Ok(())
        });

        Arc::clone(&self).spawn_persons_file_poll();
        Arc::clone(&self).spawn_daily_refresh();

        if let Err(e) = self.regenerate("startup").await {
            error!(error = %e, "startup generation failed");
        }

        while let Some(reason) = rebuild_rx.recv().await {
            if let Err(e) = self.regenerate(&reason).await {
                error!(error = %e, reason, "regeneration failed");
            }
        }
    }

    /// Poll the persons file for modification-time changes; on change,
    /// reload metadata and arm a rebuild.
    fn spawn_persons_file_poll(self: Arc<Self>) {
        let orchestrator = self;
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(
                orchestrator.config.poll_interval_secs.max(1),
            ));
            let mut last_mtime: Option<SystemTime> = None;
            loop {
                ticker.tick().await;
                let mtime = tokio::fs::metadata(&orchestrator.config.persons_file)
                    .await
                    .ok()
                    .and_then(|m| m.modified().ok());
                if mtime == last_mtime {
                    continue;
                }
                let first_check = last_mtime.is_none() && mtime.is_some();
                last_mtime = mtime;
                if first_check {
                    // Startup load already covered the initial content.
                    continue;
                }
                info!(file = %orchestrator.config.persons_file.display(), "persons file changed");
                if let Err(e) = orchestrator
                    .registry
                    .load_metadata(&orchestrator.config.persons_file)
                    .await
                {
                    error!(error = %e, "persons file reload rejected, keeping prior state");
                    continue;
                }
                orchestrator.scheduler.trigger("persons file changed").await;
            }
        });
    }

    /// Fire a full refresh at the configured local time every day.
    fn spawn_daily_refresh(self: Arc<Self>) {
        let Some(refresh_at) = self.config.daily_refresh else {
            return;
        };
        let orchestrator = self;
        tokio::spawn(async move {
            loop {
                let now = Local::now();
                let mut next = now.date_naive().and_time(refresh_at);
                if next <= now.naive_local() {
                    next += chrono::Duration::days(1);
                }
                let wait = (next - now.naive_local())
                    .to_std()
                    .unwrap_or(Duration::from_secs(60));
                tokio::time::sleep(wait).await;
                orchestrator
                    .scheduler
                    .trigger_immediate("daily refresh")
                    .await;
            }
        });
    }
}
