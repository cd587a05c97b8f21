pub mod client;
pub mod filter;
pub mod payload;
pub mod schedule;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{JobConfig, ScheduledAlertConfig};
use crate::dispatch::DispatchSink;
use client::AlertSourceClient;

/// Source tag attached to every dispatch call from this subsystem.
pub const SOURCE_TAG: &str = "scheduled";

/// Point-in-time view of one job, as reported by status queries.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub name: String,
    pub next_run: Option<DateTime<Utc>>,
    pub prev_run: Option<DateTime<Utc>>,
    pub active: bool,
}

#[derive(Debug, Clone, Default)]
struct JobRuntimeEntry {
    next_run: Option<DateTime<Utc>>,
    prev_run: Option<DateTime<Utc>>,
    active: bool,
}

/// Runtime state of all registered jobs, written during registration and
/// after each firing, read concurrently by status queries.
#[derive(Clone, Default)]
pub struct JobRegistry {
    entries: Arc<RwLock<HashMap<String, JobRuntimeEntry>>>,
}

impl JobRegistry {
    async fn register(&self, name: &str, next_run: Option<DateTime<Utc>>) {
        self.entries.write().await.insert(
            name.to_string(),
            JobRuntimeEntry {
                next_run,
                prev_run: None,
                active: true,
            },
        );
    }

    async fn record_fire(
        &self,
        name: &str,
        fired_at: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) {
        if let Some(entry) = self.entries.write().await.get_mut(name) {
            entry.prev_run = Some(fired_at);
            entry.next_run = next_run;
        }
    }

    async fn deactivate_all(&self) {
        for entry in self.entries.write().await.values_mut() {
            entry.active = false;
        }
    }

    /// Copy of the registry, ordered by job name.
    pub async fn snapshot(&self) -> Vec<JobStatus> {
        let mut statuses: Vec<JobStatus> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .map(|(name, entry)| JobStatus {
                    name: name.clone(),
                    next_run: entry.next_run,
                    prev_run: entry.prev_run,
                    active: entry.active,
                })
                .collect()
        };
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}

/// Time zone shared by every job schedule.
#[derive(Debug, Clone, Copy)]
enum ScheduleZone {
    Named(chrono_tz::Tz),
    Local,
}

fn resolve_zone(name: &str) -> ScheduleZone {
    if name.is_empty() {
        return ScheduleZone::Local;
    }
    match name.parse::<chrono_tz::Tz>() {
        Ok(tz) => ScheduleZone::Named(tz),
        Err(_) => {
            warn!("invalid timezone '{name}', using local timezone");
            ScheduleZone::Local
        }
    }
}

type FireAction =
    Box<dyn FnMut(Uuid, JobScheduler) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Orchestrates the scheduled polling jobs: registers them against the cron
/// engine, runs the fetch -> filter -> build -> dispatch pipeline on each
/// tick, and exposes status snapshots and a graceful stop.
pub struct Scheduler {
    engine: JobScheduler,
    registry: JobRegistry,
    dispatch: Arc<dyn DispatchSink>,
    config: ScheduledAlertConfig,
    zone: ScheduleZone,
    /// Every in-flight firing holds a read guard; stop() takes the write
    /// guard to drain them.
    drain: Arc<RwLock<()>>,
    stopping: Arc<AtomicBool>,
    stopped: AtomicBool,
}

impl Scheduler {
    pub async fn new(config: ScheduledAlertConfig, dispatch: Arc<dyn DispatchSink>) -> Result<Self> {
        let engine = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("failed to create cron engine: {e}"))?;
        let zone = resolve_zone(&config.timezone);
        Ok(Self {
            engine,
            registry: JobRegistry::default(),
            dispatch,
            config,
            zone,
            drain: Arc::new(RwLock::new(())),
            stopping: Arc::new(AtomicBool::new(false)),
            stopped: AtomicBool::new(false),
        })
    }

    /// Register every enabled job and start the cron engine. Any
    /// registration failure aborts startup; partial scheduling is worse
    /// than none.
    pub async fn start(&self) -> Result<()> {
        if !self.config.enable {
            info!("scheduled alerts are disabled");
            return Ok(());
        }

        let mut registered = 0usize;
        for job in self.config.jobs.clone() {
            if !job.enable {
                info!("job '{}' is disabled, skipping", job.name);
                continue;
            }
            self.add_job(job).await?;
            registered += 1;
        }

        let mut engine = self.engine.clone();
        engine
            .start()
            .await
            .map_err(|e| anyhow!("failed to start cron engine: {e}"))?;
        info!("scheduler started with {registered} jobs");

        for status in self.registry.snapshot().await {
            if let Some(next) = status.next_run {
                info!(
                    "job '{}' next run: {}",
                    status.name,
                    next.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Ok(())
    }

    async fn add_job(&self, job: JobConfig) -> Result<()> {
        let expr = schedule::resolve_schedule(&job.schedule)
            .with_context(|| format!("failed to add job '{}'", job.name))?;

        let name = job.name.clone();
        let raw_schedule = job.schedule.clone();
        let action = self.fire_action(job);
        let cron_job = match self.zone {
            ScheduleZone::Named(tz) => Job::new_async_tz(expr.as_str(), tz, action),
            ScheduleZone::Local => Job::new_async_tz(expr.as_str(), chrono::Local, action),
        }
        .map_err(|e| anyhow!("invalid cron expression '{raw_schedule}' for job '{name}': {e}"))?;

        let mut engine = self.engine.clone();
        let job_id = engine
            .add(cron_job)
            .await
            .map_err(|e| anyhow!("failed to register job '{name}': {e}"))?;

        let next = self.next_tick(job_id).await;
        self.registry.register(&name, next).await;
        info!("added scheduled job '{name}' with schedule '{expr}'");
        Ok(())
    }

    async fn next_tick(&self, job_id: Uuid) -> Option<DateTime<Utc>> {
        let mut engine = self.engine.clone();
        engine.next_tick_for_job(job_id).await.ok().flatten()
    }

    /// The per-tick closure handed to the cron engine. Different jobs may
    /// fire concurrently; the per-job gate keeps one job's own firings
    /// serialized. Every failure is logged and ends this firing only.
    fn fire_action(&self, job: JobConfig) -> FireAction {
        let registry = self.registry.clone();
        let dispatch = self.dispatch.clone();
        let drain = self.drain.clone();
        let stopping = self.stopping.clone();
        let gate = Arc::new(Mutex::new(()));
        let job = Arc::new(job);

        Box::new(move |job_id, engine| {
            let registry = registry.clone();
            let dispatch = dispatch.clone();
            let drain = drain.clone();
            let stopping = stopping.clone();
            let gate = gate.clone();
            let job = job.clone();
            let mut engine = engine;

            Box::pin(async move {
                let _firing = drain.read().await;
                if stopping.load(Ordering::SeqCst) {
                    return;
                }
                let _serialized = gate.lock().await;
                if stopping.load(Ordering::SeqCst) {
                    return;
                }

                let fired_at = Utc::now();
                if let Err(e) = run_firing(&job, dispatch.as_ref()).await {
                    error!("scheduled job '{}' failed: {e:#}", job.name);
                }

                let next = engine.next_tick_for_job(job_id).await.ok().flatten();
                registry.record_fire(&job.name, fired_at, next).await;
            })
        })
    }

    /// Read-only snapshot for the status surface; never blocks on an
    /// in-flight firing beyond copying the registry.
    pub async fn status(&self) -> Vec<JobStatus> {
        self.registry.snapshot().await
    }

    /// Shut the engine down and wait for in-flight firings to finish.
    /// Safe to call more than once.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stopping.store(true, Ordering::SeqCst);

        let mut engine = self.engine.clone();
        if let Err(e) = engine.shutdown().await {
            warn!("cron engine shutdown error: {e}");
        }

        let _drained = self.drain.write().await;
        self.registry.deactivate_all().await;
        info!("scheduler stopped");
    }
}

/// One firing: fetch the backend's firing alerts, filter them by the job's
/// label predicate, build the incident envelope, overlay the scheduling
/// metadata and hand it to the dispatch sink.
async fn run_firing(job: &JobConfig, dispatch: &dyn DispatchSink) -> Result<()> {
    info!("running scheduled job '{}'", job.name);

    let client = AlertSourceClient::new(
        &job.alertmanager.url,
        &job.alertmanager.username,
        &job.alertmanager.password,
    )
    .with_context(|| format!("failed to build alert client for job '{}'", job.name))?;

    let alerts = client
        .fetch_firing()
        .await
        .with_context(|| format!("failed to fetch alerts for job '{}'", job.name))?;
    info!("job '{}': fetched {} firing alerts", job.name, alerts.len());

    let matched = filter::filter_alerts(alerts, &job.match_labels);
    info!(
        "job '{}': {} alerts matched label filters",
        job.name,
        matched.len()
    );

    let Some(mut payload) = payload::build_payload(&matched) else {
        info!("job '{}': no alerts matched, skipping notification", job.name);
        return Ok(());
    };
    payload.scheduled_job = Some(job.name.clone());
    payload.scheduled_time = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

    let params = build_params(job);
    let sent = payload.alerts.len();
    dispatch
        .deliver(SOURCE_TAG, &payload, &params)
        .await
        .with_context(|| format!("failed to dispatch incident for job '{}'", job.name))?;

    info!("job '{}': sent {sent} alerts to notification channels", job.name);
    Ok(())
}

fn build_params(job: &JobConfig) -> HashMap<String, String> {
    let mut params = HashMap::new();
    params.insert(
        "oncall_enable".to_string(),
        job.channels.oncall_enable.unwrap_or(false).to_string(),
    );

    let channels = &job.channels;
    for (key, value) in [
        ("slack_channel_id", &channels.slack_channel_id),
        ("telegram_chat_id", &channels.telegram_chat_id),
        ("lark_other_webhook_url", &channels.lark_webhook_key),
        ("msteams_other_power_url", &channels.msteams_power_url_key),
        ("email_to", &channels.email_to),
    ] {
        if !value.is_empty() {
            params.insert(key.to_string(), value.clone());
        }
    }
    params
}
