//! Periodic drivers for the pipeline.
//!
//! Two independent loops run on the tokio runtime:
//!
//! - topic refresh: fires immediately, then every `topic_refresh`
//! - article drain: waits `article_initial_delay`, then fires every
//!   `article_drain`
//!
//! A tick that is still running when the next one is due delays the
//! schedule instead of bursting to catch up. Each tick runs in its own task
//! so a panicking job is logged and the loop keeps going. Stopping lets an
//! in-flight tick finish.

use crate::config::ScheduleConfig;
use crate::generator::ArticleGenerator;
use crate::topics::TopicSelector;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, error, info, warn};

/// One unit of periodic work. Implementations log their own failures.
#[async_trait]
pub trait PeriodicJob: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self);
}

#[async_trait]
impl PeriodicJob for TopicSelector {
    fn name(&self) -> &'static str {
        "topic-refresh"
    }

    async fn run(&self) {
        let outcome = self.refresh().await;
        debug!(?outcome, "Topic refresh tick done");
    }
}

/// Pops one topic per tick and turns it into an article.
pub struct ArticleDrainJob {
    selector: Arc<TopicSelector>,
    generator: Arc<ArticleGenerator>,
}

impl ArticleDrainJob {
    pub fn new(selector: Arc<TopicSelector>, generator: Arc<ArticleGenerator>) -> Self {
        Self {
            selector,
            generator,
        }
    }
}

#[async_trait]
impl PeriodicJob for ArticleDrainJob {
    fn name(&self) -> &'static str {
        "article-drain"
    }

    async fn run(&self) {
        self.generator.run_next(&self.selector).await;
    }
}

/// Periods of both loops plus the drain loop's head start delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTiming {
    pub topic_refresh: Duration,
    pub article_drain: Duration,
    pub article_initial_delay: Duration,
}

impl From<&ScheduleConfig> for ScheduleTiming {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            topic_refresh: config.topic_refresh(),
            article_drain: config.article_drain(),
            article_initial_delay: config.article_initial_delay(),
        }
    }
}

/// Drives the topic refresh and article drain jobs on their own loops.
///
/// # Examples
///
/// ```ignore
/// let mut scheduler = Scheduler::new(selector, drain, ScheduleTiming::from(&config.schedule));
/// scheduler.start();
/// tokio::signal::ctrl_c().await?;
/// scheduler.stop().await;
/// ```
pub struct Scheduler {
    topic_job: Arc<dyn PeriodicJob>,
    article_job: Arc<dyn PeriodicJob>,
    timing: ScheduleTiming,
    shutdown: Option<watch::Sender<bool>>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Build a stopped scheduler. Nothing runs until [`Scheduler::start`].
    ///
    /// # Arguments
    ///
    /// * `topic_job` - fires immediately, then every `timing.topic_refresh`
    /// * `article_job` - first fires after `timing.article_initial_delay`
    /// * `timing` - loop periods
    pub fn new(
        topic_job: Arc<dyn PeriodicJob>,
        article_job: Arc<dyn PeriodicJob>,
        timing: ScheduleTiming,
    ) -> Self {
        Self {
            topic_job,
            article_job,
            timing,
            shutdown: None,
            handles: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Spawn both loops. Calling `start` on a running scheduler does nothing.
    pub fn start(&mut self) {
        if self.is_running() {
            warn!("Scheduler already running");
            return;
        }
        let (tx, rx) = watch::channel(false);

        self.handles.push(tokio::spawn(run_periodic(
            Arc::clone(&self.topic_job),
            Duration::ZERO,
            self.timing.topic_refresh,
            rx.clone(),
        )));
        self.handles.push(tokio::spawn(run_periodic(
            Arc::clone(&self.article_job),
            self.timing.article_initial_delay,
            self.timing.article_drain,
            rx,
        )));
        self.shutdown = Some(tx);

        info!(
            topic_refresh_secs = self.timing.topic_refresh.as_secs(),
            article_drain_secs = self.timing.article_drain.as_secs(),
            article_initial_delay_secs = self.timing.article_initial_delay.as_secs(),
            "Scheduler started"
        );
    }

    /// Signal both loops and wait for them to wind down.
    ///
    /// A tick already in progress runs to completion first. Stopping a
    /// scheduler that is not running returns at once.
    pub async fn stop(&mut self) {
        let Some(tx) = self.shutdown.take() else {
            return;
        };
        let _ = tx.send(true);
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler loop ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }
}

async fn run_periodic(
    job: Arc<dyn PeriodicJob>,
    initial_delay: Duration,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let name = job.name();
    if !initial_delay.is_zero() {
        tokio::select! {
            _ = sleep(initial_delay) => {}
            _ = shutdown.changed() => return,
        }
    }

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                debug!(job = name, "Tick");
                let job = Arc::clone(&job);
                if let Err(e) = tokio::spawn(async move { job.run().await }).await {
                    error!(job = name, error = %e, "Periodic job panicked");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!(job = name, "Loop exited");
}
