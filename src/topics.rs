//! Topic selection: which news items get rewritten next.
//!
//! A refresh cycle walks `Idle -> Fetching -> Deduping -> Ranking -> Ready -> Idle`.
//! Any failing stage drops the cycle and returns to `Idle`; the next tick
//! starts over from scratch. The selector owns the pending topic queue and the
//! recent-topics window. Both sit behind one async mutex that is never held
//! across a network call, so a drain tick can pop while a refresh is waiting
//! on the model.

use crate::api::{GenerationParams, TextGenerator};
use crate::config::{DedupMode, TopicsConfig};
use crate::error::PipelineError;
use crate::models::{NewsCandidate, RecentTopic, Topic};
use crate::prompts::{dedup_prompt, parse_index_selection, ranking_prompt};
use crate::scrapers::ArticleSource;
use itertools::Itertools;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Where a refresh cycle currently is. Anything but `Idle` means a cycle is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorPhase {
    Idle,
    Fetching,
    Deduping,
    Ranking,
    Ready,
}

/// What a single [`TopicSelector::refresh`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This many topics were appended to the queue.
    Enqueued(usize),
    /// Too few candidates survived, or the model selected nothing.
    Empty,
    /// A stage failed; the queue is unchanged.
    Aborted,
    /// Another refresh was still running.
    Skipped,
}

/// Bounded FIFO of recently used topics, oldest evicted first.
#[derive(Debug, Clone)]
pub struct RecentTopicsWindow {
    entries: VecDeque<RecentTopic>,
    capacity: usize,
}

impl RecentTopicsWindow {
    /// An empty window holding at most `capacity` topics (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append `topic`, evicting the oldest entries once the window is full.
    pub fn push(&mut self, topic: RecentTopic) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(topic);
    }

    /// Exact title match, ignoring surrounding whitespace.
    pub fn contains_title(&self, title: &str) -> bool {
        let title = title.trim();
        self.entries.iter().any(|t| t.title.trim() == title)
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &RecentTopic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug)]
struct SelectorState {
    queue: VecDeque<Topic>,
    recent: RecentTopicsWindow,
}

/// Resets the phase to `Idle` however the cycle ends: normal return, panic
/// or the refresh future being dropped.
struct IdleOnDrop<'a>(&'a StdMutex<SelectorPhase>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        *lock_phase(self.0) = SelectorPhase::Idle;
    }
}

fn lock_phase(phase: &StdMutex<SelectorPhase>) -> MutexGuard<'_, SelectorPhase> {
    phase.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owner of the topic queue and the recent-topics window.
///
/// Shared as `Arc<TopicSelector>` between the refresh loop, which fills the
/// queue, and the drain loop, which pops from it. Only one refresh cycle runs
/// at a time; a tick arriving mid-cycle is skipped.
///
/// # Examples
///
/// ```ignore
/// let selector = TopicSelector::new(source, generator, params, TopicsConfig::default());
/// if let RefreshOutcome::Enqueued(n) = selector.refresh().await {
///     let topic = selector.next_topic().await;
/// }
/// ```
pub struct TopicSelector {
    source: Arc<dyn ArticleSource>,
    generator: Arc<dyn TextGenerator>,
    params: GenerationParams,
    config: TopicsConfig,
    phase: StdMutex<SelectorPhase>,
    state: Mutex<SelectorState>,
}

impl TopicSelector {
    /// Build an idle selector with an empty queue.
    ///
    /// # Arguments
    ///
    /// * `source` - listing source for candidates
    /// * `generator` - model used for similarity dedup and ranking
    /// * `params` - sampling parameters; structured output is always requested
    /// * `config` - thresholds, window size and dedup mode
    pub fn new(
        source: Arc<dyn ArticleSource>,
        generator: Arc<dyn TextGenerator>,
        params: GenerationParams,
        config: TopicsConfig,
    ) -> Self {
        let state = SelectorState {
            queue: VecDeque::new(),
            recent: RecentTopicsWindow::new(config.recent_window),
        };
        Self {
            source,
            generator,
            params: params.structured(),
            config,
            phase: StdMutex::new(SelectorPhase::Idle),
            state: Mutex::new(state),
        }
    }

    /// Run one full selection cycle.
    ///
    /// Never fails: stage errors are logged and reported as
    /// [`RefreshOutcome::Aborted`] with the queue left as it was.
    #[instrument(level = "info", skip_all)]
    pub async fn refresh(&self) -> RefreshOutcome {
        {
            let mut phase = lock_phase(&self.phase);
            if *phase != SelectorPhase::Idle {
                info!(phase = ?*phase, "Topic refresh already running; skipping tick");
                return RefreshOutcome::Skipped;
            }
            *phase = SelectorPhase::Fetching;
        }
        let _idle = IdleOnDrop(&self.phase);
        debug!("Topic selector fetching");

        match self.select().await {
            Ok(Some(picks)) if !picks.is_empty() => {
                let added = self.commit(picks).await;
                info!(added, "Topics enqueued");
                RefreshOutcome::Enqueued(added)
            }
            Ok(_) => RefreshOutcome::Empty,
            Err(e) => {
                warn!(error = %e, "Topic refresh aborted; queue unchanged");
                RefreshOutcome::Aborted
            }
        }
    }

    /// Pop the oldest queued topic. The caller owns it from here on.
    pub async fn next_topic(&self) -> Option<Topic> {
        self.state.lock().await.queue.pop_front()
    }

    pub async fn queue_len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// `Ok(None)` means the cycle ended early with too few candidates.
    async fn select(&self) -> Result<Option<Vec<NewsCandidate>>, PipelineError> {
        let fetched = self.source.fetch_candidates().await;
        let fetched_count = fetched.len();

        let (recent, queued) = {
            let state = self.state.lock().await;
            let recent: Vec<RecentTopic> = state.recent.iter().cloned().collect();
            let queued: Vec<String> = state.queue.iter().map(|t| t.title().to_string()).collect();
            (recent, queued)
        };

        let mut candidates = exact_dedup(fetched, &recent, &queued);
        debug!(fetched = fetched_count, remaining = candidates.len(), "Exact dedup done");
        if candidates.len() < self.config.min_candidates {
            info!(
                remaining = candidates.len(),
                min = self.config.min_candidates,
                "Too few fresh candidates; cycle empty"
            );
            return Ok(None);
        }

        if self.config.dedup == DedupMode::Similarity && !recent.is_empty() {
            self.set_phase(SelectorPhase::Deduping);
            debug!(candidates = candidates.len(), recent = recent.len(), "Topic selector deduping");
            candidates = self.similarity_dedup(candidates, &recent).await?;
            if candidates.len() < self.config.min_candidates {
                info!(
                    remaining = candidates.len(),
                    min = self.config.min_candidates,
                    "Too few candidates after similarity dedup; cycle empty"
                );
                return Ok(None);
            }
        }

        self.set_phase(SelectorPhase::Ranking);
        debug!(candidates = candidates.len(), "Topic selector ranking");
        self.rank(candidates).await.map(Some)
    }

    async fn similarity_dedup(
        &self,
        candidates: Vec<NewsCandidate>,
        recent: &[RecentTopic],
    ) -> Result<Vec<NewsCandidate>, PipelineError> {
        let response = self
            .generator
            .complete(&dedup_prompt(&candidates, recent), &self.params)
            .await
            .ok_or(PipelineError::GenerationNull { stage: "dedup" })?;

        let keep: HashSet<usize> = parse_index_selection(&response, "keep", candidates.len())?
            .into_iter()
            .collect();
        let before = candidates.len();
        let kept: Vec<NewsCandidate> = candidates
            .into_iter()
            .enumerate()
            .filter(|(i, _)| keep.contains(i))
            .map(|(_, c)| c)
            .collect();
        debug!(before, after = kept.len(), "Similarity dedup done");
        Ok(kept)
    }

    async fn rank(&self, candidates: Vec<NewsCandidate>) -> Result<Vec<NewsCandidate>, PipelineError> {
        let response = self
            .generator
            .complete(
                &ranking_prompt(&candidates, self.config.max_selected),
                &self.params,
            )
            .await
            .ok_or(PipelineError::GenerationNull { stage: "ranking" })?;

        let selected = parse_index_selection(&response, "selected", candidates.len())?;
        Ok(selected
            .into_iter()
            .take(self.config.max_selected)
            .map(|i| candidates[i].clone())
            .collect())
    }

    async fn commit(&self, picks: Vec<NewsCandidate>) -> usize {
        self.set_phase(SelectorPhase::Ready);
        let mut state = self.state.lock().await;
        let mut added = 0;
        for candidate in picks {
            // never re-queue a title that is still pending or already used
            if state.queue.iter().any(|t| t.title() == candidate.title)
                || state.recent.contains_title(&candidate.title)
            {
                continue;
            }
            state.recent.push(RecentTopic::from(&candidate));
            state.queue.push_back(Topic::new(candidate));
            added += 1;
        }
        debug!(queued = state.queue.len(), recent = state.recent.len(), "Selector state updated");
        added
    }

    fn set_phase(&self, phase: SelectorPhase) {
        *lock_phase(&self.phase) = phase;
    }

    #[cfg(test)]
    pub fn phase(&self) -> SelectorPhase {
        *lock_phase(&self.phase)
    }

    #[cfg(test)]
    pub async fn recent_titles(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.recent.iter().map(|t| t.title.clone()).collect()
    }

    #[cfg(test)]
    pub async fn queued_titles(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.queue.iter().map(|t| t.title().to_string()).collect()
    }
}

/// Collapse identical titles and drop those already used or still queued.
pub fn exact_dedup(
    candidates: Vec<NewsCandidate>,
    recent: &[RecentTopic],
    queued: &[String],
) -> Vec<NewsCandidate> {
    let seen: HashSet<&str> = recent
        .iter()
        .map(|t| t.title.trim())
        .chain(queued.iter().map(|t| t.trim()))
        .collect();
    candidates
        .into_iter()
        .filter(|c| !c.title.trim().is_empty())
        .unique_by(|c| c.title.trim().to_string())
        .filter(|c| !seen.contains(c.title.trim()))
        .collect()
}
