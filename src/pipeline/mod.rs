//! Per-user content run: generate, settle, collect, synthesize, send, persist.
//!
//! A run fans every generation task for the user out through
//! [`run_limited`], folds the outcomes per category, optionally condenses
//! them with the insight model, optionally delivers a digest and finally
//! writes everything back in a single [`UserStore::apply_update`] call.

mod messaging;
mod plan;
mod prompt;
mod render;
mod stage;

pub use messaging::{DigestSender, SendReport};
pub use plan::{CategoryChannels, ChannelMap, GenerationPlan, GenerationTask, Granularity};
pub use render::{aggregate, TaskOutcome, ITEM_DIVIDER};
pub use stage::{PipelineStage, StageTracker};

use crate::clients::{
    last_agent_message, AgentChannel, ChannelRef, ClientError, InsightSynthesizer, SynthesisInput,
};
use crate::config::PipelineSettings;
use crate::decision::{StalenessPolicy, UpdateDecision};
use crate::limiter::{run_limited, Settled};
use crate::model::{Category, ContentField, ContentSlot, UserRecord, UserUpdate};
use crate::server::metrics;
use crate::store::UserStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Short id used to correlate the log lines of one run.
pub(crate) fn short_run_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// One async mutex per generation channel, shared by every run of a pipeline.
#[derive(Default)]
struct ChannelGates {
    gates: Mutex<HashMap<ChannelRef, Arc<tokio::sync::Mutex<()>>>>,
}

impl ChannelGates {
    fn gate(&self, channel: &ChannelRef) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(gates.entry(channel.clone()).or_default())
    }
}

pub struct ContentPipeline {
    store: Arc<dyn UserStore>,
    generator: Arc<dyn AgentChannel>,
    channels: ChannelMap,
    gates: ChannelGates,
    synthesizer: Option<Arc<dyn InsightSynthesizer>>,
    digest: Option<DigestSender>,
    staleness: StalenessPolicy,
    settings: PipelineSettings,
}

impl ContentPipeline {
    pub fn new(
        store: Arc<dyn UserStore>,
        generator: Arc<dyn AgentChannel>,
        channels: ChannelMap,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            generator,
            channels,
            gates: ChannelGates::default(),
            synthesizer: None,
            digest: None,
            staleness: StalenessPolicy::from_hours(settings.refresh_hours),
            settings,
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn InsightSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn with_digest_sender(mut self, digest: DigestSender) -> Self {
        self.digest = Some(digest);
        self
    }

    pub fn staleness(&self) -> &StalenessPolicy {
        &self.staleness
    }

    pub fn digest_sender(&self) -> Option<&DigestSender> {
        self.digest.as_ref()
    }

    pub fn store(&self) -> &Arc<dyn UserStore> {
        &self.store
    }

    /// Runs the pipeline for `user`.
    ///
    /// Without `force_run` the staleness rules are checked again and an
    /// up-to-date user is a successful no-op. Returns false when the final
    /// write fails or when generation was attempted and every task failed.
    pub async fn run(&self, user: &UserRecord, force_run: bool) -> bool {
        let now = Utc::now();
        let run_id = short_run_id();

        if !force_run && self.staleness.classify(user, now) == UpdateDecision::UpToDate {
            debug!("[{}] {} is up to date, skipping run", run_id, user.key);
            metrics::record_pipeline_run("skipped");
            return true;
        }

        info!(
            "[{}] Starting content run for {} (forced: {})",
            run_id, user.key, force_run
        );
        let started = Instant::now();
        let mut stages = StageTracker::new(format!("{}/{}", run_id, user.key));

        let plan = GenerationPlan::build(
            &user.preferences,
            &self.channels,
            self.settings.granularity,
        );

        // last_job marks the attempt, so it is taken before any work starts.
        let mut update = UserUpdate {
            last_job: Some(now),
            ..Default::default()
        };

        for category in &plan.empty {
            update.set_content(*category, ContentSlot::Exposed, ContentField::Placeholder);
            update.set_content(*category, ContentSlot::Intel, ContentField::Placeholder);
            if self.channels.get(*category).social.is_some() {
                update.set_content(*category, ContentSlot::Social, ContentField::Placeholder);
            }
        }

        let attempted = !plan.tasks.is_empty();
        let mut generated = 0;
        let mut synthesized = 0;

        if attempted {
            stages.advance(PipelineStage::Dispatching);
            let outcomes = self.generate(&plan, &run_id).await;
            generated = outcomes.iter().filter(|o| o.succeeded()).count();

            stages.advance(PipelineStage::Collecting);
            self.fold_outcomes(&plan, &outcomes, &mut update);

            if self.synthesizer.is_some() {
                stages.advance(PipelineStage::Synthesizing);
            }
            synthesized = self.synthesize(&plan.active, &mut update, &run_id).await;
            if synthesized > 0 {
                update.ai_last_update = Some(Utc::now());
            }
        }

        let mut sent = SendReport::default();
        if let (Some(digest), Some(recipient)) = (&self.digest, user.messaging_id.as_deref()) {
            let mut refreshed = user.clone();
            update.apply_to(&mut refreshed);
            if digest.policy().is_send_due(&refreshed, Utc::now(), false) {
                stages.advance(PipelineStage::Sending);
                sent = digest
                    .send_digest(recipient, &refreshed.deliverable_content())
                    .await;
                if sent.any_sent() {
                    update.tele_last_sent = Some(Utc::now());
                }
            }
        }

        stages.advance(PipelineStage::Persisting);
        let persisted = match self.store.apply_update(&user.key, &update).await {
            Ok(()) => true,
            Err(e) => {
                error!("[{}] Failed to persist update for {}: {}", run_id, user.key, e);
                false
            }
        };

        let success = persisted && (!attempted || generated > 0);
        if success {
            stages.advance(PipelineStage::Done);
            metrics::record_pipeline_run("success");
        } else {
            stages.advance(PipelineStage::Failed);
            metrics::record_pipeline_run("failed");
        }

        info!(
            "[{}] Content run for {} finished in {:?}: {}/{} generation tasks ok, {} synthesized, {} messages sent, success={}",
            run_id,
            user.key,
            started.elapsed(),
            generated,
            plan.tasks.len(),
            synthesized,
            sent.sent,
            success
        );
        success
    }

    /// Dispatches every task at once under the global cap.
    async fn generate(&self, plan: &GenerationPlan, run_id: &str) -> Vec<TaskOutcome> {
        let factories: Vec<_> = plan
            .tasks
            .iter()
            .map(|task| {
                let generator = Arc::clone(&self.generator);
                let gate = self
                    .settings
                    .exclusive_channels
                    .then(|| self.gates.gate(&task.channel));
                let task = task.clone();
                let settle = self.settings.settle_wait;
                let scope = format!(
                    "{}/{}:{}:{}",
                    run_id,
                    task.category,
                    task.source.as_str(),
                    task.subject()
                );
                move || run_generation_task(generator, gate, task, settle, scope)
            })
            .collect();

        let settled = run_limited(factories, self.settings.concurrency).await;

        plan.tasks
            .iter()
            .zip(settled)
            .map(|(task, settled)| {
                let outcome = match settled {
                    Settled::Fulfilled(Some(text)) => TaskOutcome::Text(text),
                    Settled::Fulfilled(None) => TaskOutcome::NoContent,
                    Settled::Rejected(e) => {
                        warn!(
                            "[{}] Generation for {} ({} {}) failed: {}",
                            run_id,
                            task.subject(),
                            task.category,
                            task.source.as_str(),
                            e
                        );
                        TaskOutcome::Failed(e.to_string())
                    }
                };
                metrics::record_generation_task(
                    task.category.update_key(),
                    task.source.as_str(),
                    outcome.label(),
                );
                outcome
            })
            .collect()
    }

    fn fold_outcomes(&self, plan: &GenerationPlan, outcomes: &[TaskOutcome], update: &mut UserUpdate) {
        for category in &plan.active {
            for source in self.channels.get(*category).sources() {
                let results: Vec<(&GenerationTask, &TaskOutcome)> = plan
                    .tasks
                    .iter()
                    .zip(outcomes)
                    .filter(|(task, _)| task.category == *category && task.source == source)
                    .collect();
                if let Some(field) = aggregate(&results) {
                    update.set_content(*category, source.slot(), field);
                }
            }
        }
    }

    /// Sets each category's exposed field and returns how many synthesis
    /// calls succeeded.
    ///
    /// The exposed field starts as the raw intel aggregate. A category whose
    /// intel is substantive is then condensed by the insight model when one
    /// is configured; a failed or empty answer keeps the raw intel.
    async fn synthesize(&self, categories: &[Category], update: &mut UserUpdate, run_id: &str) -> usize {
        let mut inputs = Vec::new();

        for category in categories {
            let Some(intel) = update.content.get(&(*category, ContentSlot::Intel)).cloned() else {
                continue;
            };
            if let Some(text) = intel.text() {
                let social = update
                    .content
                    .get(&(*category, ContentSlot::Social))
                    .and_then(ContentField::text)
                    .map(str::to_string);
                inputs.push(SynthesisInput {
                    category: *category,
                    intel: text.to_string(),
                    social,
                });
            }
            update.set_content(*category, ContentSlot::Exposed, intel);
        }

        let Some(synthesizer) = &self.synthesizer else {
            return 0;
        };
        if inputs.is_empty() {
            return 0;
        }

        let categories: Vec<Category> = inputs.iter().map(|input| input.category).collect();
        let factories: Vec<_> = inputs
            .into_iter()
            .map(|input| {
                let synthesizer = Arc::clone(synthesizer);
                move || async move { synthesizer.synthesize(&input).await }
            })
            .collect();

        let mut succeeded = 0;
        for (category, settled) in categories
            .into_iter()
            .zip(run_limited(factories, self.settings.concurrency).await)
        {
            match settled.into_result() {
                Ok(text) if !text.trim().is_empty() => {
                    update.set_content(
                        category,
                        ContentSlot::Exposed,
                        ContentField::Content(text.trim().to_string()),
                    );
                    metrics::record_synthesis_call("success");
                    succeeded += 1;
                }
                Ok(_) => {
                    warn!(
                        "[{}] Insight model returned nothing for {}, keeping raw intel",
                        run_id, category
                    );
                    metrics::record_synthesis_call("empty");
                }
                Err(e) => {
                    warn!(
                        "[{}] Insight synthesis for {} failed, keeping raw intel: {}",
                        run_id, category, e
                    );
                    metrics::record_synthesis_call("failed");
                }
            }
        }
        succeeded
    }
}

/// Submit, wait out the settle interval, then read the channel back.
///
/// With a gate the channel is held for the whole exchange, since collecting
/// means "latest agent message on the channel".
async fn run_generation_task(
    generator: Arc<dyn AgentChannel>,
    gate: Option<Arc<tokio::sync::Mutex<()>>>,
    task: GenerationTask,
    settle: Duration,
    scope: String,
) -> Result<Option<String>, ClientError> {
    let _held = match gate {
        Some(gate) => Some(gate.lock_owned().await),
        None => None,
    };
    let mut stages = StageTracker::new(scope);

    stages.advance(PipelineStage::Dispatching);
    if let Err(e) = generator.submit(&task.channel, &task.prompt).await {
        stages.advance(PipelineStage::Failed);
        return Err(e);
    }

    stages.advance(PipelineStage::Settling);
    tokio::time::sleep(settle).await;

    stages.advance(PipelineStage::Collecting);
    let messages = match generator.collect(&task.channel).await {
        Ok(messages) => messages,
        Err(e) => {
            stages.advance(PipelineStage::Failed);
            return Err(e);
        }
    };

    stages.advance(PipelineStage::Done);
    Ok(last_agent_message(&messages).map(|text| text.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ChannelRef, ChatMessage};
    use crate::model::Preferences;
    use crate::store::InMemoryUserStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies to every prompt with "news for <prompt>".
    #[derive(Default)]
    struct EchoChannel {
        history: Mutex<Vec<ChatMessage>>,
        submits: Mutex<usize>,
    }

    #[async_trait]
    impl AgentChannel for EchoChannel {
        async fn submit(&self, _channel: &ChannelRef, prompt: &str) -> Result<(), ClientError> {
            *self.submits.lock().unwrap() += 1;
            let mut history = self.history.lock().unwrap();
            history.push(ChatMessage::user(prompt));
            history.push(ChatMessage::agent(format!("news for {}", prompt)));
            Ok(())
        }

        async fn collect(&self, _channel: &ChannelRef) -> Result<Vec<ChatMessage>, ClientError> {
            Ok(self.history.lock().unwrap().clone())
        }
    }

    fn channels() -> ChannelMap {
        ChannelMap {
            watchlist: CategoryChannels::intel_only(ChannelRef::new("3422", "140")),
            sector: CategoryChannels::intel_only(ChannelRef::new("3420", "140")),
            narrative: CategoryChannels::intel_only(ChannelRef::new("3421", "140")),
        }
    }

    fn settings() -> PipelineSettings {
        PipelineSettings {
            concurrency: 1,
            settle_wait: Duration::ZERO,
            ..Default::default()
        }
    }

    fn pro_user(watchlist: &[&str]) -> UserRecord {
        let mut user = UserRecord::new("a@example.com");
        user.is_pro = true;
        user.preferences = Preferences {
            watchlist: watchlist.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        user
    }

    #[tokio::test]
    async fn test_up_to_date_user_is_a_noop() {
        let store = Arc::new(InMemoryUserStore::new());
        let channel = Arc::new(EchoChannel::default());
        let pipeline = ContentPipeline::new(store.clone(), channel.clone(), channels(), settings());

        let mut user = pro_user(&["BTC"]);
        user.last_job = Some(Utc::now());
        for category in Category::ALL {
            user.content.get_mut(category).exposed = Some(ContentField::Content("x".into()));
        }
        store.insert(user.clone());

        assert!(pipeline.run(&user, false).await);
        assert_eq!(*channel.submits.lock().unwrap(), 0);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_items_sharing_a_channel_collect_their_own_reply() {
        let store = Arc::new(InMemoryUserStore::new());
        let channel = Arc::new(EchoChannel::default());
        let settings = PipelineSettings {
            concurrency: 3,
            settle_wait: Duration::from_millis(20),
            ..Default::default()
        };
        let pipeline = ContentPipeline::new(store.clone(), channel.clone(), channels(), settings);
        let user = pro_user(&["BTC", "ETH", "SOL"]);
        store.insert(user.clone());

        assert!(pipeline.run(&user, true).await);

        let stored = store.get(&user.key).unwrap();
        let text = stored
            .exposed(Category::Watchlist)
            .and_then(ContentField::text)
            .unwrap();
        let blocks: Vec<&str> = text.split(ITEM_DIVIDER).collect();
        assert_eq!(blocks.len(), 3);
        for (block, item) in blocks.iter().zip(["BTC", "ETH", "SOL"]) {
            let reply = block.strip_prefix(&format!("### {}\n\n", item)).unwrap();
            assert!(reply.contains(item), "{} got {:?}", item, reply);
        }
    }

    #[tokio::test]
    async fn test_empty_preferences_resolve_to_placeholders() {
        let store = Arc::new(InMemoryUserStore::new());
        let channel = Arc::new(EchoChannel::default());
        let pipeline = ContentPipeline::new(store.clone(), channel.clone(), channels(), settings());
        let user = pro_user(&[]);
        store.insert(user.clone());

        assert!(pipeline.run(&user, true).await);

        assert_eq!(*channel.submits.lock().unwrap(), 0);
        let stored = store.get(&user.key).unwrap();
        for category in Category::ALL {
            assert_eq!(stored.exposed(category), Some(&ContentField::Placeholder));
        }
        assert!(stored.last_job.is_some());
        assert!(stored.ai_last_update.is_none());
    }

    #[tokio::test]
    async fn test_single_item_flows_into_exposed_field() {
        let store = Arc::new(InMemoryUserStore::new());
        let channel = Arc::new(EchoChannel::default());
        let pipeline = ContentPipeline::new(store.clone(), channel.clone(), channels(), settings());
        let user = pro_user(&["BTC"]);
        store.insert(user.clone());

        assert!(pipeline.run(&user, false).await);

        let stored = store.get(&user.key).unwrap();
        let text = stored
            .exposed(Category::Watchlist)
            .and_then(ContentField::text)
            .unwrap()
            .to_string();
        assert!(text.starts_with("### BTC\n\nnews for "));
        assert_eq!(
            stored.content.watchlist.intel,
            stored.content.watchlist.exposed
        );
        assert_eq!(stored.exposed(Category::Sector), Some(&ContentField::Placeholder));
        assert_eq!(store.writes_for(&user.key).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_reports_failure() {
        let store = Arc::new(InMemoryUserStore::new());
        let channel = Arc::new(EchoChannel::default());
        let pipeline = ContentPipeline::new(store.clone(), channel, channels(), settings());
        let user = pro_user(&["BTC"]);
        store.insert(user.clone());
        store.set_fail_writes(true);

        assert!(!pipeline.run(&user, true).await);
    }

    #[test]
    fn test_short_run_id() {
        let id = short_run_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
