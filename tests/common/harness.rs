//! Wires a pipeline, a cycle context and health state around the stubs.

use super::constants::WAIT_TIMEOUT;
use super::fixtures::{fast_pipeline, fast_schedule, intel_channels, messaging_channel};
use super::stubs::{RecordingSender, ScriptedChannel, ScriptedSynthesizer};
use digest_worker::clients::{AgentChannel, InsightSynthesizer, MessageSender};
use digest_worker::config::{PipelineSettings, ScheduleSettings};
use digest_worker::decision::MessagingPolicy;
use digest_worker::model::UserRecord;
use digest_worker::pipeline::{ChannelMap, ContentPipeline, DigestSender};
use digest_worker::scheduler::{CycleContext, InitialSendTracker};
use digest_worker::store::{InMemoryUserStore, UserStore};
use digest_worker::{HealthState, LockRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub const MESSAGING_COOLDOWN_HOURS: u64 = 12;

pub struct HarnessBuilder {
    users: Vec<UserRecord>,
    channel: ScriptedChannel,
    synthesizer: Option<ScriptedSynthesizer>,
    messaging: bool,
    channels: ChannelMap,
    pipeline: PipelineSettings,
    schedule: ScheduleSettings,
}

impl HarnessBuilder {
    pub fn user(mut self, user: UserRecord) -> Self {
        self.users.push(user);
        self
    }

    pub fn channel(mut self, channel: ScriptedChannel) -> Self {
        self.channel = channel;
        self
    }

    pub fn synthesizer(mut self, synthesizer: ScriptedSynthesizer) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn with_messaging(mut self) -> Self {
        self.messaging = true;
        self
    }

    pub fn channels(mut self, channels: ChannelMap) -> Self {
        self.channels = channels;
        self
    }

    pub fn pipeline(mut self, settings: PipelineSettings) -> Self {
        self.pipeline = settings;
        self
    }

    pub fn schedule(mut self, settings: ScheduleSettings) -> Self {
        self.schedule = settings;
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(InMemoryUserStore::with_users(self.users));
        let channel = Arc::new(self.channel);
        let sender = Arc::new(RecordingSender::new());
        let synthesizer = self.synthesizer.map(Arc::new);

        let mut pipeline = ContentPipeline::new(
            Arc::clone(&store) as Arc<dyn UserStore>,
            Arc::clone(&channel) as Arc<dyn AgentChannel>,
            self.channels,
            self.pipeline,
        );
        if let Some(synthesizer) = &synthesizer {
            pipeline =
                pipeline.with_synthesizer(Arc::clone(synthesizer) as Arc<dyn InsightSynthesizer>);
        }
        if self.messaging {
            pipeline = pipeline.with_digest_sender(DigestSender::new(
                Arc::clone(&sender) as Arc<dyn MessageSender>,
                messaging_channel(),
                MessagingPolicy::from_hours(MESSAGING_COOLDOWN_HOURS),
                Duration::ZERO,
            ));
        }

        let locks = LockRegistry::new();
        let initial_sends = InitialSendTracker::new();
        let shutdown = CancellationToken::new();
        let health = HealthState::new("test", locks.clone(), initial_sends.clone());
        let pipeline = Arc::new(pipeline);
        let context = CycleContext::new(
            Arc::clone(&pipeline),
            locks.clone(),
            initial_sends.clone(),
            shutdown.clone(),
            &self.schedule,
        );

        Harness {
            store,
            channel,
            sender,
            synthesizer,
            pipeline,
            locks,
            initial_sends,
            shutdown,
            health,
            context,
            schedule: self.schedule,
        }
    }
}

/// Everything a cycle or pipeline test needs, backed by in-memory stubs.
pub struct Harness {
    pub store: Arc<InMemoryUserStore>,
    pub channel: Arc<ScriptedChannel>,
    pub sender: Arc<RecordingSender>,
    pub synthesizer: Option<Arc<ScriptedSynthesizer>>,
    pub pipeline: Arc<ContentPipeline>,
    pub locks: LockRegistry,
    pub initial_sends: InitialSendTracker,
    pub shutdown: CancellationToken,
    pub health: HealthState,
    pub context: CycleContext,
    pub schedule: ScheduleSettings,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            users: Vec::new(),
            channel: ScriptedChannel::new(),
            synthesizer: None,
            messaging: false,
            channels: intel_channels(),
            pipeline: fast_pipeline(),
            schedule: fast_schedule(),
        }
    }

    pub fn user(&self, key: &str) -> UserRecord {
        self.store
            .get(key)
            .unwrap_or_else(|| panic!("user {} missing from store", key))
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Polls `condition` until it holds or [`WAIT_TIMEOUT`] elapses.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < WAIT_TIMEOUT {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
