//! In-process stand-ins for the outbound collaborators.

use async_trait::async_trait;
use digest_worker::clients::{
    AgentChannel, ChannelRef, ChatMessage, ClientError, InsightSynthesizer, MessageSender,
    SynthesisInput,
};
use digest_worker::model::Category;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// How the scripted agent answers a prompt.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// The agent never answers.
    Silent,
    /// The submit call itself fails.
    Fail,
}

/// Agent channel that answers prompts from a list of rules.
///
/// The first rule whose needle appears in the prompt decides the reply;
/// without a match the agent answers "Report on <prompt>".
#[derive(Default)]
pub struct ScriptedChannel {
    histories: Mutex<HashMap<ChannelRef, Vec<ChatMessage>>>,
    prompts: Mutex<Vec<(ChannelRef, String)>>,
    rules: Mutex<Vec<(String, Reply)>>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when(self, needle: &str, reply: Reply) -> Self {
        self.rules.lock().unwrap().push((needle.to_string(), reply));
        self
    }

    pub fn prompts(&self) -> Vec<(ChannelRef, String)> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn reply_for(&self, prompt: &str) -> Reply {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Reply::Text(format!("Report on {}", prompt)))
    }
}

#[async_trait]
impl AgentChannel for ScriptedChannel {
    async fn submit(&self, channel: &ChannelRef, prompt: &str) -> Result<(), ClientError> {
        self.prompts
            .lock()
            .unwrap()
            .push((channel.clone(), prompt.to_string()));

        let reply = self.reply_for(prompt);
        if let Reply::Fail = reply {
            return Err(ClientError::Api {
                status: 503,
                message: "agent unavailable".to_string(),
            });
        }

        let mut histories = self.histories.lock().unwrap();
        let history = histories.entry(channel.clone()).or_default();
        history.push(ChatMessage::user(prompt));
        if let Reply::Text(text) = reply {
            history.push(ChatMessage::agent(text));
        }
        Ok(())
    }

    async fn collect(&self, channel: &ChannelRef) -> Result<Vec<ChatMessage>, ClientError> {
        Ok(self
            .histories
            .lock()
            .unwrap()
            .get(channel)
            .cloned()
            .unwrap_or_default())
    }
}

/// Messaging agent that records every message it is asked to send.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(ChannelRef, String)>>,
    fail_all: std::sync::atomic::AtomicBool,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn channels(&self) -> Vec<ChannelRef> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(channel, _)| channel.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, channel: &ChannelRef, text: &str) -> Result<(), ClientError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(ClientError::Timeout);
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel.clone(), text.to_string()));
        Ok(())
    }
}

/// Insight model that answers "Insight for <Label>" unless told otherwise.
#[derive(Default)]
pub struct ScriptedSynthesizer {
    overrides: Mutex<HashMap<Category, Reply>>,
    inputs: Mutex<Vec<SynthesisInput>>,
    calls: AtomicUsize,
}

impl ScriptedSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, category: Category, reply: Reply) -> Self {
        self.overrides.lock().unwrap().insert(category, reply);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<SynthesisInput> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl InsightSynthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, input: &SynthesisInput) -> Result<String, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input.clone());

        let reply = self.overrides.lock().unwrap().get(&input.category).cloned();
        match reply {
            None => Ok(format!("Insight for {}", input.category.label())),
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Silent) => Ok(String::new()),
            Some(Reply::Fail) => Err(ClientError::Blocked("SAFETY".to_string())),
        }
    }
}
