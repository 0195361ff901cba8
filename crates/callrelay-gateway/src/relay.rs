//! Conversation relay: turns telephony speech callbacks into model turns and
//! TwiML replies.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use callrelay_core::config::{Config, VoiceConfig};
use callrelay_core::session::SessionStore;
use callrelay_core::types::{Message, SpeechEvent};
use callrelay_providers::{CompletionRequest, Credentials, LlmProvider};

use crate::metrics;
use crate::twiml::{Gather, Redirect, Say, VoiceResponse};

/// Path the call-start webhook is mounted on; also the no-input fallback.
pub const VOICE_PATH: &str = "/voice";
/// Path speech results are posted to.
pub const HANDLE_SPEECH_PATH: &str = "/handle-speech";

/// Per-turn parameters resolved from config once at startup.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub annotate_caller: bool,
    pub persist_apology: bool,
    pub voice: VoiceConfig,
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model(),
            max_tokens: config.max_tokens(),
            temperature: config.temperature(),
            annotate_caller: config.annotate_caller(),
            persist_apology: config.persist_apology(),
            voice: config.voice(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct ConversationRelay {
    settings: RelaySettings,
    sessions: Arc<dyn SessionStore>,
    provider: Arc<dyn LlmProvider>,
    credentials: Credentials,
}

impl ConversationRelay {
    pub fn new(
        settings: RelaySettings,
        sessions: Arc<dyn SessionStore>,
        provider: Arc<dyn LlmProvider>,
        credentials: Credentials,
    ) -> Self {
        Self {
            settings,
            sessions,
            provider,
            credentials,
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Greet the caller and listen for the first utterance.
    pub fn start_call(&self, call_sid: Option<&str>) -> VoiceResponse {
        info!(call_sid = call_sid.unwrap_or("-"), "Call started");
        metrics::record_call_start();
        self.listen(&self.settings.voice.greeting)
    }

    /// Run one conversational turn for a recognized utterance.
    ///
    /// Blank or missing transcripts produce the reprompt document without
    /// touching any session. Model failures are spoken as the apology.
    pub async fn handle_speech(&self, event: &SpeechEvent) -> VoiceResponse {
        let Some(utterance) = event.utterance() else {
            debug!(call_sid = ?event.call_sid, "No speech recognized, reprompting");
            metrics::record_reprompt();
            return self.reprompt();
        };
        let Some(call_sid) = event.call_sid.as_deref().filter(|s| !s.is_empty()) else {
            warn!("Speech result without CallSid, reprompting");
            metrics::record_reprompt();
            return self.reprompt();
        };

        debug!(call_sid, utterance, "Caller said");
        metrics::record_speech_turn();

        let handle = self.sessions.get_or_create(call_sid).await;
        // Held across the completion so turns for one call never interleave
        let mut session = handle.lock().await;
        session.append(Message::user(
            self.user_content(utterance, event.caller.as_deref()),
        ));

        let request = CompletionRequest {
            model: self.settings.model.clone(),
            messages: session.messages().to_vec(),
            max_tokens: self.settings.max_tokens,
            temperature: Some(self.settings.temperature),
        };

        let started = Instant::now();
        let result = self.provider.complete(&request, &self.credentials).await;
        metrics::record_completion(started.elapsed().as_secs_f64());

        let reply = match result {
            Ok(completion) => {
                session.append(Message::assistant(completion.text.clone()));
                completion.text
            }
            Err(e) => {
                error!(call_sid, error = %e, "Completion failed");
                metrics::record_provider_error();
                let apology = self.settings.voice.apology.clone();
                if self.settings.persist_apology {
                    session.append(Message::assistant(apology.clone()));
                }
                apology
            }
        };

        debug!(call_sid, history = session.len(), turns = session.turns(), "Turn complete");
        drop(session);
        metrics::set_active_calls(self.sessions.len().await);

        self.listen(&reply)
    }

    /// Forget a call. Unknown or missing ids are a no-op.
    pub async fn end_call(&self, call_sid: Option<&str>) -> bool {
        let Some(call_sid) = call_sid.filter(|s| !s.is_empty()) else {
            return false;
        };
        let Some(handle) = self.sessions.remove(call_sid).await else {
            return false;
        };
        match handle.try_lock() {
            Ok(session) => info!(
                call_sid,
                turns = session.turns(),
                duration_secs = session.age().num_seconds(),
                "Call completed, session cleared"
            ),
            Err(_) => info!(call_sid, "Call completed mid-turn, session cleared"),
        }
        metrics::set_active_calls(self.sessions.len().await);
        true
    }

    fn user_content(&self, utterance: &str, caller: Option<&str>) -> String {
        match caller.filter(|c| self.settings.annotate_caller && !c.is_empty()) {
            Some(caller) => format!("[Caller {caller}] {utterance}"),
            None => utterance.to_string(),
        }
    }

    fn say(&self, text: &str) -> Say {
        Say::new(text).voice(self.settings.voice.voice.as_str())
    }

    /// Speak `text` inside a speech gather, falling back to the greeting if
    /// nothing is heard.
    fn listen(&self, text: &str) -> VoiceResponse {
        let voice = &self.settings.voice;
        VoiceResponse::new()
            .gather(
                Gather::speech(HANDLE_SPEECH_PATH)
                    .speech_timeout(voice.speech_timeout.as_str())
                    .language(voice.language.as_str())
                    .say(self.say(text)),
            )
            .redirect(Redirect::post(VOICE_PATH))
    }

    fn reprompt(&self) -> VoiceResponse {
        VoiceResponse::new()
            .say(self.say(&self.settings.voice.reprompt))
            .redirect(Redirect::post(VOICE_PATH))
    }
}
