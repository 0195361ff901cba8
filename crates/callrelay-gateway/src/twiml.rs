//! TwiML voice-response documents.
//!
//! Only the verbs the relay needs are modelled: `<Say>`, `<Gather>` (speech
//! input with nested prompts) and `<Redirect>`.

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

/// Speak text to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Say {
    pub text: String,
    pub voice: Option<String>,
    pub language: Option<String>,
}

impl Say {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: None,
            language: None,
        }
    }

    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }
}

/// Collect one speech utterance and post the transcript to `action`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gather {
    pub input: String,
    pub action: String,
    pub method: String,
    pub speech_timeout: Option<String>,
    pub language: Option<String>,
    pub prompts: Vec<Say>,
}

impl Gather {
    pub fn speech(action: impl Into<String>) -> Self {
        Self {
            input: "speech".into(),
            action: action.into(),
            method: "POST".into(),
            speech_timeout: None,
            language: None,
            prompts: Vec::new(),
        }
    }

    pub fn speech_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.speech_timeout = Some(timeout.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn say(mut self, say: Say) -> Self {
        self.prompts.push(say);
        self
    }
}

/// Transfer control to another TwiML URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub url: String,
    pub method: String,
}

impl Redirect {
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "POST".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Say(Say),
    Gather(Gather),
    Redirect(Redirect),
}

/// An ordered `<Response>` document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, say: Say) -> Self {
        self.verbs.push(Verb::Say(say));
        self
    }

    pub fn gather(mut self, gather: Gather) -> Self {
        self.verbs.push(Verb::Gather(gather));
        self
    }

    pub fn redirect(mut self, redirect: Redirect) -> Self {
        self.verbs.push(Verb::Redirect(redirect));
        self
    }

    pub fn verbs(&self) -> &[Verb] {
        &self.verbs
    }

    /// Every spoken sentence in document order, including gather prompts.
    pub fn spoken_text(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for verb in &self.verbs {
            match verb {
                Verb::Say(say) => out.push(say.text.as_str()),
                Verb::Gather(gather) => {
                    out.extend(gather.prompts.iter().map(|s| s.text.as_str()));
                }
                Verb::Redirect(_) => {}
            }
        }
        out
    }

    /// Serialize to a TwiML XML string.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("Response")))?;
        for verb in &self.verbs {
            write_verb(&mut writer, verb)?;
        }
        writer.write_event(Event::End(BytesEnd::new("Response")))?;
        Ok(String::from_utf8(writer.into_inner())?)
    }
}

fn write_say(writer: &mut Writer<Vec<u8>>, say: &Say) -> anyhow::Result<()> {
    let mut start = BytesStart::new("Say");
    if let Some(voice) = &say.voice {
        start.push_attribute(("voice", voice.as_str()));
    }
    if let Some(language) = &say.language {
        start.push_attribute(("language", language.as_str()));
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(&say.text)))?;
    writer.write_event(Event::End(BytesEnd::new("Say")))?;
    Ok(())
}

fn write_verb(writer: &mut Writer<Vec<u8>>, verb: &Verb) -> anyhow::Result<()> {
    match verb {
        Verb::Say(say) => write_say(writer, say)?,
        Verb::Gather(gather) => {
            let mut start = BytesStart::new("Gather");
            start.push_attribute(("input", gather.input.as_str()));
            start.push_attribute(("action", gather.action.as_str()));
            start.push_attribute(("method", gather.method.as_str()));
            if let Some(timeout) = &gather.speech_timeout {
                start.push_attribute(("speechTimeout", timeout.as_str()));
            }
            if let Some(language) = &gather.language {
                start.push_attribute(("language", language.as_str()));
            }
            writer.write_event(Event::Start(start))?;
            for say in &gather.prompts {
                write_say(writer, say)?;
            }
            writer.write_event(Event::End(BytesEnd::new("Gather")))?;
        }
        Verb::Redirect(redirect) => {
            let mut start = BytesStart::new("Redirect");
            start.push_attribute(("method", redirect.method.as_str()));
            writer.write_event(Event::Start(start))?;
            writer.write_event(Event::Text(BytesText::new(&redirect.url)))?;
            writer.write_event(Event::End(BytesEnd::new("Redirect")))?;
        }
    }
    Ok(())
}
