use serde::Deserialize;

/// Outer envelope of an Events API delivery. Every field except `type` is
/// optional on the wire; unknown payloads classify as discards, never as
/// deserialization failures.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct EventsPayload {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub challenge: Option<String>,
    pub event: Option<CallbackEvent>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CallbackEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub subtype: Option<String>,
    pub text: Option<String>,
    pub channel: Option<String>,
    pub client_msg_id: Option<String>,
    pub ts: Option<String>,
    pub bot_id: Option<String>,
}

/// A human-authored message that passed the gate, ready for the agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub channel: String,
    pub text: String,
    /// Dedup key: message id (or timestamp) joined with the channel.
    pub fingerprint: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Gate {
    /// `url_verification` challenge; echo it back verbatim, no side effects.
    Handshake(String),
    Message(InboundMessage),
    Discard(DiscardReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    BotOriginated,
    UnsupportedType,
    NoText,
    Malformed,
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BotOriginated => "bot_originated",
            Self::UnsupportedType => "unsupported_type",
            Self::NoText => "no_text",
            Self::Malformed => "malformed",
        }
    }
}

/// Admission gate for one inbound delivery. Handshake detection runs first;
/// everything else resolves to exactly one terminal outcome.
pub fn classify(payload: &EventsPayload) -> Gate {
    if payload.kind == "url_verification" {
        return Gate::Handshake(payload.challenge.clone().unwrap_or_default());
    }

    let Some(event) = payload.event.as_ref() else {
        return Gate::Discard(DiscardReason::Malformed);
    };

    if event.bot_id.is_some() || event.subtype.as_deref() == Some("bot_message") {
        return Gate::Discard(DiscardReason::BotOriginated);
    }

    // Subtyped messages (message_changed, channel_topic, ...) are platform
    // bookkeeping, not new human-authored messages.
    if event.subtype.is_some() {
        return Gate::Discard(DiscardReason::UnsupportedType);
    }

    let mention = match event.kind.as_str() {
        "message" => false,
        "app_mention" => true,
        _ => return Gate::Discard(DiscardReason::UnsupportedType),
    };

    let Some(channel) = event.channel.as_deref().filter(|channel| !channel.is_empty()) else {
        return Gate::Discard(DiscardReason::Malformed);
    };
    let Some(event_id) = event.client_msg_id.as_deref().or(event.ts.as_deref()) else {
        return Gate::Discard(DiscardReason::Malformed);
    };

    let raw_text = event.text.as_deref().unwrap_or_default();
    let text = if mention { strip_leading_mention(raw_text) } else { raw_text }.trim();
    if text.is_empty() {
        return Gate::Discard(DiscardReason::NoText);
    }

    Gate::Message(InboundMessage {
        channel: channel.to_string(),
        text: text.to_string(),
        fingerprint: format!("{event_id}:{channel}"),
    })
}

/// Removes the addressed-to token (`<@U123ABC>`) that prefixes `app_mention`
/// text. Only a leading token is stripped; mid-text mentions stay.
fn strip_leading_mention(text: &str) -> &str {
    let trimmed = text.trim_start();
    if let Some(rest) = trimmed.strip_prefix("<@") {
        if let Some(end) = rest.find('>') {
            return &rest[end + 1..];
        }
    }
    trimmed
}
