use std::sync::Arc;

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, response::Response, routing::post,
    Json, Router,
};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use deskbot_agent::runtime::AgentService;
use deskbot_slack::client::ReplyDispatcher;
use deskbot_slack::dedup::DedupCache;
use deskbot_slack::events::{classify, EventsPayload, Gate, InboundMessage};

/// Everything the webhook path needs, built once at bootstrap. The dedup
/// cache is the only shared mutable state.
#[derive(Clone)]
pub struct GatewayState {
    pub agent: Arc<dyn AgentService>,
    pub replies: Arc<dyn ReplyDispatcher>,
    pub dedup: Arc<DedupCache>,
}

pub fn router(state: GatewayState) -> Router {
    Router::new().route("/slack/events", post(slack_events)).with_state(state)
}

/// One inbound delivery from the Slack Events API.
///
/// The handshake is answered synchronously and first. Everything else is
/// acknowledged with an empty 200 immediately; agent invocation and reply
/// dispatch happen on a spawned task so Slack never waits on the LLM and
/// never retries a slow response.
async fn slack_events(
    State(state): State<GatewayState>,
    Json(payload): Json<EventsPayload>,
) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    match classify(&payload) {
        Gate::Handshake(challenge) => {
            info!(
                event_name = "gateway.handshake",
                correlation_id = %correlation_id,
                "answering url_verification challenge"
            );
            (StatusCode::OK, Json(json!({ "challenge": challenge }))).into_response()
        }
        Gate::Discard(reason) => {
            info!(
                event_name = "gateway.event.discarded",
                correlation_id = %correlation_id,
                reason = reason.as_str(),
                "event discarded"
            );
            StatusCode::OK.into_response()
        }
        Gate::Message(message) => {
            // Fingerprint is recorded before any async work so a
            // near-simultaneous redelivery cannot pass the check twice.
            if !state.dedup.insert(&message.fingerprint) {
                info!(
                    event_name = "gateway.event.duplicate",
                    correlation_id = %correlation_id,
                    fingerprint = %message.fingerprint,
                    "duplicate event dropped"
                );
                return StatusCode::OK.into_response();
            }

            let state = state.clone();
            tokio::spawn(async move {
                process_message(state, message, correlation_id).await;
            });

            StatusCode::OK.into_response()
        }
    }
}

/// Runs after the platform has been acknowledged. Every failure ends here as
/// a log line; nothing is surfaced to Slack and nothing is retried.
async fn process_message(state: GatewayState, message: InboundMessage, correlation_id: String) {
    info!(
        event_name = "gateway.event.forwarded",
        correlation_id = %correlation_id,
        channel = %message.channel,
        "forwarding message to agent"
    );

    let reply = match state.agent.respond(&message.text).await {
        Ok(reply) => reply,
        Err(agent_error) => {
            error!(
                event_name = "gateway.agent.failed",
                correlation_id = %correlation_id,
                error = %agent_error,
                "agent invocation failed"
            );
            return;
        }
    };

    if reply.trim().is_empty() {
        info!(
            event_name = "gateway.reply.empty",
            correlation_id = %correlation_id,
            "agent produced no reply; nothing to post"
        );
        return;
    }

    if let Err(dispatch_error) = state.replies.post(&message.channel, &reply).await {
        error!(
            event_name = "gateway.reply.failed",
            correlation_id = %correlation_id,
            channel = %message.channel,
            error = %dispatch_error,
            "failed to post reply"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use deskbot_agent::runtime::AgentService;
    use deskbot_slack::client::{DispatchError, ReplyDispatcher};
    use deskbot_slack::dedup::DedupCache;

    use super::{router, GatewayState};

    struct FakeAgent {
        calls: Arc<Mutex<Vec<String>>>,
        tx: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl AgentService for FakeAgent {
        async fn respond(&self, text: &str) -> Result<String> {
            self.calls.lock().unwrap().push(text.to_string());
            let _ = self.tx.send(text.to_string());
            Ok("Here is your reset link: https://example.okta.com/reset/XE6wE".to_string())
        }
    }

    struct FakeDispatcher {
        tx: mpsc::UnboundedSender<(String, String)>,
    }

    #[async_trait]
    impl ReplyDispatcher for FakeDispatcher {
        async fn post(&self, channel: &str, text: &str) -> Result<(), DispatchError> {
            let _ = self.tx.send((channel.to_string(), text.to_string()));
            Ok(())
        }
    }

    struct Harness {
        router: axum::Router,
        agent_calls: Arc<Mutex<Vec<String>>>,
        agent_rx: mpsc::UnboundedReceiver<String>,
        post_rx: mpsc::UnboundedReceiver<(String, String)>,
    }

    fn harness() -> Harness {
        let (agent_tx, agent_rx) = mpsc::unbounded_channel();
        let (post_tx, post_rx) = mpsc::unbounded_channel();
        let agent_calls = Arc::new(Mutex::new(Vec::new()));

        let state = GatewayState {
            agent: Arc::new(FakeAgent { calls: Arc::clone(&agent_calls), tx: agent_tx }),
            replies: Arc::new(FakeDispatcher { tx: post_tx }),
            dedup: Arc::new(DedupCache::new(Duration::from_secs(300))),
        };

        Harness { router: router(state), agent_calls, agent_rx, post_rx }
    }

    fn events_request(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/slack/events")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn message_body(ts: &str, channel: &str, text: &str) -> Value {
        json!({
            "type": "event_callback",
            "event": { "type": "message", "text": text, "channel": channel, "ts": ts }
        })
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn handshake_echoes_the_exact_challenge() {
        let harness = harness();
        let body = json!({
            "type": "url_verification",
            "token": "ignored",
            "challenge": "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"
        });

        let response = harness.router.oneshot(events_request(&body)).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let reply = body_json(response).await;
        assert_eq!(reply["challenge"], body["challenge"]);
        assert!(harness.agent_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn message_event_is_acked_then_forwarded_and_replied() {
        let mut harness = harness();
        let request = events_request(&message_body("1.1", "C1", "help me reset my password"));

        let response = harness.router.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let forwarded =
            tokio::time::timeout(Duration::from_secs(1), harness.agent_rx.recv())
                .await
                .expect("agent should be invoked")
                .expect("channel open");
        assert_eq!(forwarded, "help me reset my password");

        let (channel, text) =
            tokio::time::timeout(Duration::from_secs(1), harness.post_rx.recv())
                .await
                .expect("reply should be posted")
                .expect("channel open");
        assert_eq!(channel, "C1");
        assert!(text.contains("https://"));
    }

    #[tokio::test]
    async fn duplicate_event_is_forwarded_at_most_once() {
        let mut harness = harness();
        let body = message_body("1.1", "C1", "help me reset my password");

        let first = harness.router.clone().oneshot(events_request(&body)).await.expect("first");
        let second = harness.router.clone().oneshot(events_request(&body)).await.expect("second");
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);

        tokio::time::timeout(Duration::from_secs(1), harness.agent_rx.recv())
            .await
            .expect("first delivery reaches the agent")
            .expect("channel open");

        let redelivery =
            tokio::time::timeout(Duration::from_millis(200), harness.agent_rx.recv()).await;
        assert!(redelivery.is_err(), "duplicate must not reach the agent");
        assert_eq!(harness.agent_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn distinct_channels_are_not_duplicates_of_each_other() {
        let mut harness = harness();

        for channel in ["C1", "C2"] {
            let body = message_body("1.1", channel, "hello");
            harness.router.clone().oneshot(events_request(&body)).await.expect("response");
        }

        for _ in 0..2 {
            tokio::time::timeout(Duration::from_secs(1), harness.agent_rx.recv())
                .await
                .expect("both events reach the agent")
                .expect("channel open");
        }
    }

    #[tokio::test]
    async fn bot_events_are_never_forwarded() {
        let harness = harness();
        let body = json!({
            "type": "event_callback",
            "event": {
                "type": "message", "text": "reset everything", "channel": "C1",
                "ts": "1.2", "bot_id": "B042"
            }
        });

        let response = harness.router.oneshot(events_request(&body)).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(harness.agent_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn app_mention_text_is_stripped_before_forwarding() {
        let mut harness = harness();
        let body = json!({
            "type": "event_callback",
            "event": {
                "type": "app_mention", "text": "<@U123ABC> reset my password",
                "channel": "C1", "ts": "1.3"
            }
        });

        harness.router.oneshot(events_request(&body)).await.expect("response");

        let forwarded =
            tokio::time::timeout(Duration::from_secs(1), harness.agent_rx.recv())
                .await
                .expect("mention should be forwarded")
                .expect("channel open");
        assert_eq!(forwarded, "reset my password");
    }

    #[tokio::test]
    async fn unrecognized_payload_is_acked_and_ignored() {
        let harness = harness();

        let response =
            harness.router.oneshot(events_request(&json!({}))).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(harness.agent_calls.lock().unwrap().is_empty());
    }
}
