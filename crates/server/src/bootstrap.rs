use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use deskbot_agent::llm::LlmClient;
use deskbot_agent::runtime::AgentRuntime;
use deskbot_agent::tools::identity_tools;
use deskbot_core::config::{AppConfig, ConfigError, LoadOptions};
use deskbot_okta::OktaClient;
use deskbot_slack::client::SlackClient;
use deskbot_slack::dedup::DedupCache;

use crate::gateway::GatewayState;

pub struct Application {
    pub config: AppConfig,
    pub gateway: GatewayState,
    pub dedup_sweeper: tokio::task::JoinHandle<()>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    Ok(bootstrap_with_config(config).await)
}

pub async fn bootstrap_with_config(config: AppConfig) -> Application {
    info!(
        event_name = "system.bootstrap.start",
        okta_configured = config.okta.org_url.is_some(),
        llm_configured = config.llm.api_key.is_some(),
        "starting application bootstrap"
    );

    let okta = Arc::new(OktaClient::new(
        config.okta.org_url.clone(),
        config.okta.api_token.clone(),
    ));
    let agent = AgentRuntime::new(LlmClient::new(config.llm.clone()), identity_tools(okta));
    let replies = SlackClient::new(config.slack.bot_token.clone());

    let dedup = Arc::new(DedupCache::new(Duration::from_secs(config.slack.dedup_ttl_secs)));
    let dedup_sweeper = dedup.spawn_sweeper();

    info!(
        event_name = "system.bootstrap.ready",
        dedup_ttl_secs = config.slack.dedup_ttl_secs,
        "application wired"
    );

    Application {
        config,
        gateway: GatewayState { agent: Arc::new(agent), replies: Arc::new(replies), dedup },
        dedup_sweeper,
    }
}

#[cfg(test)]
mod tests {
    use deskbot_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_without_the_bot_token() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                slack_bot_token: Some(String::new()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("missing token must fail").to_string();
        assert!(message.contains("slack.bot_token"));
    }

    #[tokio::test]
    async fn bootstrap_wires_the_gateway_with_valid_overrides() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                slack_bot_token: Some("xoxb-test".to_string()),
                dedup_ttl_secs: Some(60),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed");

        assert_eq!(app.config.slack.dedup_ttl_secs, 60);
        assert!(app.gateway.dedup.is_empty());
        app.dedup_sweeper.abort();
    }
}
