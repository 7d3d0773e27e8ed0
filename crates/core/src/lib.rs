//! Shared foundation for deskbot.
//!
//! Currently this is the configuration layer: typed settings for the Slack
//! transport, the Okta tenant, the LLM endpoint, and the HTTP server, loaded
//! from defaults, an optional `deskbot.toml`, and `DESKBOT_*` environment
//! overrides.

pub mod config;
