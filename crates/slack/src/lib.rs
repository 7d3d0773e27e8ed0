//! Slack Integration - Events API transport
//!
//! This crate provides the Slack-facing pieces of deskbot:
//! - **Events** (`events`) - wire model for the Events API webhook payload and
//!   the admission gate that filters handshakes, bot echoes, and textless
//!   events before anything reaches the agent
//! - **Dedup** (`dedup`) - in-memory fingerprint cache that drops redelivered
//!   events within a TTL window
//! - **Client** (`client`) - outbound `chat.postMessage` reply dispatcher
//!
//! # Architecture
//!
//! ```text
//! Slack Events webhook → classify() → DedupCache → Agent Runtime
//!                                                      ↓
//!                              chat.postMessage ← SlackClient
//! ```

pub mod client;
pub mod dedup;
pub mod events;
