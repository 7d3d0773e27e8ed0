//! Agent Runtime - LLM-driven helpdesk orchestration
//!
//! This crate is the "brain" binding of deskbot: it hands the user's message
//! to an externally hosted LLM together with a declared set of identity
//! operations, executes the tool calls the model requests, and returns the
//! model's final natural-language reply.
//!
//! # Architecture
//!
//! 1. **Chat client** (`llm`) - OpenAI-compatible chat-completions wire layer
//! 2. **Tools** (`tools`) - registry of the eight Okta operations with typed
//!    JSON argument/result shapes
//! 3. **Loop** (`runtime`) - bounded call/execute/feed-back iteration
//!
//! # Safety Principle
//!
//! The LLM decides *which* declared operation to invoke and with what
//! arguments; it never gets an open-ended capability. A failed tool call is
//! fed back as the tool result so the model can narrate the failure instead
//! of aborting the conversation.

pub mod llm;
pub mod runtime;
pub mod tools;
