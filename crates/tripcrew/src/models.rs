//! These models represent the objects passed around by the conversation
//!
//! There are a few formats we need to interact with:
//! - transcript messages, produced by agents and the tool side-channel
//! - openai-compatible chat messages/tools, sent from the executor to the LLM
//! - tool requests, sent from the executor to the tool registry
//!
//! We always immediately convert the wire formats into the internal structs using to/from
//! helpers, so the orchestration logic only ever sees these types.
pub mod message;
pub mod role;
pub mod tool;
