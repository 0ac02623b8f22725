//! Xang is a terminal assistant that turns natural-language requests into
//! shell commands, or holds a streamed conversation, backed by Gemini.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the conversation engine: per-mode history, system
//!   prompts, the model client seam, output normalization, and the
//!   one-shot and streaming completion drivers.
//! - [`api`] defines the Gemini wire payloads used by the client.
//! - [`cli`] parses arguments and runs the one-shot mode or the REPL.
//! - [`run`] executes confirmed shell commands.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod run;
pub mod utils;
