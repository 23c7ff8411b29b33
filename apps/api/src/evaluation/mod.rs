//! Evaluation pipeline: assemble -> extract -> build prompt -> invoke.
//! Every stage is stateless; the provider client in AppState is the only shared value.

pub mod assembler;
pub mod extractor;
pub mod handlers;
pub mod invoker;
pub mod models;
pub mod prompt_builder;
pub mod prompts;
