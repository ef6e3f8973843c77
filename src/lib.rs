//! linksmith: rule-driven links for arbitrary documents
//!
//! A workspace declares, in a small configuration file, rules that turn
//! textual patterns into navigable links. Each rule names a handler that the
//! host application registers; the handler maps the matched text to a target
//! URI plus optional tooltip, description and buttons.
//!
//! # Overview
//!
//! - **Rules**: validated once per configuration load, kept per workspace root
//! - **Extraction**: scans a document against every eligible rule, in a
//!   deterministic order, isolating failures to the single match involved
//! - **Lazy resolution**: links that point at "the first occurrence of X in
//!   file Y" are only searched when activated
//! - **Buttons**: callback buttons are exchanged for one-shot tokens so that
//!   presentation layers only ever see strings
//!
//! # Architecture
//!
//! - [`schema`]: validation of rule configurations and handler responses
//! - [`rules`]: compiled rules, the per-root store and config file loading
//! - [`path_filter`], [`scanner`]: which documents a rule sees, and where it matches
//! - [`handler`], [`extract`], [`resolve`], [`buttons`]: the link pipeline
//! - [`engine`]: [`LinkEngine`](engine::LinkEngine), the context handle hosts hold on to
//! - [`document_link`], [`hover`]: LSP conversions
//!
//! # Usage
//!
//! ```ignore
//! use linksmith::config::Settings;
//! use linksmith::diagnostics::LogSink;
//! use linksmith::engine::LinkEngine;
//! use linksmith::handler::HandlerRegistry;
//! use linksmith::rules::FileConfigLoader;
//!
//! let mut handlers = HandlerRegistry::new();
//! handlers.register_fn("jira", |ctx| {
//!     Ok(serde_json::json!({ "target": format!("https://jira.example.com/browse/{}", ctx.link_text()) }))
//! });
//!
//! let engine = LinkEngine::new(Settings::default(), handlers, Arc::new(LogSink));
//! engine.reload(&root, &FileConfigLoader).await;
//! let links = engine.extract_links(&document_path, &text, &root);
//! ```

// Rules and their inputs
pub mod config;
pub mod path_filter;
pub mod rules;
pub mod scanner;
pub mod schema;

// Link pipeline
pub mod buttons;
pub mod extract;
pub mod handler;
pub mod resolve;

// Host-facing surface
pub mod diagnostics;
pub mod document_link;
pub mod engine;
pub mod hover;

// Test utilities (only available in test builds)
#[cfg(test)]
pub mod test_utils;
