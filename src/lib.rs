//! Daybook — a local-first background agent that turns inbound email from
//! multiple Gmail and Outlook accounts into an auditable, stress-aware daily
//! schedule on a dedicated managed calendar, steered by chat-style slash
//! commands (`today`, `add`, `move`, `undo`).
//!
//! Every mutation of external state is deterministic, idempotent, and
//! reversible; an LLM may propose but never mutate.
#![allow(missing_docs)] // TODO: enforce once core types are stable

pub mod apply;
pub mod calendar;
pub mod chat;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod parser;
pub mod planner;
pub mod providers;
pub mod rules;
pub mod store;
pub mod types;
