//! # Adaptive RAG
//!
//! An adaptive routing and retrieval orchestration engine.
//!
//! Each query is routed at run time to the knowledge source most likely to
//! answer it (a proprietary vector store, Wikipedia, or the open web),
//! evidence is retrieved through a uniform adapter interface with a single
//! fallback, and a cited answer is synthesized. Every external dependency
//! has a simulated twin, so the same orchestration runs deterministically
//! when credentials are absent.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!   QueryRequest ─▶ Orchestrator ├──────────────────────────┐
//!                 └──┬────────┬──┘                          │
//!                    ▼        ▼                             ▼
//!            ┌──────────┐ ┌──────────────────────┐  ┌──────────────┐
//!            │ Routing  │ │   AdapterRegistry    │  │ Synthesizer  │
//!            │ LLM or   │ │ vector │ wiki │ web  │  │ LLM or       │
//!            │ heuristic│ └──────────────────────┘  │ template     │
//!            └──────────┘     live | simulated      └──────────────┘
//!                    ▲                ▲                    ▲
//!                    └──── CapabilityState (resolved once) ┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! arag status                                   # live/mock per dependency
//! arag query "What are the types of agent memory?"
//! arag query "Who is Elon Musk?" --json
//! arag serve                                    # HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment credentials |
//! | [`capability`] | Mock/live resolution per dependency |
//! | [`models`] | Requests, decisions, results, responses |
//! | [`error`] | Adapter and orchestration error kinds |
//! | [`corpus`] | Built-in seed knowledge base |
//! | [`embedding`] | Embedding providers |
//! | [`store`] | Vector index backends |
//! | [`adapters`] | Source adapters and their registry |
//! | [`llm`] | Chat completions client |
//! | [`routing`] | Routing decision engine |
//! | [`synthesis`] | Answer synthesis |
//! | [`metrics`] | Per-run metrics and aggregate analytics |
//! | [`orchestrator`] | The per-query state machine |
//! | [`server`] | HTTP API |
//! | [`logging`] | Tracing subscriber setup |

pub mod adapters;
pub mod capability;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod routing;
pub mod server;
pub mod store;
pub mod synthesis;
