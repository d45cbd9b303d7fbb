//! # sentmetrics-graph
//!
//! Microsoft Graph adapter for `sentmetrics`.
//!
//! ## Features
//!
//! - **App-only authentication**: `OAuth2` client-credentials grant with a
//!   per-scope token cache
//! - **Mail access**: folder listing, paged folder messages, conversation heads
//! - **Resilience**: connect/request timeouts, retries with exponential
//!   backoff, pagination loop detection
//! - **Engine integration**: [`GraphClient`] implements
//!   [`sentmetrics_core::MessageSource`]
//!
//! ## Quick Start
//!
//! ```ignore
//! use sentmetrics_core::{EngagementEngine, EngineConfig, MessageSource};
//! use sentmetrics_graph::{GraphClient, GraphSettings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = GraphSettings::from_env().map_err(|e| e.join("; "))?;
//!     let client = GraphClient::new(settings, "sent items")?;
//!
//!     let mut sent = client.sent_messages("sales@acme.com").await?;
//!     let engine = EngagementEngine::new(client, EngineConfig::default());
//!     let snapshot = engine.classify(&mut sent, "sales@acme.com").await;
//!
//!     println!("reply rate: {:.2}", snapshot.reply_rate());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod client;
pub mod dto;
mod error;
pub mod settings;
pub mod token;

pub use client::GraphClient;
pub use dto::MailFolder;
pub use error::{Error, Result};
pub use settings::GraphSettings;
pub use token::{Token, TokenProvider};
