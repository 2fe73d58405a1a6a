//! Tether: streaming protocol adapter for remote agents.
//!
//! Sends a conversation to an AG-UI agent endpoint, decodes the streamed
//! response into normalized [`adapter::AdapterEvent`]s, and batches local
//! tool results into a single continuation request per run.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether::prelude::*;
//!
//! # async fn example() -> tether::error::Result<()> {
//! let config = TetherConfig::new("http://localhost:8000/api/agent/run");
//! let adapter = create_adapter(config, AdapterOptions::default())?;
//! let _sub = adapter.subscribe(Arc::new(|event: &AdapterEvent| {
//!     if let AdapterEvent::Message { content, .. } = event {
//!         println!("{content}");
//!     }
//! }));
//! adapter.connect().await?;
//! adapter
//!     .send_message(Message::user("Hello!"), SendOptions::default())
//!     .await?;
//! adapter.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod prelude;
pub mod protocol;
pub mod tools;
pub mod transport;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;
