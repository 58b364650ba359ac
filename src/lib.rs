//! Live event-streaming client for the ADARA neutron data acquisition protocol.
//!
//! The listener connects to a stream management service, decodes the
//! length-prefixed ADARA packet stream on a background task and accumulates
//! neutron events, beam monitor events and process-variable logs into an
//! [`EventBuffer`] that a consumer periodically drains.
//!
//! # Features
//!
//! - **Streaming decode**: partial packets are buffered across socket reads
//! - **Run lifecycle**: run boundaries are reported through [`LiveListener::run_status`]
//! - **Historical start**: data before the requested start time is filtered and
//!   variable values seen during the filtered window are replayed once it closes
//! - **Deferred errors**: background failures surface on the next foreground call
//!
//! ## Example
//!
//! ```rust,no_run
//! use adara_listener::{ListenerConfig, LiveListener, RunStatus, Timestamp};
//!
//! #[tokio::main]
//! async fn main() -> adara_listener::Result<()> {
//!     let mut listener = LiveListener::with_default_loader(ListenerConfig::default());
//!     listener.connect("127.0.0.1:31415").await?;
//!     listener.start(Timestamp::ZERO).await?;
//!
//!     loop {
//!         match listener.extract_data().await {
//!             Ok(buffer) => println!("{} events", buffer.total_events()),
//!             Err(e) if e.is_retryable() => continue,
//!             Err(e) => return Err(e),
//!         }
//!         if listener.run_status()? == RunStatus::EndRun {
//!             break;
//!         }
//!     }
//!     listener.stop().await
//! }
//! ```

pub mod buffer;
pub mod config;
pub mod descriptor;
mod driver;
mod error;
mod handlers;
pub mod instrument;
pub mod listener;
pub mod protocol;
pub mod registry;
pub mod replay;
pub mod run;
mod state;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;
mod xml_utils;

pub use buffer::{DetectorIndexMap, EventBuffer, TimeSeriesLog};
pub use config::ListenerConfig;
pub use error::*;
pub use instrument::{InstrumentLayout, InstrumentLoader, XmlInstrumentLoader};
pub use listener::LiveListener;
pub use protocol::{Packet, PacketBody, PacketCodec, PacketHeader};
pub use registry::{VariableInfo, VariableRegistry};
pub use types::*;
