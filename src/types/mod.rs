//! Core value types shared by the codec, the buffer and the listener.
//!
//! - [`Timestamp`] is the pulse clock (EPICS epoch) used by every packet header
//! - [`EventRecord`] is one detected neutron or monitor hit
//! - [`LogValueType`] and [`LogValue`] describe time-series log samples
//! - [`RunStatus`] is the run lifecycle reported to consumers

mod event;
mod run_status;
mod timestamp;
mod variable_type;

pub use event::EventRecord;
pub use run_status::RunStatus;
pub use timestamp::{EPICS_EPOCH_OFFSET, Timestamp};
pub use variable_type::{LogValue, LogValueType};
