//! Pivot Failover - Surviving writer re-election and reader loss
//!
//! When the active connection to a clustered database breaks, the handlers in
//! this crate find a replacement:
//!
//! - `WriterFailoverHandler` races a reconnect to the last known writer against
//!   a topology watch for a newly elected writer.
//! - `ReaderFailoverHandler` probes readers in priority order, falling back to
//!   the writer.
//!
//! Both return a `FailoverResult` and never raise; a result is only marked
//! connected when it carries a connection that completed a round trip.

mod attempt;
mod config;
mod reader;
mod result;
mod task;
mod writer;

#[cfg(test)]
mod test_support;

pub use config::FailoverConfig;
pub use reader::ReaderFailoverHandler;
pub use result::{
    FailoverResult, READER_FAILOVER_TASK, RECONNECT_TASK, TOPOLOGY_UPDATE_TASK,
    WRITER_FAILOVER_TASK,
};
pub use writer::WriterFailoverHandler;
