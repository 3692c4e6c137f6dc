//! Scheduler errors

use thiserror::Error;

use super::manifest::Query;
use crate::capability::CapabilityError;
use crate::link::LinkError;

/// Fatal polling errors. The poller stops on the first one and hands it to
/// the runtime supervisor.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Query '{query}' failed: {source}")]
    QueryFault {
        query: Query,
        #[source]
        source: LinkError,
    },

    #[error("Could not determine supported parameters: {0}")]
    CapabilityUnavailable(#[from] CapabilityError),

    #[error("Acquisition task '{task}' panicked: {message}")]
    TaskPanicked { task: &'static str, message: String },
}
