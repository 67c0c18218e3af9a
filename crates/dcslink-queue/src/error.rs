//! Error types for the command queue.

/// Errors raised by [`CommandQueue`](crate::CommandQueue).
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// `acknowledge` was called while no command was awaiting a reply.
    #[error("no command is awaiting acknowledgment")]
    NothingInFlight,

    /// A bounded queue is at capacity.
    #[error("command queue is full ({capacity} commands)")]
    Full { capacity: usize },

    /// Writing command `seq` failed. The command has been dropped.
    #[error("sending command #{seq} failed: {source}")]
    SendFailed {
        seq: u64,
        /// Calls the same pump wrote before the failure that need no
        /// reply. They went out and are complete.
        completed: Vec<crate::QueueEntry>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
