//! The command queue: FIFO of outgoing calls with at most one call on the
//! wire awaiting its reply.
//!
//! # Concurrency note
//!
//! `CommandQueue` is a plain struct with `&mut self` methods. The client
//! owns it behind a `tokio::sync::Mutex` and holds that lock across
//! [`pump`](CommandQueue::pump), so a reply can never be matched against
//! a call whose write has not finished.
//!
//! ```text
//! enqueue() ──→ [Pending] ──pump()──→ [Sent] ──acknowledge()──→ done
//!                   │                                ▲
//!                   └── no ack expected: done after the write
//! ```

use std::collections::VecDeque;

use dcslink_protocol::BoundCall;

use crate::{CommandSink, QueueError};

/// A call waiting to be queued: the bound call plus its encoded frame.
#[derive(Debug, Clone)]
pub struct PendingCommand {
    call: BoundCall,
    frame: Vec<u8>,
}

impl PendingCommand {
    /// Pairs a call with the bytes its codec produced for it.
    pub fn new(call: BoundCall, frame: Vec<u8>) -> Self {
        Self { call, frame }
    }
}

/// A call owned by the queue.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    /// Position in submission order, starting at 1.
    pub seq: u64,
    pub call: BoundCall,
    pub frame: Vec<u8>,
    /// Copied from the call when it was bound.
    pub expects_ack: bool,
}

impl QueueEntry {
    /// API id of the queued call.
    pub fn api_id(&self) -> u32 {
        self.call.api_id()
    }
}

/// FIFO of outgoing calls with a single in-flight slot.
#[derive(Debug)]
pub struct CommandQueue {
    pending: VecDeque<QueueEntry>,
    /// The call written to the wire and still waiting for its reply.
    in_flight: Option<QueueEntry>,
    capacity: Option<usize>,
    next_seq: u64,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    /// Creates an unbounded queue.
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: None,
            capacity: None,
            next_seq: 1,
        }
    }

    /// Creates a queue that holds at most `capacity` calls, counting the
    /// in-flight one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(capacity),
            capacity: Some(capacity),
            ..Self::new()
        }
    }

    /// Appends a call to the tail. Never writes to the wire.
    ///
    /// # Errors
    /// [`QueueError::Full`] if a bounded queue is at capacity.
    pub fn enqueue(&mut self, command: PendingCommand) -> Result<u64, QueueError> {
        if let Some(capacity) = self.capacity {
            if self.len() >= capacity {
                return Err(QueueError::Full { capacity });
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let expects_ack = command.call.expects_acknowledgment();
        tracing::debug!(seq, api_id = command.call.api_id(), expects_ack, "enqueued");
        self.pending.push_back(QueueEntry {
            seq,
            call: command.call,
            frame: command.frame,
            expects_ack,
        });
        Ok(seq)
    }

    /// Writes queued calls until one that expects a reply is in flight or
    /// the queue runs dry. Does nothing while a call is in flight.
    ///
    /// Returns the calls that were written and need no reply, which are
    /// complete as of this call.
    ///
    /// # Errors
    /// [`QueueError::SendFailed`] if a write fails. The failed call is
    /// dropped and later calls stay queued. Calls completed earlier in the
    /// same pump are handed back in the error.
    pub async fn pump<S: CommandSink>(
        &mut self,
        sink: &S,
    ) -> Result<Vec<QueueEntry>, QueueError> {
        let mut completed = Vec::new();
        while self.in_flight.is_none() {
            let Some(entry) = self.pending.pop_front() else {
                break;
            };

            if let Err(e) = sink.send(&entry.frame).await {
                tracing::warn!(seq = entry.seq, api_id = entry.api_id(), error = %e, "send failed");
                return Err(QueueError::SendFailed {
                    seq: entry.seq,
                    completed,
                    source: Box::new(e),
                });
            }
            tracing::debug!(seq = entry.seq, api_id = entry.api_id(), "sent");

            if entry.expects_ack {
                self.in_flight = Some(entry);
            } else {
                completed.push(entry);
            }
        }
        Ok(completed)
    }

    /// Completes the in-flight call and returns it. The next call is not
    /// sent until [`pump`](Self::pump) runs again.
    ///
    /// # Errors
    /// [`QueueError::NothingInFlight`] if no call is awaiting a reply.
    pub fn acknowledge(&mut self) -> Result<QueueEntry, QueueError> {
        let entry = self.in_flight.take().ok_or(QueueError::NothingInFlight)?;
        tracing::debug!(seq = entry.seq, api_id = entry.api_id(), "acknowledged");
        Ok(entry)
    }

    /// The call awaiting its reply, if any.
    pub fn in_flight(&self) -> Option<&QueueEntry> {
        self.in_flight.as_ref()
    }

    /// Number of calls not yet written.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Total number of calls held, in flight included.
    pub fn len(&self) -> usize {
        self.pending.len() + usize::from(self.in_flight.is_some())
    }

    /// Returns `true` if the queue holds no calls at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if nothing is in flight and nothing is pending.
    pub fn is_idle(&self) -> bool {
        self.is_empty()
    }

    /// Drops every call, in-flight first, and returns them in order.
    pub fn clear(&mut self) -> Vec<QueueEntry> {
        let dropped: Vec<QueueEntry> = self
            .in_flight
            .take()
            .into_iter()
            .chain(self.pending.drain(..))
            .collect();
        if !dropped.is_empty() {
            tracing::debug!(count = dropped.len(), "queue cleared");
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use dcslink_protocol::{AckPolicy, Catalog, Scalar};

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        frames: Mutex<Vec<Vec<u8>>>,
        /// Writes that succeed before every later one fails.
        fail_after: Option<usize>,
    }

    impl RecordingSink {
        fn failing_after(writes: usize) -> Self {
            Self {
                fail_after: Some(writes),
                ..Default::default()
            }
        }
    }

    impl CommandSink for RecordingSink {
        type Error = std::io::Error;

        async fn send(&self, frame: &[u8]) -> Result<(), Self::Error> {
            let mut frames = self.frames.lock().unwrap();
            if self.fail_after.is_some_and(|n| frames.len() >= n) {
                return Err(std::io::Error::other("boom"));
            }
            frames.push(frame.to_vec());
            Ok(())
        }
    }

    fn command(api_id: u32, policy: AckPolicy) -> PendingCommand {
        let api = Catalog::builtin().get(api_id).unwrap();
        let args: Vec<(String, Scalar)> = api
            .parameters
            .iter()
            .map(|p| (p.name.clone(), Scalar::Int(1)))
            .collect();
        let call = BoundCall::bind(api, args, policy).unwrap();
        let frame = call.render().unwrap().into_bytes();
        PendingCommand::new(call, frame)
    }

    #[tokio::test]
    async fn test_back_to_back_sends_only_one() {
        let sink = RecordingSink::default();
        let mut queue = CommandQueue::new();

        let a = queue.enqueue(command(17, AckPolicy::EveryCall)).unwrap();
        queue.pump(&sink).await.unwrap();
        let b = queue.enqueue(command(52, AckPolicy::EveryCall)).unwrap();
        queue.pump(&sink).await.unwrap();

        assert_eq!(sink.frames.lock().unwrap().len(), 1);
        assert_eq!(queue.in_flight().map(|e| e.seq), Some(a));
        assert_eq!(queue.pending(), 1);

        let done = queue.acknowledge().unwrap();
        assert_eq!(done.seq, a);
        queue.pump(&sink).await.unwrap();
        assert_eq!(queue.in_flight().map(|e| e.seq), Some(b));

        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames[1], b"LoGetWorldObjects()");
    }

    #[tokio::test]
    async fn test_fire_and_forget_does_not_hold_the_queue() {
        let sink = RecordingSink::default();
        let mut queue = CommandQueue::new();

        queue.enqueue(command(12, AckPolicy::DataCallsOnly)).unwrap();
        queue.enqueue(command(12, AckPolicy::DataCallsOnly)).unwrap();
        let data = queue.enqueue(command(17, AckPolicy::DataCallsOnly)).unwrap();
        queue.enqueue(command(12, AckPolicy::DataCallsOnly)).unwrap();

        let completed = queue.pump(&sink).await.unwrap();
        assert_eq!(completed.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(queue.in_flight().map(|e| e.seq), Some(data));
        assert_eq!(queue.pending(), 1);
        assert_eq!(sink.frames.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_acknowledge_when_idle_is_a_violation() {
        let mut queue = CommandQueue::new();
        assert!(matches!(queue.acknowledge(), Err(QueueError::NothingInFlight)));
    }

    #[test]
    fn test_bounded_queue_rejects_when_full() {
        let mut queue = CommandQueue::with_capacity(2);
        queue.enqueue(command(17, AckPolicy::EveryCall)).unwrap();
        queue.enqueue(command(17, AckPolicy::EveryCall)).unwrap();
        let err = queue.enqueue(command(17, AckPolicy::EveryCall)).unwrap_err();
        assert!(matches!(err, QueueError::Full { capacity: 2 }));
    }

    #[tokio::test]
    async fn test_send_failure_drops_only_that_command() {
        let failing = RecordingSink::failing_after(0);
        let mut queue = CommandQueue::new();
        let first = queue.enqueue(command(17, AckPolicy::EveryCall)).unwrap();
        queue.enqueue(command(52, AckPolicy::EveryCall)).unwrap();

        match queue.pump(&failing).await {
            Err(QueueError::SendFailed { seq, .. }) => assert_eq!(seq, first),
            other => panic!("expected send failure, got {other:?}"),
        }
        assert!(queue.in_flight().is_none());
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test]
    async fn test_send_failure_hands_back_calls_already_written() {
        let sink = RecordingSink::failing_after(2);
        let mut queue = CommandQueue::new();
        for _ in 0..4 {
            queue.enqueue(command(12, AckPolicy::DataCallsOnly)).unwrap();
        }

        match queue.pump(&sink).await {
            Err(QueueError::SendFailed { seq, completed, .. }) => {
                assert_eq!(seq, 3);
                let written: Vec<u64> = completed.iter().map(|e| e.seq).collect();
                assert_eq!(written, vec![1, 2]);
            }
            other => panic!("expected send failure, got {other:?}"),
        }
        assert_eq!(sink.frames.lock().unwrap().len(), 2);
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test]
    async fn test_clear_returns_everything_in_order() {
        let sink = RecordingSink::default();
        let mut queue = CommandQueue::new();
        for _ in 0..3 {
            queue.enqueue(command(17, AckPolicy::EveryCall)).unwrap();
        }
        queue.pump(&sink).await.unwrap();

        let dropped = queue.clear();
        assert_eq!(dropped.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(queue.is_idle());
    }
}
