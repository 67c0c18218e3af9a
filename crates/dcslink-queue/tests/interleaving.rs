//! Randomized and socket-backed checks of the single-in-flight rule.

use std::sync::Mutex;
use std::time::Duration;

use dcslink_protocol::{
    AckPolicy, BoundCall, Catalog, Codec, LineCodec, Scalar,
};
use dcslink_queue::{CommandQueue, CommandSink, PendingCommand, QueueError};
use dcslink_transport::{TcpTransport, event_channel};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

/// Records every frame and tracks how many ack-expecting calls are on the
/// wire without a reply.
#[derive(Default)]
struct Wire {
    frames: Mutex<Vec<Vec<u8>>>,
}

impl CommandSink for Wire {
    type Error = std::io::Error;

    async fn send(&self, frame: &[u8]) -> Result<(), Self::Error> {
        self.frames.lock().unwrap().push(frame.to_vec());
        Ok(())
    }
}

fn command(api_id: u32, policy: AckPolicy) -> PendingCommand {
    let api = Catalog::builtin().get(api_id).unwrap();
    let args: Vec<(String, Scalar)> = api
        .parameters
        .iter()
        .map(|p| (p.name.clone(), Scalar::Int(3)))
        .collect();
    let call = BoundCall::bind(api, args, policy).unwrap();
    let frame = LineCodec.encode(&call).unwrap();
    PendingCommand::new(call, frame)
}

#[tokio::test]
async fn test_random_interleaving_keeps_one_in_flight() {
    // Mix of data calls and fire-and-forget commands.
    const APIS: [u32; 5] = [17, 52, 10, 12, 13];

    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let policy = if seed % 2 == 0 {
            AckPolicy::EveryCall
        } else {
            AckPolicy::DataCallsOnly
        };
        let wire = Wire::default();
        let mut queue = CommandQueue::new();
        let mut submitted = Vec::new();
        let mut finished = Vec::new();

        for _ in 0..200 {
            match rng.random_range(0..3) {
                0 => {
                    let api = APIS[rng.random_range(0..APIS.len())];
                    submitted.push(queue.enqueue(command(api, policy)).unwrap());
                }
                1 => {
                    let done = queue.pump(&wire).await.unwrap();
                    finished.extend(done.into_iter().map(|e| e.seq));
                }
                _ => match queue.acknowledge() {
                    Ok(entry) => {
                        assert!(entry.expects_ack);
                        finished.push(entry.seq);
                    }
                    Err(QueueError::NothingInFlight) => {}
                    Err(e) => panic!("seed {seed}: unexpected {e}"),
                },
            }

            // Everything written so far is either finished or the single
            // in-flight call.
            let written = wire.frames.lock().unwrap().len();
            let in_flight = usize::from(queue.in_flight().is_some());
            assert_eq!(written, finished.len() + in_flight, "seed {seed}");
        }

        // Completion order is submission order.
        assert_eq!(finished[..], submitted[..finished.len()], "seed {seed}");
    }
}

#[tokio::test]
async fn test_pump_writes_through_tcp_transport() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });

    let (tx, _rx) = event_channel();
    let transport = TcpTransport::new(tx);
    transport.connect("127.0.0.1", port).await.unwrap();
    let mut server = accept.await.unwrap();

    let mut queue = CommandQueue::new();
    queue.enqueue(command(17, AckPolicy::EveryCall)).unwrap();
    queue.enqueue(command(52, AckPolicy::EveryCall)).unwrap();
    queue.pump(&transport).await.unwrap();

    let mut buf = [0u8; 64];
    let n = tokio::time::timeout(Duration::from_secs(1), server.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf[..n], b"LoGetSelfData()\n");

    // The second call waits for the first reply.
    let more = tokio::time::timeout(Duration::from_millis(50), server.read(&mut buf)).await;
    assert!(more.is_err(), "nothing else should be written yet");

    transport.disconnect().await;
    let err = {
        queue.acknowledge().unwrap();
        queue.pump(&transport).await.unwrap_err()
    };
    assert!(matches!(err, QueueError::SendFailed { seq: 2, .. }));
}
