//! Connection manager behaviour against an in-memory transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout;
use varflow_stream::{
    OpenedStream, StreamManager, StreamParams, StreamSettings, StreamState, StreamStatus,
    StreamTransport, StreamTransportError,
};

type Chunk = Result<String, StreamTransportError>;

struct MockConnection {
    sender: mpsc::UnboundedSender<Chunk>,
    aborts: Arc<AtomicUsize>,
}

#[derive(Default)]
struct MockTransport {
    connections: Mutex<Vec<MockConnection>>,
    refuse: bool,
    open_attempts: AtomicUsize,
}

impl MockTransport {
    fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    fn opened(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    fn aborts(&self, index: usize) -> usize {
        self.connections.lock().unwrap()[index]
            .aborts
            .load(Ordering::SeqCst)
    }

    fn send(&self, index: usize, line: &str) {
        let _ = self.connections.lock().unwrap()[index]
            .sender
            .send(Ok(format!("{line}\n")));
    }

    /// End connection `index` from the server side.
    fn hang_up(&self, index: usize) {
        let (closed, _) = mpsc::unbounded_channel();
        self.connections.lock().unwrap()[index].sender = closed;
    }
}

impl StreamTransport for MockTransport {
    fn open_stream(&self, _params: &StreamParams) -> Result<OpenedStream, StreamTransportError> {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(StreamTransportError::new("connection refused"));
        }
        let (sender, receiver) = mpsc::unbounded_channel::<Chunk>();
        let events = stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|chunk| (chunk, receiver))
        })
        .boxed();
        let aborts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&aborts);
        self.connections
            .lock()
            .unwrap()
            .push(MockConnection { sender, aborts });
        Ok(OpenedStream::new(events, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

fn fast_settings(max_reconnect_attempts: Option<u32>) -> StreamSettings {
    StreamSettings {
        backoff_base_ms: 1,
        backoff_max_ms: 5,
        max_reconnect_attempts,
    }
}

fn channel_sink() -> (
    impl Fn(Arc<StreamState>) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<Arc<StreamState>>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |state| {
            let _ = tx.send(state);
        },
        rx,
    )
}

async fn next_state(rx: &mut mpsc::UnboundedReceiver<Arc<StreamState>>) -> Arc<StreamState> {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for stream state")
        .expect("sink dropped")
}

fn params() -> StreamParams {
    StreamParams::new("ticks").with_key_accessor("id")
}

#[tokio::test]
async fn identical_starts_keep_one_connection() {
    let manager = StreamManager::new(MockTransport::default(), fast_settings(None));

    let first = manager.start(params(), |_| {}).unwrap();
    let second = manager.start(params(), |_| {}).unwrap();

    assert_eq!(manager.active_connections(), 1);
    assert_eq!(manager.transport().opened(), 2);
    assert_eq!(manager.transport().aborts(0), 1);
    assert_eq!(manager.transport().aborts(1), 0);
    assert!(!first.is_active());
    assert!(second.is_active());

    // Closing the replaced subscription must not touch the live one.
    first.close();
    assert_eq!(manager.active_connections(), 1);
    assert_eq!(manager.transport().aborts(0), 1);

    second.close();
    second.close();
    assert_eq!(manager.active_connections(), 0);
    assert_eq!(manager.transport().aborts(1), 1);
}

#[tokio::test]
async fn different_parameters_get_separate_connections() {
    let manager = StreamManager::new(MockTransport::default(), fast_settings(None));
    let _a = manager.start(params(), |_| {}).unwrap();
    let _b = manager
        .start(params().with_extras(json!({"page": 2})), |_| {})
        .unwrap();
    assert_eq!(manager.active_connections(), 2);
    assert_eq!(manager.transport().aborts(0), 0);
}

#[tokio::test]
async fn events_flow_to_sink() {
    let manager = StreamManager::new(MockTransport::default(), fast_settings(None));
    let (sink, mut rx) = channel_sink();
    let _subscription = manager.start(params(), sink).unwrap();

    manager
        .transport()
        .send(0, r#"{"type":"add","data":[{"id":1,"v":"a"},{"id":2,"v":"b"}]}"#);
    let state = next_state(&mut rx).await;
    assert_eq!(state.status, StreamStatus::Connected);

    manager
        .transport()
        .send(0, r#"{"type":"add","data":{"id":1,"v":"A"}}"#);
    let state = next_state(&mut rx).await;
    assert_eq!(
        state.data,
        Some(json!({"1": {"id": 1, "v": "A"}, "2": {"id": 2, "v": "b"}}))
    );
}

#[tokio::test]
async fn reconnects_after_server_hang_up() {
    let manager = StreamManager::new(MockTransport::default(), fast_settings(None));
    let (sink, mut rx) = channel_sink();
    let _subscription = manager.start(params(), sink).unwrap();

    manager
        .transport()
        .send(0, r#"{"type":"json_snapshot","data":[{"id":1}]}"#);
    assert_eq!(next_state(&mut rx).await.status, StreamStatus::Connected);

    manager.transport().hang_up(0);
    let reconnecting = next_state(&mut rx).await;
    assert_eq!(reconnecting.status, StreamStatus::Reconnecting);
    assert_eq!(reconnecting.data, Some(json!([{"id": 1}])));

    // The connection reopens after the backoff delay.
    let reopened = timeout(Duration::from_secs(2), async {
        while manager.transport().opened() < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(reopened.is_ok());
    assert_eq!(manager.active_connections(), 1);

    manager
        .transport()
        .send(1, r#"{"type":"json_snapshot","data":[{"id":2}]}"#);
    let state = next_state(&mut rx).await;
    assert_eq!(state.status, StreamStatus::Connected);
    assert_eq!(state.data, Some(json!([{"id": 2}])));
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let manager = StreamManager::new(MockTransport::refusing(), fast_settings(Some(2)));
    let (sink, mut rx) = channel_sink();
    let _subscription = manager.start(params(), sink).unwrap();

    let mut last = next_state(&mut rx).await;
    while last.status != StreamStatus::Error {
        assert_eq!(last.status, StreamStatus::Reconnecting);
        last = next_state(&mut rx).await;
    }
    assert_eq!(
        last.error.as_deref(),
        Some("Connection lost after 2 reconnect attempts")
    );
    // Initial open plus two reconnects.
    assert_eq!(manager.transport().open_attempts.load(Ordering::SeqCst), 3);
    assert_eq!(manager.active_connections(), 0);
}

#[tokio::test]
async fn no_state_after_close() {
    let manager = StreamManager::new(MockTransport::default(), fast_settings(None));
    let (sink, mut rx) = channel_sink();
    let subscription = manager.start(params(), sink).unwrap();

    manager
        .transport()
        .send(0, r#"{"type":"json_snapshot","data":{}}"#);
    next_state(&mut rx).await;

    subscription.close();
    manager
        .transport()
        .send(0, r#"{"type":"json_snapshot","data":{"late":true}}"#);
    manager.transport().hang_up(0);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(rx.try_recv().is_err());
    assert_eq!(manager.transport().opened(), 1);
}

#[tokio::test]
async fn dropping_subscription_closes_connection() {
    let manager = StreamManager::new(MockTransport::default(), fast_settings(None));
    let (sink, mut rx) = channel_sink();
    let subscription = manager.start(params(), sink).unwrap();
    assert_eq!(manager.active_connections(), 1);

    drop(subscription);
    assert_eq!(manager.active_connections(), 0);
    assert_eq!(manager.transport().aborts(0), 1);

    manager
        .transport()
        .send(0, r#"{"type":"json_snapshot","data":{"late":true}}"#);
    manager.transport().hang_up(0);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(rx.try_recv().is_err());
    assert_eq!(manager.transport().opened(), 1);
}
