use std::sync::{Arc, Mutex};
use std::time::Duration;

use b2500::{Engine, Entities, Frame, Publish, Session, SessionConfig, TimerEntities};
use futures_util::stream;
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::sync::mpsc;

const TIMERS: &str = "731b231201010800101ec80000193d01009600011600173b50004f";
const RUNTIME_LOAD_FIRST: &str = "731d23030100780000008f028b010100010050c80000600464000000a8";

type Log = Arc<Mutex<Vec<String>>>;
type Chunk = Result<Vec<u8>, std::io::Error>;

fn recorder<T: std::fmt::Debug + 'static>(log: &Log, name: String) -> Option<Publish<T>> {
    let log = log.clone();
    Some(Box::new(move |value: T| log.lock().unwrap().push(format!("{name}={value:?}"))))
}

fn entities(log: &Log) -> Entities {
    Entities {
        charge_mode: recorder(log, "charge_mode".into()),
        timers: std::array::from_fn(|i| TimerEntities {
            enabled: recorder(log, format!("timer{i}.enabled")),
            output_power: None,
            start: None,
            end: None,
        }),
        adaptive_mode: recorder(log, "adaptive_mode".into()),
    }
}

fn config() -> SessionConfig {
    SessionConfig {
        // Only the immediate first tick fires during a test
        poll_interval: Duration::from_secs(3600),
        ..SessionConfig::default()
    }
}

fn inbound() -> (mpsc::UnboundedSender<Chunk>, impl futures_util::Stream<Item = Chunk> + Unpin) {
    let (tx, rx) = mpsc::unbounded_channel::<Chunk>();
    let chunks = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|chunk| (chunk, rx)) });
    (tx, Box::pin(chunks))
}

async fn read_frame(device: &mut DuplexStream, len: usize) -> String {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(5), device.read_exact(&mut buf))
        .await
        .expect("no frame written")
        .unwrap();
    hex::encode(buf)
}

async fn wait_for(log: &Log, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while log.lock().unwrap().len() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("entities were not published");
}

#[tokio::test]
async fn test_session_polls_decodes_and_sends_settings() {
    let log = Log::default();
    let (session, handle) = Session::new(Engine::new(entities(&log)), config());
    let (tx, chunks) = inbound();
    let (link, mut device) = tokio::io::duplex(1024);
    let task = tokio::spawn(session.run(chunks, link));

    assert_eq!(read_frame(&mut device, 6).await, "730623030154");
    assert_eq!(read_frame(&mut device, 6).await, "730623120145");

    // The timer table arrives split over two notifications
    let timers = hex::decode(TIMERS).unwrap();
    tx.send(Ok(timers[..10].to_vec())).unwrap();
    tx.send(Ok(timers[10..].to_vec())).unwrap();
    wait_for(&log, 4).await;

    assert!(handle.set_timer_enabled(1, true).await.unwrap());
    assert_eq!(
        read_frame(&mut device, 27).await,
        "731b231101010800101ec80001010101009600011600173b500069"
    );

    assert!(!handle.set_timer_enabled(7, true).await.unwrap());
    assert!(!handle.set_charge_mode("Bogus").await.unwrap());

    assert!(handle.set_charge_mode("LoadFirst").await.unwrap());
    assert_eq!(read_frame(&mut device, 6).await, "730623010156");

    tx.send(Ok(hex::decode(RUNTIME_LOAD_FIRST).unwrap())).unwrap();
    wait_for(&log, 5).await;

    drop(tx);
    let engine = task.await.unwrap().unwrap();
    assert!(engine.runtime_info().is_some());
    // The write is only reflected once the device reports it back
    assert!(!engine.timer_info().unwrap().timers[1].enabled);

    let published = log.lock().unwrap().clone();
    assert_eq!(
        published,
        vec![
            "timer0.enabled=true",
            "timer1.enabled=false",
            "timer2.enabled=true",
            "adaptive_mode=true",
            "charge_mode=\"LoadFirst\"",
        ]
    );

    assert!(handle.set_adaptive_mode_enabled(true).await.is_err());
}

#[tokio::test]
async fn test_session_forwards_unknown_frames() {
    let log = Log::default();
    let (session, _handle) = Session::new(Engine::new(entities(&log)), config());
    let (unknown_tx, mut unknown_rx) = mpsc::unbounded_channel();
    let session = session.forward_unknown_frames(unknown_tx);
    let (tx, chunks) = inbound();
    let (link, _device) = tokio::io::duplex(1024);
    let task = tokio::spawn(session.run(chunks, link));

    // Garbage, then an unknown frame and a corrupt one in a single chunk
    let mut chunk = vec![0x00, 0x42];
    chunk.extend(hex::decode("73072304dead20").unwrap());
    chunk.extend(hex::decode("73072304dead21").unwrap());
    tx.send(Ok(chunk)).unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), unknown_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        frame,
        Frame {
            opcode: 0x04,
            payload: vec![0xde, 0xad]
        }
    );

    drop(tx);
    let engine = task.await.unwrap().unwrap();
    assert!(engine.runtime_info().is_none());
    assert!(engine.timer_info().is_none());
    assert!(unknown_rx.try_recv().is_err());
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_session_stops_on_transport_error() {
    let (session, _handle) = Session::new(Engine::new(Entities::default()), config());
    let (tx, chunks) = inbound();
    let (link, _device) = tokio::io::duplex(1024);
    let task = tokio::spawn(session.run(chunks, link));

    tx.send(Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "link lost")))
        .unwrap();
    let result = task.await.unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_session_runs_captured_chunks_to_completion() {
    let config = SessionConfig {
        poll_interval: Duration::from_secs(1),
        max_buffered: 64,
        ..SessionConfig::default()
    };
    let (session, _handle) = Session::new(Engine::new(Entities::default()), config);

    // A stray start byte, then both reports cut across chunk boundaries
    let mut capture = vec![0x73, 0x40];
    capture.extend(hex::decode(RUNTIME_LOAD_FIRST).unwrap());
    capture.extend(hex::decode(TIMERS).unwrap());
    let chunks: Vec<Chunk> = capture.chunks(7).map(|chunk| Ok(chunk.to_vec())).collect();

    let engine = tokio::time::timeout(
        Duration::from_secs(5),
        session.run(stream::iter(chunks), tokio::io::sink()),
    )
    .await
    .expect("session did not finish")
    .unwrap();
    assert!(engine.runtime_info().is_some());
    assert!(engine.timer_info().unwrap().adaptive_mode_enabled);
}
