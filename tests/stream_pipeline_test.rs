//! Integration tests for the complete stream-to-frame pipeline.
//!
//! Exercises the full path without hardware:
//!
//! ```text
//! ReplayTransport -> reader thread -> FrameReassembler -> FrameQueue -> RenderDispatcher
//! ```

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uvc_stream::render::RenderDispatcher;
use uvc_stream::replay::ReplayTransport;
use uvc_stream::session::{CameraSession, SessionState};
use uvc_stream::test_utils::{chunked, framed, garbage};
use uvc_stream::Frame;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Concatenate one frame per payload into a single wire stream.
fn build_stream(payloads: &[&[u8]]) -> Vec<u8> {
    let mut stream = Vec::new();
    for payload in payloads {
        stream.extend_from_slice(&framed(payload));
    }
    stream
}

fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_pipeline_delivers_frames_to_render_sink_in_order() {
    init_logs();

    // Five frames fit the queue bound even if the consumer lags, so none
    // may be dropped
    let payloads: Vec<Vec<u8>> = (0..5u8).map(|tag| vec![tag; 20]).collect();
    let payload_refs: Vec<&[u8]> = payloads.iter().map(Vec::as_slice).collect();
    let stream = build_stream(&payload_refs);
    let transport = ReplayTransport::from_chunks(chunked(&stream, 13));

    let mut session = CameraSession::new(transport);
    session.initialize().unwrap();
    session.start().unwrap();

    let delivered: Arc<Mutex<Vec<Frame>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_delivered = Arc::clone(&delivered);
    let mut dispatcher = RenderDispatcher::spawn(session.frames(), move |frame: Frame| {
        sink_delivered.lock().unwrap().push(frame);
        Ok(())
    });

    assert!(wait_until(
        || delivered.lock().unwrap().len() == 5,
        Duration::from_secs(5)
    ));

    dispatcher.shutdown();
    session.stop();

    let delivered = delivered.lock().unwrap();
    for (tag, frame) in delivered.iter().enumerate() {
        assert_eq!(frame.payload(), vec![tag as u8; 20].as_slice());
        assert_eq!(frame.header_len(), 12);
    }
}

#[test]
fn test_queue_keeps_newest_frames_when_consumer_is_absent() {
    init_logs();

    // Eight frames against a capacity-5 queue with nobody draining it
    let payloads: Vec<Vec<u8>> = (0..8u8).map(|tag| vec![tag; 4]).collect();
    let payload_refs: Vec<&[u8]> = payloads.iter().map(Vec::as_slice).collect();
    let stream = build_stream(&payload_refs);
    let transport = ReplayTransport::from_chunks(chunked(&stream, 32));

    let mut session = CameraSession::new(transport);
    session.initialize().unwrap();
    session.start().unwrap();

    let queue = session.frames();
    assert!(wait_until(|| queue.len() == 5, Duration::from_secs(5)));
    std::thread::sleep(Duration::from_millis(100));
    session.stop();

    // Oldest three evicted, newest five kept in order
    let tags: Vec<u8> = std::iter::from_fn(|| queue.poll())
        .map(|frame| frame.payload()[0])
        .collect();
    assert_eq!(tags, vec![3, 4, 5, 6, 7]);
}

#[test]
fn test_resynchronization_across_reads() {
    init_logs();

    // Torn bytes ahead of and between valid frames
    let mut stream = garbage(20);
    stream.extend_from_slice(&framed(&[0xA1; 30]));
    stream.extend_from_slice(&garbage(3));
    stream.extend_from_slice(&framed(&[0xB2; 15]));

    let transport = ReplayTransport::from_chunks(chunked(&stream, 7));
    let mut session = CameraSession::new(transport);
    session.initialize().unwrap();
    session.start().unwrap();

    let queue = session.frames();
    assert!(wait_until(|| queue.len() == 2, Duration::from_secs(5)));
    session.stop();

    let first = queue.poll().unwrap();
    let second = queue.poll().unwrap();
    assert_eq!(first.payload(), &[0xA1; 30]);
    assert_eq!(second.payload(), &[0xB2; 15]);
}

#[test]
fn test_byte_sized_reads_reassemble_frames() {
    init_logs();

    let stream = build_stream(&[&[1, 2, 3, 4, 5], &[6, 7, 8]]);
    let transport = ReplayTransport::from_chunks(chunked(&stream, 1));

    let mut session = CameraSession::new(transport);
    session.initialize().unwrap();
    session.start().unwrap();

    let queue = session.frames();
    assert!(wait_until(|| queue.len() == 2, Duration::from_secs(5)));
    session.stop();

    assert_eq!(queue.poll().unwrap().payload(), &[1, 2, 3, 4, 5]);
    assert_eq!(queue.poll().unwrap().payload(), &[6, 7, 8]);
}

#[test]
fn test_lifecycle_stop_start_cycles() {
    init_logs();

    let stream = build_stream(&[&[0x42; 10]]);
    // Looped playback keeps frames flowing across restarts
    let transport = ReplayTransport::from_chunks(chunked(&stream, 8)).looped(true);

    let mut session = CameraSession::new(transport);
    assert_eq!(session.state(), SessionState::Idle);

    session.initialize().unwrap();
    assert_eq!(session.state(), SessionState::Initialized);

    for _ in 0..3 {
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Streaming);

        let queue = session.frames();
        assert!(wait_until(|| !queue.is_empty(), Duration::from_secs(5)));

        session.stop();
        assert_eq!(session.state(), SessionState::Initialized);
    }

    session.release();
    assert_eq!(session.state(), SessionState::Released);
    assert!(session.start().is_err());
}
