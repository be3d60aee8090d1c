use monosink_core::{
    fill_buffer, sample_queue, CallbackContext, Dequeue, FeedShared, FeedStats, IntegrityViolation, PullFeed,
    SinkError, SinkState, StateCell,
};
use pretty_assertions::assert_eq;
use std::ffi::c_void;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn open_feed(capacity: usize) -> (PullFeed, Arc<StateCell>, Arc<FeedStats>) {
    let state = Arc::new(StateCell::new(SinkState::Open));
    let stats = Arc::new(FeedStats::new());
    let mut feed = PullFeed::new(Arc::clone(&state), Arc::clone(&stats));
    feed.attach_queue(capacity, Duration::from_millis(1));
    (feed, state, stats)
}

/// Run the driver side once, through the raw callback.
fn render(feed: &PullFeed, samples: usize) -> Vec<i16> {
    let callback = feed.render_callback().unwrap();
    let mut stream = vec![0xAAu8; samples * 2];
    unsafe { callback.invoke(stream.as_mut_ptr(), stream.len()) };
    stream
        .chunks_exact(2)
        .map(|pair| i16::from_ne_bytes([pair[0], pair[1]]))
        .collect()
}

#[test]
fn samples_come_out_in_order() {
    let (mut feed, _, stats) = open_feed(16);
    feed.producer_mut().unwrap().push_blocking(&[1, 2, 3, 4, 5, 6]).unwrap();

    assert_eq!(render(&feed, 4), vec![1, 2, 3, 4]);
    assert_eq!(render(&feed, 2), vec![5, 6]);

    let stats = stats.snapshot();
    assert_eq!(stats.callbacks, 2);
    assert_eq!(stats.samples_delivered, 6);
    assert_eq!(stats.underruns, 0);
}

#[test]
fn empty_queue_renders_silence_without_blocking() {
    let (feed, _, stats) = open_feed(16);

    let started = Instant::now();
    assert_eq!(render(&feed, 256), vec![0; 256]);
    assert!(started.elapsed() < Duration::from_millis(50));
    assert_eq!(stats.snapshot().underruns, 1);
}

#[test]
fn short_queue_is_padded_with_silence() {
    let (mut feed, _, stats) = open_feed(16);
    feed.producer_mut().unwrap().push_blocking(&[7, 8]).unwrap();

    assert_eq!(render(&feed, 4), vec![7, 8, 0, 0]);
    assert_eq!(stats.snapshot().underruns, 1);
}

#[test]
fn closed_feed_renders_silence() {
    let (mut feed, _, _) = open_feed(16);
    feed.producer_mut().unwrap().push_blocking(&[1, 2, 3]).unwrap();
    feed.close();

    assert_eq!(render(&feed, 3), vec![0, 0, 0]);
    assert!(matches!(feed.producer_mut(), Err(SinkError::FeedClosed)));
}

#[test]
fn sink_not_open_renders_silence() {
    let (mut feed, state, stats) = open_feed(16);
    feed.producer_mut().unwrap().push_blocking(&[1, 2]).unwrap();
    state.set(SinkState::Closing);

    assert_eq!(render(&feed, 2), vec![0, 0]);
    assert_eq!(stats.snapshot().underruns, 0);

    state.set(SinkState::Open);
    assert_eq!(render(&feed, 2), vec![1, 2]);
}

#[test]
fn odd_byte_counts_zero_the_trailing_byte() {
    let (mut feed, _, _) = open_feed(16);
    feed.producer_mut().unwrap().push_blocking(&[-1, -1]).unwrap();

    let callback = feed.render_callback().unwrap();
    let mut stream = [0xAAu8; 5];
    unsafe { callback.invoke(stream.as_mut_ptr(), stream.len()) };
    assert_eq!(stream, [0xFF, 0xFF, 0xFF, 0xFF, 0x00]);
}

#[test]
fn producer_blocks_until_space_frees_up() {
    let (mut feed, _, _) = open_feed(4);
    let mut producer = feed.take_producer().unwrap();
    assert!(matches!(feed.take_producer(), Err(SinkError::FeedClosed)));

    let writer = thread::spawn(move || producer.push_blocking(&[1, 2, 3, 4, 5, 6, 7, 8]));
    let mut heard = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while heard.len() < 8 && Instant::now() < deadline {
        heard.extend(render(&feed, 2).into_iter().filter(|s| *s != 0));
        thread::sleep(Duration::from_millis(1));
    }

    assert!(writer.join().unwrap().is_ok());
    assert_eq!(heard, vec![1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn closing_unblocks_a_waiting_producer() {
    let (mut feed, _, _) = open_feed(2);
    let mut producer = feed.take_producer().unwrap();
    let writer = thread::spawn(move || producer.push_blocking(&[1; 64]));

    thread::sleep(Duration::from_millis(20));
    feed.close();
    assert_eq!(writer.join().unwrap(), Err(SinkError::FeedClosed));
}

#[test]
fn push_timeout_reports_partial_writes() {
    let (mut feed, _, _) = open_feed(3);
    let producer = feed.producer_mut().unwrap();

    let written = producer.push_timeout(&[1, 2, 3, 4, 5], Duration::from_millis(5)).unwrap();
    assert_eq!(written, 3);
    assert_eq!(producer.queued(), 3);
    assert_eq!(producer.try_push(&[9]).unwrap(), 0);
}

#[test]
fn dequeue_is_tri_state() {
    let shared = Arc::new(FeedShared::new());
    let (mut producer, mut consumer) = sample_queue(4, Duration::from_millis(1), Arc::clone(&shared));

    assert_eq!(consumer.dequeue(), Dequeue::Empty);
    producer.try_push(&[42]).unwrap();
    assert_eq!(consumer.dequeue(), Dequeue::Sample(42));

    drop(producer);
    assert_eq!(consumer.dequeue(), Dequeue::Closed);

    let (_producer, mut consumer) = sample_queue(4, Duration::from_millis(1), Arc::clone(&shared));
    shared.close();
    assert_eq!(consumer.dequeue(), Dequeue::Closed);
}

#[test]
fn bad_userdata_fails_validation() {
    let null = unsafe { CallbackContext::from_userdata(std::ptr::null_mut()) };
    assert!(matches!(null, Err(IntegrityViolation { found: 0 })));

    let misaligned = unsafe { CallbackContext::from_userdata(1usize as *mut c_void) };
    assert!(matches!(misaligned, Err(IntegrityViolation { found: 1 })));
}

#[test]
fn live_context_validates() {
    let state = Arc::new(StateCell::new(SinkState::Open));
    let context = CallbackContext::new(state, Arc::new(FeedStats::new()));
    assert!(context.validate().is_ok());

    let userdata = &context as *const CallbackContext as *mut c_void;
    assert!(unsafe { CallbackContext::from_userdata(userdata) }.is_ok());
}

#[test]
fn released_context_has_no_callback() {
    let (mut feed, _, _) = open_feed(4);
    assert!(feed.release_context());
    assert!(feed.render_callback().is_none());
    assert!(!feed.release_context());
}

const ABORT_CHILD_ENV: &str = "MONOSINK_ABORT_CHILD";

#[cfg(unix)]
#[test]
fn integrity_violation_aborts_the_process() {
    use std::os::unix::process::ExitStatusExt;
    use std::process::{Command, Stdio};

    if std::env::var_os(ABORT_CHILD_ENV).is_some() {
        let mut stream = [0u8; 64];
        unsafe { fill_buffer(std::ptr::null_mut(), stream.as_mut_ptr(), stream.len() as _) };
        return;
    }

    let status = Command::new(std::env::current_exe().unwrap())
        .args([
            "integrity_violation_aborts_the_process",
            "--exact",
            "--test-threads=1",
        ])
        .env(ABORT_CHILD_ENV, "1")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .unwrap();

    assert!(!status.success());
    assert_eq!(status.signal(), Some(6));
}
