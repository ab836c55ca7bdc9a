mod common;

use v4l_grab::buffer::Ownership;
use v4l_grab::{CaptureError, Session, SessionConfig, State};

use common::{FakeDriver, Wait};

fn owners<D: v4l_grab::Driver>(session: &Session<D>) -> Vec<Ownership> {
    session.buffers().iter().map(|buf| buf.owner()).collect()
}

#[test]
fn four_buffers_ten_frames() {
    let fake = FakeDriver::new();
    let mut session = common::streaming(&fake, 4);
    let payload = (fake.state().buffer_len / 2) as usize;

    for n in 0..10u32 {
        let frame = session.acquire().unwrap();
        assert_eq!(frame.meta().sequence, n);
        assert_eq!(frame.len(), payload);
        assert_eq!(frame.meta().bytesused as usize, payload);
        assert_eq!(frame[0], n as u8);
        assert!(frame[1..].iter().all(|&b| b == 0xab));
        // the driver no longer holds the buffer we are reading
        assert!(!fake.state().incoming.contains(&frame.index()));
        frame.release().unwrap();
    }

    assert_eq!(owners(&session), vec![Ownership::Driver; 4]);

    {
        let state = fake.state();
        assert_eq!(state.dequeued, vec![0, 1, 2, 3, 0, 1, 2, 3, 0, 1]);
        // four to prime the ring plus one per frame
        assert_eq!(state.queued.len(), 4 + 10);
        assert_eq!(&state.queued[4..], &state.dequeued[..]);
    }

    session.stop().unwrap();
    assert_eq!(fake.state().mapped(), 0);
}

#[test]
fn frame_is_a_view_into_the_mapped_buffer() {
    let fake = FakeDriver::new();
    let mut session = common::streaming(&fake, 2);

    let frame = session.acquire().unwrap();
    let region = fake.state().regions[frame.index() as usize].map(|(ptr, _)| ptr.as_ptr());
    assert_eq!(Some(frame.data().as_ptr() as *mut u8), region);
}

#[test]
fn third_wait_times_out() {
    let fake = FakeDriver::new();
    let mut session = common::streaming(&fake, 4);
    fake.state()
        .waits
        .extend([Wait::Ready, Wait::Ready, Wait::TimedOut]);

    session.acquire().unwrap().release().unwrap();
    session.acquire().unwrap().release().unwrap();

    let before = owners(&session);
    let err = session.acquire().unwrap_err();
    assert!(matches!(err, CaptureError::AcquisitionTimeout { .. }));
    assert!(!err.is_fatal());
    assert_eq!(owners(&session), before);
    assert_eq!(session.state(), State::Streaming);

    // the ring keeps going
    let frame = session.acquire().unwrap();
    assert_eq!(frame.meta().sequence, 2);
    frame.release().unwrap();
    assert_eq!(fake.state().dequeued.len(), 3);
}

#[test]
fn timeout_leaves_ownership_alone() {
    let fake = FakeDriver::new();
    let mut session = common::streaming(&fake, 3);
    fake.state().waits.push_back(Wait::TimedOut);

    let calls = fake.calls().len();
    let before = owners(&session);
    assert!(session.acquire().is_err());
    assert_eq!(owners(&session), before);
    // only the wait itself, no dequeue
    assert_eq!(fake.calls()[calls..], ["poll"]);
}

#[test]
fn wait_and_dequeue_failures_are_recoverable() {
    let fake = FakeDriver::new();
    let mut session = common::streaming(&fake, 2);
    fake.state().waits.push_back(Wait::Fail(libc::EINTR));

    let err = session.acquire().unwrap_err();
    assert!(matches!(err, CaptureError::AcquisitionWait(_)));
    assert!(!err.is_fatal());

    fake.state().fail_next_dequeues = 1;
    let err = session.acquire().unwrap_err();
    assert!(matches!(err, CaptureError::Dequeue(_)));
    assert!(!err.is_fatal());
    assert_eq!(owners(&session), vec![Ownership::Driver; 2]);

    session.acquire().unwrap().release().unwrap();
}

#[test]
fn dropped_frame_is_requeued() {
    let fake = FakeDriver::new();
    let mut session = common::streaming(&fake, 2);

    {
        let frame = session.acquire().unwrap();
        assert_eq!(frame.index(), 0);
    }

    assert_eq!(owners(&session), vec![Ownership::Driver; 2]);
    assert_eq!(fake.state().queued, vec![0, 1, 0]);
}

#[test]
fn failed_requeue_retires_the_buffer_until_the_driver_takes_it() {
    let fake = FakeDriver::new();
    let mut session = common::streaming(&fake, 3);
    fake.state().fail_next_queues = 1;

    let frame = session.acquire().unwrap();
    let index = frame.index();
    let err = frame.release().unwrap_err();
    assert!(matches!(err, CaptureError::Requeue { index: 0, .. }));
    assert!(!err.is_fatal());

    // retired: counted as driver owned, but the driver does not have it
    assert_eq!(session.ownership(index), Some(Ownership::Driver));
    assert_eq!(session.retired_buffers(), vec![index]);
    assert_eq!(session.consecutive_requeue_failures(), 1);
    assert!(!fake.state().incoming.contains(&index));

    // the next acquisition offers it again before waiting
    let calls = fake.calls().len();
    let frame = session.acquire().unwrap();
    assert_ne!(frame.index(), index);
    assert_eq!(fake.calls()[calls..], ["VIDIOC_QBUF", "poll", "VIDIOC_DQBUF"]);
    frame.release().unwrap();

    assert!(session.retired_buffers().is_empty());
    assert_eq!(session.consecutive_requeue_failures(), 0);
    assert_eq!(owners(&session), vec![Ownership::Driver; 3]);
    assert!(fake.state().incoming.contains(&index));
}

#[test]
fn refused_buffers_rejoin_the_ring() {
    let fake = FakeDriver::new();
    let mut session = common::streaming(&fake, 2);
    // the release of the first frame and its first retry
    fake.state().fail_next_queues = 2;

    assert!(session.acquire().unwrap().release().is_err());
    for _ in 0..10 {
        session.acquire().unwrap().release().unwrap();
    }

    assert!(session.retired_buffers().is_empty());
    assert_eq!(fake.state().dequeued.len(), 11);
    assert_eq!(fake.state().incoming.len(), 2);
}

#[test]
fn requeue_budget_is_fatal() {
    let fake = FakeDriver::new();
    let mut session = common::streaming(&fake, 4);
    fake.state().fail_next_queues = u32::MAX;

    let err = session.acquire().unwrap().release().unwrap_err();
    assert!(matches!(err, CaptureError::Requeue { index: 0, .. }));

    // the retry of buffer 0 fails as well, then buffer 1 is refused
    let err = session.acquire().unwrap().release().unwrap_err();
    match err {
        CaptureError::RequeueBudgetExhausted {
            index,
            failures,
            ref source,
        } => {
            assert_eq!(index, 1);
            assert_eq!(failures, 3);
            assert!(source.is_some());
        }
        ref other => panic!("unexpected error: {}", other),
    }
    assert!(err.is_fatal());

    // no further frames, and the driver is not even asked
    let calls = fake.calls().len();
    let err = session.acquire().unwrap_err();
    assert!(matches!(
        err,
        CaptureError::RequeueBudgetExhausted { source: None, .. }
    ));
    assert_eq!(fake.calls().len(), calls);

    session.stop().unwrap();
    assert_eq!(fake.state().mapped(), 0);
}

#[test]
fn buffer_refused_again_and_again_is_fatal() {
    let fake = FakeDriver::new();
    let mut session = common::streaming(&fake, 4);
    fake.state().fail_queue_index = Some(0);

    assert!(session.acquire().unwrap().release().is_err());

    // other buffers keep flowing and reset the consecutive count
    let frame = session.acquire().unwrap();
    assert_ne!(frame.index(), 0);
    frame.release().unwrap();
    assert_eq!(session.consecutive_requeue_failures(), 0);

    let err = session.acquire().unwrap_err();
    assert!(matches!(
        err,
        CaptureError::RequeueBudgetExhausted {
            index: 0,
            failures: 3,
            source: Some(_),
        }
    ));

    let err = session.acquire().unwrap_err();
    assert!(matches!(
        err,
        CaptureError::RequeueBudgetExhausted {
            index: 0,
            source: None,
            ..
        }
    ));

    session.stop().unwrap();
    assert!(session.retired_buffers().is_empty());
    assert_eq!(fake.state().mapped(), 0);
}

#[test]
fn drained_ring_is_fatal() {
    let fake = FakeDriver::new();
    let config = SessionConfig {
        max_requeue_failures: 10,
        ..common::config(2)
    };
    let mut session = common::streaming_with(&fake, config);
    fake.state().fail_next_queues = u32::MAX;

    for _ in 0..2 {
        let err = session.acquire().unwrap().release().unwrap_err();
        assert!(matches!(err, CaptureError::Requeue { .. }));
    }
    assert_eq!(session.retired_buffers(), vec![0, 1]);

    let calls = fake.calls().len();
    let err = session.acquire().unwrap_err();
    assert!(matches!(err, CaptureError::RingDrained { retired: 2 }));
    assert!(err.is_fatal());
    // both buffers were offered once more, nothing was waited for
    assert_eq!(fake.calls()[calls..], ["VIDIOC_QBUF", "VIDIOC_QBUF"]);

    session.stop().unwrap();
    assert_eq!(fake.state().mapped(), 0);
}

#[test]
fn successful_requeue_resets_the_budget() {
    let fake = FakeDriver::new();
    let mut session = common::streaming(&fake, 4);
    fake.state().fail_next_queues = 2;

    assert!(session.acquire().unwrap().release().is_err());
    assert_eq!(session.consecutive_requeue_failures(), 1);

    // the retry on this acquisition is refused too
    let frame = session.acquire().unwrap();
    assert_eq!(fake.state().fail_next_queues, 0);
    frame.release().unwrap();
    assert_eq!(session.consecutive_requeue_failures(), 0);
    assert_eq!(session.retired_buffers(), vec![0]);

    session.acquire().unwrap().release().unwrap();
    assert!(session.retired_buffers().is_empty());
}

#[test]
fn unknown_index_from_driver_is_fatal() {
    let fake = FakeDriver::new();
    let mut session = common::streaming(&fake, 2);
    fake.state().bogus_dequeue_index = Some(7);

    let err = session.acquire().unwrap_err();
    assert!(matches!(
        err,
        CaptureError::InvalidIndex { index: 7, count: 2 }
    ));
    assert!(err.is_fatal());

    session.stop().unwrap();
    assert_eq!(fake.state().mapped(), 0);
}
