//! EventQueue used as a general ISR-to-task FIFO.

use std::thread;
use std::time::{Duration, Instant};

use swtimer::{Error, Event, EventQueue, RawQueue, Timeout, WAIT_FOREVER};

#[test]
fn producers_keep_their_own_order_and_nothing_is_lost() {
    const PER_PRODUCER: u32 = 500;
    let q = EventQueue::<Event<u32>>::create(8).unwrap();

    let producers: Vec<_> = (0..4u32)
        .map(|p| {
            let q = q.clone();
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    q.send_event(p, seq, WAIT_FOREVER).unwrap();
                }
            })
        })
        .collect();

    let mut next = [0u32; 4];
    for _ in 0..4 * PER_PRODUCER {
        let (p, seq) = q.wait_event(Timeout::After(Duration::from_secs(5))).unwrap();
        assert_eq!(seq, next[p as usize], "producer {p} reordered");
        next[p as usize] += 1;
    }
    for h in producers {
        h.join().unwrap();
    }
    assert!(q.is_empty());
    assert_eq!(next, [PER_PRODUCER; 4]);
}

#[test]
fn isr_flood_is_rejected_not_overwritten() {
    let q = RawQueue::create_raw(4).unwrap();
    let isr = {
        let q = q.clone();
        thread::spawn(move || {
            let mut accepted = Vec::new();
            for w in 0..100u32 {
                match q.send_raw_from_isr(w) {
                    Ok(()) => accepted.push(w),
                    Err(e) => assert_eq!(e, Error::InterruptContextRejected),
                }
            }
            accepted
        })
    };
    let accepted = isr.join().unwrap();
    assert_eq!(accepted, vec![0, 1, 2, 3]);

    let drained: Vec<u32> = (0..4).map(|_| q.wait_raw().unwrap()).collect();
    assert_eq!(drained, accepted);
}

#[test]
fn isr_send_wakes_a_forever_waiter() {
    let q = RawQueue::create_raw(2).unwrap();
    let consumer = {
        let q = q.clone();
        thread::spawn(move || {
            let start = Instant::now();
            (q.wait_raw(), start.elapsed())
        })
    };
    thread::sleep(Duration::from_millis(30));
    q.send_raw_from_isr(0xABCD).unwrap();

    let (word, waited) = consumer.join().unwrap();
    assert_eq!(word, Ok(0xABCD));
    assert!(waited >= Duration::from_millis(25));
}

#[test]
fn destroy_releases_blocked_sender() {
    let q = EventQueue::create(1).unwrap();
    q.send(1u64, Timeout::NoWait).unwrap();
    let sender = {
        let q = q.clone();
        thread::spawn(move || q.send(2, Timeout::Forever))
    };
    thread::sleep(Duration::from_millis(20));
    q.destroy().unwrap();
    assert_eq!(sender.join().unwrap(), Err(Error::InvalidHandle));
    assert_eq!(q.wait(Timeout::NoWait), Err(Error::InvalidHandle));
}

#[test]
fn timed_wait_succeeds_when_item_arrives_in_time() {
    let q = EventQueue::<Event<[u8; 3]>>::create(2).unwrap();
    let producer = {
        let q = q.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            q.send_event(42, *b"abc", Timeout::NoWait)
        })
    };
    assert_eq!(q.wait_event(500u32), Ok((42, *b"abc")));
    producer.join().unwrap().unwrap();
}
