//! Channel dispatch behavior.

use parking_lot::Mutex;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use switchboard::{AuthError, Channel, Event, Failure, Topic, Topics};

fn recorder<P: Clone + Send + 'static>() -> (Arc<Mutex<Vec<P>>>, impl Fn(&P) + Send + Sync) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |payload: &P| sink.lock().push(payload.clone()))
}

#[test]
fn test_alternatives_match_each_name() {
    let channel: Channel<Value> = Channel::new();
    let (seen, handler) = recorder();
    let _sub = channel.on("a|b", handler);

    assert!(channel.emit("b", json!(1)));
    assert!(channel.emit("c", json!(2)));
    assert!(channel.emit("a", json!(3)));

    assert_eq!(*seen.lock(), vec![json!(1), json!(3)]);
}

#[test]
fn test_emit_alternatives_dispatch_once_per_subscription() {
    let channel: Channel<Value> = Channel::new();
    let (seen, handler) = recorder();
    let _sub = channel.on("a,b", handler);

    channel.emit("a|b", json!("both"));
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn test_once_runs_once() {
    let channel: Channel<Value> = Channel::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let _sub = channel.once("ready", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    channel.emit("ready", json!(null));
    channel.emit("ready", json!(null));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(channel.subscriber_count(), 0);
}

#[test]
fn test_regex_topics() {
    let channel: Channel<String> = Channel::new();
    let (seen, handler) = recorder();
    let _sub = channel.on(Regex::new(r"^metrics\.").unwrap(), handler);

    channel.emit("metrics.cpu", "cpu".to_string());
    channel.emit("logs.cpu", "logs".to_string());
    channel.emit("other|metrics.mem", "mem".to_string());

    assert_eq!(*seen.lock(), vec!["cpu".to_string(), "mem".to_string()]);
}

#[test]
fn test_mixed_topic_list() {
    let channel: Channel<String> = Channel::new();
    let (seen, handler) = recorder();
    let topics = Topics::new()
        .with("save|load")
        .with(Topic::Pattern(Regex::new("^user:").unwrap()));
    let _sub = channel.on(topics, handler);

    channel.emit("load", "1".to_string());
    channel.emit("user:42", "2".to_string());
    channel.emit("delete", "3".to_string());

    assert_eq!(seen.lock().len(), 2);
}

#[test]
fn test_handlers_run_in_registration_order() {
    let channel: Channel<()> = Channel::new();
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut subs = Vec::new();
    for i in 0..5 {
        let order = order.clone();
        // Alternate name and pattern subscriptions
        let sub = if i % 2 == 0 {
            channel.on("tick", move |_| order.lock().push(i))
        } else {
            channel.on(Regex::new("^ti").unwrap(), move |_| order.lock().push(i))
        };
        subs.push(sub);
    }

    channel.emit("tick", ());
    assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let channel: Channel<()> = Channel::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let sub = channel.on("x", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    channel.emit("x", ());
    sub.unsubscribe();
    sub.unsubscribe();
    channel.emit("x", ());

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!sub.is_active());
}

#[test]
fn test_same_failure_dispatched_once() {
    let channel: Channel<Event> = Channel::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let _sub = channel.on("error", move |event| {
        assert!(matches!(event, Event::Error(_)));
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let failure = Failure::from(AuthError::Unauthenticated);
    channel.emit("error", Event::Error(failure.clone()));
    channel.emit("error", Event::Error(failure.clone()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(failure.is_propagated());

    // A distinct failure with the same content still goes through
    channel.emit("error", Event::Error(Failure::from(AuthError::Unauthenticated)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_handlers_may_emit_and_subscribe() {
    let channel: Channel<String> = Channel::new();
    let (seen, handler) = recorder();
    let _audit = channel.on("audit", handler);

    let late_calls = Arc::new(AtomicUsize::new(0));
    let late_subs = Arc::new(Mutex::new(Vec::new()));

    let inner = channel.clone();
    let counter = late_calls.clone();
    let subs = late_subs.clone();
    let _relay = channel.on("save", move |name: &String| {
        inner.emit("audit", format!("saved {name}"));
        let counter = counter.clone();
        subs.lock().push(inner.on("save", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
    });

    channel.emit("save", "report".to_string());
    assert_eq!(*seen.lock(), vec!["saved report".to_string()]);
    // Added during dispatch, so it missed the first event
    assert_eq!(late_calls.load(Ordering::SeqCst), 0);

    channel.emit("save", "chart".to_string());
    assert_eq!(late_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_handler_removed_mid_dispatch_is_skipped() {
    let channel: Channel<()> = Channel::new();
    let second_calls = Arc::new(AtomicUsize::new(0));

    let victim = Arc::new(Mutex::new(None::<switchboard::Unsubscribe>));
    let slot = victim.clone();
    let _first = channel.on("go", move |_| {
        if let Some(sub) = slot.lock().as_ref() {
            sub.unsubscribe();
        }
    });

    let counter = second_calls.clone();
    *victim.lock() = Some(channel.on("go", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    channel.emit("go", ());
    assert_eq!(second_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_emit_from_many_threads() {
    let channel: Channel<Value> = Channel::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let _sub = channel.on("hit", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let channel = channel.clone();
            std::thread::spawn(move || {
                for i in 0..250 {
                    channel.emit("hit", json!(i));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1000);
}

#[test]
fn test_emit_after_shutdown() {
    let channel: Channel<()> = Channel::new();
    let _sub = channel.on("x", |_| {});
    channel.shutdown();

    assert!(!channel.emit("x", ()));
    let late = channel.on("x", |_| {});
    assert!(!late.is_active());
}
