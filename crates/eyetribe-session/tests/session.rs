//! End-to-end session tests against an in-process fake tracker on loopback TCP.

use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use eyetribe_session::{
    Endpoint, GazeFrame, Mode, Session, SessionConfig, SessionError, SessionState,
};
use serde_json::{json, Value};

#[derive(Clone, Default)]
struct Behavior {
    /// Answer `set version` with 400.
    reject_version: bool,
    /// Answer `get frame` with 403.
    reject_frames: bool,
    /// Leave `id` out of every reply.
    omit_ids: bool,
    heartbeat_ms: u64,
}

#[derive(Default)]
struct Shared {
    requests: Mutex<Vec<Value>>,
    client: Mutex<Option<TcpStream>>,
    disconnects: AtomicUsize,
    polled: AtomicUsize,
}

impl Shared {
    fn send(&self, msg: &Value) {
        let mut line = serde_json::to_vec(msg).unwrap();
        line.push(b'\n');
        self.send_raw(&line);
    }

    fn send_raw(&self, line: &[u8]) {
        let mut client = self.client.lock().unwrap();
        if let Some(stream) = client.as_mut() {
            let _ = stream.write_all(line);
        }
    }
}

struct FakeTracker {
    port: u16,
    shared: Arc<Shared>,
}

impl FakeTracker {
    fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let shared = Arc::new(Shared::default());

        let device = Arc::clone(&shared);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                serve(stream, &device, &behavior);
            }
        });

        Self { port, shared }
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", self.port)
    }

    fn push_frame(&self, timestamp: u64) {
        self.shared.send(&frame_message(timestamp, None));
    }

    fn requests(&self) -> Vec<Value> {
        self.shared.requests.lock().unwrap().clone()
    }

    /// `set push` requests the client issued (the id-less goodbye excluded).
    fn push_requests(&self) -> Vec<bool> {
        self.requests()
            .iter()
            .filter(|r| r.get("id").is_some())
            .filter_map(|r| r["values"]["push"].as_bool())
            .collect()
    }

    fn drop_client(&self) {
        if let Some(stream) = self.shared.client.lock().unwrap().take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn disconnects(&self) -> usize {
        self.shared.disconnects.load(Ordering::SeqCst)
    }
}

fn serve(stream: TcpStream, shared: &Shared, behavior: &Behavior) {
    *shared.client.lock().unwrap() = Some(stream.try_clone().unwrap());

    for line in BufReader::new(stream).lines() {
        let Ok(line) = line else { break };
        let Ok(request) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        shared.requests.lock().unwrap().push(request.clone());
        if let Some(reply) = respond(&request, shared, behavior) {
            shared.send(&reply);
        }
    }

    shared.client.lock().unwrap().take();
    shared.disconnects.fetch_add(1, Ordering::SeqCst);
}

fn respond(request: &Value, shared: &Shared, behavior: &Behavior) -> Option<Value> {
    let id = if behavior.omit_ids {
        None
    } else {
        request.get("id").cloned()
    };
    let values = &request["values"];

    let mut reply = match (request["category"].as_str()?, request["request"].as_str()) {
        ("heartbeat", _) => json!({"category": "heartbeat", "statuscode": 200}),
        ("tracker", Some("set")) if values.get("version").is_some() && behavior.reject_version => {
            json!({
                "category": "tracker",
                "request": "set",
                "statuscode": 400,
                "values": {"statusmessage": "unsupported version"}
            })
        }
        ("tracker", Some("set")) => {
            json!({"category": "tracker", "request": "set", "statuscode": 200})
        }
        ("tracker", Some("get")) if values.as_array()?.contains(&json!("frame")) => {
            if behavior.reject_frames {
                json!({
                    "category": "tracker",
                    "request": "get",
                    "statuscode": 403,
                    "values": {"statusmessage": "not calibrated"}
                })
            } else {
                let n = shared.polled.fetch_add(1, Ordering::SeqCst) as u64;
                frame_message(500 + n, None)
            }
        }
        ("tracker", Some("get")) => json!({
            "category": "tracker",
            "request": "get",
            "statuscode": 200,
            "values": {
                "version": 1,
                "heartbeatinterval": behavior.heartbeat_ms,
                "iscalibrated": true,
                "framerate": 30,
                "trackerstate": 0
            }
        }),
        _ => return None,
    };

    if let Some(id) = id {
        reply["id"] = id;
    }
    Some(reply)
}

fn frame_message(timestamp: u64, id: Option<u64>) -> Value {
    let eye = json!({
        "raw": {"x": 500.5, "y": 380.25},
        "avg": {"x": 501.0, "y": 381.0},
        "psize": 17.2,
        "pcenter": {"x": 0.41, "y": 0.52}
    });
    let mut msg = json!({
        "category": "tracker",
        "request": "get",
        "statuscode": 200,
        "values": {"frame": {
            "timestamp": timestamp.to_string(),
            "time": timestamp,
            "fix": false,
            "state": 7,
            "raw": {"x": 512.4, "y": 384.9},
            "avg": {"x": 510.0, "y": 380.0},
            "lefteye": eye,
            "righteye": eye
        }}
    });
    if let Some(id) = id {
        msg["id"] = json!(id);
    }
    msg
}

fn quick_config() -> SessionConfig {
    SessionConfig::default()
        .with_request_timeout(Duration::from_secs(2))
        .with_frame_timeout(Duration::from_secs(2))
        .with_handshake_timeout(Duration::from_secs(2))
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    done()
}

fn connected(tracker: &FakeTracker) -> Session {
    let session = Session::with_config(tracker.endpoint(), quick_config());
    session.connect().expect("connect should succeed");
    session
}

#[test]
fn handshake_declares_version_then_reads_settings() {
    let tracker = FakeTracker::start(Behavior {
        heartbeat_ms: 3000,
        ..Behavior::default()
    });
    let session = connected(&tracker);

    assert_eq!(session.state(), SessionState::Connected(Mode::Pull));
    let info = session.tracker_info().expect("tracker info after connect");
    assert_eq!(info.version, 1);
    assert_eq!(info.heartbeat_interval(), Some(Duration::from_secs(3)));
    assert!(info.is_calibrated);
    assert_eq!(info.framerate, Some(30));

    let requests = tracker.requests();
    assert_eq!(requests[0]["request"], "set");
    assert_eq!(requests[0]["values"]["version"], 1);
    assert_eq!(requests[1]["request"], "get");
    assert!(requests[1]["values"]
        .as_array()
        .unwrap()
        .contains(&json!("heartbeatinterval")));

    assert!(matches!(
        session.connect(),
        Err(SessionError::AlreadyConnected)
    ));
}

#[test]
fn repeated_mode_calls_send_no_extra_requests() {
    let tracker = FakeTracker::start(Behavior::default());
    let session = connected(&tracker);

    session.pullmode().unwrap();
    session.pushmode().unwrap();
    session.pushmode().unwrap();
    session.pullmode().unwrap();
    session.pullmode().unwrap();
    session.pushmode().unwrap();

    assert_eq!(session.mode(), Some(Mode::Push));
    assert_eq!(tracker.push_requests(), vec![true, false, true]);
}

#[test]
fn pull_mode_requests_one_frame_per_call() {
    let tracker = FakeTracker::start(Behavior::default());
    let session = connected(&tracker);

    let first = session.next().unwrap();
    let second = session.next().unwrap();
    assert_eq!(first.timestamp(), "500");
    assert_eq!(second.timestamp(), "501");
    assert_eq!(first.time(), 0.5);
    assert!(first.left().valid);
    assert_eq!(first.raw().x, 512.4);
}

#[test]
fn push_mode_end_to_end() {
    let tracker = FakeTracker::start(Behavior::default());
    let session = connected(&tracker);

    session.pushmode().unwrap();
    for ts in [100, 101, 102] {
        tracker.push_frame(ts);
    }

    let stamps: Vec<String> = (0..3)
        .map(|_| session.next().unwrap().timestamp().to_string())
        .collect();
    assert_eq!(stamps, ["100", "101", "102"]);

    session.pullmode().unwrap();
    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(session.next(), Err(SessionError::ConnectionClosed)));

    assert!(wait_until(Duration::from_secs(2), || tracker.disconnects() == 1));
    let goodbye = tracker
        .requests()
        .into_iter()
        .last()
        .expect("disconnect notice");
    assert_eq!(goodbye["values"]["push"], false);
    assert!(goodbye.get("id").is_none());
}

#[test]
fn handshake_rejection_leaves_session_disconnected() {
    let tracker = FakeTracker::start(Behavior {
        reject_version: true,
        ..Behavior::default()
    });
    let session = Session::with_config(tracker.endpoint(), quick_config());

    let err = session.connect().unwrap_err();
    assert!(matches!(err, SessionError::Handshake(ref m) if m.contains("400")));
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(matches!(session.next(), Err(SessionError::NotConnected)));

    assert!(wait_until(Duration::from_secs(2), || tracker.disconnects() == 1));
}

#[test]
fn device_drop_wakes_blocked_next() {
    let tracker = FakeTracker::start(Behavior::default());
    let session = Arc::new(Session::with_config(
        tracker.endpoint(),
        quick_config().with_frame_timeout(Duration::from_secs(30)),
    ));
    session.connect().unwrap();
    session.pushmode().unwrap();

    let consumer = {
        let session = Arc::clone(&session);
        thread::spawn(move || {
            let started = Instant::now();
            (session.next(), started.elapsed())
        })
    };

    thread::sleep(Duration::from_millis(100));
    tracker.drop_client();

    let (result, waited) = consumer.join().unwrap();
    assert!(matches!(result, Err(SessionError::ConnectionClosed)));
    assert!(waited < Duration::from_secs(5));
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[test]
fn close_from_another_thread_wakes_blocked_next() {
    let tracker = FakeTracker::start(Behavior::default());
    let session = Arc::new(Session::with_config(
        tracker.endpoint(),
        quick_config().with_frame_timeout(Duration::from_secs(30)),
    ));
    session.connect().unwrap();
    session.pushmode().unwrap();

    let consumer = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.next())
    };

    thread::sleep(Duration::from_millis(100));
    let started = Instant::now();
    session.close();

    let result = consumer.join().unwrap();
    assert!(matches!(result, Err(SessionError::ConnectionClosed)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn mode_calls_fail_after_connection_loss() {
    let tracker = FakeTracker::start(Behavior::default());
    let session = connected(&tracker);
    session.pushmode().unwrap();

    tracker.drop_client();
    assert!(wait_until(Duration::from_secs(2), || {
        session.state() == SessionState::Disconnected
    }));

    assert!(matches!(
        session.pushmode(),
        Err(SessionError::ConnectionClosed)
    ));
    assert!(matches!(
        session.pushmode_with_filter(|_: &GazeFrame| true),
        Err(SessionError::ConnectionClosed)
    ));
    assert!(matches!(
        session.pullmode(),
        Err(SessionError::ConnectionClosed)
    ));
}

#[test]
fn pullmode_fails_after_connection_loss_in_pull_mode() {
    let tracker = FakeTracker::start(Behavior::default());
    let session = connected(&tracker);

    tracker.drop_client();
    assert!(wait_until(Duration::from_secs(2), || {
        session.state() == SessionState::Disconnected
    }));

    assert!(matches!(
        session.pullmode(),
        Err(SessionError::ConnectionClosed)
    ));
}

#[test]
fn garbage_between_pushed_frames_is_skipped() {
    let tracker = FakeTracker::start(Behavior::default());
    let session = connected(&tracker);
    session.pushmode().unwrap();

    tracker.push_frame(1);
    tracker.shared.send_raw(b"{garbage\n");
    tracker.push_frame(2);

    assert_eq!(session.next().unwrap().timestamp(), "1");
    assert_eq!(session.next().unwrap().timestamp(), "2");
    assert_eq!(session.state(), SessionState::Connected(Mode::Push));
}

#[test]
fn queued_frames_survive_connection_loss() {
    let tracker = FakeTracker::start(Behavior::default());
    let session = connected(&tracker);
    session.pushmode().unwrap();

    tracker.push_frame(7);
    tracker.push_frame(8);
    thread::sleep(Duration::from_millis(100));
    tracker.drop_client();

    assert_eq!(session.next().unwrap().timestamp(), "7");
    assert_eq!(session.next().unwrap().timestamp(), "8");
    assert!(matches!(session.next(), Err(SessionError::ConnectionClosed)));
}

#[test]
fn reconnect_after_connection_loss() {
    let tracker = FakeTracker::start(Behavior::default());
    let session = connected(&tracker);

    tracker.drop_client();
    assert!(wait_until(Duration::from_secs(2), || {
        session.state() == SessionState::Disconnected
    }));

    session.connect().unwrap();
    assert_eq!(session.state(), SessionState::Connected(Mode::Pull));
    assert!(session.next().is_ok());
}

#[test]
fn push_next_times_out_without_frames() {
    let tracker = FakeTracker::start(Behavior::default());
    let session = Session::with_config(
        tracker.endpoint(),
        quick_config().with_frame_timeout(Duration::from_millis(100)),
    );
    session.connect().unwrap();
    session.pushmode().unwrap();

    assert!(matches!(session.next(), Err(SessionError::Timeout(_))));
    assert!(matches!(session.try_next(), Ok(None)));
}

#[test]
fn replies_without_ids_are_matched_by_verb() {
    let tracker = FakeTracker::start(Behavior {
        omit_ids: true,
        ..Behavior::default()
    });
    let session = connected(&tracker);

    assert_eq!(session.next().unwrap().timestamp(), "500");
    session.pushmode().unwrap();
    tracker.push_frame(42);
    assert_eq!(session.next().unwrap().timestamp(), "42");
    session.pullmode().unwrap();
}

#[test]
fn device_error_surfaces_status_and_message() {
    let tracker = FakeTracker::start(Behavior {
        reject_frames: true,
        ..Behavior::default()
    });
    let session = connected(&tracker);

    match session.next() {
        Err(SessionError::Device { code, message }) => {
            assert_eq!(code, 403);
            assert_eq!(message, "not calibrated");
        }
        other => panic!("expected device error, got {other:?}"),
    }
    assert!(session.next().is_err());
}

#[test]
fn filter_drops_unwanted_frames() {
    let tracker = FakeTracker::start(Behavior::default());
    let session = connected(&tracker);

    session
        .pushmode_with_filter(|frame: &GazeFrame| frame.timestamp() != "13")
        .unwrap();
    for ts in [12, 13, 14] {
        tracker.push_frame(ts);
    }

    assert_eq!(session.next().unwrap().timestamp(), "12");
    assert_eq!(session.next().unwrap().timestamp(), "14");
}

#[test]
fn stale_frame_reply_is_not_delivered_to_next_poll() {
    let tracker = FakeTracker::start(Behavior::default());
    let session = connected(&tracker);

    // A reply for an id nobody waits on is dropped.
    tracker.shared.send(&frame_message(9999, Some(424242)));
    assert_eq!(session.next().unwrap().timestamp(), "500");
}

#[test]
fn heartbeats_follow_announced_interval() {
    let tracker = FakeTracker::start(Behavior {
        heartbeat_ms: 50,
        ..Behavior::default()
    });
    let session = connected(&tracker);

    thread::sleep(Duration::from_millis(80));
    session.next().unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        tracker
            .requests()
            .iter()
            .any(|r| r["category"] == "heartbeat")
    }));
}

#[test]
fn rebased_push_time_starts_at_zero() {
    let tracker = FakeTracker::start(Behavior::default());
    let session = Session::with_config(
        tracker.endpoint(),
        quick_config().with_rebase_push_time(true),
    );
    session.connect().unwrap();
    session.pushmode().unwrap();

    tracker.push_frame(2000);
    tracker.push_frame(2500);
    assert_eq!(session.next().unwrap().time(), 0.0);
    assert_eq!(session.next().unwrap().time(), 0.5);
}
