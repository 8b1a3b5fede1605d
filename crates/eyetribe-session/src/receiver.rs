use std::io::{self, Read};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use eyetribe_protocol::{decode, is_notice, status_name, GazeFrame, MessageKind, ProtocolMessage};
use eyetribe_transport::{LineReader, TrackerStream, TransportError};
use tracing::{debug, info, trace, warn};

use crate::link::Link;

/// Start the background thread that owns the read half of the connection.
pub(crate) fn spawn(
    reader: LineReader<TrackerStream>,
    link: Arc<Link>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("eyetribe-receiver".to_string())
        .spawn(move || run(reader, &link))
}

/// Read and route messages until the stream ends, then close the link.
pub(crate) fn run<R: Read>(mut reader: LineReader<R>, link: &Link) {
    loop {
        let payload = match reader.read_message() {
            Ok(payload) => payload,
            Err(TransportError::ConnectionClosed) => {
                if link.is_closed() {
                    debug!("receiver stopped");
                } else {
                    info!("tracker closed the connection");
                }
                break;
            }
            Err(err) => {
                if !link.is_closed() {
                    warn!(error = %err, "receiver stopped on read error");
                }
                break;
            }
        };

        match decode(&payload) {
            Ok(msg) => route(link, msg),
            Err(err) => warn!(error = %err, "skipping malformed message"),
        }
    }

    link.close();
}

/// Deliver one decoded message to a waiting caller, the frame queue, or the log.
pub(crate) fn route(link: &Link, msg: ProtocolMessage) {
    let msg = match link.pending.resolve(msg) {
        Ok(()) => return,
        Err(unmatched) => unmatched,
    };

    if let Some(block) = msg.frame.as_ref().filter(|_| msg.id.is_none()) {
        if link.is_streaming() {
            link.accept_frame(GazeFrame::from_block(block, SystemTime::now()));
        } else {
            trace!("discarding pushed frame outside push mode");
        }
        return;
    }

    if msg.is_heartbeat() {
        debug!(status = msg.status, "heartbeat acknowledged");
        return;
    }

    match msg.kind {
        kind if kind == MessageKind::PushNotification || is_notice(msg.status) => debug!(
            category = %msg.category,
            status = msg.status,
            notice = status_name(msg.status),
            "tracker notice"
        ),
        MessageKind::Error => warn!(
            category = %msg.category,
            status = msg.status,
            message = msg.status_message().unwrap_or_default(),
            "tracker error with no pending request"
        ),
        _ => warn!(
            category = %msg.category,
            request = msg.request.as_deref().unwrap_or_default(),
            id = msg.id,
            "dropping reply that matches no pending request"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::mpsc::TryRecvError;
    use std::time::Duration;

    use eyetribe_protocol::Request;

    use super::*;
    use crate::config::SessionConfig;
    use crate::queue::Pop;

    fn link() -> Link {
        Link::new(&SessionConfig::default())
    }

    fn feed(link: &Link, wire: &str) {
        run(LineReader::new(Cursor::new(wire.as_bytes().to_vec())), link);
    }

    const FRAME_100: &str = r#"{"category":"tracker","request":"get","statuscode":200,"values":{"frame":{"timestamp":"100","time":100,"state":7}}}"#;

    #[test]
    fn replies_reach_callers_in_any_order() {
        let link = link();
        let waiters: Vec<_> = (1..=5u64)
            .map(|id| {
                let request = match id % 3 {
                    0 => Request::get_frame(id),
                    1 => Request::set_push(id, true),
                    _ => Request::get(id, &["framerate"]),
                };
                (id, link.pending.register(&request).unwrap())
            })
            .collect();

        let mut wire = String::new();
        for id in (1..=5u64).rev() {
            let line = match id % 3 {
                0 => format!(
                    r#"{{"category":"tracker","request":"get","id":{id},"statuscode":200,"values":{{"frame":{{"timestamp":"t{id}","time":{id}}}}}}}"#
                ),
                1 => format!(r#"{{"category":"tracker","request":"set","id":{id},"statuscode":200}}"#),
                _ => format!(
                    r#"{{"category":"tracker","request":"get","id":{id},"statuscode":200,"values":{{"framerate":{id}}}}}"#
                ),
            };
            wire.push_str(&line);
            wire.push('\n');
        }
        feed(&link, &wire);

        for (id, waiter) in waiters {
            let reply = waiter.try_recv().unwrap();
            assert_eq!(reply.id, Some(id));
            assert_eq!(reply.is_frame_bearing(), id % 3 == 0);
        }
    }

    #[test]
    fn malformed_lines_do_not_stop_the_receiver() {
        let link = link();
        let rx = link.pending.register(&Request::set_push(1, true)).unwrap();

        let wire = concat!(
            "not json\n",
            "[1,2,3]\n",
            "{\"request\":\"set\"}\n",
            "{\"category\":\"tracker\",\"request\":\"set\",\"id\":1,\"statuscode\":200}\n",
        );
        feed(&link, wire);

        assert_eq!(rx.try_recv().unwrap().status, 200);
    }

    #[test]
    fn pushed_frames_are_queued_only_while_streaming() {
        let link = link();
        route(&link, decode(FRAME_100.as_bytes()).unwrap());
        assert_eq!(link.frames.len(), 0);

        link.set_streaming(true, None);
        route(&link, decode(FRAME_100.as_bytes()).unwrap());
        assert_eq!(link.frames.len(), 1);
        match link.frames.try_pop() {
            Pop::Frame(frame) => assert_eq!(frame.timestamp(), "100"),
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn pending_frame_request_wins_over_queue() {
        let link = link();
        link.set_streaming(true, None);
        let rx = link.pending.register(&Request::get_frame(9)).unwrap();

        route(&link, decode(FRAME_100.as_bytes()).unwrap());
        assert!(rx.try_recv().is_ok());
        assert_eq!(link.frames.len(), 0);
    }

    #[test]
    fn notices_and_heartbeats_are_not_queued() {
        let link = link();
        link.set_streaming(true, None);
        route(
            &link,
            decode(br#"{"category":"tracker","statuscode":802}"#).unwrap(),
        );
        route(
            &link,
            decode(br#"{"category":"heartbeat","statuscode":200}"#).unwrap(),
        );
        assert_eq!(link.frames.len(), 0);
    }

    #[test]
    fn end_of_stream_closes_the_link() {
        let link = link();
        let rx = link.pending.register(&Request::get_frame(1)).unwrap();
        feed(&link, "");

        assert!(link.is_closed());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));
        assert!(matches!(
            link.frames.pop_timeout(Duration::from_millis(10)),
            Pop::Closed
        ));
    }
}
