//! Stream one second of gaze data and print where the user looked.
//!
//! Run with a tracker server listening on localhost:6555:
//!   cargo run --example gaze-stream

use eyetribe::{Endpoint, Session, SessionConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = SessionConfig::default().with_rebase_push_time(true);
    let session = Session::with_config(Endpoint::default(), config);
    session.connect()?;

    if let Some(info) = session.tracker_info() {
        eprintln!(
            "Connected: protocol {}, {} fps, calibrated={}",
            info.version,
            info.framerate.unwrap_or_default(),
            info.is_calibrated
        );
    }

    // Keep only frames where the tracker actually found a gaze point.
    session.pushmode_with_filter(|frame| {
        frame
            .state()
            .contains(eyetribe::protocol::TrackingState::GAZE)
    })?;

    while let Ok(frame) = session.next() {
        let gaze = frame.avg();
        println!("{:>7.3}s  ({:>6.1}, {:>6.1})", frame.time(), gaze.x, gaze.y);
        if frame.time() >= 1.0 {
            break;
        }
    }

    session.pullmode()?;
    session.close();
    Ok(())
}
