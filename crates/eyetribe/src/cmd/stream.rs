use std::sync::atomic::Ordering;

use tracing::{info, warn};

use crate::cmd::{install_stop_handler, print_frames, StreamArgs, TargetArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: StreamArgs, target: &TargetArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = target.config()?.with_rebase_push_time(args.rebase_time);
    if let Some(capacity) = args.queue_capacity {
        config = config.with_frame_queue_capacity(capacity);
    }

    let session = target.connect(config)?;
    let running = install_stop_handler(&session)?;
    if let Err(err) = session.pushmode() {
        session.close();
        return Err(session_error("push mode failed", err));
    }

    let result = print_frames(&session, &running, args.count, None, format);

    if let Err(err) = session.pullmode() {
        if running.load(Ordering::SeqCst) {
            warn!(error = %err, "could not return tracker to pull mode");
        }
    }
    session.close();

    let printed = result?;
    info!(frames = printed, "stream finished");
    Ok(SUCCESS)
}
