use tracing::info;

use crate::cmd::{install_stop_handler, parse_duration, print_frames, PullArgs, TargetArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: PullArgs, target: &TargetArgs, format: OutputFormat) -> CliResult<i32> {
    let pause = args.interval.as_deref().map(parse_duration).transpose()?;
    let session = target.connect(target.config()?)?;
    let running = install_stop_handler(&session)?;

    let result = print_frames(&session, &running, args.count, pause, format);
    session.close();

    let printed = result?;
    info!(frames = printed, "pull finished");
    Ok(SUCCESS)
}
