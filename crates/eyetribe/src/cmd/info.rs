use crate::cmd::{InfoArgs, TargetArgs};
use crate::exit::{CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_info, InfoOutput, OutputFormat};

pub fn run(_args: InfoArgs, target: &TargetArgs, format: OutputFormat) -> CliResult<i32> {
    let session = target.connect(target.config()?)?;

    let Some(tracker) = session.tracker_info() else {
        session.close();
        return Err(CliError::new(INTERNAL, "connected without tracker info"));
    };
    session.close();

    let out = InfoOutput {
        endpoint: session.endpoint().to_string(),
        tracker: &tracker,
        tracker_state_name: tracker.tracker_state_name(),
    };
    print_info(&out, format);
    Ok(SUCCESS)
}
