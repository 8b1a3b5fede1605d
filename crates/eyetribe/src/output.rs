use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use eyetribe_session::{GazeFrame, TrackerInfo};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// `;`-separated records with a header line.
    Csv,
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Csv
        }
    }
}

const RECORD_SEPARATOR: &str = ";";

/// Prints frames one by one; table output is collected and printed by
/// [`FramePrinter::finish`].
pub struct FramePrinter {
    format: OutputFormat,
    header_printed: bool,
    table: Option<Table>,
    rows: usize,
}

impl FramePrinter {
    pub fn new(format: OutputFormat) -> Self {
        let table = (format == OutputFormat::Table).then(|| {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "aT", "dT", "FIX", "STATE", "GAZE X", "GAZE Y", "L SIZE", "R SIZE",
                ]);
            table
        });

        Self {
            format,
            header_printed: false,
            table,
            rows: 0,
        }
    }

    pub fn print(&mut self, frame: &GazeFrame) {
        match self.format {
            OutputFormat::Csv => {
                if !self.header_printed {
                    println!("{}", GazeFrame::RECORD_HEADER);
                    self.header_printed = true;
                }
                println!("{}", frame.to_record(RECORD_SEPARATOR));
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string(frame).unwrap_or_else(|_| "{}".to_string())
                );
            }
            OutputFormat::Table => {
                if let Some(table) = self.table.as_mut() {
                    table.add_row(frame_row(frame));
                    self.rows += 1;
                }
            }
            OutputFormat::Pretty => println!("{}", pretty_frame(frame)),
        }
    }

    pub fn finish(&mut self) {
        if let Some(table) = self.table.take() {
            if self.rows > 0 {
                println!("{table}");
            }
        }
    }
}

fn frame_row(frame: &GazeFrame) -> Vec<String> {
    vec![
        frame.timestamp().to_string(),
        format!("{:.3}", frame.time()),
        fix_label(frame).to_string(),
        frame.state().flags(),
        format!("{:.0}", frame.avg().x),
        format!("{:.0}", frame.avg().y),
        format!("{:.1}", frame.left().pupil_size),
        format!("{:.1}", frame.right().pupil_size),
    ]
}

fn pretty_frame(frame: &GazeFrame) -> String {
    format!(
        "{} dT={:.3}s {} state={} gaze=({:.0}, {:.0}) left={} right={}",
        frame.timestamp(),
        frame.time(),
        fix_label(frame),
        frame.state().flags(),
        frame.avg().x,
        frame.avg().y,
        if frame.left().valid { "ok" } else { "-" },
        if frame.right().valid { "ok" } else { "-" },
    )
}

fn fix_label(frame: &GazeFrame) -> &'static str {
    if frame.is_fixated() {
        "fixation"
    } else {
        "moving"
    }
}

#[derive(Serialize)]
pub struct InfoOutput<'a> {
    pub endpoint: String,
    #[serde(flatten)]
    pub tracker: &'a TrackerInfo,
    pub tracker_state_name: Option<&'static str>,
}

impl InfoOutput<'_> {
    fn rows(&self) -> Vec<(&'static str, String)> {
        let optional = |value: Option<String>| value.unwrap_or_else(|| "unknown".to_string());
        vec![
            ("endpoint", self.endpoint.clone()),
            ("protocol_version", self.tracker.version.to_string()),
            (
                "heartbeat_interval_ms",
                optional(self.tracker.heartbeat_interval_ms.map(|ms| ms.to_string())),
            ),
            ("calibrated", self.tracker.is_calibrated.to_string()),
            (
                "framerate",
                optional(self.tracker.framerate.map(|fps| fps.to_string())),
            ),
            (
                "tracker_state",
                optional(self.tracker_state_name.map(str::to_string)),
            ),
        ]
    }
}

pub fn print_info(out: &InfoOutput<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in out.rows() {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Csv => {
            for (field, value) in out.rows() {
                println!("{field}{RECORD_SEPARATOR}{value}");
            }
        }
        OutputFormat::Pretty => {
            println!("Tracker Info:");
            for (field, value) in out.rows() {
                println!("  {:<22} {}", format!("{field}:"), value);
            }
        }
    }
}
