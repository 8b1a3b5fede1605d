use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::message::ProtocolMessage;

/// A 2D point, usually in screen pixels (pupil centres are normalised 0..1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Tracking state bit flags reported with every frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TrackingState(u32);

impl TrackingState {
    /// Gaze point is being tracked.
    pub const GAZE: u32 = 0x01;
    /// Both eyes are found.
    pub const EYES: u32 = 0x02;
    /// A user is present in front of the device.
    pub const PRESENCE: u32 = 0x04;
    /// Tracking failed for this frame.
    pub const FAIL: u32 = 0x08;
    /// Tracking was lost.
    pub const LOST: u32 = 0x10;

    pub fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    /// Five-character summary, most significant flag first: `LFPEG`, `.` when unset.
    pub fn flags(self) -> String {
        [
            (Self::LOST, 'L'),
            (Self::FAIL, 'F'),
            (Self::PRESENCE, 'P'),
            (Self::EYES, 'E'),
            (Self::GAZE, 'G'),
        ]
        .iter()
        .map(|&(flag, c)| if self.contains(flag) { c } else { '.' })
        .collect()
    }
}

/// Left or right eye.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Per-eye data within one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Eye {
    pub raw: Point,
    pub avg: Point,
    pub pupil_size: f64,
    pub pupil_center: Point,
    /// False when the device omitted this eye's data (tracking lost for it).
    pub valid: bool,
}

impl Eye {
    fn from_block(block: Option<&EyeBlock>) -> Self {
        let Some(block) = block else {
            return Self::default();
        };
        Self {
            raw: block.raw.unwrap_or_default(),
            avg: block.avg.unwrap_or_default(),
            pupil_size: block.psize.unwrap_or_default(),
            pupil_center: block.pcenter.unwrap_or_default(),
            valid: block.raw.is_some() && block.avg.is_some(),
        }
    }
}

/// Wire form of a `values.frame` block.
///
/// `time` and `timestamp` are required; everything else may be omitted by
/// the device and is defaulted when converting to a [`GazeFrame`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrameBlock {
    #[serde(deserialize_with = "timestamp_text")]
    pub timestamp: String,
    pub time: f64,
    #[serde(default)]
    pub fix: bool,
    #[serde(default)]
    pub state: u32,
    pub raw: Option<Point>,
    pub avg: Option<Point>,
    pub lefteye: Option<EyeBlock>,
    pub righteye: Option<EyeBlock>,
}

/// Wire form of a `lefteye`/`righteye` block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EyeBlock {
    pub raw: Option<Point>,
    pub avg: Option<Point>,
    pub psize: Option<f64>,
    pub pcenter: Option<Point>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimestampRepr {
    Int(i64),
    Float(f64),
    Text(String),
}

fn timestamp_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match TimestampRepr::deserialize(deserializer)? {
        TimestampRepr::Int(n) => n.to_string(),
        TimestampRepr::Float(f) => f.to_string(),
        TimestampRepr::Text(s) => s,
    })
}

/// One gaze sample.
///
/// Immutable once built; produced once per decoded frame message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GazeFrame {
    received_at: f64,
    time: f64,
    timestamp: String,
    fix: bool,
    state: TrackingState,
    raw: Point,
    avg: Point,
    left: Eye,
    right: Eye,
}

impl GazeFrame {
    /// Build a frame from a decoded frame block, stamped with `received_at`.
    pub fn from_block(block: &FrameBlock, received_at: SystemTime) -> Self {
        let received_at = received_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        Self {
            received_at,
            time: block.time / 1000.0,
            timestamp: block.timestamp.clone(),
            fix: block.fix,
            state: TrackingState::from_bits(block.state),
            raw: block.raw.unwrap_or_default(),
            avg: block.avg.unwrap_or_default(),
            left: Eye::from_block(block.lefteye.as_ref()),
            right: Eye::from_block(block.righteye.as_ref()),
        }
    }

    /// Build a frame from a frame-bearing message, stamped now.
    ///
    /// Returns `None` when the message carries no frame block.
    pub fn from_message(msg: &ProtocolMessage) -> Option<Self> {
        msg.frame
            .as_ref()
            .map(|block| Self::from_block(block, SystemTime::now()))
    }

    /// Copy of this frame with `dT` measured from `origin` seconds.
    pub fn rebased(&self, origin: f64) -> Self {
        Self {
            time: self.time - origin,
            ..self.clone()
        }
    }

    /// eT: local reception time, seconds since the UNIX epoch.
    pub fn received_at(&self) -> f64 {
        self.received_at
    }

    /// dT: device time in seconds.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// aT: device timestamp as sent on the wire.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn is_fixated(&self) -> bool {
        self.fix
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn raw(&self) -> Point {
        self.raw
    }

    pub fn avg(&self) -> Point {
        self.avg
    }

    pub fn left(&self) -> &Eye {
        &self.left
    }

    pub fn right(&self) -> &Eye {
        &self.right
    }

    pub fn eye(&self, side: Side) -> &Eye {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Render as one `sep`-separated record.
    ///
    /// Column order matches [`GazeFrame::RECORD_HEADER`]; gaze coordinates are
    /// truncated to whole pixels.
    pub fn to_record(&self, sep: &str) -> String {
        let mut out = format!(
            "{:014.3}{sep}{:07.3}{sep}{}{sep}{}{sep}{}{sep}",
            self.received_at,
            self.time,
            self.timestamp,
            if self.fix { 'F' } else { 'N' },
            self.state.flags(),
        );
        push_pixels(&mut out, self.raw, sep);
        out.push_str(sep);
        push_pixels(&mut out, self.avg, sep);
        for eye in [&self.left, &self.right] {
            out.push_str(sep);
            push_eye(&mut out, eye, sep);
        }
        out
    }

    /// Header line for [`GazeFrame::to_record`] with `;` separators.
    pub const RECORD_HEADER: &'static str =
        "eT;dT;aT;Fix;State;Rwx;Rwy;Avx;Avy;LRwx;LRwy;LAvx;LAvy;LSz;LCx;LCy;RRwx;RRwy;RAvx;RAvy;RSz;RCx;RCy";
}

fn push_pixels(out: &mut String, p: Point, sep: &str) {
    let _ = write!(out, "{}{sep}{}", p.x.trunc() as i64, p.y.trunc() as i64);
}

fn push_eye(out: &mut String, eye: &Eye, sep: &str) {
    push_pixels(out, eye.raw, sep);
    out.push_str(sep);
    push_pixels(out, eye.avg, sep);
    let _ = write!(
        out,
        "{sep}{:.1}{sep}{:.3}{sep}{:.3}",
        eye.pupil_size, eye.pupil_center.x, eye.pupil_center.y
    );
}
