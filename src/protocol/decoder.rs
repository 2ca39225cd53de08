// src/protocol/decoder.rs

//! Line → [`Event`] decoding.
//!
//! Grammar: `^\*([^:]*):(.*)$`. The name is matched case-insensitively
//! against a fixed vocabulary, the payload is everything after the first
//! `:` and may itself contain `:`.
//!
//! | name            | event                          | payload rule                         |
//! |-----------------|--------------------------------|--------------------------------------|
//! | `totalprogress` | [`Event::TotalProgress`]       | decimal, unparsable → ignored        |
//! | `progress`      | [`Event::StepProgress`]        | decimal, unparsable → ignored        |
//! | `stepstarted`   | [`Event::StepStarted`]         | trimmed text                         |
//! | `stepcomplete`  | [`Event::StepCompleted`]       | trimmed text                         |
//! | `allcomplete`   | [`Event::AllCompleted`]        | unused                               |
//! | `savedimage`    | [`Event::ImageSaved`]          | filename moved into `<scratch>/output`|
//! | `error`         | [`Event::Error`]               | message                              |
//! | `possibleerror` | [`Event::PossibleError`]       | integer, unparsable → `None`         |

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::events::{ErrorDetail, Event};

static PROTOCOL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\*(?P<name>[^:]*):(?P<payload>.*)$").expect("protocol regex is valid")
});

/// Result of decoding one raw line.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Event(Event),
    Ignored,
}

impl Decoded {
    pub fn into_event(self) -> Option<Event> {
        match self {
            Decoded::Event(ev) => Some(ev),
            Decoded::Ignored => None,
        }
    }
}

/// Pure decoder bound to the scratch output directory used to rewrite
/// `savedimage` paths.
#[derive(Debug, Clone)]
pub struct ProtocolDecoder {
    output_dir: PathBuf,
}

impl ProtocolDecoder {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Decode a single stdout line. Never fails.
    pub fn decode(&self, line: &str) -> Decoded {
        let Some(caps) = PROTOCOL_LINE.captures(line) else {
            return Decoded::Ignored;
        };
        let name = &caps["name"];
        let payload = &caps["payload"];

        let event = match name.to_ascii_lowercase().as_str() {
            "totalprogress" => parse_percent(payload).map(Event::TotalProgress),
            "progress" => parse_percent(payload).map(Event::StepProgress),
            "stepstarted" => Some(Event::StepStarted(payload.trim().to_string())),
            "stepcomplete" => Some(Event::StepCompleted(payload.trim().to_string())),
            "allcomplete" => Some(Event::AllCompleted),
            "savedimage" => self.rewrite_saved_image(payload).map(Event::ImageSaved),
            "error" => Some(Event::Error(ErrorDetail::Reported(payload.trim().to_string()))),
            "possibleerror" => Some(Event::PossibleError(payload.trim().parse::<i32>().ok())),
            _ => None,
        };

        event.map_or(Decoded::Ignored, Decoded::Event)
    }

    /// The container reports paths in its own filesystem; only the filename
    /// is meaningful on the host.
    fn rewrite_saved_image(&self, payload: &str) -> Option<PathBuf> {
        let filename = payload
            .trim()
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty() && *name != "." && *name != "..")?;
        Some(self.output_dir.join(filename))
    }
}

/// Decimal with `.` as separator regardless of locale. Non-finite values are
/// treated as unparsable.
fn parse_percent(payload: &str) -> Option<f64> {
    payload
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}
