//! Line-based touch input
//!
//! Stands in for the touchscreen when running headless. Each line on stdin is
//! one event: `press <x> <y>`, `drag <x> <y>` or `release`.

use smartdash_core::dashboard::TouchEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub fn parse_event(line: &str) -> Option<TouchEvent> {
    let mut parts = line.split_whitespace();
    let command = parts.next()?.to_ascii_lowercase();
    let mut coord = || parts.next().and_then(|v| v.parse::<f32>().ok());

    match command.as_str() {
        "press" => Some(TouchEvent::Press { x: coord()?, y: coord()? }),
        "drag" => Some(TouchEvent::Drag { x: coord()?, y: coord()? }),
        "release" => Some(TouchEvent::Release),
        _ => None,
    }
}

/// Read events from stdin until it closes
pub async fn read_stdin(events: mpsc::UnboundedSender<TouchEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match parse_event(&line) {
                    Some(event) => {
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                    None => warn!(line = %line, "unrecognised input"),
                }
            }
            Ok(None) => {
                debug!("stdin closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "failed to read stdin");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_events() {
        assert_eq!(parse_event("press 10 20.5"), Some(TouchEvent::Press { x: 10.0, y: 20.5 }));
        assert_eq!(parse_event("DRAG 1 2"), Some(TouchEvent::Drag { x: 1.0, y: 2.0 }));
        assert_eq!(parse_event("release"), Some(TouchEvent::Release));
    }

    #[test]
    fn test_reject_malformed() {
        assert_eq!(parse_event("press 10"), None);
        assert_eq!(parse_event("press a b"), None);
        assert_eq!(parse_event("tap 1 2"), None);
        assert_eq!(parse_event(""), None);
    }
}
