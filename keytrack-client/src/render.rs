//! Terminal rendering of upload progress
//!
//! A plain observer: it subscribes to the event bus and prints one line per
//! slot change. It never touches the batch itself.

use keytrack_common::events::KeytrackEvent;
use keytrack_common::{PerFileResult, SlotStatus, GENERIC_FAILURE_MESSAGE};
use std::io::Write;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

/// One-line description of a slot
pub fn describe_slot(slot: &PerFileResult) -> String {
    match slot.status {
        SlotStatus::Pending => format!("{}: analysing...", slot.filename),
        SlotStatus::Errored => format!(
            "{}: error: {}",
            slot.filename,
            slot.error.as_deref().unwrap_or(GENERIC_FAILURE_MESSAGE)
        ),
        SlotStatus::Done if slot.analysis.is_empty() => {
            format!("{}: done (no keywords)", slot.filename)
        }
        SlotStatus::Done => format!("{}: {}", slot.filename, slot.analysis.join(", ")),
    }
}

/// Print events until the upload reaches a terminal event
///
/// Returns the number of lines written.
pub async fn render_events<W: Write>(
    mut rx: broadcast::Receiver<KeytrackEvent>,
    mut out: W,
) -> std::io::Result<usize> {
    let mut lines = 0;

    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Renderer fell behind, some updates were not shown");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match &event {
            KeytrackEvent::UploadStarted { filenames, .. } => {
                for filename in filenames {
                    writeln!(out, "{}", describe_slot(&PerFileResult::pending(filename.as_str())))?;
                    lines += 1;
                }
            }
            KeytrackEvent::SlotUpdated { slot, .. } => {
                writeln!(out, "{}", describe_slot(slot))?;
                lines += 1;
            }
            KeytrackEvent::UploadFailed { error_message, .. } => {
                writeln!(out, "upload failed: {}", error_message)?;
                lines += 1;
            }
            KeytrackEvent::UploadCancelled { slots_pending, .. } => {
                writeln!(out, "upload cancelled ({} file(s) unfinished)", slots_pending)?;
                lines += 1;
            }
            KeytrackEvent::StateChanged { .. }
            | KeytrackEvent::FrameRejected { .. }
            | KeytrackEvent::UploadCompleted { .. } => {}
        }
        out.flush()?;

        if event.is_terminal() {
            break;
        }
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keytrack_common::events::EventBus;
    use uuid::Uuid;

    fn done(filename: &str, analysis: &[&str]) -> PerFileResult {
        PerFileResult {
            filename: filename.to_string(),
            analysis: analysis.iter().map(|s| s.to_string()).collect(),
            error: None,
            status: SlotStatus::Done,
        }
    }

    #[test]
    fn test_describe_slot_variants() {
        assert_eq!(
            describe_slot(&PerFileResult::pending("a.mp4")),
            "a.mp4: analysing..."
        );
        assert_eq!(describe_slot(&done("a.mp4", &["jazz", "funk"])), "a.mp4: jazz, funk");
        assert_eq!(describe_slot(&done("a.mp4", &[])), "a.mp4: done (no keywords)");
        assert_eq!(
            describe_slot(&PerFileResult::failed("a.mp4", "bad codec")),
            "a.mp4: error: bad codec"
        );
    }

    #[tokio::test]
    async fn test_render_stops_at_terminal_event() {
        let bus = EventBus::new(16);
        let rx = bus.subscribe();
        let batch_id = Uuid::new_v4();

        bus.emit(KeytrackEvent::UploadStarted {
            batch_id,
            filenames: vec!["a.mp4".to_string(), "b.mp4".to_string()],
            timestamp: chrono::Utc::now(),
        })
        .unwrap();
        bus.emit(KeytrackEvent::SlotUpdated {
            batch_id,
            index: 1,
            slot: done("b.mp4", &["jazz"]),
            timestamp: chrono::Utc::now(),
        })
        .unwrap();
        bus.emit(KeytrackEvent::UploadCompleted {
            batch_id,
            redirect: None,
            timestamp: chrono::Utc::now(),
        })
        .unwrap();

        let mut out = Vec::new();
        let lines = render_events(rx, &mut out).await.unwrap();

        assert_eq!(lines, 3);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "a.mp4: analysing...\nb.mp4: analysing...\nb.mp4: jazz\n"
        );
    }

    #[tokio::test]
    async fn test_render_returns_on_completion_with_all_slot_lines_written() {
        let bus = EventBus::new(16);
        let rx = bus.subscribe();
        let batch_id = Uuid::new_v4();

        bus.emit(KeytrackEvent::SlotUpdated {
            batch_id,
            index: 0,
            slot: done("a.mp4", &["funk"]),
            timestamp: chrono::Utc::now(),
        })
        .unwrap();
        bus.emit(KeytrackEvent::UploadCompleted {
            batch_id,
            redirect: Some("/music/?srp_search=funk".to_string()),
            timestamp: chrono::Utc::now(),
        })
        .unwrap();
        // Anything after the terminal event belongs to the caller
        bus.emit(KeytrackEvent::SlotUpdated {
            batch_id,
            index: 0,
            slot: done("a.mp4", &["late"]),
            timestamp: chrono::Utc::now(),
        })
        .unwrap();

        let mut out = Vec::new();
        render_events(rx, &mut out).await.unwrap();

        // The redirect is not printed here; the caller navigates afterwards
        assert_eq!(String::from_utf8(out).unwrap(), "a.mp4: funk\n");
    }
}
