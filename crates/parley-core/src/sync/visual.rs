//! Derived per-message presentation annotations.
//!
//! Pure functions over the merged sequence: whether a message starts,
//! continues, or ends a same-sender run, and whether a time separator
//! belongs before it. Separator placement looks past system messages and
//! empty entries for the nearest earlier real message, so it is a
//! computation over the full sequence, not just adjacent array entries.

use chrono::{DateTime, Utc};

use crate::models::Message;

/// Position of a message within a visual run of same-sender messages,
/// in chronological terms: `Start` is the earliest message of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPosition {
    Solo,
    Start,
    Middle,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    /// The message falls on a different calendar day than the nearest
    /// earlier real message.
    DayBoundary,
    /// Same day, but the gap to the nearest earlier real message meets the
    /// separator threshold.
    TimeGap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualAnnotation {
    pub run: RunPosition,
    pub separator: Option<Separator>,
}

fn same_day(a_ms: i64, b_ms: i64) -> bool {
    let day = |ms| DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.date_naive());
    match (day(a_ms), day(b_ms)) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

fn grouped(a: &Message, b: &Message, group_window_ms: i64) -> bool {
    a.sender == b.sender && (a.created_at_ms - b.created_at_ms).abs() <= group_window_ms
}

/// Annotate a newest-first merged sequence.
///
/// Output is index-aligned with the input.
pub fn annotate(
    messages: &[Message],
    group_window_ms: i64,
    separator_gap_ms: i64,
) -> Vec<VisualAnnotation> {
    let len = messages.len();
    let mut annotations = Vec::with_capacity(len);

    for (i, message) in messages.iter().enumerate() {
        // Newest-first: i+1 is chronologically earlier, i-1 later.
        let earlier = messages.get(i + 1);
        let later = if i > 0 { messages.get(i - 1) } else { None };

        let with_earlier = earlier.map_or(false, |e| grouped(message, e, group_window_ms));
        let with_later = later.map_or(false, |l| grouped(message, l, group_window_ms));

        let run = match (with_earlier, with_later) {
            (false, false) => RunPosition::Solo,
            (false, true) => RunPosition::Start,
            (true, true) => RunPosition::Middle,
            (true, false) => RunPosition::End,
        };

        let nearest_earlier_real = messages[i + 1..].iter().find(|m| m.is_real());
        let separator = match nearest_earlier_real {
            Some(anchor) => {
                if !same_day(message.created_at_ms, anchor.created_at_ms) {
                    Some(Separator::DayBoundary)
                } else if message.created_at_ms - anchor.created_at_ms >= separator_gap_ms {
                    Some(Separator::TimeGap)
                } else {
                    None
                }
            }
            // Transcript start: only the chronologically first message
            // carries the opening day marker.
            None if i + 1 == len => Some(Separator::DayBoundary),
            None => None,
        };

        annotations.push(VisualAnnotation { run, separator });
    }

    annotations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Delivery, Sender};

    const MINUTE: i64 = 60 * 1000;
    const GROUP: i64 = 3 * MINUTE;
    const GAP: i64 = 10 * MINUTE;

    fn msg(id: &str, ms: i64, sender: Sender) -> Message {
        Message {
            id: id.into(),
            text: format!("text {id}"),
            sender,
            created_at_ms: ms,
            delivery: Delivery::Confirmed,
        }
    }

    fn base() -> i64 {
        // 2024-05-01 12:00:00 UTC, well inside a day.
        1_714_564_800_000
    }

    #[test]
    fn same_sender_within_window_forms_a_run() {
        let t = base();
        // Newest-first: c (t+2m), b (t+1m), a (t).
        let messages = vec![
            msg("c", t + 2 * MINUTE, Sender::User),
            msg("b", t + MINUTE, Sender::User),
            msg("a", t, Sender::User),
        ];
        let ann = annotate(&messages, GROUP, GAP);
        assert_eq!(ann[0].run, RunPosition::End);
        assert_eq!(ann[1].run, RunPosition::Middle);
        assert_eq!(ann[2].run, RunPosition::Start);
    }

    #[test]
    fn sender_change_breaks_run() {
        let t = base();
        let messages = vec![
            msg("b", t + MINUTE, Sender::Admin { admin_id: "op".into() }),
            msg("a", t, Sender::User),
        ];
        let ann = annotate(&messages, GROUP, GAP);
        assert_eq!(ann[0].run, RunPosition::Solo);
        assert_eq!(ann[1].run, RunPosition::Solo);
    }

    #[test]
    fn different_admins_do_not_group() {
        let t = base();
        let messages = vec![
            msg("b", t + MINUTE, Sender::Admin { admin_id: "op-2".into() }),
            msg("a", t, Sender::Admin { admin_id: "op-1".into() }),
        ];
        let ann = annotate(&messages, GROUP, GAP);
        assert_eq!(ann[0].run, RunPosition::Solo);
        assert_eq!(ann[1].run, RunPosition::Solo);
    }

    #[test]
    fn gap_beyond_window_breaks_run() {
        let t = base();
        let messages = vec![
            msg("b", t + GROUP + 1, Sender::User),
            msg("a", t, Sender::User),
        ];
        let ann = annotate(&messages, GROUP, GAP);
        assert_eq!(ann[0].run, RunPosition::Solo);
        assert_eq!(ann[1].run, RunPosition::Solo);
    }

    #[test]
    fn ten_minute_gap_inserts_time_separator() {
        let t = base();
        let messages = vec![msg("b", t + GAP, Sender::User), msg("a", t, Sender::User)];
        let ann = annotate(&messages, GROUP, GAP);
        assert_eq!(ann[0].separator, Some(Separator::TimeGap));
        assert_eq!(ann[1].separator, Some(Separator::DayBoundary));
    }

    #[test]
    fn day_change_inserts_day_separator() {
        let t = base();
        let messages = vec![
            msg("b", t + 24 * 60 * MINUTE, Sender::User),
            msg("a", t, Sender::User),
        ];
        let ann = annotate(&messages, GROUP, GAP);
        assert_eq!(ann[0].separator, Some(Separator::DayBoundary));
    }

    #[test]
    fn separator_anchor_skips_system_and_empty_messages() {
        let t = base();
        let mut empty = msg("blank", t + 11 * MINUTE, Sender::User);
        empty.text = "  ".into();
        let messages = vec![
            msg("d", t + 12 * MINUTE, Sender::User),
            empty,
            msg("sys", t + 11 * MINUTE, Sender::System),
            msg("a", t, Sender::User),
        ];
        let ann = annotate(&messages, GROUP, GAP);
        // Anchor for "d" is "a" (skipping the system notice and the empty
        // entry), and the gap to it is 12 minutes.
        assert_eq!(ann[0].separator, Some(Separator::TimeGap));
    }

    #[test]
    fn close_messages_get_no_separator() {
        let t = base();
        let messages = vec![msg("b", t + MINUTE, Sender::User), msg("a", t, Sender::User)];
        let ann = annotate(&messages, GROUP, GAP);
        assert_eq!(ann[0].separator, None);
    }

    #[test]
    fn empty_sequence_annotates_nothing() {
        assert!(annotate(&[], GROUP, GAP).is_empty());
    }
}
