//! Scheduling scripted times against the simulated clock.

use crate::script::{Micros, TimeKind, TimeSpec};
use thiserror::Error as ThisError;

/// Resolves the times of an event about to be scheduled.
///
/// Absolute times are measured from the start of the run. Relative times
/// are measured from whichever is later: now, or the previous event's
/// scheduled time. The resulting `offset` remembers that anchor.
pub fn adjust_time(spec: &mut TimeSpec, start: Micros, now: Micros, previous: Micros) {
    match spec.kind {
        TimeKind::Absolute | TimeKind::AbsoluteRange => {
            spec.offset = 0;
            spec.time += start;
            spec.end += start;
        }
        TimeKind::Relative | TimeKind::RelativeRange | TimeKind::Any => {
            let offset = (now - start).max(previous - start);
            spec.offset = offset;
            spec.time += offset + start;
            spec.end += offset + start;
        }
    }
}

/// Checks that something happened at `actual` when `spec` allowed it.
pub fn verify_time(
    spec: &TimeSpec,
    actual: Micros,
    tolerance: u64,
    description: &str,
) -> Result<(), TimingError> {
    let tolerance = tolerance as Micros;
    let on_time = match spec.kind {
        TimeKind::Any => true,
        TimeKind::AbsoluteRange | TimeKind::RelativeRange => {
            spec.time - tolerance <= actual && actual <= spec.end + tolerance
        }
        TimeKind::Absolute | TimeKind::Relative => (actual - spec.time).abs() <= tolerance,
    };
    if on_time {
        Ok(())
    } else {
        Err(TimingError {
            description: description.to_string(),
            expected: spec.time,
            expected_end: spec.kind.is_range().then_some(spec.end),
            actual,
        })
    }
}

#[derive(Debug, ThisError, Clone, PartialEq, Eq)]
#[error("Timing error: {description} expected at {}, happened at {actual}", show_expected(.expected, .expected_end))]
pub struct TimingError {
    pub description: String,
    pub expected: Micros,
    pub expected_end: Option<Micros>,
    pub actual: Micros,
}

fn show_expected(start: &Micros, end: &Option<Micros>) -> String {
    match end {
        Some(end) => format!("{start}~{end}"),
        None => start.to_string(),
    }
}
