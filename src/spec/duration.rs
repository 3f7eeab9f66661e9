use chrono::Duration;
use serde::Deserialize;

/// A duration as written in a job specification
///
/// Either a mapping of whole units (`{hours: 1, minutes: 30}`) or a clock string
/// (`01:30:00`, `2-00:00:00`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SpecDuration {
    Parts(DurationParts),
    Clock(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DurationParts {
    #[serde(default)]
    days: i64,
    #[serde(default)]
    hours: i64,
    #[serde(default)]
    minutes: i64,
    #[serde(default)]
    seconds: i64,
}

impl SpecDuration {
    pub fn to_duration(&self) -> Result<Duration, String> {
        match self {
            SpecDuration::Parts(parts) => {
                let DurationParts { days, hours, minutes, seconds } = *parts;
                if [days, hours, minutes, seconds].iter().any(|v| *v < 0) {
                    return Err("duration fields must not be negative".to_string());
                }
                total_seconds(days, hours, minutes, seconds)
                    .ok_or_else(|| "duration is too long".to_string())
            }
            SpecDuration::Clock(text) => parse_clock(text),
        }
    }
}

/// Parse `[D-]HH:MM:SS`, the notation sbatch uses for `--time`
pub fn parse_clock(text: &str) -> Result<Duration, String> {
    let invalid = || format!("invalid time '{text}', expected [D-]HH:MM:SS");

    let (days, clock) = match text.split_once('-') {
        Some((days, clock)) => (parse_unit(days).ok_or_else(invalid)?, clock),
        None => (0, text),
    };

    let fields: Vec<&str> = clock.split(':').collect();
    if fields.len() != 3 {
        return Err(invalid());
    }
    let hours = parse_unit(fields[0]).ok_or_else(invalid)?;
    let minutes = parse_unit(fields[1]).ok_or_else(invalid)?;
    let seconds = parse_unit(fields[2]).ok_or_else(invalid)?;
    if minutes > 59 || seconds > 59 || (days > 0 && hours > 23) {
        return Err(invalid());
    }

    total_seconds(days, hours, minutes, seconds).ok_or_else(invalid)
}

/// None when the total doesn't fit a `Duration`
fn total_seconds(days: i64, hours: i64, minutes: i64, seconds: i64) -> Option<Duration> {
    let total = days
        .checked_mul(86_400)?
        .checked_add(hours.checked_mul(3_600)?)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)?;
    Duration::try_seconds(total)
}

fn parse_unit(field: &str) -> Option<i64> {
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}
