use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("schedule is required")]
    Empty,
    #[error("invalid time format '{0}', expected HH:MM")]
    Malformed(String),
}

/// Translate the "HH:MM" daily shorthand into a five-field cron expression,
/// e.g. "09:05" -> "5 9 * * *".
pub fn parse_simple_schedule(simple: &str) -> Result<String, ScheduleError> {
    let (hour, minute) = simple
        .split_once(':')
        .ok_or_else(|| ScheduleError::Malformed(simple.to_string()))?;
    Ok(format!("{} {} * * *", strip_zeros(minute), strip_zeros(hour)))
}

fn strip_zeros(field: &str) -> &str {
    let stripped = field.trim_start_matches('0');
    if stripped.is_empty() { "0" } else { stripped }
}

/// Resolve a job's schedule string into an expression the cron engine
/// accepts: "HH:MM" becomes a daily cron pattern, anything else is taken
/// as a cron expression. The engine parses seconds-first expressions, so a
/// classic five-field expression gets a zero seconds field prepended.
pub fn resolve_schedule(raw: &str) -> Result<String, ScheduleError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ScheduleError::Empty);
    }
    let resolved = if !raw.contains(char::is_whitespace) && raw.contains(':') {
        parse_simple_schedule(raw)?
    } else {
        raw.to_string()
    };
    Ok(normalize_for_engine(&resolved))
}

fn normalize_for_engine(expr: &str) -> String {
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}
