use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};

use crate::models::appointment::Appointment;

/// Arabic label for an appointment status. Unknown values pass through.
pub fn translate_status(status: Option<&str>) -> String {
    let Some(status) = status else {
        return String::new();
    };
    match status.to_lowercase().as_str() {
        "pending" => "قيد الانتظار".to_string(),
        "confirmed" => "مؤكد".to_string(),
        "completed" => "مكتمل".to_string(),
        "cancelled" => "ملغي".to_string(),
        _ => status.to_string(),
    }
}

/// Badge class for a status. Anything unrecognised renders as cancelled.
pub fn status_class(status: Option<&str>) -> &'static str {
    match status.map(str::to_lowercase).as_deref() {
        Some("pending") => "status-pending",
        Some("confirmed") => "status-confirmed",
        Some("completed") => "status-completed",
        _ => "status-cancelled",
    }
}

/// Reads a server timestamp as local wall-clock time. Accepts RFC 3339,
/// offset-less ISO date-times and bare dates.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Local).naive_local());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

pub fn is_today(value: &str, today: NaiveDate) -> bool {
    parse_timestamp(value).is_some_and(|dt| dt.date() == today)
}

pub fn format_date(value: &str) -> String {
    parse_timestamp(value)
        .map(|dt| dt.format("%A %Y-%m-%d").to_string())
        .unwrap_or_else(|| value.to_string())
}

pub fn format_time(value: &str) -> String {
    parse_timestamp(value)
        .map(|dt| dt.format("%H:%M").to_string())
        .unwrap_or_default()
}

/// Turns a picked time slot (`"03:30 PM"` or `"15:30"`) into a local
/// date-time on `day`.
pub fn slot_on(day: NaiveDate, slot: &str) -> Option<NaiveDateTime> {
    let slot = slot.trim();
    ["%I:%M %p", "%H:%M"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(slot, format).ok())
        .map(|time| day.and_time(time))
}

/// Splits appointments into (today, other) preserving order.
pub fn split_today(
    appointments: &[Appointment],
    today: NaiveDate,
) -> (Vec<&Appointment>, Vec<&Appointment>) {
    appointments
        .iter()
        .partition(|appointment| is_today(&appointment.date, today))
}
