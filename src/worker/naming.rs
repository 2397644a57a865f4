use chrono::{DateTime, TimeZone};
use std::fmt::Display;

pub const FILE_PREFIX: &str = "generated";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

/// Replaces every non-alphanumeric character with `_`.
pub fn sanitize_model(model: &str) -> String {
    model
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

/// `generated_{model}_{YYYYMMDD_HHMMSS_ffffff}_{attempt}.jpg`
pub fn image_file_name<Tz>(model: &str, attempt: u32, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!(
        "{}_{}_{}_{}.jpg",
        FILE_PREFIX,
        sanitize_model(model),
        at.format(TIMESTAMP_FORMAT),
        attempt
    )
}
