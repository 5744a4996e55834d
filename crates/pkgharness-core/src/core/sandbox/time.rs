use std::env;

use time::OffsetDateTime;

fn backup_timestamp() -> OffsetDateTime {
    if let Ok(raw) = env::var("SOURCE_DATE_EPOCH") {
        if let Ok(epoch) = raw.trim().parse::<i64>() {
            if let Ok(ts) = OffsetDateTime::from_unix_timestamp(epoch) {
                return ts;
            }
        }
    }
    OffsetDateTime::now_utc()
}

pub(crate) fn backup_timestamp_string() -> String {
    backup_timestamp()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
