//! Thin wrapper around wall-clock time so call sites read `now_ms()` rather
//! than reaching for `chrono` directly everywhere a timestamp is needed.

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
