/// Gets the unix timestamp in nanoseconds
pub fn unix_nano() -> i64 {
    let now = std::time::SystemTime::now();

    // NOTE: Unwrap is trivial
    #[allow(clippy::unwrap_used)]
    let since_epoch = now
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap();

    // NOTE: Truncation is okay, i64 nanoseconds reach past the year 2200
    #[allow(clippy::cast_possible_truncation)]
    {
        since_epoch.as_nanos() as i64
    }
}
