use std::fmt;
use std::time::Duration;

/// Records the error as a `dyn Error`, so that the subscriber renders its
/// whole chain of sources.
#[must_use]
pub fn tracing_err<'a, E: std::error::Error + 'static>(err: &'a E) -> impl tracing::Value + 'a {
    err as &dyn std::error::Error
}

/// Short human-readable duration: milliseconds for quick requests,
/// seconds for the long ones like broadcast batches and backfills.
pub(crate) fn tracing_duration(duration: Duration) -> impl tracing::Value {
    tracing::field::display(ShortDuration(duration))
}

struct ShortDuration(Duration);

impl fmt::Display for ShortDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self(duration) = self;
        if *duration < Duration::from_secs(1) {
            write!(f, "{}ms", duration.as_millis())
        } else {
            write!(f, "{:.2}s", duration.as_secs_f64())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn short_durations() {
        let fmt = |duration| ShortDuration(duration).to_string();

        expect!["0ms"].assert_eq(&fmt(Duration::ZERO));
        expect!["250ms"].assert_eq(&fmt(Duration::from_micros(250_700)));
        expect!["1.00s"].assert_eq(&fmt(Duration::from_secs(1)));
        expect!["93.46s"].assert_eq(&fmt(Duration::from_millis(93_456)));
    }
}
