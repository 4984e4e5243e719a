//! Exponential interpolation between two bounds.

use std::time::Duration;

/// Returns `f` with `f(x0) == y0` and `f(x1) == y1`, following a geometric
/// curve in between. Inputs outside `[x0, x1]` are clamped.
///
/// Falls back to a straight line when either bound is not strictly positive,
/// since a geometric curve cannot pass through zero.
pub fn make_exponential(x0: f64, x1: f64, y0: f64, y1: f64) -> impl Fn(f64) -> f64 {
    move |x| {
        if x <= x0 {
            return y0;
        }
        if x >= x1 {
            return y1;
        }
        let u = (x - x0) / (x1 - x0);
        if y0 > 0.0 && y1 > 0.0 {
            y0 * (y1 / y0).powf(u)
        } else {
            y0 + (y1 - y0) * u
        }
    }
}

/// Maps `exhaustion` in `[1, limit]` onto `[start, end]`.
///
/// The bounds are returned as-is at the ends of the range so no precision is
/// lost in the round trip through seconds.
pub fn interpolate_duration(start: Duration, end: Duration, limit: f64, exhaustion: f64) -> Duration {
    if exhaustion <= 1.0 {
        return start;
    }
    if exhaustion >= limit {
        return end;
    }
    let f = make_exponential(1.0, limit, start.as_secs_f64(), end.as_secs_f64());
    Duration::try_from_secs_f64(f(exhaustion)).unwrap_or(end)
}
