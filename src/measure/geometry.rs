use std::f64::consts::PI;

/// Half-angle between the shaft and each barb of an arrow head.
const ARROW_HALF_ANGLE: f64 = PI / 6.0;

pub fn pixel_distance(start: (i32, i32), end: (i32, i32)) -> f64 {
    let dx = end.0 as f64 - start.0 as f64;
    let dy = end.1 as f64 - start.1 as f64;
    dx.hypot(dy)
}

/// Screen-space bearing of `start -> end` in degrees, clockwise from "up".
///
/// The y axis grows downward, so a drag straight up is 0° and a drag
/// straight right is 90°. The result is always in `[0, 360)`.
pub fn angle_from_vertical(start: (i32, i32), end: (i32, i32)) -> f64 {
    let dx = end.0 as f64 - start.0 as f64;
    let dy = end.1 as f64 - start.1 as f64;
    normalize_degrees(dx.atan2(-dy).to_degrees())
}

pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs.
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

pub fn midpoint(start: (i32, i32), end: (i32, i32)) -> (f64, f64) {
    (
        (start.0 as f64 + end.0 as f64) / 2.0,
        (start.1 as f64 + end.1 as f64) / 2.0,
    )
}

/// Triangle for an arrow head pointing at `end`: the tip followed by the two
/// barb points, each `size` pixels back along the shaft.
pub fn arrow_head(start: (i32, i32), end: (i32, i32), size: f64) -> [(f64, f64); 3] {
    let tip = (end.0 as f64, end.1 as f64);
    let dx = end.0 as f64 - start.0 as f64;
    let dy = end.1 as f64 - start.1 as f64;
    // Math-space angle (y up) of the shaft.
    let angle = (-dy).atan2(dx);

    let barb = |offset: f64| {
        (
            tip.0 - (angle + offset).cos() * size,
            tip.1 + (angle + offset).sin() * size,
        )
    };

    [tip, barb(ARROW_HALF_ANGLE), barb(-ARROW_HALF_ANGLE)]
}
