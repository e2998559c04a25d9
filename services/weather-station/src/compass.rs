//! Wind vane calibration
//!
//! The vane is a resistor ladder; each of its sixteen switch positions yields a
//! distinct voltage. The break-points below are the calibrated midpoints between
//! adjacent readings, sorted by voltage.

/// `(upper voltage bound, degrees)`; the first bound above the reading wins.
const VANE_TABLE: [(f64, f64); 15] = [
    (0.365, 112.5),
    (0.430, 67.5),
    (0.535, 90.0),
    (0.760, 157.5),
    (1.045, 135.0),
    (1.295, 202.5),
    (1.690, 180.0),
    (2.115, 22.5),
    (2.590, 45.0),
    (3.005, 247.5),
    (3.225, 225.0),
    (3.635, 337.5),
    (3.940, 0.0),
    (4.185, 292.5),
    (4.475, 315.0),
];

/// Bucket used for readings above the highest break-point
const VANE_DEFAULT: f64 = 270.0;

const POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// Convert a vane voltage to compass degrees
pub fn volts_to_degrees(volts: f64) -> f64 {
    VANE_TABLE
        .iter()
        .find(|(bound, _)| volts < *bound)
        .map(|(_, degrees)| *degrees)
        .unwrap_or(VANE_DEFAULT)
}

/// Sixteen-point compass name for a bearing in degrees
pub fn compass_point(degrees: f64) -> &'static str {
    let normalised = degrees.rem_euclid(360.0);
    let index = ((normalised + 11.25) / 22.5) as usize % POINTS.len();
    POINTS[index]
}
