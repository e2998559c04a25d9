//! Unit conversions and derived quantities

/// Specific gas constant for dry air, J/(kg·K)
pub const RD: f64 = 287.1;
/// Standard gravity, m/s²
pub const GRAVITY: f64 = 9.807;
/// Offset from °C to K used by the sea-level reduction
pub const KELVIN_OFFSET: f64 = 273.1;
pub const HPA_TO_INHG: f64 = 0.02953;
pub const MM_PER_INCH: f64 = 25.4;

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

pub fn mm_to_inches(mm: f64) -> f64 {
    mm / MM_PER_INCH
}

pub fn hpa_to_inhg(hpa: f64) -> f64 {
    hpa * HPA_TO_INHG
}

/// Approximate dew point, `Td = T - (100 - RH) / 5`, good above ~50 %RH
pub fn dew_point_celsius(temperature_c: f64, humidity_percent: f64) -> f64 {
    temperature_c - (100.0 - humidity_percent) / 5.0
}

/// Reduce station pressure to sea level.
///
/// Uses the isothermal barometric formula `p0 = p · exp(z / H)` with scale
/// height `H = Rd·T / g`. The result is in the unit of `pressure`.
pub fn sea_level_pressure(pressure: f64, temperature_c: f64, altitude_m: f64) -> f64 {
    let scale_height = RD * (temperature_c + KELVIN_OFFSET) / GRAVITY;
    pressure * (altitude_m / scale_height).exp()
}

/// Round to `places` decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
