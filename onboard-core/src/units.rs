//! Unit conversions used when mapping vendor data.

pub fn kmh_to_ms(kmh: f64) -> f64 {
    kmh / 3.6
}

pub fn ms_to_kmh(ms: f64) -> f64 {
    ms * 3.6
}

pub fn minutes_to_seconds(minutes: f64) -> f64 {
    minutes * 60.0
}

pub fn hours_to_seconds(hours: f64) -> f64 {
    hours * 3600.0
}

/// Degrees, minutes and seconds of one coordinate. The sign is kept apart so
/// values between -1 and 0 survive the conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dms {
    pub negative: bool,
    pub degrees: u32,
    pub minutes: u32,
    pub seconds: f64,
}

pub fn decimal_to_dms(value: f64) -> Dms {
    let abs = value.abs();
    let degrees = abs.trunc();
    let minutes = ((abs - degrees) * 60.0).trunc();
    let seconds = ((abs - degrees) * 60.0 - minutes) * 60.0;
    Dms {
        negative: value < 0.0,
        degrees: degrees as u32,
        minutes: minutes as u32,
        seconds,
    }
}

pub fn dms_to_decimal(dms: Dms) -> f64 {
    let value = dms.degrees as f64 + dms.minutes as f64 / 60.0 + dms.seconds / 3600.0;
    if dms.negative {
        -value
    } else {
        value
    }
}
