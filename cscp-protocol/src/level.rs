//! Conversion between decibels and protocol levels (0..=1023).
//!
//! Both fader curves are piecewise linear between fixed anchor points.
//! Channels and groups run from -100 dB to +10 dB, mains from -100 dB to 0 dB.
use crate::protocol::MAX_LEVEL;

/// One anchor of a conversion curve.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Anchor {
    pub level: u16,
    pub db: f64,
}

const fn anchor(level: u16, db: f64) -> Anchor {
    Anchor { level, db }
}

/// Curve for channel and group faders.
pub const CHANNEL_TABLE: [Anchor; 11] = [
    anchor(0, -100.0),
    anchor(16, -80.0),
    anchor(64, -60.0),
    anchor(160, -40.0),
    anchor(320, -30.0),
    anchor(480, -20.0),
    anchor(704, -10.0),
    anchor(832, -5.0),
    anchor(928, 0.0),
    anchor(976, 5.0),
    anchor(MAX_LEVEL, 10.0),
];

/// Curve for main output faders.
pub const MAIN_TABLE: [Anchor; 9] = [
    anchor(0, -100.0),
    anchor(16, -80.0),
    anchor(64, -60.0),
    anchor(192, -40.0),
    anchor(384, -30.0),
    anchor(576, -20.0),
    anchor(768, -10.0),
    anchor(896, -5.0),
    anchor(MAX_LEVEL, 0.0),
];

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Field {
    Level,
    Db,
}

impl Anchor {
    fn get(&self, field: Field) -> f64 {
        match field {
            Field::Level => self.level as f64,
            Field::Db => self.db,
        }
    }
}

/// Maps `value` from one field of `table` to the other.
///
/// Values outside the table clamp to the nearest end, the first bracketing
/// pair in table order wins, and a degenerate pair yields its first anchor.
fn interpolate(value: f64, table: &[Anchor], from: Field, to: Field) -> f64 {
    let (Some(first), Some(last)) = (table.first(), table.last()) else {
        return 0.0;
    };
    if value <= first.get(from) {
        return first.get(to);
    }
    if value >= last.get(from) {
        return last.get(to);
    }
    for pair in table.windows(2) {
        let (p1, p2) = (pair[0], pair[1]);
        let (lo, hi) = (p1.get(from), p2.get(from));
        if value >= lo && value <= hi {
            if hi == lo {
                return p1.get(to);
            }
            return p1.get(to) + (value - lo) / (hi - lo) * (p2.get(to) - p1.get(to));
        }
    }
    last.get(to)
}

fn to_level(value: f64) -> u16 {
    value.round().clamp(0.0, MAX_LEVEL as f64) as u16
}

/// Protocol level of a channel or group fader set to `db`.
pub fn db_to_channel_level(db: f64) -> u16 {
    to_level(interpolate(db, &CHANNEL_TABLE, Field::Db, Field::Level))
}

/// Decibels of a channel or group fader at `level`.
pub fn channel_level_to_db(level: u16) -> f64 {
    interpolate(level as f64, &CHANNEL_TABLE, Field::Level, Field::Db)
}

/// Protocol level of a main fader set to `db`.
pub fn db_to_main_level(db: f64) -> u16 {
    to_level(interpolate(db, &MAIN_TABLE, Field::Db, Field::Level))
}

/// Decibels of a main fader at `level`.
pub fn main_level_to_db(level: u16) -> f64 {
    interpolate(level as f64, &MAIN_TABLE, Field::Level, Field::Db)
}
