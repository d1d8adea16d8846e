//! Deterministic spatial jitter.
//!
//! Many registry records share a city and therefore a coordinate. A small offset seeded by
//! the record id spreads them out on the map while staying stable across runs, processes and
//! machines.

use crate::models::Coordinates;

/// Maximum offset per axis is half of this, in degrees (about 110 m of latitude).
pub const JITTER_SPAN: f64 = 0.002;

/// 32-bit wrapping string hash over UTF-16 code units (`h = h * 31 + unit`).
fn string_hash(seed: &str) -> i32 {
    seed.encode_utf16().fold(0i32, |h, unit| {
        h.wrapping_shl(5).wrapping_sub(h).wrapping_add(i32::from(unit))
    })
}

/// Pseudo-random value in `[0, 1)` derived from `seed`.
pub fn seeded_unit(seed: &str) -> f64 {
    let x = (f64::from(string_hash(seed))).sin() * 10000.0;
    x - x.floor()
}

/// Offset `coords` by up to ±`JITTER_SPAN / 2` on each axis, seeded by `seed`.
pub fn jitter(coords: Coordinates, seed: &str) -> Coordinates {
    let lat_r = seeded_unit(&format!("{}_lat", seed));
    let lon_r = seeded_unit(&format!("{}_lng", seed));
    Coordinates::new(
        coords.lat + (lat_r - 0.5) * JITTER_SPAN,
        coords.lon + (lon_r - 0.5) * JITTER_SPAN,
    )
}
