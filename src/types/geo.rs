//! Geohash scores for points stored in a sorted set.
//!
//! A point is stored as a 52-bit integer score: latitude and longitude are
//! each quantized to 26 bits over their valid ranges and interleaved, with
//! longitude in the odd bits so the most significant bit is a longitude bit.

/// Earth's radius in meters, as used by Redis.
pub const EARTH_RADIUS_M: f64 = 6372797.560856;

pub const LON_MIN: f64 = -180.0;
pub const LON_MAX: f64 = 180.0;
/// Latitude limits of the Web Mercator projection.
pub const LAT_MIN: f64 = -85.05112878;
pub const LAT_MAX: f64 = 85.05112878;

const STEP: u32 = 26;
const GEOHASH_ALPHABET: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    /// A point, if it lies within the indexable area.
    pub fn new(lon: f64, lat: f64) -> Option<GeoPoint> {
        let valid = (LON_MIN..=LON_MAX).contains(&lon) && (LAT_MIN..=LAT_MAX).contains(&lat);
        valid.then_some(GeoPoint { lon, lat })
    }
}

/// Spread the low 32 bits of `v` into the even bit positions.
fn spread(v: u32) -> u64 {
    let mut x = v as u64;
    x = (x | (x << 16)) & 0x0000_FFFF_0000_FFFF;
    x = (x | (x << 8)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333_3333_3333;
    (x | (x << 1)) & 0x5555_5555_5555_5555
}

/// Inverse of [`spread`]: gather the even bit positions.
fn squash(v: u64) -> u32 {
    let mut x = v & 0x5555_5555_5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333_3333_3333;
    x = (x | (x >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    x = (x | (x >> 4)) & 0x00FF_00FF_00FF_00FF;
    x = (x | (x >> 8)) & 0x0000_FFFF_0000_FFFF;
    ((x | (x >> 16)) & 0x0000_0000_FFFF_FFFF) as u32
}

fn quantize(value: f64, min: f64, max: f64) -> u32 {
    let offset = (value - min) / (max - min) * (1u64 << STEP) as f64;
    (offset as u64).min((1 << STEP) - 1) as u32
}

fn encode_with_ranges(lon: f64, lat: f64, lat_min: f64, lat_max: f64) -> u64 {
    let lat_bits = quantize(lat, lat_min, lat_max);
    let lon_bits = quantize(lon, LON_MIN, LON_MAX);
    spread(lat_bits) | (spread(lon_bits) << 1)
}

/// The 52-bit score for a point.
pub fn encode(point: GeoPoint) -> u64 {
    encode_with_ranges(point.lon, point.lat, LAT_MIN, LAT_MAX)
}

/// The center of the cell a score identifies.
pub fn decode(bits: u64) -> GeoPoint {
    let cell = 1.0 / (1u64 << STEP) as f64;
    let lat_cell = squash(bits) as f64;
    let lon_cell = squash(bits >> 1) as f64;

    let lat_scale = LAT_MAX - LAT_MIN;
    let lon_scale = LON_MAX - LON_MIN;
    let lat_lo = LAT_MIN + lat_cell * cell * lat_scale;
    let lat_hi = LAT_MIN + (lat_cell + 1.0) * cell * lat_scale;
    let lon_lo = LON_MIN + lon_cell * cell * lon_scale;
    let lon_hi = LON_MIN + (lon_cell + 1.0) * cell * lon_scale;

    GeoPoint {
        lon: ((lon_lo + lon_hi) / 2.0).clamp(LON_MIN, LON_MAX),
        lat: ((lat_lo + lat_hi) / 2.0).clamp(LAT_MIN, LAT_MAX),
    }
}

/// Decode a sorted-set score back into a point.
pub fn decode_score(score: f64) -> GeoPoint {
    decode(score as u64)
}

/// The standard 11-character base32 geohash for a stored score.
///
/// The score is decoded and re-encoded over the full [-90, 90] latitude
/// range, so the string agrees with geohash.org rather than with the
/// Mercator-bounded internal score.
pub fn geohash_string(score: f64) -> String {
    let point = decode_score(score);
    let bits = encode_with_ranges(point.lon, point.lat, -90.0, 90.0);
    (0..11)
        .map(|i| {
            // 52 bits fill ten characters; the eleventh is padding.
            let idx = if i == 10 { 0 } else { (bits >> (52 - (i + 1) * 5)) & 0x1f };
            GEOHASH_ALPHABET[idx as usize] as char
        })
        .collect()
}

fn haversine(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let u = ((lat2 - lat1) / 2.0).sin();
    let v = ((lon2.to_radians() - lon1.to_radians()) / 2.0).sin();
    let a = u * u + lat1.cos() * lat2.cos() * v * v;
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Great-circle distance in meters.
pub fn distance(a: GeoPoint, b: GeoPoint) -> f64 {
    haversine(a.lon, a.lat, b.lon, b.lat)
}

/// Search area around a center point. Sizes are in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Radius(f64),
    Box { width: f64, height: f64 },
}

impl Shape {
    /// Distance from `center` to `point` if the point lies inside the shape.
    pub fn contains(&self, center: GeoPoint, point: GeoPoint) -> Option<f64> {
        let dist = distance(center, point);
        match *self {
            Shape::Radius(r) => (dist <= r).then_some(dist),
            Shape::Box { width, height } => {
                let lat_dist = EARTH_RADIUS_M * (point.lat.to_radians() - center.lat.to_radians()).abs();
                if lat_dist > height / 2.0 {
                    return None;
                }
                // East-west extent is measured along the point's parallel.
                let lon_dist = haversine(point.lon, point.lat, center.lon, point.lat);
                (lon_dist <= width / 2.0).then_some(dist)
            }
        }
    }
}

/// Meters per unit, for `m`, `km`, `ft` and `mi` in any case.
pub fn unit_to_meters(unit: &str) -> Option<f64> {
    match unit.to_ascii_lowercase().as_str() {
        "m" => Some(1.0),
        "km" => Some(1000.0),
        "ft" => Some(0.3048),
        "mi" => Some(1609.34),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PALERMO: GeoPoint = GeoPoint { lon: 13.361389, lat: 38.115556 };
    const CATANIA: GeoPoint = GeoPoint { lon: 15.087269, lat: 37.502669 };

    #[test]
    fn test_spread_squash_inverse() {
        for v in [0u32, 1, 0x3ff_ffff, 0x155_5555, 12345] {
            assert_eq!(squash(spread(v)), v);
        }
    }

    #[test]
    fn test_encode_matches_redis_score() {
        assert_eq!(encode(PALERMO), 3479099956230698);
        assert_eq!(encode(CATANIA), 3479447370796909);
    }

    #[test]
    fn test_round_trip_precision() {
        let decoded = decode(encode(PALERMO));
        assert!((decoded.lon - PALERMO.lon).abs() < 1e-5);
        assert!((decoded.lat - PALERMO.lat).abs() < 1e-5);
    }

    #[test]
    fn test_geohash_string() {
        assert_eq!(geohash_string(encode(PALERMO) as f64), "sqc8b49rny0");
        assert_eq!(geohash_string(encode(CATANIA) as f64), "sqdtr74hyu0");
    }

    #[test]
    fn test_distance() {
        let d = distance(PALERMO, CATANIA);
        assert!((d - 166274.1516).abs() < 1.0, "got {d}");
        assert_eq!(distance(PALERMO, CATANIA), distance(CATANIA, PALERMO));
    }

    #[test]
    fn test_point_validation() {
        assert!(GeoPoint::new(180.0, 85.05112878).is_some());
        assert!(GeoPoint::new(180.1, 0.0).is_none());
        assert!(GeoPoint::new(0.0, 86.0).is_none());
    }

    #[test]
    fn test_box_contains() {
        let center = GeoPoint { lon: 15.0, lat: 37.0 };
        let wide = Shape::Box { width: 400_000.0, height: 400_000.0 };
        assert!(wide.contains(center, PALERMO).is_some());
        let narrow = Shape::Box { width: 10_000.0, height: 400_000.0 };
        assert!(narrow.contains(center, PALERMO).is_none());
    }

    #[test]
    fn test_units() {
        assert_eq!(unit_to_meters("KM"), Some(1000.0));
        assert_eq!(unit_to_meters("mi"), Some(1609.34));
        assert_eq!(unit_to_meters("yd"), None);
    }
}
