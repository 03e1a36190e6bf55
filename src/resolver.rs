use crate::record::GeoRecord;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Larger than any distance on Earth (circumference is about 40000 km).
pub const UNREACHABLE_KM: u32 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestMatch<'a> {
    pub record: &'a GeoRecord,
    pub distance_km: u32,
}

/// Great-circle distance on a spherical Earth, truncated to whole kilometres.
pub fn haversine_km(a: Coordinate, b: Coordinate) -> u32 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push near-antipodal pairs just past 1.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    (EARTH_RADIUS_KM * c) as u32
}

/// Cheap box test run before the trigonometry. Both bounds are exclusive.
pub fn within_box(reference: Coordinate, half_width_degrees: f64, candidate: Coordinate) -> bool {
    let lat_ok = reference.lat - half_width_degrees < candidate.lat
        && candidate.lat < reference.lat + half_width_degrees;
    let lon_ok = reference.lon - half_width_degrees < candidate.lon
        && candidate.lon < reference.lon + half_width_degrees;
    lat_ok && lon_ok
}

/// Closest candidate inside the box around `reference`.
///
/// Records without coordinates are ignored. When two candidates are the same
/// whole number of kilometres away, the one seen first is kept.
pub fn find_nearest<'a, I>(
    reference: Coordinate,
    half_width_degrees: f64,
    candidates: I,
) -> Option<NearestMatch<'a>>
where
    I: IntoIterator<Item = &'a GeoRecord>,
{
    let mut best: Option<&'a GeoRecord> = None;
    let mut best_km = UNREACHABLE_KM;

    for record in candidates {
        let Some((lat, lon)) = record.coordinates() else {
            continue;
        };
        let point = Coordinate::new(lat, lon);
        if !within_box(reference, half_width_degrees, point) {
            continue;
        }
        let km = haversine_km(reference, point);
        if km < best_km {
            best_km = km;
            best = Some(record);
        }
    }

    best.map(|record| NearestMatch {
        record,
        distance_km: best_km,
    })
}
