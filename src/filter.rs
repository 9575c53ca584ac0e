//! Display filters over the cached vehicle states.
//!
//! Every predicate is independent of the others, so the order they are
//! applied in never changes the surviving set.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::record::VehicleUpdate;

/// Latitude separating Ogden (north) from the Salt Lake City band.
pub const NORTH_BOUNDARY_LAT: f64 = 41.1;
/// Latitude separating Provo (south) from the Salt Lake City band.
pub const SOUTH_BOUNDARY_LAT: f64 = 40.5;

/// Named latitude bands of the service area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Region {
    #[default]
    All,
    SaltLakeCity,
    /// North of [`NORTH_BOUNDARY_LAT`].
    Ogden,
    /// South of [`SOUTH_BOUNDARY_LAT`].
    Provo,
}

impl Region {
    pub fn contains(&self, latitude: f64) -> bool {
        match self {
            Region::All => true,
            Region::Ogden => latitude > NORTH_BOUNDARY_LAT,
            Region::Provo => latitude < SOUTH_BOUNDARY_LAT,
            Region::SaltLakeCity => {
                (SOUTH_BOUNDARY_LAT..=NORTH_BOUNDARY_LAT).contains(&latitude)
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    pub min_speed: f64,
    pub region: Region,
    /// Empty means every id passes.
    pub allowed_ids: HashSet<String>,
}

impl FilterSpec {
    /// Negative or NaN thresholds are clamped to zero.
    pub fn new(
        min_speed: f64,
        region: Region,
        allowed_ids: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            min_speed: if min_speed > 0.0 { min_speed } else { 0.0 },
            region,
            allowed_ids: allowed_ids.into_iter().collect(),
        }
    }

    pub fn keeps_speed(&self, update: &VehicleUpdate) -> bool {
        update.speed_or_zero() >= self.min_speed
    }

    pub fn keeps_region(&self, update: &VehicleUpdate) -> bool {
        self.region.contains(update.latitude)
    }

    pub fn keeps_id(&self, update: &VehicleUpdate) -> bool {
        self.allowed_ids.is_empty() || self.allowed_ids.contains(&update.id)
    }

    pub fn matches(&self, update: &VehicleUpdate) -> bool {
        self.keeps_speed(update) && self.keeps_region(update) && self.keeps_id(update)
    }
}

/// Returns the records passing every predicate of `spec`, in input order.
pub fn filter<'a, I>(values: I, spec: &FilterSpec) -> Vec<&'a VehicleUpdate>
where
    I: IntoIterator<Item = &'a VehicleUpdate>,
{
    values.into_iter().filter(|u| spec.matches(u)).collect()
}

/// Fastest first; ties broken by id so the listing is stable between ticks.
pub fn sort_by_speed_desc(vehicles: &mut [&VehicleUpdate]) {
    vehicles.sort_by(|a, b| {
        b.speed_or_zero()
            .partial_cmp(&a.speed_or_zero())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle(id: &str, lat: f64, speed: Option<f64>) -> VehicleUpdate {
        VehicleUpdate {
            id: id.to_string(),
            trip_id: String::new(),
            route_id: String::new(),
            latitude: lat,
            longitude: -111.9,
            vehicle_timestamp: 0,
            source_timestamp: 0.0,
            speed_mph: speed,
        }
    }

    fn fleet() -> Vec<VehicleUpdate> {
        vec![
            vehicle("ogden-fast", 41.2, Some(35.0)),
            vehicle("ogden-idle", 41.3, None),
            vehicle("slc-edge-n", 41.1, Some(12.0)),
            vehicle("slc-edge-s", 40.5, Some(3.0)),
            vehicle("provo", 40.2, Some(50.0)),
        ]
    }

    fn ids(vehicles: &[&VehicleUpdate]) -> Vec<String> {
        let mut ids: Vec<String> = vehicles.iter().map(|v| v.id.clone()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_region_boundaries() {
        assert!(Region::SaltLakeCity.contains(NORTH_BOUNDARY_LAT));
        assert!(Region::SaltLakeCity.contains(SOUTH_BOUNDARY_LAT));
        assert!(!Region::Ogden.contains(NORTH_BOUNDARY_LAT));
        assert!(!Region::Provo.contains(SOUTH_BOUNDARY_LAT));
        assert!(Region::Ogden.contains(41.11));
        assert!(Region::Provo.contains(40.49));
        assert!(Region::All.contains(-90.0));
    }

    #[test]
    fn test_missing_speed_counts_as_zero() {
        let all = fleet();
        let spec = FilterSpec::new(0.0, Region::Ogden, Vec::<String>::new());
        assert_eq!(ids(&filter(&all, &spec)), vec!["ogden-fast", "ogden-idle"]);

        let spec = FilterSpec::new(1.0, Region::Ogden, Vec::<String>::new());
        assert_eq!(ids(&filter(&all, &spec)), vec!["ogden-fast"]);
    }

    #[test]
    fn test_allow_list_restricts_ids() {
        let all = fleet();
        let spec = FilterSpec::new(0.0, Region::All, vec!["provo".to_string(), "nope".to_string()]);
        assert_eq!(ids(&filter(&all, &spec)), vec!["provo"]);
    }

    #[test]
    fn test_predicate_order_does_not_matter() {
        let all = fleet();
        let spec = FilterSpec::new(
            10.0,
            Region::SaltLakeCity,
            vec!["slc-edge-n".to_string(), "slc-edge-s".to_string(), "provo".to_string()],
        );

        let combined = ids(&filter(&all, &spec));

        let by_id: Vec<&VehicleUpdate> = all.iter().filter(|v| spec.keeps_id(v)).collect();
        let then_region: Vec<&VehicleUpdate> =
            by_id.into_iter().filter(|v| spec.keeps_region(v)).collect();
        let then_speed: Vec<&VehicleUpdate> =
            then_region.into_iter().filter(|v| spec.keeps_speed(v)).collect();

        assert_eq!(combined, ids(&then_speed));
        assert_eq!(combined, vec!["slc-edge-n"]);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let all = fleet();
        let spec = FilterSpec::new(5.0, Region::All, Vec::<String>::new());
        let once = filter(&all, &spec);
        let twice = filter(once.iter().copied(), &spec);
        assert_eq!(ids(&once), ids(&twice));
    }

    #[test]
    fn test_negative_threshold_is_clamped() {
        let spec = FilterSpec::new(-3.0, Region::All, Vec::<String>::new());
        assert_eq!(spec.min_speed, 0.0);
        let spec = FilterSpec::new(f64::NAN, Region::All, Vec::<String>::new());
        assert_eq!(spec.min_speed, 0.0);
    }

    #[test]
    fn test_sort_by_speed_desc() {
        let all = fleet();
        let mut listed: Vec<&VehicleUpdate> = all.iter().collect();
        sort_by_speed_desc(&mut listed);
        let order: Vec<&str> = listed.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(
            order,
            vec!["provo", "ogden-fast", "slc-edge-n", "slc-edge-s", "ogden-idle"]
        );
    }
}
