//! The input of a job and the units of work derived from it.

use bon::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

fn unknown() -> String {
    "Unknown".to_string()
}

fn enabled() -> bool {
    true
}

/// A request to download (and optionally convert) NSRDB data.
///
/// All fields are kept exactly as the caller supplied them; nothing is checked
/// until the request reaches [`crate::Orchestrator::validate`].
///
/// # Examples
///
/// ```
/// use openweather::JobRequest;
///
/// let request = JobRequest::builder()
///     .wkt("POINT(-76.5 42.4)")
///     .dataset("nsrdb-GOES-aggregated-v4-0-0")
///     .interval("60")
///     .years(vec!["2021".to_string(), "2022".to_string()])
///     .api_key("my-key")
///     .email("me@example.com")
///     .location("Ithaca")
///     .build();
/// assert_eq!(request.region, "Unknown");
/// assert!(request.convert_to_epw);
/// ```
#[derive(Clone, Builder, Serialize, Deserialize)]
pub struct JobRequest {
    /// Query geometry as a WKT string.
    #[builder(into)]
    pub wkt: String,
    /// Dataset short name or archive name.
    #[builder(into)]
    pub dataset: String,
    /// Sampling interval in minutes, as text.
    #[builder(into)]
    pub interval: String,
    /// Requested years; may contain duplicates.
    pub years: Vec<String>,
    #[builder(into)]
    pub api_key: String,
    #[builder(into)]
    pub email: String,
    #[serde(default = "unknown")]
    #[builder(into, default = unknown())]
    pub location: String,
    /// State, province or other administrative region.
    #[serde(default = "unknown")]
    #[builder(into, default = unknown())]
    pub region: String,
    #[serde(default = "unknown")]
    #[builder(into, default = unknown())]
    pub country: String,
    #[serde(default = "enabled")]
    #[builder(default = true)]
    pub convert_to_epw: bool,
}

impl JobRequest {
    pub fn labels(&self) -> LocationLabels {
        LocationLabels {
            location: self.location.clone(),
            region: self.region.clone(),
            country: self.country.clone(),
        }
    }
}

// The API key never ends up in logs.
impl fmt::Debug for JobRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRequest")
            .field("wkt", &self.wkt)
            .field("dataset", &self.dataset)
            .field("interval", &self.interval)
            .field("years", &self.years)
            .field("api_key", &"<redacted>")
            .field("email", &self.email)
            .field("location", &self.location)
            .field("region", &self.region)
            .field("country", &self.country)
            .field("convert_to_epw", &self.convert_to_epw)
            .finish()
    }
}

/// Free-text labels describing where a job's data comes from. Used for the job
/// directory name and the EPW `LOCATION` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationLabels {
    pub location: String,
    pub region: String,
    pub country: String,
}

impl Default for LocationLabels {
    fn default() -> Self {
        Self {
            location: unknown(),
            region: unknown(),
            country: unknown(),
        }
    }
}

/// One `(year, location)` pair: a single fetch and at most one conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkUnit {
    pub year: i32,
    pub location_id: u64,
}

impl WorkUnit {
    /// Name of the raw CSV file written for this unit.
    pub fn raw_file_name(&self) -> String {
        format!("{}_{}.csv", self.location_id, self.year)
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "year {} at location {}", self.year, self.location_id)
    }
}

/// Removes duplicate years, keeping the order in which each year was first seen.
pub fn dedup_years(years: &[i32]) -> Vec<i32> {
    let mut seen = HashSet::with_capacity(years.len());
    years.iter().copied().filter(|year| seen.insert(*year)).collect()
}

/// Builds the unit-of-work set: years in the outer loop, locations in the inner
/// loop, in the order given. Duplicate years are dropped first, so the result
/// always has `unique years × locations` entries.
pub fn work_units(years: &[i32], location_ids: &[u64]) -> Vec<WorkUnit> {
    dedup_years(years)
        .into_iter()
        .flat_map(|year| {
            location_ids
                .iter()
                .map(move |&location_id| WorkUnit { year, location_id })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_years_keeps_first_seen_order() {
        assert_eq!(dedup_years(&[2022, 2021, 2022, 2020, 2021]), vec![2022, 2021, 2020]);
        assert!(dedup_years(&[]).is_empty());
    }

    #[test]
    fn test_duplicate_years_do_not_multiply_units() {
        let units = work_units(&[2021, 2021, 2022], &[144_000]);
        assert_eq!(units.len(), 2);
        assert_eq!(
            units,
            vec![
                WorkUnit { year: 2021, location_id: 144_000 },
                WorkUnit { year: 2022, location_id: 144_000 },
            ]
        );
    }

    #[test]
    fn test_unit_order_is_years_outer_locations_inner() {
        let units = work_units(&[2019, 2018, 2019], &[7, 3, 5]);
        assert_eq!(units.len(), 2 * 3);
        let order: Vec<(i32, u64)> = units.iter().map(|u| (u.year, u.location_id)).collect();
        assert_eq!(
            order,
            vec![(2019, 7), (2019, 3), (2019, 5), (2018, 7), (2018, 3), (2018, 5)]
        );
    }

    #[test]
    fn test_raw_file_name() {
        let unit = WorkUnit { year: 2021, location_id: 1_234_567 };
        assert_eq!(unit.raw_file_name(), "1234567_2021.csv");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let request = JobRequest::builder()
            .wkt("POINT(0 0)")
            .dataset("tmy")
            .interval("60")
            .years(vec!["2022".to_string()])
            .api_key("super-secret-key")
            .email("a@b.c")
            .build();
        let debug = format!("{request:?}");
        assert!(!debug.contains("super-secret-key"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_deserialize_applies_label_defaults() {
        let json = r#"{
            "wkt": "POINT(-76.5 42.4)",
            "dataset": "tmy",
            "interval": "60",
            "years": ["2022"],
            "api_key": "k",
            "email": "a@b.c"
        }"#;
        let request: JobRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.labels(), LocationLabels::default());
        assert!(request.convert_to_epw);
    }
}
