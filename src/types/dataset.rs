//! Defines the NSRDB datasets that can be requested, together with the
//! sampling intervals and years each of them offers.

use serde::Serialize;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// The attributes requested from the archive for every unit of work. These are
/// exactly the columns the EPW converter consumes.
pub const REQUESTED_ATTRIBUTES: &str = "dew_point,ghi,air_temperature,wind_direction,surface_albedo,dhi,dni,surface_pressure,wind_speed";

/// One of the NSRDB GOES v4 datasets.
///
/// A dataset can be parsed from either its short name (`"conus"`) or its full
/// archive name (`"nsrdb-GOES-conus-v4-0-0"`).
///
/// # Examples
///
/// ```
/// use openweather::Dataset;
///
/// let dataset: Dataset = "nsrdb-GOES-full-disc-v4-0-0".parse().unwrap();
/// assert_eq!(dataset, Dataset::FullDisc);
/// assert_eq!(dataset.short_name(), "full-disc");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dataset {
    /// Continental United States, 5 minute native resolution.
    Conus,
    /// Full disc coverage of the GOES satellites.
    FullDisc,
    /// Long-running aggregated series starting in 1998.
    Aggregated,
    /// Typical meteorological year.
    Tmy,
}

impl Dataset {
    pub const ALL: [Dataset; 4] = [
        Dataset::Conus,
        Dataset::FullDisc,
        Dataset::Aggregated,
        Dataset::Tmy,
    ];

    pub fn short_name(&self) -> &'static str {
        match self {
            Dataset::Conus => "conus",
            Dataset::FullDisc => "full-disc",
            Dataset::Aggregated => "aggregated",
            Dataset::Tmy => "tmy",
        }
    }

    /// The identifier used by the archive in URLs and query parameters.
    pub fn archive_name(&self) -> &'static str {
        match self {
            Dataset::Conus => "nsrdb-GOES-conus-v4-0-0",
            Dataset::FullDisc => "nsrdb-GOES-full-disc-v4-0-0",
            Dataset::Aggregated => "nsrdb-GOES-aggregated-v4-0-0",
            Dataset::Tmy => "nsrdb-GOES-tmy-v4-0-0",
        }
    }

    /// Sampling intervals in minutes offered by the archive for this dataset.
    pub fn intervals(&self) -> &'static [u32] {
        match self {
            Dataset::Conus => &[5, 30, 60],
            Dataset::FullDisc => &[10, 30, 60],
            Dataset::Aggregated => &[30, 60],
            Dataset::Tmy => &[60],
        }
    }

    pub fn years(&self) -> RangeInclusive<i32> {
        match self {
            Dataset::Conus => 2021..=2024,
            Dataset::FullDisc => 2018..=2024,
            Dataset::Aggregated => 1998..=2024,
            Dataset::Tmy => 2022..=2024,
        }
    }

    /// A serializable listing of every dataset, for front ends that render a
    /// dataset picker.
    pub fn catalog() -> Vec<DatasetInfo> {
        Self::ALL
            .iter()
            .map(|dataset| DatasetInfo {
                short_name: dataset.short_name(),
                archive_name: dataset.archive_name(),
                intervals: dataset.intervals().to_vec(),
                years: dataset.years().collect(),
            })
            .collect()
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.archive_name())
    }
}

/// Returned when a string names no known dataset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown dataset '{0}'")]
pub struct UnknownDataset(pub String);

impl FromStr for Dataset {
    type Err = UnknownDataset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|dataset| {
                dataset.archive_name() == trimmed
                    || dataset.short_name().eq_ignore_ascii_case(trimmed)
            })
            .ok_or_else(|| UnknownDataset(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    pub short_name: &'static str,
    pub archive_name: &'static str,
    pub intervals: Vec<u32>,
    pub years: Vec<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_and_archive_names() {
        for dataset in Dataset::ALL {
            assert_eq!(dataset.short_name().parse::<Dataset>(), Ok(dataset));
            assert_eq!(dataset.archive_name().parse::<Dataset>(), Ok(dataset));
        }
        assert_eq!("TMY".parse::<Dataset>(), Ok(Dataset::Tmy));
    }

    #[test]
    fn test_parse_unknown_dataset() {
        let err = "nsrdb-psm3".parse::<Dataset>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown dataset 'nsrdb-psm3'");
    }

    #[test]
    fn test_catalog_lists_every_dataset() {
        let catalog = Dataset::catalog();
        assert_eq!(catalog.len(), 4);
        let conus = &catalog[0];
        assert_eq!(conus.short_name, "conus");
        assert_eq!(conus.intervals, vec![5, 30, 60]);
        assert_eq!(conus.years, vec![2021, 2022, 2023, 2024]);
        assert_eq!(catalog[2].years.first(), Some(&1998));
    }
}
