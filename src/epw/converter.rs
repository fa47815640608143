use crate::epw::error::ConversionError;
use crate::epw::raw_record::RawRecord;
use crate::epw::weather_record::WeatherRecord;
use crate::types::job_request::LocationLabels;
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::task;

/// Result of converting one raw archive file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionOutput {
    pub epw_path: PathBuf,
    pub csv_path: PathBuf,
    pub location: String,
    pub year: i32,
    pub latitude: String,
    pub longitude: String,
}

/// Converts a raw NSRDB CSV into an EPW file next to it.
///
/// The output is named `{location}_{lat}_{lon}_{year}.epw`. Only hourly files
/// with at least one full non-leap year of rows convert; extra rows (the leap
/// day of a leap year) are dropped from the end.
pub fn convert_csv_to_epw(
    csv_path: &Path,
    labels: &LocationLabels,
) -> Result<ConversionOutput, ConversionError> {
    if !csv_path.is_file() {
        return Err(ConversionError::NotFound(csv_path.to_path_buf()));
    }
    let bytes =
        std::fs::read(csv_path).map_err(|e| ConversionError::Read(csv_path.to_path_buf(), e))?;

    let raw = RawRecord::parse(&bytes, csv_path)?;
    let record = WeatherRecord::from_raw(&raw, labels)?;

    let out_dir = csv_path.parent().unwrap_or_else(|| Path::new("."));
    let epw_path = out_dir.join(record.file_name(&labels.location));
    record.write(&epw_path)?;
    info!(
        "Converted {} to {}",
        csv_path.display(),
        epw_path.display()
    );

    Ok(ConversionOutput {
        epw_path,
        csv_path: csv_path.to_path_buf(),
        location: labels.location.clone(),
        year: record.year,
        latitude: record.latitude,
        longitude: record.longitude,
    })
}

/// [`convert_csv_to_epw`] on the blocking pool.
pub async fn convert_csv_to_epw_async(
    csv_path: PathBuf,
    labels: LocationLabels,
) -> Result<ConversionOutput, ConversionError> {
    task::spawn_blocking(move || convert_csv_to_epw(&csv_path, &labels)).await?
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::epw::error::ConversionErrorClass;
    use crate::epw::weather_record::{HOURS_PER_YEAR, SENTINEL};
    use std::fmt::Write as _;
    use tempfile::TempDir;

    /// A raw archive file with `rows` rows spaced `step_minutes` apart.
    /// The pressure column is left out and wind direction is blank in row 0.
    pub(crate) fn sample_csv(year: i32, rows: usize, step_minutes: usize) -> String {
        let mut csv = String::from(
            "Source,Location ID,City,State,Country,Latitude,Longitude,Time Zone,Elevation,Local Time Zone\n\
             NSRDB,1127013,-,-,-,42.45,-76.46,0,253,-5\n\
             Year,Month,Day,Hour,Minute,Temperature,Dew Point,GHI,DNI,DHI,Wind Direction,Wind Speed,Surface Albedo,Unused\n",
        );
        for i in 0..rows {
            let minutes = i * step_minutes + 30;
            let wind = if i == 0 { String::new() } else { "182.7".to_string() };
            writeln!(
                csv,
                "{year},1,1,{},{},20,10,100,200,50,{wind},3.5,0.2,",
                minutes / 60,
                minutes % 60
            )
            .unwrap();
        }
        csv
    }

    fn write_sample(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn labels() -> LocationLabels {
        LocationLabels {
            location: "Ithaca".to_string(),
            region: "NY".to_string(),
            country: "USA".to_string(),
        }
    }

    #[test]
    fn test_full_year_conversion() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let csv_path = write_sample(&dir, "1127013_2022.csv", &sample_csv(2022, HOURS_PER_YEAR, 60));

        let output = convert_csv_to_epw(&csv_path, &labels())?;
        assert_eq!(output.year, 2022);
        assert_eq!(
            output.epw_path.file_name().unwrap(),
            "Ithaca_42.45_-76.46_2022.epw"
        );

        let text = std::fs::read_to_string(&output.epw_path)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 8 + HOURS_PER_YEAR);
        assert_eq!(
            lines[0],
            "LOCATION,Ithaca,NY,USA,NSRDB,XXX,42.45,-76.46,-5,253"
        );
        assert_eq!(lines[7], "DATA PERIODS,1,1,Data,Sunday, 1/ 1,12/31");

        let first: Vec<&str> = lines[8].split(',').collect();
        assert_eq!(first.len(), 35);
        assert_eq!(&first[..5], &["2022", "1", "1", "1", "0"]);
        let rh: i64 = first[8].parse()?;
        assert!((rh - 52).abs() <= 1);
        // No pressure column in the source.
        assert_eq!(first[9], SENTINEL.to_string());
        // Blank wind direction in the first row.
        assert_eq!(first[20], SENTINEL.to_string());
        assert_eq!(first[33], SENTINEL.to_string());

        let second: Vec<&str> = lines[9].split(',').collect();
        assert_eq!(second[20], "182");
        assert_eq!(second[32].parse::<f64>()?, 0.2);

        let last: Vec<&str> = lines.last().unwrap().split(',').collect();
        assert_eq!(&last[..4], &["2022", "12", "31", "24"]);
        Ok(())
    }

    #[test]
    fn test_missing_file() {
        let err = convert_csv_to_epw(Path::new("/definitely/not/here.csv"), &labels()).unwrap_err();
        assert!(matches!(err, ConversionError::NotFound(_)));
        assert_eq!(err.class(), ConversionErrorClass::NotFound);
    }

    #[test]
    fn test_too_few_rows() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let csv_path = write_sample(&dir, "short.csv", &sample_csv(2022, 48, 60));
        let err = convert_csv_to_epw(&csv_path, &labels()).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::InsufficientRows { found: 48, expected: 8760, .. }
        ));
        assert_eq!(err.class(), ConversionErrorClass::Format);
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn test_half_hourly_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let csv_path = write_sample(&dir, "half.csv", &sample_csv(2022, 4, 30));
        let err = convert_csv_to_epw(&csv_path, &labels()).unwrap_err();
        assert!(matches!(
            err,
            ConversionError::UnsupportedInterval { minutes: 30, .. }
        ));
        Ok(())
    }

    #[test]
    fn test_leap_year_is_truncated() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let csv_path = write_sample(&dir, "leap.csv", &sample_csv(2020, 8784, 60));
        let output = convert_csv_to_epw(&csv_path, &labels())?;
        let text = std::fs::read_to_string(&output.epw_path)?;
        assert_eq!(text.lines().count(), 8 + HOURS_PER_YEAR);
        Ok(())
    }

    #[tokio::test]
    async fn test_async_conversion() -> Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let csv_path = write_sample(&dir, "a.csv", &sample_csv(2021, HOURS_PER_YEAR, 60));
        let output = convert_csv_to_epw_async(csv_path, labels()).await?;
        assert!(output.epw_path.exists());
        Ok(())
    }
}
