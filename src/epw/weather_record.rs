use crate::epw::error::ConversionError;
use crate::epw::raw_record::RawRecord;
use crate::storage::output_store::sanitize_label;
use crate::types::job_request::LocationLabels;
use chrono::{Datelike, Duration, NaiveDate, Timelike};
use log::warn;
use polars::prelude::*;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Placeholder EPW readers treat as "not measured".
pub const SENTINEL: i64 = 999_999;

/// Rows in an EPW year. Leap days are not represented.
pub const HOURS_PER_YEAR: usize = 8760;

/// Only hourly archive data maps onto EPW rows.
pub const SUPPORTED_INTERVAL_MINUTES: i64 = 60;

/// The 35 EPW data fields, in file order.
pub const EPW_FIELDS: [&str; 35] = [
    "Year",
    "Month",
    "Day",
    "Hour",
    "Minute",
    "Data Source and Uncertainty Flags",
    "Dry Bulb Temperature",
    "Dew Point Temperature",
    "Relative Humidity",
    "Atmospheric Station Pressure",
    "Extraterrestrial Horizontal Radiation",
    "Extraterrestrial Direct Normal Radiation",
    "Horizontal Infrared Radiation Intensity",
    "Global Horizontal Radiation",
    "Direct Normal Radiation",
    "Diffuse Horizontal Radiation",
    "Global Horizontal Illuminance",
    "Direct Normal Illuminance",
    "Diffuse Horizontal Illuminance",
    "Zenith Luminance",
    "Wind Direction",
    "Wind Speed",
    "Total Sky Cover",
    "Opaque Sky Cover",
    "Visibility",
    "Ceiling Height",
    "Present Weather Observation",
    "Present Weather Codes",
    "Precipitable Water",
    "Aerosol Optical Depth",
    "Snow Depth",
    "Days Since Last Snowfall",
    "Albedo",
    "Liquid Precipitation Depth",
    "Liquid Precipitation Quantity",
];

const DESIGN_CONDITIONS: &[&str] = &[
    "1", "Climate Design Data 2009 ASHRAE Handbook", "", "Heating", "1", "3.8", "4.9", "-3.7",
    "2.8", "10.7", "-1.2", "3.4", "11.2", "12.9", "12.1", "11.6", "12.2", "2.2", "150",
    "Cooling", "8", "8.5", "28.3", "17.2", "25.7", "16.7", "23.6", "16.2", "18.6", "25.7",
    "17.8", "23.9", "17", "22.4", "5.9", "310", "16.1", "11.5", "19.9", "15.3", "10.9", "19.2",
    "14.7", "10.4", "18.7", "52.4", "25.8", "49.8", "23.8", "47.6", "22.4", "2038", "Extremes",
    "12.8", "11.5", "11.5", "10.6", "22.3", "1.8", "34.6", "1.5", "2.3", "0.8", "36.2", "-0.1",
    "37.5", "-0.9", "38.8", "-1.9", "40.5",
];

const TYPICAL_EXTREME_PERIODS: &[&str] = &[
    "6",
    "Summer - Week Nearest Max Temperature For Period",
    "Extreme",
    "8/ 1",
    "8/ 7",
    "Summer - Week Nearest Average Temperature For Period",
    "Typical",
    "9/ 5",
    "9/11",
    "Winter - Week Nearest Min Temperature For Period",
    "Extreme",
    "2/ 1",
    "2/ 7",
    "Winter - Week Nearest Average Temperature For Period",
    "Typical",
    "2/15",
    "2/21",
    "Autumn - Week Nearest Average Temperature For Period",
    "Typical",
    "12/ 6",
    "12/12",
    "Spring - Week Nearest Average Temperature For Period",
    "Typical",
    "5/29",
    "6/ 4",
];

const GROUND_TEMPERATURES: &[&str] = &[
    "3", ".5", "", "", "", "10.86", "10.57", "11.08", "11.88", "13.97", "15.58", "16.67",
    "17.00", "16.44", "15.19", "13.51", "11.96", "2", "", "", "", "11.92", "11.41", "11.51",
    "11.93", "13.33", "14.60", "15.61", "16.15", "16.03", "15.32", "14.17", "12.95", "4", "",
    "", "", "12.79", "12.27", "12.15", "12.31", "13.10", "13.96", "14.74", "15.28", "15.41",
    "15.10", "14.42", "13.60",
];

const HOLIDAYS_DAYLIGHT_SAVINGS: &[&str] = &["No", "0", "0", "0"];

const DATA_PERIODS: &[&str] = &["1", "1", "Data", "Sunday", " 1/ 1", "12/31"];

/// Relative humidity in percent from dry bulb and dew point temperatures (°C),
/// using the Magnus approximation. Rounded and clamped to the EPW range 0..=110.
pub fn relative_humidity(temperature: f64, dew_point: f64) -> Option<i64> {
    let ratio = (17.62 * dew_point / (dew_point + 243.12)
        - 17.62 * temperature / (temperature + 243.12))
        .exp();
    let percent = (ratio * 100.0).round();
    percent.is_finite().then(|| (percent as i64).clamp(0, 110))
}

/// One EPW year: the header blocks plus the 8760-row data table.
#[derive(Debug, Clone)]
pub struct WeatherRecord {
    pub year: i32,
    pub latitude: String,
    pub longitude: String,
    pub headers: Vec<(String, Vec<String>)>,
    pub frame: DataFrame,
}

impl WeatherRecord {
    pub fn from_raw(raw: &RawRecord, labels: &LocationLabels) -> Result<Self, ConversionError> {
        let rows = raw.height();
        if rows == 0 {
            return Err(ConversionError::NoRows(raw.path.clone()));
        }

        let year_value = raw.required_int("Year", 0)?;
        let start = i32::try_from(year_value)
            .ok()
            .and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1))
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| ConversionError::InvalidValue {
                path: raw.path.clone(),
                column: "Year".to_string(),
                value: year_value.to_string(),
            })?;
        let year = start.year();

        if rows >= 2 {
            let minutes = (raw.required_int("Hour", 1)? - raw.required_int("Hour", 0)?) * 60
                + raw.required_int("Minute", 1)?
                - raw.required_int("Minute", 0)?;
            if minutes != SUPPORTED_INTERVAL_MINUTES {
                return Err(ConversionError::UnsupportedInterval {
                    path: raw.path.clone(),
                    minutes,
                });
            }
        }

        if rows < HOURS_PER_YEAR {
            return Err(ConversionError::InsufficientRows {
                path: raw.path.clone(),
                expected: HOURS_PER_YEAR,
                found: rows,
            });
        }
        if rows > HOURS_PER_YEAR {
            warn!(
                "{} has {} rows, keeping the first {}",
                raw.path.display(),
                rows,
                HOURS_PER_YEAR
            );
        }

        let timestamps: Vec<_> = (0..HOURS_PER_YEAR as i64)
            .map(|h| start + Duration::hours(h))
            .collect();
        let temperature = measured(raw, "Temperature", 1.0);
        let dew_point = measured(raw, "Dew Point", 1.0);
        let humidity: Vec<i64> = temperature
            .iter()
            .zip(&dew_point)
            .map(|(t, td)| match (t, td) {
                (Some(t), Some(td)) => relative_humidity(*t, *td).unwrap_or(SENTINEL),
                _ => SENTINEL,
            })
            .collect();
        let wind_direction: Vec<i64> = measured(raw, "Wind Direction", 1.0)
            .into_iter()
            .map(|v| v.map_or(SENTINEL, |d| d as i64))
            .collect();

        use Field::{Float, Int, Missing};
        let fields: [Field; EPW_FIELDS.len()] = [
            Int(timestamps.iter().map(|t| t.year() as i64).collect()),
            Int(timestamps.iter().map(|t| t.month() as i64).collect()),
            Int(timestamps.iter().map(|t| t.day() as i64).collect()),
            Int(timestamps.iter().map(|t| t.hour() as i64 + 1).collect()),
            Int(vec![0; HOURS_PER_YEAR]),
            Missing,
            Float(temperature),
            Float(dew_point),
            Int(humidity),
            Float(measured(raw, "Pressure", 100.0)),
            Missing,
            Missing,
            Missing,
            Float(measured(raw, "GHI", 1.0)),
            Float(measured(raw, "DNI", 1.0)),
            Float(measured(raw, "DHI", 1.0)),
            Missing,
            Missing,
            Missing,
            Missing,
            Int(wind_direction),
            Float(measured(raw, "Wind Speed", 1.0)),
            Missing,
            Missing,
            Missing,
            Missing,
            Missing,
            Missing,
            Missing,
            Missing,
            Missing,
            Missing,
            Float(measured(raw, "Surface Albedo", 1.0)),
            Missing,
            Missing,
        ];
        let columns: Vec<Column> = EPW_FIELDS
            .iter()
            .zip(fields)
            .map(|(name, field)| field.into_column(name))
            .collect();
        let frame = DataFrame::new(columns).map_err(ConversionError::Frame)?;

        let meta = &raw.metadata;
        let headers = vec![
            header(
                "LOCATION",
                [
                    labels.location.as_str(),
                    labels.region.as_str(),
                    labels.country.as_str(),
                    meta.source.as_str(),
                    "XXX",
                    meta.latitude.as_str(),
                    meta.longitude.as_str(),
                    meta.time_zone.as_str(),
                    meta.elevation.as_str(),
                ],
            ),
            header("DESIGN CONDITIONS", DESIGN_CONDITIONS.iter().copied()),
            header("TYPICAL/EXTREME PERIODS", TYPICAL_EXTREME_PERIODS.iter().copied()),
            header("GROUND TEMPERATURES", GROUND_TEMPERATURES.iter().copied()),
            header(
                "HOLIDAYS/DAYLIGHT SAVINGS",
                HOLIDAYS_DAYLIGHT_SAVINGS.iter().copied(),
            ),
            header("COMMENTS 1", [meta.source.as_str()]),
            header("COMMENTS 2", ["Converted from NSRDB hourly data"]),
            header("DATA PERIODS", DATA_PERIODS.iter().copied()),
        ];

        Ok(Self {
            year,
            latitude: meta.latitude.clone(),
            longitude: meta.longitude.clone(),
            headers,
            frame,
        })
    }

    /// `{location}_{lat}_{lon}_{year}.epw`
    pub fn file_name(&self, location: &str) -> String {
        format!(
            "{}_{}_{}_{}.epw",
            sanitize_label(location),
            self.latitude,
            self.longitude,
            self.year
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ConversionError> {
        let mut out = Vec::new();
        for (name, values) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            for value in values {
                out.push(b',');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }
        let mut frame = self.frame.clone();
        CsvWriter::new(&mut out)
            .include_header(false)
            .with_null_value(SENTINEL.to_string())
            .finish(&mut frame)
            .map_err(ConversionError::Frame)?;
        Ok(out)
    }

    /// Writes the file through a temporary sibling so readers never see a
    /// partial EPW.
    pub fn write(&self, path: &Path) -> Result<(), ConversionError> {
        let bytes = self.to_bytes()?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| ConversionError::Write(path.to_path_buf(), e))?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.flush())
            .map_err(|e| ConversionError::Write(path.to_path_buf(), e))?;
        tmp.persist(path)
            .map_err(|e| ConversionError::Write(path.to_path_buf(), e.error))?;
        Ok(())
    }
}

/// First year's worth of a numeric column, scaled. Absent columns yield all `None`.
fn measured(raw: &RawRecord, column: &str, scale: f64) -> Vec<Option<f64>> {
    match raw.numeric(column) {
        Some(values) => values
            .into_iter()
            .take(HOURS_PER_YEAR)
            .map(|v| v.map(|x| x * scale))
            .collect(),
        None => vec![None; HOURS_PER_YEAR],
    }
}

/// Values of one EPW field before it is named and written.
enum Field {
    Int(Vec<i64>),
    /// Unmeasured hours are null and written as [`SENTINEL`].
    Float(Vec<Option<f64>>),
    Missing,
}

impl Field {
    fn into_column(self, name: &str) -> Column {
        match self {
            Field::Int(values) => Column::new(name.into(), values),
            Field::Float(values) => Column::new(name.into(), values),
            Field::Missing => Column::new(name.into(), vec![SENTINEL; HOURS_PER_YEAR]),
        }
    }
}

fn header<'a>(name: &str, values: impl IntoIterator<Item = &'a str>) -> (String, Vec<String>) {
    // Header fields are comma separated, so embedded commas would shift columns.
    (
        name.to_string(),
        values.into_iter().map(|v| v.replace(',', " ")).collect(),
    )
}
