//! Request validation. Every problem with a request is reported at once.

use crate::archive::client::ArchiveQuery;
use crate::epw::weather_record::SUPPORTED_INTERVAL_MINUTES;
use crate::geometry::GeometryValidator;
use crate::types::dataset::Dataset;
use crate::types::job_request::{dedup_years, JobRequest, LocationLabels};

/// A request that passed validation, with every field in its typed form.
#[derive(Clone, PartialEq)]
pub struct PreparedJob {
    pub location_seed: String,
    pub dataset: Dataset,
    pub interval: u32,
    /// Deduplicated, in first-seen order.
    pub years: Vec<i32>,
    pub api_key: String,
    pub email: String,
    pub labels: LocationLabels,
    pub convert_to_epw: bool,
}

impl PreparedJob {
    pub fn query(&self) -> ArchiveQuery {
        ArchiveQuery {
            dataset: self.dataset,
            interval: self.interval,
            api_key: self.api_key.clone(),
            email: self.email.clone(),
        }
    }
}

impl std::fmt::Debug for PreparedJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedJob")
            .field("location_seed", &self.location_seed)
            .field("dataset", &self.dataset)
            .field("interval", &self.interval)
            .field("years", &self.years)
            .field("api_key", &"<redacted>")
            .field("email", &self.email)
            .field("labels", &self.labels)
            .field("convert_to_epw", &self.convert_to_epw)
            .finish()
    }
}

pub fn validate_request(
    request: &JobRequest,
    geometry: &impl GeometryValidator,
) -> Result<PreparedJob, Vec<String>> {
    let mut errors = Vec::new();

    let wkt = request.wkt.trim();
    if wkt.is_empty() || !geometry.is_valid(wkt) {
        errors.push("Invalid WKT geometry string".to_string());
    }

    let dataset = request.dataset.parse::<Dataset>().ok();
    if dataset.is_none() {
        let names: Vec<&str> = Dataset::ALL.iter().map(|d| d.short_name()).collect();
        errors.push(format!(
            "Invalid dataset. Must be one of: {}",
            names.join(", ")
        ));
    }

    let interval = request
        .interval
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|minutes| *minutes > 0);
    match interval {
        None => errors.push("Interval must be a positive integer".to_string()),
        // Only hourly data converts, so fail before anything is downloaded.
        Some(minutes)
            if request.convert_to_epw && i64::from(minutes) != SUPPORTED_INTERVAL_MINUTES =>
        {
            errors.push(format!(
                "EPW conversion requires an interval of {} minutes, got {}",
                SUPPORTED_INTERVAL_MINUTES, minutes
            ))
        }
        Some(_) => {}
    }

    let mut years = Vec::with_capacity(request.years.len());
    if request.years.is_empty() {
        errors.push("At least one year must be specified".to_string());
    }
    for year in &request.years {
        match parse_year(year) {
            Some(value) => years.push(value),
            None => errors.push(format!("Invalid year format: {}", year)),
        }
    }

    if request.api_key.trim().is_empty() {
        errors.push("API key is required".to_string());
    }
    if !is_plausible_email(&request.email) {
        errors.push("Valid email address is required".to_string());
    }

    match (dataset, interval) {
        (Some(dataset), Some(interval)) if errors.is_empty() => Ok(PreparedJob {
            location_seed: geometry.to_location_seed(wkt),
            dataset,
            interval,
            years: dedup_years(&years),
            api_key: request.api_key.trim().to_string(),
            email: request.email.trim().to_string(),
            labels: request.labels(),
            convert_to_epw: request.convert_to_epw,
        }),
        _ => Err(errors),
    }
}

/// Exactly four ASCII digits.
fn parse_year(text: &str) -> Option<i32> {
    let text = text.trim();
    if text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit()) {
        text.parse().ok()
    } else {
        None
    }
}

fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}
