//! In-memory progress registry shared by running jobs and pollers.

pub mod job_state;
pub mod tracker;
