pub mod dataset;
pub mod job_id;
pub mod job_request;
pub mod job_result;
