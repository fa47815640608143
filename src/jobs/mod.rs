//! Job orchestration: from a [`crate::JobRequest`] to converted files on disk.

pub mod error;
pub mod orchestrator;
pub mod validation;
