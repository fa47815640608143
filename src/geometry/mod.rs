//! Query-geometry handling.
//!
//! The pipeline only needs two things from a geometry: whether it is valid and
//! what to send to the archive's discovery endpoint. [`GeometryValidator`] is
//! that seam; [`WktGeometry`] is the built-in implementation.

pub mod wkt;

pub use wkt::{buffered_point_wkt, point_wkt, WktGeometry};

pub trait GeometryValidator: Send + Sync {
    /// Whether `wkt` is a syntactically valid geometry the archive can be queried with.
    fn is_valid(&self, wkt: &str) -> bool;

    /// The geometry as it should be passed to the archive's discovery endpoint.
    fn to_location_seed(&self, wkt: &str) -> String;
}
