#![warn(missing_docs)]

//! Obstruction adaptive elevation masks.
//!
//! An OAEM answers, for every compass azimuth around a viewpoint, how high
//! a nearby building roof edge reaches into the sky. GNSS and solar
//! clients use it to predict whether a satellite or the sun is blocked.
//!
//! The pipeline: a request position is reprojected into the working CRS,
//! its height corrected from ellipsoidal to orthometric with a geoid grid,
//! nearby roof edges are pulled from CityGML tiles or a WFS, and the
//! engine sweeps a one-degree azimuth grid against an interval index of
//! the edges. [`service::OaemService`] ties it all together;
//! [`sun::SunTrack`] intersects the day's solar trajectory with a mask.

#[allow(missing_docs)]
pub mod config;
pub mod coord;
pub mod crs;
pub mod edge;
#[allow(missing_docs)]
pub mod error;
pub mod geoid;
pub mod gml;
pub mod interval;
pub mod oaem;
pub mod provider;
pub mod service;
pub mod sun;

/// The types most callers need.
pub mod prelude {
    pub use crate::config::{Config, EdgeSource};
    pub use crate::coord::Coord;
    pub use crate::edge::Edge;
    pub use crate::error::{Error, Result};
    pub use crate::geoid::{Geoid, Interpolation};
    pub use crate::oaem::{Oaem, oaem_from_edges};
    pub use crate::provider::{EdgeProvider, LocalEdgeProvider, WfsEdgeProvider};
    pub use crate::service::{Area, MaskResult, OaemService, SunVisibility};
    pub use crate::sun::SunTrack;
}
