//! Building roof edges and the elevation they subtend at a viewpoint.
//!
//! Azimuths follow the compass convention throughout: `atan2(Δx, Δy)` with
//! north at zero and east at +π/2, on the range (−π, π]. This matches how
//! the mask is indexed and how solar bearings are reported.

use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One roof edge: a 3-D segment between two vertices in the working CRS.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Edge {
    start: [f64; 3],
    end: [f64; 3],
}

impl Edge {
    pub fn new(start: [f64; 3], end: [f64; 3]) -> Self {
        Self { start, end }
    }

    /// Builds an edge from a flat six-float row, the shape the GML parser
    /// emits.
    pub fn from_row(row: [f64; 6]) -> Self {
        Self {
            start: [row[0], row[1], row[2]],
            end: [row[3], row[4], row[5]],
        }
    }

    pub fn start(&self) -> [f64; 3] {
        self.start
    }

    pub fn end(&self) -> [f64; 3] {
        self.end
    }

    /// Binds a viewpoint, precomputing everything the per-azimuth elevation
    /// query needs.
    pub fn observe_from(&self, viewpoint: [f64; 3]) -> ObservedEdge {
        let rel_start = [
            self.start[0] - viewpoint[0],
            self.start[1] - viewpoint[1],
            self.start[2] - viewpoint[2],
        ];
        let delta = [
            self.end[0] - self.start[0],
            self.end[1] - self.start[1],
            self.end[2] - self.start[2],
        ];
        ObservedEdge {
            rel_start,
            delta,
            azimuth_start: rel_start[0].atan2(rel_start[1]),
            azimuth_end: (self.end[0] - viewpoint[0]).atan2(self.end[1] - viewpoint[1]),
        }
    }
}

/// An [`Edge`] with a viewpoint bound to it.
#[derive(Clone, Copy, Debug)]
pub struct ObservedEdge {
    /// Start vertex relative to the viewpoint.
    rel_start: [f64; 3],
    /// End vertex minus start vertex.
    delta: [f64; 3],
    azimuth_start: f64,
    azimuth_end: f64,
}

impl ObservedEdge {
    pub fn azimuth_start(&self) -> f64 {
        self.azimuth_start
    }

    pub fn azimuth_end(&self) -> f64 {
        self.azimuth_end
    }

    /// The azimuth ranges this edge occludes.
    ///
    /// An edge whose endpoint bearings sit on opposite sides of the ±π seam
    /// and more than π apart is seen across the seam; it covers the two
    /// ranges `[−π, min]` and `[max, π]` rather than the long way around.
    /// Everything else covers the single range `[min, max]`.
    pub fn azimuth_intervals(&self) -> Vec<(f64, f64)> {
        let lo = self.azimuth_start.min(self.azimuth_end);
        let hi = self.azimuth_start.max(self.azimuth_end);
        if self.azimuth_start.signum() != self.azimuth_end.signum() && hi - lo > PI {
            vec![(-PI, lo), (hi, PI)]
        } else {
            vec![(lo, hi)]
        }
    }

    /// Elevation angle of the edge along the bearing `azimuth`, in radians,
    /// clamped to the horizon.
    ///
    /// The foot point is the intersection of the bearing half-line with the
    /// horizontal projection of the segment; the line parameter is clamped
    /// to the segment, so bearings just past an endpoint see that endpoint.
    /// Degenerate geometry (the viewpoint on the edge, or an edge parallel
    /// to the bearing) contributes nothing.
    pub fn elevation_at(&self, azimuth: f64) -> f64 {
        let (sin_az, cos_az) = azimuth.sin_cos();

        // (P(t) - v) x (sin, cos) = 0, linear in t.
        let denom = self.delta[0] * cos_az - self.delta[1] * sin_az;
        let t = if denom.abs() < f64::EPSILON {
            0.0
        } else {
            (self.rel_start[1] * sin_az - self.rel_start[0] * cos_az) / denom
        };
        let t = t.clamp(0.0, 1.0);

        let px = self.rel_start[0] + t * self.delta[0];
        let py = self.rel_start[1] + t * self.delta[1];
        let pz = self.rel_start[2] + t * self.delta[2];

        let horizontal = px.hypot(py);
        if horizontal < f64::EPSILON {
            return 0.0;
        }
        pz.atan2(horizontal).max(0.0)
    }
}
