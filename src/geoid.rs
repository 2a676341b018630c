//! Geoid undulation: the correction from ellipsoidal to orthometric heights.
//!
//! Building models carry orthometric roof heights while GNSS positions are
//! ellipsoidal; the difference is the undulation N interpolated from a
//! scattered grid. The grid is loaded once, reprojected into the working
//! CRS, and queried read-only for the life of the process.

use std::num::NonZeroUsize;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use kdtree::KdTree;
use kdtree::distance::squared_euclidean;
use log::{debug, info};
use lru::LruCache;

use crate::coord::{Coord, CoordKey};
use crate::crs;
use crate::error::{Error, Result};

/// Undulation queries memoized per discretized position.
const CACHE_ENTRIES: usize = 2048;

/// Neighbours considered when searching for an enclosing triangle.
const LINEAR_NEIGHBOURS: usize = 12;

/// How a query point is interpolated from the surrounding grid points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interpolation {
    /// Undulation of the closest grid point.
    Nearest,
    /// Barycentric interpolation on a triangle of nearby grid points; NaN
    /// outside the grid.
    Linear,
}

impl FromStr for Interpolation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NEAREST" => Ok(Interpolation::Nearest),
            "LINEAR" => Ok(Interpolation::Linear),
            other => Err(Error::config(format!("unknown interpolation '{other}'"))),
        }
    }
}

/// A geoid undulation grid with a fixed interpolation mode.
pub struct Geoid {
    points: Vec<[f64; 2]>,
    undulation: Vec<f64>,
    tree: KdTree<f64, usize, [f64; 2]>,
    interpolation: Interpolation,
    cache: Mutex<LruCache<CoordKey, f64>>,
}

impl Geoid {
    /// The no-grid geoid: undulation is zero everywhere.
    pub fn zero() -> Self {
        info!("no geoid grid configured, heights are used as-is");
        Self::from_points(Vec::new(), Interpolation::Nearest)
    }

    /// Loads a whitespace-separated `lon lat N` grid file given in
    /// `epsg` and reprojects it into `work_epsg`.
    pub fn from_file(
        path: &Path,
        epsg: u32,
        interpolation: Interpolation,
        work_epsg: u32,
    ) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut rows = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut columns = line.split_whitespace().map(f64::from_str);
            let (Some(Ok(lon)), Some(Ok(lat)), Some(Ok(n)), None) = (
                columns.next(),
                columns.next(),
                columns.next(),
                columns.next(),
            ) else {
                return Err(Error::GeoidFormat {
                    path: path.to_path_buf(),
                    line: idx + 1,
                });
            };
            let (x, y, _) = crs::transform(lon, lat, 0.0, epsg, work_epsg)?;
            rows.push(([x, y], n));
        }
        info!(
            "initialized geoid from {} with {} grid points",
            path.display(),
            rows.len()
        );
        Ok(Self::from_points(rows, interpolation))
    }

    /// Builds a geoid from grid points already in the working CRS.
    pub fn from_points(rows: Vec<([f64; 2], f64)>, interpolation: Interpolation) -> Self {
        let mut tree = KdTree::new(2);
        let mut points = Vec::with_capacity(rows.len());
        let mut undulation = Vec::with_capacity(rows.len());
        for (point, n) in rows {
            if !(point[0].is_finite() && point[1].is_finite() && n.is_finite()) {
                debug!("dropping non-finite geoid grid point {point:?}");
                continue;
            }
            if tree.add(point, points.len()).is_ok() {
                points.push(point);
                undulation.push(n);
            }
        }
        Self {
            points,
            undulation,
            tree,
            interpolation,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_ENTRIES).expect("cache capacity is nonzero"),
            )),
        }
    }

    /// Interpolated undulation at `pos` (already in the working CRS and
    /// rounded to the geoid resolution by the caller, so nearby requests
    /// share a cache entry).
    ///
    /// Returns NaN when linear interpolation is asked for a point outside
    /// the grid.
    pub fn interpolate(&self, pos: Coord) -> f64 {
        let key = pos.key();
        let mut cache = self.cache.lock().expect("geoid cache lock");
        if let Some(n) = cache.get(&key) {
            return *n;
        }
        let n = self.undulation_at(pos.x, pos.y);
        cache.put(key, n);
        n
    }

    fn undulation_at(&self, x: f64, y: f64) -> f64 {
        if self.undulation.is_empty() {
            return 0.0;
        }
        match self.interpolation {
            Interpolation::Nearest => self
                .tree
                .nearest(&[x, y], 1, &squared_euclidean)
                .ok()
                .and_then(|hits| hits.first().map(|&(_, &idx)| self.undulation[idx]))
                .unwrap_or(0.0),
            Interpolation::Linear => self.linear_at(x, y),
        }
    }

    /// Barycentric interpolation on the first non-degenerate triangle of
    /// nearby grid points that encloses the query.
    fn linear_at(&self, x: f64, y: f64) -> f64 {
        let k = LINEAR_NEIGHBOURS.min(self.points.len());
        let Ok(hits) = self.tree.nearest(&[x, y], k, &squared_euclidean) else {
            return f64::NAN;
        };
        let indices: Vec<usize> = hits.iter().map(|&(_, &idx)| idx).collect();

        for a in 0..indices.len() {
            for b in (a + 1)..indices.len() {
                for c in (b + 1)..indices.len() {
                    if let Some(n) = self.barycentric(indices[a], indices[b], indices[c], x, y) {
                        return n;
                    }
                }
            }
        }
        f64::NAN
    }

    fn barycentric(&self, i: usize, j: usize, k: usize, x: f64, y: f64) -> Option<f64> {
        let [x1, y1] = self.points[i];
        let [x2, y2] = self.points[j];
        let [x3, y3] = self.points[k];

        let denom = (y2 - y3) * (x1 - x3) + (x3 - x2) * (y1 - y3);
        if denom.abs() < 1e-12 {
            return None;
        }
        let u = ((y2 - y3) * (x - x3) + (x3 - x2) * (y - y3)) / denom;
        let v = ((y3 - y1) * (x - x3) + (x1 - x3) * (y - y3)) / denom;
        let w = 1.0 - u - v;

        const TOL: f64 = -1e-9;
        if u < TOL || v < TOL || w < TOL {
            return None;
        }
        Some(u * self.undulation[i] + v * self.undulation[j] + w * self.undulation[k])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plane_grid() -> Vec<([f64; 2], f64)> {
        // N = 2x + 3y + 1 sampled on a 5x5 unit grid.
        let mut rows = Vec::new();
        for ix in 0..5 {
            for iy in 0..5 {
                let (x, y) = (f64::from(ix), f64::from(iy));
                rows.push(([x, y], 2.0 * x + 3.0 * y + 1.0));
            }
        }
        rows
    }

    fn query(geoid: &Geoid, x: f64, y: f64) -> f64 {
        geoid.interpolate(Coord::new(x, y, 0.0, 25832))
    }

    #[test]
    fn zero_geoid_is_flat() {
        let geoid = Geoid::zero();
        assert_eq!(query(&geoid, 364938.4, 5621690.5), 0.0);
    }

    #[test]
    fn nearest_returns_the_closest_grid_value() {
        let geoid = Geoid::from_points(
            vec![([0.0, 0.0], 47.0), ([100.0, 0.0], 49.0)],
            Interpolation::Nearest,
        );
        assert_eq!(query(&geoid, 10.0, 5.0), 47.0);
        assert_eq!(query(&geoid, 90.0, -5.0), 49.0);
    }

    #[test]
    fn linear_reproduces_a_plane() {
        let geoid = Geoid::from_points(plane_grid(), Interpolation::Linear);
        assert_relative_eq!(
            query(&geoid, 1.5, 2.25),
            2.0 * 1.5 + 3.0 * 2.25 + 1.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(query(&geoid, 2.0, 2.0), 11.0, epsilon = 1e-9);
    }

    #[test]
    fn linear_is_nan_outside_the_grid() {
        let geoid = Geoid::from_points(plane_grid(), Interpolation::Linear);
        assert!(query(&geoid, 40.0, 40.0).is_nan());
    }

    #[test]
    fn repeated_queries_hit_the_cache() {
        let geoid = Geoid::from_points(plane_grid(), Interpolation::Linear);
        let first = query(&geoid, 1.0, 1.0);
        let second = query(&geoid, 1.0, 1.0);
        assert_eq!(first, second);
    }

    #[test]
    fn interpolation_tags_parse() {
        assert_eq!(
            "linear".parse::<Interpolation>().unwrap(),
            Interpolation::Linear
        );
        assert_eq!(
            "NEAREST".parse::<Interpolation>().unwrap(),
            Interpolation::Nearest
        );
        assert!("cubic".parse::<Interpolation>().is_err());
    }
}
