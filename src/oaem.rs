//! The obstruction adaptive elevation mask and the sweep that computes it.

use std::f64::consts::PI;
use std::fmt::Write as _;

use log::debug;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::coord::Coord;
use crate::edge::Edge;
use crate::interval::IntervalTree;

/// Default azimuth grid resolution: one degree.
pub const DEFAULT_RES: f64 = PI / 180.0;

/// Wraps an angle into [−π, π).
pub fn wrap_to_pi(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    // rem_euclid of a tiny negative can land exactly on 2π.
    if wrapped >= PI { -PI } else { wrapped }
}

/// A sampled elevation mask e(φ) on a uniform azimuth grid.
///
/// Azimuths ascend from −π in steps of the resolution and stay below π;
/// elevations are non-negative radians. The mask is 2π-periodic: queries are
/// wrapped, and the seam between the last and first sample interpolates
/// across ±π.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Oaem {
    azimuth: Vec<f64>,
    elevation: Vec<f64>,
    res: f64,
}

impl Oaem {
    /// The all-zero mask: a free horizon.
    pub fn zero(res: f64) -> Self {
        let azimuth = grid(res);
        let elevation = vec![0.0; azimuth.len()];
        Self {
            azimuth,
            elevation,
            res,
        }
    }

    /// Builds a mask from grid samples produced by the sweep.
    ///
    /// `elevation` must be sampled on the uniform grid `−π + k·res`.
    pub fn from_samples(elevation: Vec<f64>, res: f64) -> Self {
        let azimuth = grid(res);
        assert_eq!(azimuth.len(), elevation.len());
        Self {
            azimuth,
            elevation,
            res,
        }
    }

    pub fn azimuth(&self) -> &[f64] {
        &self.azimuth
    }

    pub fn elevation(&self) -> &[f64] {
        &self.elevation
    }

    pub fn res(&self) -> f64 {
        self.res
    }

    /// Mask elevation at an arbitrary azimuth, by linear interpolation.
    pub fn query(&self, azimuth: f64) -> f64 {
        let n = self.azimuth.len();
        if n == 0 {
            return 0.0;
        }
        let wrapped = wrap_to_pi(azimuth);
        let offset = (wrapped + PI) / self.res;
        let idx = (offset.floor() as usize).min(n - 1);
        let frac = offset - idx as f64;
        let next = (idx + 1) % n;
        self.elevation[idx] + (self.elevation[next] - self.elevation[idx]) * frac
    }

    /// [`Oaem::query`] over a batch of azimuths.
    pub fn query_many(&self, azimuths: &[f64]) -> Vec<f64> {
        azimuths.iter().map(|&az| self.query(az)).collect()
    }

    /// The same mask resampled onto a uniform grid of resolution `res`.
    pub fn resample(&self, res: f64) -> Oaem {
        let elevation = grid(res).into_iter().map(|az| self.query(az)).collect();
        Oaem::from_samples(elevation, res)
    }

    /// The wire format: `"az:el,"` per sample with three decimals, radians,
    /// trailing comma included.
    pub fn az_el_str(&self) -> String {
        let mut out = String::with_capacity(self.azimuth.len() * 14);
        for (az, el) in self.azimuth.iter().zip(&self.elevation) {
            let _ = write!(out, "{az:.3}:{el:.3},");
        }
        out
    }
}

fn grid(res: f64) -> Vec<f64> {
    let n = (2.0 * PI / res).round() as usize;
    (0..n).map(|k| -PI + k as f64 * res).collect()
}

/// Computes the elevation mask seen from `viewpoint` against `edges`.
///
/// Every edge is observed from the viewpoint once; its azimuth ranges go
/// into an interval tree carrying the edge index, and the grid sweep takes
/// the maximum elevation over the edges stabbed at each azimuth. The result
/// depends only on the inputs; insertion and query order never matter
/// because only the maximum survives.
pub fn oaem_from_edges(edges: &[Edge], viewpoint: Coord, res: f64) -> Oaem {
    if edges.is_empty() {
        return Oaem::zero(res);
    }

    let vp = viewpoint.xyz();
    let observed: Vec<_> = edges.iter().map(|e| e.observe_from(vp)).collect();

    let mut tree = IntervalTree::new();
    for (idx, edge) in observed.iter().enumerate() {
        for (lo, hi) in edge.azimuth_intervals() {
            tree.add(lo, hi, idx);
        }
    }
    debug!(
        "sweeping {} azimuth intervals from {} edges",
        tree.len(),
        edges.len()
    );

    let azimuth = grid(res);
    let elevation: Vec<f64> = azimuth
        .clone()
        .into_par_iter()
        .map(|az| {
            tree.query(az)
                .into_iter()
                .map(|&idx| observed[idx].elevation_at(az))
                .fold(0.0, f64::max)
        })
        .collect();

    Oaem {
        azimuth,
        elevation,
        res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use quickcheck::quickcheck;
    use rstest::rstest;

    #[test]
    fn empty_world_is_a_free_horizon() {
        let oaem = oaem_from_edges(&[], Coord::new(0.0, 0.0, 0.0, 25832), DEFAULT_RES);
        assert_eq!(oaem.azimuth().len(), 360);
        assert!(oaem.elevation().iter().all(|&el| el == 0.0));
        assert!(oaem.az_el_str().starts_with("-3.142:0.000,-3.124:0.000,"));
        assert!(oaem.az_el_str().ends_with(','));
    }

    #[test]
    fn grid_is_strictly_ascending_below_pi() {
        let oaem = Oaem::zero(DEFAULT_RES);
        let az = oaem.azimuth();
        assert!(az.windows(2).all(|w| w[0] < w[1]));
        assert!(az[0] >= -PI);
        assert!(*az.last().unwrap() < PI);
    }

    #[test]
    fn single_wall_peaks_at_its_bearing() {
        let edges = [Edge::new([0.0, 10.0, 5.0], [10.0, 10.0, 5.0])];
        let oaem = oaem_from_edges(&edges, Coord::new(5.0, 0.0, 0.0, 25832), DEFAULT_RES);
        assert_relative_eq!(oaem.query(0.0), 0.5_f64.atan(), epsilon = 0.01);
        assert_relative_eq!(oaem.query(PI - 0.01), 0.0);
    }

    #[test]
    fn seam_wall_peaks_at_both_ends_of_the_grid() {
        let edges = [Edge::new([-1.0, -10.0, 5.0], [1.0, -10.0, 5.0])];
        let oaem = oaem_from_edges(&edges, Coord::new(0.0, 0.0, 0.0, 25832), DEFAULT_RES);
        assert!(oaem.query(-PI) > 0.4);
        assert!(oaem.query(PI - 1e-9) > 0.4);
        assert_relative_eq!(oaem.query(0.0), 0.0);
        assert_relative_eq!(oaem.query(PI / 2.0), 0.0);
    }

    #[rstest]
    #[case(0.7)]
    #[case(-2.1)]
    #[case(3.0)]
    fn query_is_periodic(#[case] az: f64) {
        let edges = [Edge::new([0.0, 10.0, 5.0], [10.0, 10.0, 5.0])];
        let oaem = oaem_from_edges(&edges, Coord::new(5.0, 0.0, 0.0, 25832), DEFAULT_RES);
        assert_relative_eq!(
            oaem.query(az),
            oaem.query(az + 2.0 * PI),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            oaem.query(az),
            oaem.query(az - 4.0 * PI),
            epsilon = 1e-12
        );
    }

    #[test]
    fn resampling_keeps_the_grid_samples() {
        let edges = [Edge::new([0.0, 10.0, 5.0], [10.0, 10.0, 5.0])];
        let oaem = oaem_from_edges(&edges, Coord::new(5.0, 0.0, 0.0, 25832), DEFAULT_RES);
        let coarse = oaem.resample(DEFAULT_RES * 5.0);
        assert_eq!(coarse.azimuth().len(), 72);
        for (az, el) in coarse.azimuth().iter().zip(coarse.elevation()) {
            assert_relative_eq!(oaem.query(*az), *el, epsilon = 1e-12);
        }
    }

    #[test]
    fn taller_roofs_raise_the_mask() {
        let viewpoint = Coord::new(5.0, 0.0, 0.0, 25832);
        let low = oaem_from_edges(
            &[Edge::new([0.0, 10.0, 5.0], [10.0, 10.0, 5.0])],
            viewpoint,
            DEFAULT_RES,
        );
        let high = oaem_from_edges(
            &[Edge::new([0.0, 10.0, 15.0], [10.0, 10.0, 15.0])],
            viewpoint,
            DEFAULT_RES,
        );
        for (lo, hi) in low.elevation().iter().zip(high.elevation()) {
            assert!(hi >= lo);
        }
    }

    #[test]
    fn query_many_matches_scalar_queries() {
        let edges = [Edge::new([0.0, 10.0, 5.0], [10.0, 10.0, 5.0])];
        let oaem = oaem_from_edges(&edges, Coord::new(5.0, 0.0, 0.0, 25832), DEFAULT_RES);
        let azimuths = [-3.0, -0.3, 0.0, 0.4, 2.9];
        let batch = oaem.query_many(&azimuths);
        for (az, el) in azimuths.iter().zip(batch) {
            assert_eq!(oaem.query(*az), el);
        }
    }

    quickcheck! {
        /// Masks from arbitrary edge soup keep their structural invariants.
        fn mask_invariants_hold(raw: Vec<(i16, i16, i16, i16, u8)>) -> bool {
            let edges: Vec<Edge> = raw
                .iter()
                .map(|&(sx, sy, ex, ey, h)| {
                    Edge::new(
                        [f64::from(sx), f64::from(sy), f64::from(h)],
                        [f64::from(ex), f64::from(ey), f64::from(h)],
                    )
                })
                .collect();
            let oaem = oaem_from_edges(&edges, Coord::new(0.5, 0.5, 0.0, 25832), DEFAULT_RES);
            oaem.azimuth().len() == oaem.elevation().len()
                && oaem.elevation().iter().all(|el| *el >= 0.0 && el.is_finite())
                && oaem.azimuth().windows(2).all(|w| w[0] < w[1])
        }
    }
}
