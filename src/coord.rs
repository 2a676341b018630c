//! Georeferenced positions and the discretization that makes them cacheable.

use crate::crs;
use crate::error::Result;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A position tagged with the EPSG code of its reference system.
///
/// For projected systems (x, y, z) is (easting, northing, height) in meters;
/// for geographic systems it is (lon, lat, height) with angles in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub epsg: u32,
}

impl Coord {
    pub fn new(x: f64, y: f64, z: f64, epsg: u32) -> Self {
        Self { x, y, z, epsg }
    }

    /// Reprojects into `epsg`, returning the transformed position.
    pub fn to_epsg(self, epsg: u32) -> Result<Self> {
        let (x, y, z) = crs::transform(self.x, self.y, self.z, self.epsg, epsg)?;
        Ok(Self { x, y, z, epsg })
    }

    /// Snaps each component to the nearest multiple of `res`.
    ///
    /// Two positions land on the same snapped value exactly when they lie in
    /// the same res-sized cell, which is what makes the result usable as a
    /// shared cache key for nearby requests. Idempotent.
    pub fn round_to(self, res: f64) -> Self {
        Self {
            x: round_component(self.x, res),
            y: round_component(self.y, res),
            z: round_component(self.z, res),
            epsg: self.epsg,
        }
    }

    /// A hashable key derived from the exact component bit patterns.
    ///
    /// Only meaningful on values that went through [`Coord::round_to`]:
    /// snapping maps a whole cell onto one representative, so bit equality
    /// and value equality coincide.
    pub fn key(&self) -> CoordKey {
        CoordKey {
            x: self.x.to_bits(),
            y: self.y.to_bits(),
            z: self.z.to_bits(),
            epsg: self.epsg,
        }
    }

    pub fn xyz(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

fn round_component(v: f64, res: f64) -> f64 {
    let snapped = (v / res).round() * res;
    // Collapse -0.0 so the bit-pattern key cannot split a cell in two.
    if snapped == 0.0 { 0.0 } else { snapped }
}

/// Cache key of a discretized [`Coord`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CoordKey {
    x: u64,
    y: u64,
    z: u64,
    epsg: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;
    use rstest::rstest;

    quickcheck! {
        fn round_to_is_idempotent(x: f64, y: f64, z: f64) -> bool {
            if !(x.is_finite() && y.is_finite() && z.is_finite()) {
                return true;
            }
            let once = Coord::new(x, y, z, 25832).round_to(50.0);
            once == once.round_to(50.0)
        }
    }

    #[rstest]
    #[case(364938.4, 5621690.5, 110.0)]
    #[case(-25.0, 24.9, 0.0)]
    fn same_cell_same_key(#[case] x: f64, #[case] y: f64, #[case] z: f64) {
        let res = 50.0;
        let a = Coord::new(x, y, z, 25832).round_to(res);
        let b = Coord::new(x + res / 4.0, y - res / 4.0, z + res / 4.0, 25832).round_to(res);
        assert_eq!(a, b);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn different_cell_different_key() {
        let a = Coord::new(10.0, 10.0, 0.0, 25832).round_to(50.0);
        let b = Coord::new(60.0, 10.0, 0.0, 25832).round_to(50.0);
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn epsg_is_part_of_the_key() {
        let a = Coord::new(10.0, 10.0, 0.0, 25832).round_to(50.0);
        let b = Coord::new(10.0, 10.0, 0.0, 25833).round_to(50.0);
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn negative_zero_is_normalized() {
        let a = Coord::new(-1.0, 0.0, 0.0, 25832).round_to(50.0);
        let b = Coord::new(1.0, 0.0, 0.0, 25832).round_to(50.0);
        assert_eq!(a.key(), b.key());
    }
}
