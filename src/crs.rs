//! EPSG reprojection between geographic and UTM coordinate systems.
//!
//! Covers the systems building models and geoid grids actually come in:
//! geographic ETRS89/WGS84 (EPSG 4258/4326, lon/lat degrees) and the UTM
//! zones derived from them (EPSG 258xx and 326xx, easting/northing meters).
//! The projection is the transverse Mercator evaluated with Karney's
//! sixth-order series, accurate well below a millimeter inside a zone and
//! far beyond what a one-degree elevation mask can resolve.

use crate::error::{Error, Result};

const UTM_SCALE: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;

/// Reference ellipsoid given by semi-major axis and flattening.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Ellipsoid {
    a: f64,
    f: f64,
}

/// ETRS89 is realized on GRS80.
const GRS80: Ellipsoid = Ellipsoid {
    a: 6_378_137.0,
    f: 1.0 / 298.257_222_101,
};

const WGS84: Ellipsoid = Ellipsoid {
    a: 6_378_137.0,
    f: 1.0 / 298.257_223_563,
};

/// A coordinate reference system this crate understands.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Crs {
    /// Longitude/latitude in degrees, (x, y) = (lon, lat). ETRS89 and WGS84
    /// differ by less than the width of a roof edge and are treated as
    /// coincident here.
    Geographic,
    /// UTM easting/northing in meters on the northern hemisphere.
    Utm { ellipsoid: Ellipsoid, zone: u8 },
}

impl Crs {
    /// Resolves an EPSG code, or fails with [`Error::UnknownCrs`].
    fn from_epsg(epsg: u32) -> Result<Self> {
        match epsg {
            4258 | 4326 => Ok(Crs::Geographic),
            25801..=25860 => Ok(Crs::Utm {
                ellipsoid: GRS80,
                zone: (epsg - 25800) as u8,
            }),
            32601..=32660 => Ok(Crs::Utm {
                ellipsoid: WGS84,
                zone: (epsg - 32600) as u8,
            }),
            _ => Err(Error::UnknownCrs { epsg }),
        }
    }
}

/// The UTM zone of a projected EPSG code, if it has one.
pub fn utm_zone(epsg: u32) -> Option<u8> {
    match Crs::from_epsg(epsg) {
        Ok(Crs::Utm { zone, .. }) => Some(zone),
        _ => None,
    }
}

/// Transforms (x, y, z) from one EPSG code into another.
///
/// z is carried through unchanged; the vertical datum is handled by the
/// geoid correction, not here. The two geographic systems differ by less
/// than the width of a roof edge and are treated as coincident.
pub fn transform(x: f64, y: f64, z: f64, from_epsg: u32, to_epsg: u32) -> Result<(f64, f64, f64)> {
    if from_epsg == to_epsg {
        return Ok((x, y, z));
    }

    let from = Crs::from_epsg(from_epsg)?;
    let to = Crs::from_epsg(to_epsg)?;

    // Pivot through geographic lon/lat.
    let (lon, lat) = match from {
        Crs::Geographic => (x.to_radians(), y.to_radians()),
        Crs::Utm { ellipsoid, zone } => utm_to_geographic(ellipsoid, zone, x, y),
    };

    if !lon.is_finite() || !lat.is_finite() || lat.abs() > std::f64::consts::FRAC_PI_2 {
        return Err(Error::Untransformable {
            x,
            y,
            epsg: to_epsg,
        });
    }

    match to {
        Crs::Geographic => Ok((lon.to_degrees(), lat.to_degrees(), z)),
        Crs::Utm { ellipsoid, zone } => {
            let (e, n) = geographic_to_utm(ellipsoid, zone, lon, lat);
            if !e.is_finite() || !n.is_finite() {
                return Err(Error::Untransformable {
                    x,
                    y,
                    epsg: to_epsg,
                });
            }
            Ok((e, n, z))
        }
    }
}

fn central_meridian(zone: u8) -> f64 {
    (f64::from(zone) * 6.0 - 183.0).to_radians()
}

/// Third flattening and the rectifying radius times the scale factor.
fn series_setup(ellipsoid: Ellipsoid) -> (f64, f64) {
    let n = ellipsoid.f / (2.0 - ellipsoid.f);
    let n2 = n * n;
    let radius =
        ellipsoid.a / (1.0 + n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0 + n2 * n2 * n2 / 256.0);
    (n, radius)
}

fn alpha_coefficients(n: f64) -> [f64; 6] {
    let n2 = n * n;
    let n3 = n2 * n;
    let n4 = n3 * n;
    let n5 = n4 * n;
    let n6 = n5 * n;
    [
        n / 2.0 - 2.0 / 3.0 * n2 + 5.0 / 16.0 * n3 + 41.0 / 180.0 * n4 - 127.0 / 288.0 * n5
            + 7891.0 / 37800.0 * n6,
        13.0 / 48.0 * n2 - 3.0 / 5.0 * n3 + 557.0 / 1440.0 * n4 + 281.0 / 630.0 * n5
            - 1983433.0 / 1935360.0 * n6,
        61.0 / 240.0 * n3 - 103.0 / 140.0 * n4 + 15061.0 / 26880.0 * n5
            + 167603.0 / 181440.0 * n6,
        49561.0 / 161280.0 * n4 - 179.0 / 168.0 * n5 + 6601661.0 / 7257600.0 * n6,
        34729.0 / 80640.0 * n5 - 3418889.0 / 1995840.0 * n6,
        212378941.0 / 319334400.0 * n6,
    ]
}

fn beta_coefficients(n: f64) -> [f64; 6] {
    let n2 = n * n;
    let n3 = n2 * n;
    let n4 = n3 * n;
    let n5 = n4 * n;
    let n6 = n5 * n;
    [
        n / 2.0 - 2.0 / 3.0 * n2 + 37.0 / 96.0 * n3 - 1.0 / 360.0 * n4 - 81.0 / 512.0 * n5
            + 96199.0 / 604800.0 * n6,
        1.0 / 48.0 * n2 + 1.0 / 15.0 * n3 - 437.0 / 1440.0 * n4 + 46.0 / 105.0 * n5
            - 1118711.0 / 3870720.0 * n6,
        17.0 / 480.0 * n3 - 37.0 / 840.0 * n4 - 209.0 / 4480.0 * n5 + 5569.0 / 90720.0 * n6,
        4397.0 / 161280.0 * n4 - 11.0 / 504.0 * n5 - 830251.0 / 7257600.0 * n6,
        4583.0 / 161280.0 * n5 - 108847.0 / 3991680.0 * n6,
        20648693.0 / 638668800.0 * n6,
    ]
}

fn delta_coefficients(n: f64) -> [f64; 6] {
    let n2 = n * n;
    let n3 = n2 * n;
    let n4 = n3 * n;
    let n5 = n4 * n;
    let n6 = n5 * n;
    [
        2.0 * n - 2.0 / 3.0 * n2 - 2.0 * n3 + 116.0 / 45.0 * n4 + 26.0 / 45.0 * n5
            - 2854.0 / 675.0 * n6,
        7.0 / 3.0 * n2 - 8.0 / 5.0 * n3 - 227.0 / 45.0 * n4 + 2704.0 / 315.0 * n5
            + 2323.0 / 945.0 * n6,
        56.0 / 15.0 * n3 - 136.0 / 35.0 * n4 - 1262.0 / 105.0 * n5 + 73814.0 / 2835.0 * n6,
        4279.0 / 630.0 * n4 - 332.0 / 35.0 * n5 - 399572.0 / 14175.0 * n6,
        4174.0 / 315.0 * n5 - 144838.0 / 6237.0 * n6,
        601676.0 / 22275.0 * n6,
    ]
}

fn geographic_to_utm(ellipsoid: Ellipsoid, zone: u8, lon: f64, lat: f64) -> (f64, f64) {
    let (n, radius) = series_setup(ellipsoid);
    let alpha = alpha_coefficients(n);

    let lon_d = lon - central_meridian(zone);

    // Conformal latitude.
    let e = (ellipsoid.f * (2.0 - ellipsoid.f)).sqrt();
    let t = lat.sin().atanh() - e * (e * lat.sin()).atanh();
    let t = t.sinh();

    let xi = t.atan2(lon_d.cos());
    let eta = (lon_d.sin() / t.hypot(lon_d.cos())).asinh();

    let mut xi_sum = xi;
    let mut eta_sum = eta;
    for (j, a) in alpha.iter().enumerate() {
        let k = 2.0 * (j as f64 + 1.0);
        xi_sum += a * (k * xi).sin() * (k * eta).cosh();
        eta_sum += a * (k * xi).cos() * (k * eta).sinh();
    }

    let easting = UTM_FALSE_EASTING + UTM_SCALE * radius * eta_sum;
    let northing = UTM_SCALE * radius * xi_sum;
    (easting, northing)
}

fn utm_to_geographic(ellipsoid: Ellipsoid, zone: u8, easting: f64, northing: f64) -> (f64, f64) {
    let (n, radius) = series_setup(ellipsoid);
    let beta = beta_coefficients(n);
    let delta = delta_coefficients(n);

    let xi = northing / (UTM_SCALE * radius);
    let eta = (easting - UTM_FALSE_EASTING) / (UTM_SCALE * radius);

    let mut xi_p = xi;
    let mut eta_p = eta;
    for (j, b) in beta.iter().enumerate() {
        let k = 2.0 * (j as f64 + 1.0);
        xi_p -= b * (k * xi).sin() * (k * eta).cosh();
        eta_p -= b * (k * xi).cos() * (k * eta).sinh();
    }

    let chi = (xi_p.sin() / eta_p.cosh()).asin();
    let mut lat = chi;
    for (j, d) in delta.iter().enumerate() {
        let k = 2.0 * (j as f64 + 1.0);
        lat += d * (k * chi).sin();
    }

    let lon = central_meridian(zone) + eta_p.sinh().atan2(xi_p.cos());
    (lon, lat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn identity_when_codes_match() {
        let (x, y, z) = transform(364938.4, 5621690.5, 110.0, 25832, 25832).unwrap();
        assert_eq!((x, y, z), (364938.4, 5621690.5, 110.0));
    }

    #[test]
    fn unknown_epsg_is_rejected() {
        assert!(matches!(
            transform(0.0, 0.0, 0.0, 9999, 25832),
            Err(Error::UnknownCrs { epsg: 9999 })
        ));
    }

    #[test]
    fn central_meridian_maps_to_false_easting() {
        // Zone 32 is centered on 9 degrees east.
        let (e, n, _) = transform(9.0, 0.0, 0.0, 4258, 25832).unwrap();
        assert_relative_eq!(e, 500_000.0, epsilon = 1e-6);
        assert_relative_eq!(n, 0.0, epsilon = 1e-6);
    }

    #[rstest]
    #[case(7.0982, 50.7374)] // Bonn
    #[case(6.9603, 50.9375)] // Cologne
    #[case(9.0, 48.0)]
    #[case(11.5, 51.5)]
    fn roundtrip_through_utm(#[case] lon: f64, #[case] lat: f64) {
        let (e, n, _) = transform(lon, lat, 0.0, 4258, 25832).unwrap();
        let (lon2, lat2, _) = transform(e, n, 0.0, 25832, 4258).unwrap();
        assert_relative_eq!(lon, lon2, epsilon = 1e-9);
        assert_relative_eq!(lat, lat2, epsilon = 1e-9);
    }

    #[test]
    fn bonn_lands_in_the_expected_kilometre() {
        // The LoD2 tile grid around Bonn starts at easting 364km.
        let (e, n, _) = transform(7.0982, 50.7374, 0.0, 4326, 25832).unwrap();
        assert!((360_000.0..370_000.0).contains(&e), "easting {e}");
        assert!((5_618_000.0..5_626_000.0).contains(&n), "northing {n}");
    }

    #[test]
    fn z_is_untouched() {
        let (_, _, z) = transform(7.0, 50.0, 123.45, 4258, 25832).unwrap();
        assert_eq!(z, 123.45);
    }

    #[test]
    fn utm_zone_resolution() {
        assert_eq!(utm_zone(25832), Some(32));
        assert_eq!(utm_zone(32601), Some(1));
        assert_eq!(utm_zone(4326), None);
    }
}
