//! Runtime configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::geoid::Interpolation;
use crate::oaem::DEFAULT_RES;

/// Where building edges come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeSource {
    /// CityGML tiles on the local filesystem.
    File,
    /// A remote OGC Web Feature Service.
    Wfs,
}

impl FromStr for EdgeSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FILE" => Ok(EdgeSource::File),
            "WFS" => Ok(EdgeSource::Wfs),
            other => Err(Error::config(format!("unknown edge source '{other}'"))),
        }
    }
}

/// Service configuration.
///
/// Every field has a deployment default; [`Config::from_env`] overrides
/// from `OAEM_*` environment variables and rejects values it cannot parse.
#[derive(Clone, Debug)]
pub struct Config {
    /// Projected CRS all mask computation happens in.
    pub work_epsg: u32,
    /// Azimuth grid resolution in radians.
    pub oaem_res: f64,
    /// Neighbourhood radius for edge queries, meters.
    pub n_range: f64,
    /// Discretization of edge-provider queries, meters.
    pub n_res: f64,
    /// Discretization of geoid queries, meters.
    pub geoid_res: f64,
    /// CRS of the geoid grid file.
    pub geoid_epsg: u32,
    /// Geoid grid file; without one, heights are used as-is.
    pub geoid_file: Option<PathBuf>,
    pub geoid_interpolation: Interpolation,
    pub edge_source: EdgeSource,
    /// Tile directory for [`EdgeSource::File`].
    pub edge_data_path: PathBuf,
    /// CityGML level of detail of the tile data, 1 or 2.
    pub edge_lod: u8,
    /// CRS of the tile data.
    pub edge_epsg: u32,
    pub wfs_url: String,
    pub wfs_epsg: u32,
    /// Area-of-operation polygon vertices; requests outside get an empty mask.
    pub area_file: Option<PathBuf>,
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_epsg: 25832,
            oaem_res: DEFAULT_RES,
            n_range: 150.0,
            n_res: 50.0,
            geoid_res: 100.0,
            geoid_epsg: 4258,
            geoid_file: None,
            geoid_interpolation: Interpolation::Linear,
            edge_source: EdgeSource::File,
            edge_data_path: PathBuf::from("./gmldata"),
            edge_lod: 2,
            edge_epsg: 25832,
            wfs_url: "https://www.wfs.nrw.de/geobasis/wfs_nw_3d-gebaeudemodell_lod1".into(),
            wfs_epsg: 25832,
            area_file: None,
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

impl Config {
    /// Reads the configuration, falling back to defaults for unset
    /// variables and failing on unparsable ones.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        read_parsed("OAEM_WORK_EPSG", &mut config.work_epsg)?;
        if let Some(deg) = read_optional::<f64>("OAEM_RES_DEG")? {
            if deg < 1.0 {
                return Err(Error::config("OAEM_RES_DEG below one degree"));
            }
            config.oaem_res = deg.to_radians();
        }
        read_parsed("OAEM_N_RANGE", &mut config.n_range)?;
        read_parsed("OAEM_N_RES", &mut config.n_res)?;
        read_parsed("OAEM_GEOID_RES", &mut config.geoid_res)?;
        read_parsed("OAEM_GEOID_EPSG", &mut config.geoid_epsg)?;
        config.geoid_file = env::var("OAEM_GEOID_FILE").ok().map(PathBuf::from);
        if let Some(interp) = read_optional("OAEM_GEOID_INTERPOLATION")? {
            config.geoid_interpolation = interp;
        }
        if let Some(source) = read_optional("OAEM_EDGE_SOURCE")? {
            config.edge_source = source;
        }
        if let Ok(path) = env::var("OAEM_EDGE_DATA_PATH") {
            config.edge_data_path = PathBuf::from(path);
        }
        read_parsed("OAEM_EDGE_LOD", &mut config.edge_lod)?;
        if !matches!(config.edge_lod, 1 | 2) {
            return Err(Error::config("OAEM_EDGE_LOD must be 1 or 2"));
        }
        read_parsed("OAEM_EDGE_EPSG", &mut config.edge_epsg)?;
        if let Ok(url) = env::var("OAEM_WFS_URL") {
            config.wfs_url = url;
        }
        read_parsed("OAEM_WFS_EPSG", &mut config.wfs_epsg)?;
        config.area_file = env::var("OAEM_AREA_FILE").ok().map(PathBuf::from);
        if let Ok(host) = env::var("OAEM_HOST") {
            config.host = host;
        }
        read_parsed("OAEM_PORT", &mut config.port)?;
        Ok(config)
    }
}

fn read_optional<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|err| Error::config(format!("{name}: {err}"))),
        Err(_) => Ok(None),
    }
}

fn read_parsed<T: FromStr>(name: &str, slot: &mut T) -> Result<()>
where
    T::Err: std::fmt::Display,
{
    if let Some(value) = read_optional(name)? {
        *slot = value;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_nrw_deployment() {
        let config = Config::default();
        assert_eq!(config.work_epsg, 25832);
        assert_eq!(config.edge_source, EdgeSource::File);
        assert!((config.oaem_res - 1f64.to_radians()).abs() < 1e-12);
        assert_eq!(config.n_range, 150.0);
    }

    #[test]
    fn edge_source_tags_parse() {
        assert_eq!("wfs".parse::<EdgeSource>().unwrap(), EdgeSource::Wfs);
        assert_eq!("FILE".parse::<EdgeSource>().unwrap(), EdgeSource::File);
        assert!("database".parse::<EdgeSource>().is_err());
    }
}
