//! The facade: one call from a raw position to a finished mask.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, Utc};
use log::{info, warn};
use lru::LruCache;

use crate::config::{Config, EdgeSource};
use crate::coord::{Coord, CoordKey};
use crate::error::{Error, Result};
use crate::geoid::Geoid;
use crate::oaem::{Oaem, oaem_from_edges};
use crate::provider::{EdgeProvider, LocalEdgeProvider, WfsEdgeProvider};
use crate::sun::SunTrack;

/// Finished masks memoized per discretized request position.
const MASK_CACHE_ENTRIES: usize = 16384;

/// A computed mask and whether the viewpoint was inside the area of
/// operation. Outside, the mask is the free horizon.
#[derive(Clone)]
pub struct MaskResult {
    pub oaem: Arc<Oaem>,
    pub within_area: bool,
}

/// Whether the sun currently clears the mask, and when that last changed
/// or will change next.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SunVisibility {
    pub visible: bool,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// An area-of-operation polygon in the working CRS.
///
/// Loaded from a plain-text file of whitespace-separated `x y` vertices,
/// one per line, in ring order (closing edge implied).
pub struct Area {
    vertices: Vec<(f64, f64)>,
}

impl Area {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut vertices = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut columns = line.split_whitespace().map(str::parse::<f64>);
            let (Some(Ok(x)), Some(Ok(y)), None) = (columns.next(), columns.next(), columns.next())
            else {
                return Err(Error::config(format!(
                    "area file {}: bad vertex on line {}",
                    path.display(),
                    idx + 1
                )));
            };
            vertices.push((x, y));
        }
        if vertices.len() < 3 {
            return Err(Error::config(format!(
                "area file {} has fewer than three vertices",
                path.display()
            )));
        }
        Ok(Self { vertices })
    }

    pub fn from_vertices(vertices: Vec<(f64, f64)>) -> Self {
        Self { vertices }
    }

    /// Even-odd ray casting against the polygon ring.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let mut inside = false;
        let n = self.vertices.len();
        for i in 0..n {
            let (xi, yi) = self.vertices[i];
            let (xj, yj) = self.vertices[(i + n - 1) % n];
            if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi) {
                inside = !inside;
            }
        }
        inside
    }
}

/// Process-wide entry point composing geoid correction, edge retrieval,
/// and the mask engine. Built once at startup and shared across requests;
/// every piece of mutable state behind it is lock-protected.
pub struct OaemService {
    work_epsg: u32,
    oaem_res: f64,
    n_res: f64,
    geoid_res: f64,
    geoid: Geoid,
    provider: EdgeProvider,
    area: Option<Area>,
    mask_cache: Mutex<LruCache<CoordKey, MaskResult>>,
}

impl OaemService {
    /// Builds the service from configuration: geoid grid, edge provider,
    /// and optional area of operation. Fails fast on anything malformed.
    pub fn from_config(config: &Config) -> Result<Self> {
        let geoid = match &config.geoid_file {
            Some(path) => Geoid::from_file(
                path,
                config.geoid_epsg,
                config.geoid_interpolation,
                config.work_epsg,
            )?,
            None => Geoid::zero(),
        };
        let provider = match config.edge_source {
            EdgeSource::File => EdgeProvider::Local(LocalEdgeProvider::new(
                config.edge_data_path.clone(),
                config.edge_epsg,
                config.work_epsg,
                config.edge_lod,
                config.n_range,
            )?),
            EdgeSource::Wfs => EdgeProvider::Wfs(WfsEdgeProvider::new(
                config.wfs_url.clone(),
                config.wfs_epsg,
                config.work_epsg,
                config.n_range,
            )),
        };
        let area = match &config.area_file {
            Some(path) => Some(Area::from_file(path)?),
            None => None,
        };
        Ok(Self::assemble(config, geoid, provider, area))
    }

    /// Wires a service from parts; lets tests swap in synthetic geoids,
    /// providers, and areas.
    pub fn assemble(
        config: &Config,
        geoid: Geoid,
        provider: EdgeProvider,
        area: Option<Area>,
    ) -> Self {
        Self {
            work_epsg: config.work_epsg,
            oaem_res: config.oaem_res,
            n_res: config.n_res,
            geoid_res: config.geoid_res,
            geoid,
            provider,
            area,
            mask_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(MASK_CACHE_ENTRIES).expect("cache capacity is nonzero"),
            )),
        }
    }

    pub fn provider(&self) -> &EdgeProvider {
        &self.provider
    }

    /// Computes the mask for a raw request position.
    ///
    /// The pipeline: reproject into the working CRS, check the area of
    /// operation, correct the height to orthometric, fetch the nearby
    /// edges, sweep. Results are memoized on the position discretized to
    /// the neighbourhood resolution, so a receiver drifting a few meters
    /// keeps hitting the same entry.
    pub fn compute_oaem(&self, x: f64, y: f64, z: f64, epsg: u32) -> Result<MaskResult> {
        let pos = Coord::new(x, y, z, epsg).to_epsg(self.work_epsg)?;

        let key = pos.round_to(self.n_res).key();
        if let Some(result) = self.mask_cache.lock().expect("mask cache lock").get(&key) {
            return Ok(result.clone());
        }

        if let Some(area) = &self.area {
            if !area.contains(pos.x, pos.y) {
                warn!(
                    "position [{:.3}, {:.3}] is outside the area of operation",
                    pos.x, pos.y
                );
                return Ok(MaskResult {
                    oaem: Arc::new(Oaem::zero(self.oaem_res)),
                    within_area: false,
                });
            }
        }

        let undulation = self.geoid.interpolate(pos.round_to(self.geoid_res));
        let undulation = if undulation.is_nan() { 0.0 } else { undulation };
        let mut pos = pos;
        pos.z -= undulation;
        info!(
            "computing mask for [{:.3}, {:.3}, {:.3}] (EPSG {}, N = {undulation:.3})",
            pos.x, pos.y, pos.z, pos.epsg
        );

        // The provider is queried in its own CRS but answers with edges
        // already reprojected into the working CRS.
        let query_pos = pos.to_epsg(self.provider.epsg())?.round_to(self.n_res);
        let edges = self.provider.get_edges(query_pos)?;
        let oaem = Arc::new(oaem_from_edges(&edges, pos, self.oaem_res));

        let result = MaskResult {
            oaem,
            within_area: true,
        };
        self.mask_cache
            .lock()
            .expect("mask cache lock")
            .put(key, result.clone());
        Ok(result)
    }

    /// Computes the mask for a position and intersects it with the day's
    /// solar track: is the sun visible at `now`, since when, and until
    /// when.
    pub fn sun_visibility(
        &self,
        x: f64,
        y: f64,
        z: f64,
        epsg: u32,
        now: DateTime<Utc>,
    ) -> Result<SunVisibility> {
        let mask = self.compute_oaem(x, y, z, epsg)?;
        let mut sun = SunTrack::new(Coord::new(x, y, z, epsg))?;
        sun.intersect_with_oaem(&mask.oaem, now.with_timezone(&Local).date_naive());
        Ok(SunVisibility {
            visible: sun.visible_at(&mask.oaem, now),
            since: sun.since(now),
            until: sun.until(now),
        })
    }
}
