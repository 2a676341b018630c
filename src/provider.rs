//! Edge providers: where building roof edges come from.
//!
//! A provider answers "which edges stand near this position" for the mask
//! engine. The two sources, CityGML tiles on disk and a remote OGC WFS,
//! form a closed sum selected once from configuration. Both memoize on the
//! discretized query position, so nearby requests share their results down
//! to the same allocation.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kdtree::KdTree;
use kdtree::distance::squared_euclidean;
use log::{debug, info};
use lru::LruCache;
use roxmltree::Document;

use crate::coord::{Coord, CoordKey};
use crate::crs;
use crate::edge::Edge;
use crate::error::{Error, Result};
use crate::gml::{self, EdgeRow, GmlFileList};

/// Edge query results memoized per discretized position.
const EDGE_CACHE_ENTRIES: usize = 512;

/// Parsed tile sets kept around between queries.
const TILE_CACHE_ENTRIES: usize = 128;

/// How long a WFS round trip may take before the request fails.
const WFS_TIMEOUT: Duration = Duration::from_secs(10);

/// A source of building edges near a position.
///
/// `pos` must already be in the provider's EPSG; the facade hands it over
/// rounded to the neighbourhood resolution. Returned edges are always in
/// the working CRS: each provider reprojects its rows out of the data CRS
/// the same way the geoid grid is reprojected at load time.
pub enum EdgeProvider {
    Local(LocalEdgeProvider),
    Wfs(WfsEdgeProvider),
}

impl EdgeProvider {
    pub fn get_edges(&self, pos: Coord) -> Result<Arc<Vec<Edge>>> {
        match self {
            EdgeProvider::Local(provider) => provider.get_edges(pos),
            EdgeProvider::Wfs(provider) => provider.get_edges(pos),
        }
    }

    pub fn epsg(&self) -> u32 {
        match self {
            EdgeProvider::Local(provider) => provider.epsg,
            EdgeProvider::Wfs(provider) => provider.epsg,
        }
    }
}

/// The parsed edges of a tile set with a 2-D index over their endpoints.
///
/// The index holds both endpoints of every row (2n points); a hit at point
/// index i belongs to row `i mod n`.
pub struct GmlData {
    rows: Vec<EdgeRow>,
    tree: KdTree<f64, usize, [f64; 2]>,
}

impl GmlData {
    pub fn new(rows: Vec<EdgeRow>) -> Self {
        let rows: Vec<EdgeRow> = rows
            .into_iter()
            .filter(|row| row.iter().all(|c| c.is_finite()))
            .collect();
        let mut tree = KdTree::new(2);
        let n = rows.len();
        for (i, row) in rows.iter().enumerate() {
            let _ = tree.add([row[0], row[1]], i);
            let _ = tree.add([row[3], row[4]], n + i);
        }
        Self { rows, tree }
    }

    /// All edges with an endpoint within `radius` of (x, y), in row order.
    pub fn query_edges(&self, x: f64, y: f64, radius: f64) -> Vec<Edge> {
        if self.rows.is_empty() {
            return Vec::new();
        }
        let Ok(hits) = self.tree.within(&[x, y], radius * radius, &squared_euclidean) else {
            return Vec::new();
        };
        let unique: BTreeSet<usize> = hits
            .into_iter()
            .map(|(_, &point_idx)| point_idx % self.rows.len())
            .collect();
        unique
            .into_iter()
            .map(|idx| Edge::from_row(self.rows[idx]))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Reprojects edges from the CRS of their data source into the working
/// CRS. Heights are carried through unchanged.
fn edges_into_work(edges: Vec<Edge>, from_epsg: u32, work_epsg: u32) -> Result<Vec<Edge>> {
    edges
        .into_iter()
        .map(|edge| {
            let [sx, sy, sz] = edge.start();
            let [ex, ey, ez] = edge.end();
            let (sx, sy, sz) = crs::transform(sx, sy, sz, from_epsg, work_epsg)?;
            let (ex, ey, ez) = crs::transform(ex, ey, ez, from_epsg, work_epsg)?;
            Ok(Edge::new([sx, sy, sz], [ex, ey, ez]))
        })
        .collect()
}

/// Edges from CityGML tiles on the local filesystem.
pub struct LocalEdgeProvider {
    data_path: PathBuf,
    epsg: u32,
    work_epsg: u32,
    lod: u8,
    n_range: f64,
    tile_cache: Mutex<LruCache<GmlFileList, Arc<GmlData>>>,
    edge_cache: Mutex<LruCache<CoordKey, Arc<Vec<Edge>>>>,
}

impl LocalEdgeProvider {
    pub fn new(
        data_path: PathBuf,
        epsg: u32,
        work_epsg: u32,
        lod: u8,
        n_range: f64,
    ) -> Result<Self> {
        let utm_zone = crs::utm_zone(epsg).ok_or(Error::UnknownCrs { epsg })?;
        info!(
            "local edge provider: LoD{lod} tiles in {} (UTM zone {utm_zone})",
            data_path.display()
        );
        Ok(Self {
            data_path,
            epsg,
            work_epsg,
            lod,
            n_range,
            tile_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(TILE_CACHE_ENTRIES).expect("cache capacity is nonzero"),
            )),
            edge_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(EDGE_CACHE_ENTRIES).expect("cache capacity is nonzero"),
            )),
        })
    }

    fn tile_data(&self, files: GmlFileList) -> Arc<GmlData> {
        let mut cache = self.tile_cache.lock().expect("tile cache lock");
        if let Some(data) = cache.get(&files) {
            return Arc::clone(data);
        }
        let mut rows = Vec::new();
        for path in files.files() {
            rows.extend(gml::parse_tile(path, self.lod));
        }
        let data = Arc::new(GmlData::new(rows));
        debug!("parsed {} tile(s) into {} edges", files.files().len(), data.len());
        cache.put(files, Arc::clone(&data));
        data
    }

    pub fn get_edges(&self, pos: Coord) -> Result<Arc<Vec<Edge>>> {
        let key = pos.key();
        if let Some(edges) = self.edge_cache.lock().expect("edge cache lock").get(&key) {
            return Ok(Arc::clone(edges));
        }

        // The zone was checked at construction.
        let zone = crs::utm_zone(self.epsg).expect("provider epsg has a UTM zone");
        let files = gml::gml_file_picker(&self.data_path, pos.x, pos.y, zone, self.lod, self.n_range);
        let data = self.tile_data(files);
        let edges = Arc::new(edges_into_work(
            data.query_edges(pos.x, pos.y, self.n_range),
            self.epsg,
            self.work_epsg,
        )?);
        debug!(
            "{} edge(s) within {} m of ({:.1}, {:.1})",
            edges.len(),
            self.n_range,
            pos.x,
            pos.y
        );
        self.edge_cache
            .lock()
            .expect("edge cache lock")
            .put(key, Arc::clone(&edges));
        Ok(edges)
    }
}

/// Edges fetched from an OGC Web Feature Service as LoD1 CityGML.
pub struct WfsEdgeProvider {
    url: String,
    epsg: u32,
    work_epsg: u32,
    n_range: f64,
    agent: ureq::Agent,
    edge_cache: Mutex<LruCache<CoordKey, Arc<Vec<Edge>>>>,
}

impl WfsEdgeProvider {
    pub fn new(url: String, epsg: u32, work_epsg: u32, n_range: f64) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(WFS_TIMEOUT))
            .build()
            .into();
        info!("WFS edge provider: {url} (EPSG {epsg})");
        Self {
            url,
            epsg,
            work_epsg,
            n_range,
            agent,
            edge_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(EDGE_CACHE_ENTRIES).expect("cache capacity is nonzero"),
            )),
        }
    }

    fn request_url(&self, pos: &Coord) -> String {
        let (min_x, min_y) = (pos.x - self.n_range, pos.y - self.n_range);
        let (max_x, max_y) = (pos.x + self.n_range, pos.y + self.n_range);
        format!(
            "{}?Service=WFS&REQUEST=GetFeature&VERSION=1.1.0&TYPENAME=bldg:Building\
             &BBOX={min_x},{min_y},{max_x},{max_y},urn:ogc:def:crs:EPSG::{}",
            self.url, self.epsg
        )
    }

    pub fn get_edges(&self, pos: Coord) -> Result<Arc<Vec<Edge>>> {
        let key = pos.key();
        if let Some(edges) = self.edge_cache.lock().expect("edge cache lock").get(&key) {
            return Ok(Arc::clone(edges));
        }

        let url = self.request_url(&pos);
        debug!("requesting {url}");
        let mut response = self.agent.get(&url).call().map_err(|err| match err {
            ureq::Error::StatusCode(status) => Error::Upstream { status },
            other => Error::Transport {
                reason: other.to_string(),
            },
        })?;
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| Error::Transport {
                reason: err.to_string(),
            })?;

        let rows = match Document::parse(&body) {
            Ok(doc) => gml::parse_lod1(&doc),
            Err(err) => {
                debug!("unparsable WFS response: {err}");
                Vec::new()
            }
        };
        let edges: Vec<Edge> = rows
            .into_iter()
            .filter(|row| row.iter().all(|c| c.is_finite()))
            .map(Edge::from_row)
            .collect();
        debug!("WFS returned {} edge(s)", edges.len());

        let edges = Arc::new(edges_into_work(edges, self.epsg, self.work_epsg)?);
        self.edge_cache
            .lock()
            .expect("edge cache lock")
            .put(key, Arc::clone(&edges));
        Ok(edges)
    }
}
