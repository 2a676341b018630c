//! CityGML roof-edge extraction and tile selection.
//!
//! The walk matches on local element names only; CityGML documents in the
//! wild carry a zoo of namespace prefixes (`core:`, `bldg:`, `gml:`, or
//! none) and the structure is unambiguous without them. Anything missing or
//! malformed along the way contributes nothing: a request must still get a
//! best-effort mask out of a partially broken tile.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use roxmltree::{Document, Node};

/// A roof edge as a flat row: start vertex followed by end vertex.
pub type EdgeRow = [f64; 6];

fn children_named<'a, 'i>(
    node: Node<'a, 'i>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'i>> {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

fn first_named<'a, 'i>(node: Node<'a, 'i>, name: &'static str) -> Option<Node<'a, 'i>> {
    children_named(node, name).next()
}

/// Splits a `posList` into consecutive-vertex edge rows.
///
/// Vertices come as a flat whitespace-separated coordinate string in groups
/// of three. Counts not divisible by three, or too short for a single edge,
/// drop the whole ring.
fn ring_rows(pos_list: &str) -> Vec<EdgeRow> {
    let Ok(coords) = pos_list
        .split_whitespace()
        .map(|c| c.parse())
        .collect::<std::result::Result<Vec<f64>, _>>()
    else {
        return Vec::new();
    };

    if coords.len() % 3 != 0 || coords.len() < 6 {
        return Vec::new();
    }

    coords
        .windows(6)
        .step_by(3)
        .map(|w| [w[0], w[1], w[2], w[3], w[4], w[5]])
        .collect()
}

/// Extracts the edge rows of one `surfaceMember`.
fn surface_member_rows(member: Node) -> Vec<EdgeRow> {
    let Some(pos_list) = first_named(member, "Polygon")
        .and_then(|p| first_named(p, "exterior"))
        .and_then(|e| first_named(e, "LinearRing"))
        .and_then(|r| first_named(r, "posList"))
        .and_then(|p| p.text())
    else {
        return Vec::new();
    };
    ring_rows(pos_list)
}

fn lod1_solid_rows(solid: Node) -> Vec<EdgeRow> {
    let Some(composite) = first_named(solid, "Solid")
        .and_then(|s| first_named(s, "exterior"))
        .and_then(|e| first_named(e, "CompositeSurface"))
    else {
        return Vec::new();
    };
    children_named(composite, "surfaceMember")
        .flat_map(surface_member_rows)
        .collect()
}

fn lod2_bounded_rows(building: Node) -> Vec<EdgeRow> {
    let mut rows = Vec::new();
    for bounded in children_named(building, "boundedBy") {
        // RoofSurface, WallSurface, GroundSurface, ... all look alike here.
        for surface in bounded.children().filter(|c| c.is_element()) {
            let Some(multi) = first_named(surface, "lod2MultiSurface")
                .and_then(|m| first_named(m, "MultiSurface"))
            else {
                continue;
            };
            for member in children_named(multi, "surfaceMember") {
                rows.extend(surface_member_rows(member));
            }
        }
    }
    rows
}

fn buildings<'a, 'i>(doc: &'a Document<'i>) -> Vec<Node<'a, 'i>> {
    let root = doc.root_element();
    if root.tag_name().name() != "CityModel" {
        return Vec::new();
    }
    children_named(root, "cityObjectMember")
        .flat_map(|member| children_named(member, "Building"))
        .collect()
}

/// Extracts the roof edges of every LoD1 solid in a CityGML document.
///
/// Handles both a building-level `lod1Solid` and the building-part shape
/// (`consistsOfBuildingPart` → `BuildingPart` → `lod1Solid`).
pub fn parse_lod1(doc: &Document) -> Vec<EdgeRow> {
    let mut rows = Vec::new();
    for building in buildings(doc) {
        for solid in children_named(building, "lod1Solid") {
            rows.extend(lod1_solid_rows(solid));
        }
        for wrapper in children_named(building, "consistsOfBuildingPart") {
            for part in children_named(wrapper, "BuildingPart") {
                for solid in children_named(part, "lod1Solid") {
                    rows.extend(lod1_solid_rows(solid));
                }
            }
        }
    }
    rows
}

/// Extracts the roof edges of every LoD2 surface in a CityGML document.
pub fn parse_lod2(doc: &Document) -> Vec<EdgeRow> {
    let mut rows = Vec::new();
    for building in buildings(doc) {
        rows.extend(lod2_bounded_rows(building));
        for wrapper in children_named(building, "consistsOfBuildingPart") {
            for part in children_named(wrapper, "BuildingPart") {
                rows.extend(lod2_bounded_rows(part));
            }
        }
    }
    rows
}

/// Parses one tile file at the given level of detail.
///
/// A missing or unreadable tile yields no edges: the neighbouring tile of a
/// viewpoint near the dataset boundary routinely does not exist.
pub fn parse_tile(path: &Path, lod: u8) -> Vec<EdgeRow> {
    if path.extension() != Some(std::ffi::OsStr::new("gml")) {
        return Vec::new();
    }
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            warn!("skipping tile {}: {err}", path.display());
            return Vec::new();
        }
    };
    let doc = match Document::parse(&text) {
        Ok(doc) => doc,
        Err(err) => {
            warn!("skipping unparsable tile {}: {err}", path.display());
            return Vec::new();
        }
    };
    let rows = match lod {
        1 => parse_lod1(&doc),
        _ => parse_lod2(&doc),
    };
    debug!("tile {}: {} edge rows", path.display(), rows.len());
    rows
}

/// An ordered, hashable set of tile paths; the cache key for parsed tiles.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GmlFileList {
    files: Vec<PathBuf>,
}

impl GmlFileList {
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// Picks the tile files relevant for a viewpoint.
///
/// Tiles are 1 km × 1 km and named after their lower-left kilometre corner.
/// A viewpoint within `n_range` of a tile border also pulls in the
/// neighbour on that side, so a radius query never runs off the data.
pub fn gml_file_picker(
    data_path: &Path,
    x: f64,
    y: f64,
    utm_zone: u8,
    lod: u8,
    n_range: f64,
) -> GmlFileList {
    let x_km = (x / 1000.0).floor() as i64;
    let y_km = (y / 1000.0).floor() as i64;

    let tile = |xk: i64, yk: i64| {
        data_path.join(format!("LoD{lod}_{utm_zone}_{xk}_{yk}_1_NW.gml"))
    };

    let mut files = vec![tile(x_km, y_km)];
    if x - ((x_km * 1000) as f64) < n_range {
        files.push(tile(x_km - 1, y_km));
    }
    if y - ((y_km * 1000) as f64) < n_range {
        files.push(tile(x_km, y_km - 1));
    }
    if x - (x_km * 1000) as f64 > 1000.0 - n_range {
        files.push(tile(x_km + 1, y_km));
    }
    if y - (y_km * 1000) as f64 > 1000.0 - n_range {
        files.push(tile(x_km, y_km + 1));
    }

    GmlFileList { files }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const LOD1: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<core:CityModel xmlns:core="http://www.opengis.net/citygml/1.0"
                xmlns:bldg="http://www.opengis.net/citygml/building/1.0"
                xmlns:gml="http://www.opengis.net/gml">
  <core:cityObjectMember>
    <bldg:Building>
      <bldg:lod1Solid>
        <gml:Solid>
          <gml:exterior>
            <gml:CompositeSurface>
              <gml:surfaceMember>
                <gml:Polygon>
                  <gml:exterior>
                    <gml:LinearRing>
                      <gml:posList>0 0 10 4 0 10 4 4 10 0 4 10 0 0 10</gml:posList>
                    </gml:LinearRing>
                  </gml:exterior>
                </gml:Polygon>
              </gml:surfaceMember>
            </gml:CompositeSurface>
          </gml:exterior>
        </gml:Solid>
      </bldg:lod1Solid>
    </bldg:Building>
  </core:cityObjectMember>
</core:CityModel>"#;

    const LOD2: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<core:CityModel xmlns:core="http://www.opengis.net/citygml/2.0"
                xmlns:bldg="http://www.opengis.net/citygml/building/2.0"
                xmlns:gml="http://www.opengis.net/gml">
  <core:cityObjectMember>
    <bldg:Building>
      <bldg:boundedBy>
        <bldg:RoofSurface>
          <bldg:lod2MultiSurface>
            <gml:MultiSurface>
              <gml:surfaceMember>
                <gml:Polygon>
                  <gml:exterior>
                    <gml:LinearRing>
                      <gml:posList>1 1 8 3 1 9 3 3 9 1 1 8</gml:posList>
                    </gml:LinearRing>
                  </gml:exterior>
                </gml:Polygon>
              </gml:surfaceMember>
            </gml:MultiSurface>
          </bldg:lod2MultiSurface>
        </bldg:RoofSurface>
      </bldg:boundedBy>
    </bldg:Building>
  </core:cityObjectMember>
</core:CityModel>"#;

    #[test]
    fn lod1_ring_becomes_consecutive_edges() {
        let doc = Document::parse(LOD1).unwrap();
        let rows = parse_lod1(&doc);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], [0.0, 0.0, 10.0, 4.0, 0.0, 10.0]);
        assert_eq!(rows[3], [0.0, 4.0, 10.0, 0.0, 0.0, 10.0]);
    }

    #[test]
    fn lod2_roof_surfaces_are_found() {
        let doc = Document::parse(LOD2).unwrap();
        let rows = parse_lod2(&doc);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], [1.0, 1.0, 8.0, 3.0, 1.0, 9.0]);
    }

    #[test]
    fn lod_mismatch_yields_nothing() {
        let doc = Document::parse(LOD1).unwrap();
        assert!(parse_lod2(&doc).is_empty());
    }

    #[rstest]
    #[case("1 2 3 4 5", 0)] // not divisible by 3
    #[case("1 2 3", 0)] // single vertex
    #[case("1 2 3 4 5 6", 1)]
    #[case("1 2 3 4 5 6 7 8 9", 2)]
    fn ring_row_extraction(#[case] pos_list: &str, #[case] expected: usize) {
        assert_eq!(ring_rows(pos_list).len(), expected);
    }

    #[test]
    fn missing_structure_is_skipped() {
        let doc = Document::parse(
            "<CityModel><cityObjectMember><Building/></cityObjectMember></CityModel>",
        )
        .unwrap();
        assert!(parse_lod1(&doc).is_empty());
        assert!(parse_lod2(&doc).is_empty());
    }

    #[test]
    fn picker_names_the_primary_tile() {
        let list = gml_file_picker(Path::new("tiles"), 364938.0, 5621690.0, 32, 2, 150.0);
        assert_eq!(
            list.files()[0],
            Path::new("tiles").join("LoD2_32_364_5621_1_NW.gml")
        );
    }

    #[test]
    fn picker_adds_neighbours_near_borders() {
        // 40 m east of the western border, 960 m up: west and north neighbours.
        let list = gml_file_picker(Path::new("tiles"), 364040.0, 5621960.0, 32, 1, 150.0);
        let names: Vec<String> = list
            .files()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "LoD1_32_364_5621_1_NW.gml",
                "LoD1_32_363_5621_1_NW.gml",
                "LoD1_32_364_5622_1_NW.gml",
            ]
        );
    }

    #[test]
    fn picker_center_of_tile_is_a_single_file() {
        let list = gml_file_picker(Path::new("tiles"), 364500.0, 5621500.0, 32, 2, 150.0);
        assert_eq!(list.files().len(), 1);
    }
}
