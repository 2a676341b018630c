use std::path::PathBuf;
use std::sync::Arc;

use oaem::coord::Coord;
use oaem::provider::LocalEdgeProvider;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn provider() -> LocalEdgeProvider {
    LocalEdgeProvider::new(fixture_path("tiles"), 25832, 25832, 1, 150.0).unwrap()
}

#[test]
fn tile_building_is_found_from_nearby() {
    let provider = provider();
    let edges = provider
        .get_edges(Coord::new(500.0, 450.0, 0.0, 25832).round_to(50.0))
        .unwrap();
    // The square roof ring closes on itself: four edges.
    assert_eq!(edges.len(), 4);
}

#[test]
fn out_of_range_positions_see_nothing() {
    let provider = provider();
    let edges = provider
        .get_edges(Coord::new(100.0, 100.0, 0.0, 25832).round_to(50.0))
        .unwrap();
    assert!(edges.is_empty());
}

#[test]
fn nearby_requests_share_the_cached_edge_list() {
    let provider = provider();
    let res = 50.0;
    let first = provider
        .get_edges(Coord::new(500.0, 450.0, 0.0, 25832).round_to(res))
        .unwrap();
    // Less than half a cell away: discretizes onto the same key.
    let second = provider
        .get_edges(Coord::new(510.0, 460.0, 4.0, 25832).round_to(res))
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn tile_edges_come_back_in_the_working_crs() {
    // Tile data declared in zone 33, working CRS in zone 32: every endpoint
    // must be reprojected before the engine sees it.
    let provider = LocalEdgeProvider::new(fixture_path("tiles"), 25833, 25832, 1, 150.0).unwrap();
    let edges = provider
        .get_edges(Coord::new(500.0, 450.0, 0.0, 25833).round_to(50.0))
        .unwrap();
    assert_eq!(edges.len(), 4);

    let (sx, sy, sz) = oaem::crs::transform(490.0, 490.0, 30.0, 25833, 25832).unwrap();
    assert!(
        edges.iter().any(|e| {
            let s = e.start();
            (s[0] - sx).abs() < 1e-9 && (s[1] - sy).abs() < 1e-9 && s[2] == sz
        }),
        "no edge start matches the reprojected tile corner"
    );
    // Roof heights are untouched by the reprojection.
    assert!(edges.iter().all(|e| e.start()[2] == 30.0 && e.end()[2] == 30.0));
}

#[test]
fn missing_neighbour_tiles_do_not_fail_the_query() {
    let provider = provider();
    // 60 m from the western tile border: the picker adds a tile that does
    // not exist on disk.
    let edges = provider
        .get_edges(Coord::new(60.0, 500.0, 0.0, 25832).round_to(50.0))
        .unwrap();
    assert!(edges.is_empty());
}
