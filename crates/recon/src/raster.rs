//! Bucket-grid index over lat/lon positions.
//!
//! Positions are bucketed by their offset into the raster extent divided by
//! the cell size. A range query returns every entry of every cell the box
//! touches: a superset of the exact answer. Callers refine by distance.
//!
//! Only occupied cells are stored, so memory follows the number of entries
//! rather than the size of the extent.

use std::collections::HashMap;

use crate::model::{BoundingBox, LatLon};

/// (row, column)
type CellKey = (usize, usize);

pub struct LatLonRaster<T> {
    extent: BoundingBox,
    cell_size: f64,
    cols: usize,
    rows: usize,
    cells: HashMap<CellKey, Vec<(LatLon, T)>>,
    len: usize,
}

impl<T> LatLonRaster<T> {
    /// Create an empty raster. `cell_size` is in degrees and must be positive;
    /// the extent must be non-empty (both are checked by config validation).
    pub fn new(extent: BoundingBox, cell_size: f64) -> Self {
        let cols = axis_cells(extent.max_lon - extent.min_lon, cell_size);
        let rows = axis_cells(extent.max_lat - extent.min_lat, cell_size);
        Self {
            extent,
            cell_size,
            cols,
            rows,
            cells: HashMap::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store `payload` at `position`. Equal positions are kept side by side.
    ///
    /// Positions outside the extent land in the nearest border cell, so they
    /// are still found by any query whose box contains them.
    pub fn insert(&mut self, position: LatLon, payload: T) {
        let key = (self.row_of(position.lat), self.col_of(position.lon));
        self.cells.entry(key).or_default().push((position, payload));
        self.len += 1;
    }

    /// All entries in cells overlapping `bbox`, in row-major cell order.
    pub fn query<'a>(&'a self, bbox: &BoundingBox) -> impl Iterator<Item = (LatLon, &'a T)> + 'a {
        let (x0, x1) = (self.col_of(bbox.min_lon), self.col_of(bbox.max_lon));
        let (y0, y1) = (self.row_of(bbox.min_lat), self.row_of(bbox.max_lat));

        // Walk the covered cells, or the occupied ones when there are fewer.
        let covered = (x1.saturating_sub(x0) + 1).saturating_mul(y1.saturating_sub(y0) + 1);
        let keys: Vec<CellKey> = if covered <= self.cells.len() {
            (y0..=y1).flat_map(|y| (x0..=x1).map(move |x| (y, x))).collect()
        } else {
            let mut keys: Vec<CellKey> = self
                .cells
                .keys()
                .filter(|(y, x)| (y0..=y1).contains(y) && (x0..=x1).contains(x))
                .copied()
                .collect();
            keys.sort_unstable();
            keys
        };

        keys.into_iter()
            .filter_map(move |key| self.cells.get(&key))
            .flat_map(|entries| entries.iter().map(|(p, t)| (*p, t)))
    }

    fn col_of(&self, lon: f64) -> usize {
        cell_index(lon - self.extent.min_lon, self.cell_size, self.cols)
    }

    fn row_of(&self, lat: f64) -> usize {
        cell_index(lat - self.extent.min_lat, self.cell_size, self.rows)
    }
}

fn axis_cells(span: f64, cell_size: f64) -> usize {
    let n = (span / cell_size).ceil();
    if n.is_finite() && n >= 1.0 {
        n as usize
    } else {
        1
    }
}

fn cell_index(offset: f64, cell_size: f64, count: usize) -> usize {
    let i = (offset / cell_size).floor();
    if i.is_nan() || i < 0.0 {
        0
    } else {
        (i as usize).min(count - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn muenster() -> BoundingBox {
        BoundingBox {
            min_lat: 51.866528062297945,
            min_lon: 7.333374023437501,
            max_lat: 52.05523498618564,
            max_lon: 7.872390747070313,
        }
    }

    #[test]
    fn empty_raster_returns_nothing() {
        let raster: LatLonRaster<usize> = LatLonRaster::new(muenster(), 0.0005);
        assert!(raster.is_empty());
        let hits: Vec<_> = raster.query(&muenster()).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn finds_inserted_point_in_small_box() {
        let mut raster = LatLonRaster::new(muenster(), 0.0005);
        let p = LatLon::new(51.9607, 7.6261);
        raster.insert(p, 7usize);
        raster.insert(LatLon::new(51.90, 7.40), 8usize);

        let hits: Vec<_> = raster.query(&p.enclosing_bbox(3.0)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(*hits[0].1, 7);
        assert_eq!(hits[0].0, p);
    }

    #[test]
    fn identical_positions_are_not_collapsed() {
        let mut raster = LatLonRaster::new(muenster(), 0.0005);
        let p = LatLon::new(51.95, 7.60);
        raster.insert(p, "a");
        raster.insert(p, "b");
        assert_eq!(raster.len(), 2);

        let mut hits: Vec<_> = raster.query(&p.enclosing_bbox(1.0)).map(|(_, t)| *t).collect();
        hits.sort();
        assert_eq!(hits, vec!["a", "b"]);
    }

    #[test]
    fn points_outside_extent_are_still_found() {
        let mut raster = LatLonRaster::new(muenster(), 0.0005);
        let outside = LatLon::new(52.2, 8.1);
        raster.insert(outside, 1u8);
        let hits: Vec<_> = raster.query(&outside.enclosing_bbox(5.0)).collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn query_spanning_cells_returns_superset() {
        let mut raster = LatLonRaster::new(muenster(), 0.001);
        let center = LatLon::new(51.95, 7.60);
        // One point per neighbouring cell around the center.
        for dy in -1..=1 {
            for dx in -1..=1 {
                let p = LatLon::new(center.lat + dy as f64 * 0.001, center.lon + dx as f64 * 0.001);
                raster.insert(p, (dx, dy));
            }
        }
        let bbox = BoundingBox {
            min_lat: center.lat - 0.0011,
            min_lon: center.lon - 0.0011,
            max_lat: center.lat + 0.0011,
            max_lon: center.lon + 0.0011,
        };
        assert_eq!(raster.query(&bbox).count(), 9);
    }

    #[test]
    fn world_extent_with_fine_cells_stays_small() {
        let world = BoundingBox {
            min_lat: -90.0,
            min_lon: -180.0,
            max_lat: 90.0,
            max_lon: 180.0,
        };
        let mut raster = LatLonRaster::new(world, 0.0005);
        let p = LatLon::new(51.9607, 7.6261);
        raster.insert(p, 1u8);
        raster.insert(LatLon::new(-33.86, 151.21), 2u8);
        assert_eq!(raster.cells.len(), 2);

        let near: Vec<_> = raster.query(&p.enclosing_bbox(5.0)).map(|(_, t)| *t).collect();
        assert_eq!(near, vec![1]);
        let all: Vec<_> = raster.query(&world).map(|(_, t)| *t).collect();
        assert_eq!(all.len(), 2);
    }

    fn config() -> ProptestConfig {
        ProptestConfig {
            cases: std::env::var("PROPTEST_CASES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(256),
            failure_persistence: None,
            ..ProptestConfig::default()
        }
    }

    proptest! {
        #![proptest_config(config())]
        #[test]
        fn query_never_misses_contained_points(
            points in proptest::collection::vec((51.8..52.1f64, 7.3..7.9f64), 1..60),
            center in (51.85..52.07f64, 7.32..7.89f64),
            radius in 0.5..200.0f64,
            cell in 0.0001..0.01f64,
        ) {
            let mut raster = LatLonRaster::new(muenster(), cell);
            for (i, (lat, lon)) in points.iter().enumerate() {
                raster.insert(LatLon::new(*lat, *lon), i);
            }
            let center = LatLon::new(center.0, center.1);
            let bbox = center.enclosing_bbox(radius);
            let found: std::collections::HashSet<usize> =
                raster.query(&bbox).map(|(_, i)| *i).collect();

            for (i, (lat, lon)) in points.iter().enumerate() {
                let p = LatLon::new(*lat, *lon);
                if bbox.contains(&p) {
                    prop_assert!(found.contains(&i), "point {i} in box but not returned");
                }
                if center.distance_to(&p) < radius {
                    prop_assert!(found.contains(&i), "point {i} within radius but not returned");
                }
            }
        }
    }
}
