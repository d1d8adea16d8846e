//! Spatial index over province bounding boxes.

use geo::{Intersects, Rect};
use rstar::{RTree, RTreeObject, AABB};
use std::sync::Arc;
use tracing::info;

use crate::models::{AdministrativeRegion, Coordinates};

/// R-tree entry for one region box.
#[derive(Clone)]
pub struct IndexedRegion {
    pub region: Arc<AdministrativeRegion>,
    rect: Rect<f64>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedRegion {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl IndexedRegion {
    pub fn new(region: AdministrativeRegion) -> Self {
        let bbox = region.bbox;
        Self {
            rect: bbox.to_rect(),
            region: Arc::new(region),
            envelope: AABB::from_corners([bbox.min_lon, bbox.min_lat], [bbox.max_lon, bbox.max_lat]),
        }
    }
}

/// Reverse lookup: which provinces' boxes contain a point.
pub struct RegionIndex {
    tree: RTree<IndexedRegion>,
}

impl RegionIndex {
    pub fn build(regions: impl IntoIterator<Item = AdministrativeRegion>) -> Self {
        let indexed: Vec<IndexedRegion> = regions.into_iter().map(IndexedRegion::new).collect();

        // Build R-tree
        let tree = RTree::bulk_load(indexed);
        info!("Region index built with {} entries", tree.size());
        Self { tree }
    }

    /// All regions whose box contains `coords` (inclusive), ordered by name.
    pub fn lookup(&self, coords: Coordinates) -> Vec<Arc<AdministrativeRegion>> {
        let query_envelope = AABB::from_point([coords.lon, coords.lat]);
        let point = coords.to_point();

        let mut found: Vec<Arc<AdministrativeRegion>> = self
            .tree
            .locate_in_envelope_intersecting(&query_envelope)
            // Envelope hit, then the inclusive box test
            .filter(|ir| ir.rect.intersects(&point))
            .map(|ir| Arc::clone(&ir.region))
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ReferenceData;

    fn index() -> RegionIndex {
        let data = ReferenceData::embedded().unwrap();
        RegionIndex::build(data.regions().to_vec())
    }

    fn names(found: &[Arc<AdministrativeRegion>]) -> Vec<&str> {
        found.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_empty_index() {
        let index = RegionIndex::build(Vec::new());
        assert!(index.is_empty());
        assert!(index.lookup(Coordinates::new(52.0, 19.0)).is_empty());
    }

    #[test]
    fn test_single_region() {
        let index = index();
        assert_eq!(index.len(), 16);
        assert_eq!(
            names(&index.lookup(Coordinates::new(52.5, 21.0))),
            vec!["mazowieckie"]
        );
    }

    #[test]
    fn test_overlapping_boxes() {
        let index = index();
        let found = index.lookup(Coordinates::new(51.58, 21.55));
        assert_eq!(names(&found), vec!["lubelskie", "mazowieckie"]);
    }

    #[test]
    fn test_outside_country() {
        let index = index();
        assert!(index.lookup(Coordinates::new(48.0, 10.0)).is_empty());
    }

    #[test]
    fn test_box_edges_are_inclusive() {
        let index = index();
        let found = index.lookup(Coordinates::new(51.8, 16.0));
        assert!(names(&found).contains(&"dolnośląskie"));
    }
}
