use serde::{Deserialize, Serialize};

/// A single map coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// The unweighted mean of a set of coordinates.
    ///
    /// Returns `None` for an empty slice. This is a vertex average, not an area centroid, which is
    /// all the metric lookup needs for small hand-drawn polygons.
    pub fn mean(points: &[LatLng]) -> Option<LatLng> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let (lat_sum, lng_sum) = points
            .iter()
            .fold((0.0, 0.0), |(lat, lng), p| (lat + p.lat, lng + p.lng));
        Some(LatLng::new(lat_sum / n, lng_sum / n))
    }
}

/// Coordinate extrema of a region's vertices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    /// Computes the box enclosing `points`. An empty slice yields the inverted world box
    /// (`north = -90`, `south = 90`, ...).
    pub fn from_points(points: &[LatLng]) -> Self {
        points.iter().fold(
            BoundingBox {
                north: -90.0,
                south: 90.0,
                east: -180.0,
                west: 180.0,
            },
            |bbox, p| BoundingBox {
                north: bbox.north.max(p.lat),
                south: bbox.south.min(p.lat),
                east: bbox.east.max(p.lng),
                west: bbox.west.min(p.lng),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<LatLng> {
        vec![
            LatLng::new(22.0, 88.0),
            LatLng::new(22.0, 89.0),
            LatLng::new(23.0, 89.0),
            LatLng::new(23.0, 88.0),
        ]
    }

    #[test]
    fn mean_is_vertex_average() {
        let c = LatLng::mean(&square()).unwrap();
        assert!((c.lat - 22.5).abs() < 1e-12);
        assert!((c.lng - 88.5).abs() < 1e-12);
        assert!(LatLng::mean(&[]).is_none());
    }

    #[test]
    fn bounding_box_uses_extrema() {
        let bbox = BoundingBox::from_points(&square());
        assert_eq!(bbox.north, 23.0);
        assert_eq!(bbox.south, 22.0);
        assert_eq!(bbox.east, 89.0);
        assert_eq!(bbox.west, 88.0);
    }
}
