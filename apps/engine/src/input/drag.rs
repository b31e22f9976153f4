use geo::{Contains, LineString, Point, Polygon};

use crate::domain::LatLng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragOutcome {
    Accepted(LatLng),
    /// The step landed on a blocker; the feature goes back to its last
    /// accepted position
    Rejected { revert_to: LatLng },
}

fn ring(points: &[LatLng]) -> LineString<f64> {
    points.iter().map(|point| (point.lng, point.lat)).collect()
}

/// Planar polygon over longitude/latitude. The first ring is the exterior and
/// every later ring a hole, as in GeoJSON.
pub fn polygon(rings: &[Vec<LatLng>]) -> Option<Polygon<f64>> {
    let (exterior, holes) = rings.split_first()?;
    Some(Polygon::new(
        ring(exterior),
        holes.iter().map(|hole| ring(hole)).collect(),
    ))
}

/// A world mask (world ring first, allowed areas as holes) contains every
/// point outside those areas. Points on an edge are not contained.
pub fn point_in_polygon(point: LatLng, rings: &[Vec<LatLng>]) -> bool {
    polygon(rings).is_some_and(|polygon| polygon.contains(&Point::new(point.lng, point.lat)))
}

/// Checks one drag step from the last accepted position `from` to `to`
/// against every blocker polygon.
pub fn step<'a, I>(from: LatLng, to: LatLng, blockers: I) -> DragOutcome
where
    I: IntoIterator<Item = &'a [Vec<LatLng>]>,
{
    let clashing = blockers
        .into_iter()
        .any(|rings| point_in_polygon(to, rings));

    if clashing {
        DragOutcome::Rejected { revert_to: from }
    } else {
        DragOutcome::Accepted(to)
    }
}
