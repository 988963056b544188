//! Feature geometry.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by [`Geometry::validate`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    /// A coordinate was NaN or infinite.
    #[error("non-finite coordinate at position {0}")]
    NonFiniteCoordinate(usize),

    /// A line string had fewer than two positions.
    #[error("line string requires at least 2 positions, got {0}")]
    ShortLineString(usize),

    /// A polygon ring had fewer than four positions.
    #[error("polygon ring {ring} requires at least 4 positions, got {len}")]
    ShortRing {
        /// Ring index within the polygon.
        ring: usize,
        /// Number of positions in the ring.
        len: usize,
    },

    /// A polygon ring did not close on its first position.
    #[error("polygon ring {0} is not closed")]
    UnclosedRing(usize),

    /// A polygon had no rings at all.
    #[error("polygon requires at least one ring")]
    EmptyPolygon,
}

/// A longitude/latitude position.
pub type Position = [f64; 2];

/// Geometry of a feature, shaped like its GeoJSON wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    /// A single position.
    Point {
        /// The position.
        coordinates: Position,
    },
    /// An ordered sequence of two or more positions.
    LineString {
        /// The positions.
        coordinates: Vec<Position>,
    },
    /// One exterior ring plus optional interior rings, each closed.
    Polygon {
        /// The rings.
        coordinates: Vec<Vec<Position>>,
    },
}

impl Geometry {
    /// Creates a point geometry.
    #[must_use]
    pub fn point(lng: f64, lat: f64) -> Self {
        Geometry::Point {
            coordinates: [lng, lat],
        }
    }

    /// Checks structural validity.
    ///
    /// Invalid geometry is rejected at the mutation boundary so a
    /// document never holds a malformed record.
    pub fn validate(&self) -> Result<(), GeometryError> {
        match self {
            Geometry::Point { coordinates } => check_position(0, coordinates),
            Geometry::LineString { coordinates } => {
                if coordinates.len() < 2 {
                    return Err(GeometryError::ShortLineString(coordinates.len()));
                }
                for (i, pos) in coordinates.iter().enumerate() {
                    check_position(i, pos)?;
                }
                Ok(())
            }
            Geometry::Polygon { coordinates } => {
                if coordinates.is_empty() {
                    return Err(GeometryError::EmptyPolygon);
                }
                for (ring_idx, ring) in coordinates.iter().enumerate() {
                    if ring.len() < 4 {
                        return Err(GeometryError::ShortRing {
                            ring: ring_idx,
                            len: ring.len(),
                        });
                    }
                    if ring.first() != ring.last() {
                        return Err(GeometryError::UnclosedRing(ring_idx));
                    }
                    for (i, pos) in ring.iter().enumerate() {
                        check_position(i, pos)?;
                    }
                }
                Ok(())
            }
        }
    }
}

fn check_position(index: usize, pos: &Position) -> Result<(), GeometryError> {
    if pos.iter().all(|c| c.is_finite()) {
        Ok(())
    } else {
        Err(GeometryError::NonFiniteCoordinate(index))
    }
}
