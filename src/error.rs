use thiserror::Error;

use crate::world::{PolygonId, SectorId};

/// Errors raised while assembling a world.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorldError {
    #[error("polygon needs at least three vertices, got {count}")]
    TooFewVertices { count: usize },
    #[error("polygon vertices are collinear or coincident")]
    DegeneratePolygon,
    #[error("unknown sector {0:?}")]
    UnknownSector(SectorId),
    #[error("unknown polygon {0:?}")]
    UnknownPolygon(PolygonId),
    #[error("lightmap has {actual} lumels, expected {expected}")]
    LightmapMismatch { expected: usize, actual: usize },
    #[error("texture has {actual} texels, expected {expected}")]
    TextureMismatch { expected: usize, actual: usize },
    #[error("polygon {0:?} is not a portal")]
    NotAPortal(PolygonId),
}
