//! Portal visibility and lightmap lighting for sector based worlds.
//!
//! A [`World`] is a set of convex sectors joined by portals. Portals may
//! warp space (including mirrors) and tint what passes through them. On top
//! of the frustum traversals through that graph the crate computes static
//! lighting: point lights fill lightmaps directly, and a progressive
//! [`Radiosity`] solver bounces the result between surfaces.

pub mod config;
pub mod coverage;
pub mod demo;
pub mod error;
pub mod frustum;
pub mod light;
pub mod lightmap;
pub mod math;
pub mod portal;
pub mod progress;
pub mod radiosity;
pub mod sector;
pub mod view;
pub mod world;

pub use config::{LighterConfig, QueueKind, RadiosityConfig};
pub use error::WorldError;
pub use frustum::{Frustum, ShadowFrustum, ShadowList};
pub use light::{shine_lights, Attenuation, StaticLight};
pub use lightmap::{Lightmap, RgbLightMap, Texture, TextureMapping};
pub use math::{Plane, Transform};
pub use portal::{Portal, PortalFilter};
pub use progress::{NoProgress, ProgressMeter, ProgressSink};
pub use radiosity::{
    PatchHeap, PatchQueue, RadList, RadPatch, RadTree, Radiosity, RadiosityReport, RadiosityStep, StopReason,
};
pub use view::{DrawStats, DrawnPolygon, FrustumView, PolygonHit, RenderView, TransformManager};
pub use world::{Polygon, PolygonDef, PolygonId, Sector, SectorId, World};
