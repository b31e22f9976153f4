// Recompute pipeline run by every update: visibility first, then routing

pub mod render;
pub mod visibility;

pub use render::{route, Bucket, HeatLayer, HeatSample, RenderPlan, RouteSettings};
pub use visibility::{resolve, DerivedFields, Visibility};
