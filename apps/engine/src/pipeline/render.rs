use serde::Serialize;
use tracing::debug;

use crate::config::HeatmapSettings;
use crate::domain::{Purpose, Style};
use crate::pipeline::visibility::Visibility;
use crate::state::{FeatureKey, FeatureStore};
use crate::surface::Surface;

/// Rendering group a visible feature is routed into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Clustered,
    Heat,
    /// Visible in the model but not drawn by the current display mode
    Unrouted,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatSample {
    #[serde(skip)]
    pub feature: FeatureKey,
    pub lat: f64,
    pub lng: f64,
    /// `weight / max_weight`, in `(0, 1]`
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatLayer {
    pub samples: Vec<HeatSample>,
    pub settings: HeatmapSettings,
}

/// Everything one render pass asks of the drawing surface. Built from scratch
/// each cycle, so nothing carries over from the previous pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderPlan {
    pub hidden: Vec<FeatureKey>,
    pub styled: Vec<(FeatureKey, Style)>,
    pub clustered: Vec<FeatureKey>,
    pub unrouted: Vec<FeatureKey>,
    pub heat: Option<HeatLayer>,
    pub attach_clusters: bool,
}

impl RenderPlan {
    pub fn bucket_of(&self, key: FeatureKey) -> Option<Bucket> {
        if self.clustered.contains(&key) {
            return Some(Bucket::Clustered);
        }
        if self
            .heat
            .as_ref()
            .is_some_and(|heat| heat.samples.iter().any(|sample| sample.feature == key))
        {
            return Some(Bucket::Heat);
        }
        if self.unrouted.contains(&key) {
            return Some(Bucket::Unrouted);
        }
        None
    }

    pub fn apply_to<S: Surface + ?Sized>(&self, surface: &mut S) {
        for key in &self.hidden {
            surface.hide(*key);
        }
        for (key, style) in &self.styled {
            surface.restyle(*key, style);
        }
        if self.attach_clusters {
            surface.show_clusters(&self.clustered);
        }
        if let Some(heat) = &self.heat {
            surface.show_heatmap(heat);
        }
    }
}

/// Settings the router needs from the widget configuration
#[derive(Debug, Clone, Copy)]
pub struct RouteSettings<'a> {
    pub brand_color: &'a str,
    pub heatmap: &'a HeatmapSettings,
}

/// Partitions the visible features into render buckets for `purpose`
pub fn route(
    store: &FeatureStore,
    visibility: &Visibility,
    purpose: Option<Purpose>,
    settings: RouteSettings<'_>,
) -> RenderPlan {
    let mut plan = RenderPlan::default();
    let mut samples = Vec::new();

    for (key, feature) in store.each() {
        if !visibility.is_visible(key) {
            plan.hidden.push(key);
            continue;
        }

        if let Some(style) = &feature.properties.style {
            plan.styled
                .push((key, style.clone().with_color(settings.brand_color)));
        }

        match purpose {
            Some(purpose) if purpose.uses_clusters() => plan.clustered.push(key),
            Some(Purpose::ViewHeatmap) => match feature.geometry.as_point() {
                Some(point) => samples.push(HeatSample {
                    feature: key,
                    lat: point.lat,
                    lng: point.lng,
                    intensity: feature.properties.weight / visibility.max_weight(),
                }),
                None => plan.unrouted.push(key),
            },
            _ => plan.unrouted.push(key),
        }
    }

    match purpose {
        Some(purpose) if purpose.uses_clusters() => plan.attach_clusters = true,
        Some(Purpose::ViewHeatmap) => {
            plan.heat = Some(HeatLayer {
                samples,
                settings: settings.heatmap.clone(),
            });
        }
        _ => {}
    }

    debug!(
        purpose = ?purpose,
        hidden = plan.hidden.len(),
        clustered = plan.clustered.len(),
        heat = plan.heat.as_ref().map_or(0, |heat| heat.samples.len()),
        unrouted = plan.unrouted.len(),
        "routed features"
    );

    plan
}
