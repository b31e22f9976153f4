use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};
use tracing::{debug, trace, warn};

use crate::config::WidgetConfig;
use crate::domain::{Feature, FeatureId, Geometry, LatLng, Properties, Purpose, Style};
use crate::error::{IngestError, MessageError};
use crate::host::{
    adapt_boundary, adapt_comments, adapt_routes, CommentDraft, InboundMessage, OutboundMessage,
    PopupAction,
};
use crate::input::{drag, ClickDisambiguator, ClickEvent, ClickOutcome, DragOutcome, PendingClick};
use crate::pipeline::{resolve, route, DerivedFields, RouteSettings};
use crate::state::{FeatureKey, FeatureStore, FilterKey, FilterSet, FilterValue, Popup, Selection};
use crate::surface::Surface;

/// What a click on a feature did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureClick {
    /// Blockers eat their clicks; the host must stop propagation to the canvas
    Swallowed,
    Opened,
    Ignored,
}

/// What a settled canvas click did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickResolution {
    /// The delay has not run out yet; hand the click back later
    NotDue,
    /// Something newer happened while the click was waiting
    Stale,
    Closed(FeatureKey),
    Created(FeatureKey),
    Nothing,
}

/// One embedded map: the feature store, the active filters, the selection and
/// the click state, driving a drawing surface.
///
/// Every entry point takes the current instant explicitly; the widget never
/// reads a clock.
#[derive(Debug)]
pub struct Widget<S: Surface> {
    config: WidgetConfig,
    surface: S,
    store: FeatureStore,
    filters: FilterSet,
    selection: Selection,
    clicks: ClickDisambiguator,
    instance_id: Value,
    purpose: Option<Purpose>,
    derived: DerivedFields,
}

impl<S: Surface> Widget<S> {
    pub fn new(config: WidgetConfig, mut surface: S) -> Self {
        surface.set_zoom_range(config.min_zoom, config.max_zoom);
        surface.set_view(config.center, config.clamp_zoom(config.initial_zoom));
        let clicks = ClickDisambiguator::new(&config.click);

        Self {
            config,
            surface,
            store: FeatureStore::new(),
            filters: FilterSet::new(),
            selection: Selection::new(),
            clicks,
            instance_id: Value::Null,
            purpose: None,
            derived: DerivedFields::default(),
        }
    }

    pub const fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub const fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub const fn store(&self) -> &FeatureStore {
        &self.store
    }

    pub const fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub const fn selection(&self) -> &Selection {
        &self.selection
    }

    pub const fn purpose(&self) -> Option<Purpose> {
        self.purpose
    }

    pub fn set_purpose(&mut self, purpose: Option<Purpose>) {
        self.purpose = purpose;
    }

    pub const fn instance_id(&self) -> &Value {
        &self.instance_id
    }

    /// Derived fields of the last render pass
    pub const fn derived(&self) -> &DerivedFields {
        &self.derived
    }

    pub fn selected_feature(&self) -> Option<&Feature> {
        self.selection.selected().and_then(|key| self.store.get(key))
    }

    /// Stores a feature and hands it to the surface. A feature replacing a
    /// selected one by identity inherits the selection.
    pub fn add_feature(&mut self, feature: Feature) -> FeatureKey {
        let insertion = self.store.add(feature);
        let key = insertion.key();

        // A retired key is the same feature refreshed under a new key, not a
        // removal: the selection moves over instead of being cleared.
        if let Some(retired) = insertion.retired() {
            self.surface.remove(retired);
            if self.selection.is_selected(retired) {
                debug!(retired = retired.get(), key = key.get(), "selection follows replaced feature");
                self.selection.select(Some(key));
            }
        }

        if let Some(feature) = self.store.get(key) {
            self.surface.register(key, feature);
        }

        key
    }

    /// Stores a batch of features, then recomputes visibility once
    pub fn add_features<I>(&mut self, features: I, now: DateTime<Utc>) -> Vec<FeatureKey>
    where
        I: IntoIterator<Item = Feature>,
    {
        let keys: Vec<_> = features
            .into_iter()
            .map(|feature| self.add_feature(feature))
            .collect();
        debug!(added = keys.len(), "ingested features");
        self.update(now);
        keys
    }

    pub fn remove_feature(&mut self, key: FeatureKey) -> Option<Feature> {
        let removed = self.store.remove(key)?;
        self.surface.remove(key);

        if self.selection.is_selected(key) {
            self.selection.close();
            self.surface.close_popup();
        }

        Some(removed)
    }

    /// Sets or clears a filter; call `update` to apply it
    pub fn set_filter(
        &mut self,
        key: FilterKey,
        value: impl Into<Option<FilterValue>>,
    ) -> &mut Self {
        self.filters.set(key, value);
        self
    }

    pub fn clear_filters(&mut self) -> &mut Self {
        self.filters.clear_all();
        self
    }

    /// Recomputes visibility and render buckets from scratch, then reopens the
    /// popup of a selection that is still live.
    pub fn update(&mut self, now: DateTime<Utc>) {
        let visibility = resolve(&self.store, &self.filters, now);
        let plan = route(
            &self.store,
            &visibility,
            self.purpose,
            RouteSettings {
                brand_color: &self.config.brand_color,
                heatmap: &self.config.heatmap,
            },
        );
        plan.apply_to(&mut self.surface);
        self.derived = visibility.into_derived();

        match self.selection.selected() {
            Some(key) if self.store.contains(key) => {
                self.open_popup(key, None, now);
            }
            Some(key) => {
                debug!(key = key.get(), "selected feature is gone, clearing selection");
                self.selection.close();
                self.surface.close_popup();
            }
            None => {}
        }
    }

    /// Selects `key` and shows a freshly bound popup. An unsaved comment that
    /// was selected before is discarded.
    pub fn open_popup(
        &mut self,
        key: FeatureKey,
        location: Option<LatLng>,
        now: DateTime<Utc>,
    ) -> Option<&Popup> {
        if !self.store.contains(key) {
            return None;
        }
        let previous = self.selection.selected().filter(|previous| *previous != key);
        if let Some(previous) = previous {
            self.discard_temporary(previous);
        }

        let feature = self.store.get(key)?;
        let context = popup_context(&self.store, &self.derived, key, feature);
        let popup = self
            .selection
            .open(key, feature, location, self.config.popup, context);
        trace!(key = key.get(), seq = popup.seq, anchor = ?popup.anchor, "opening popup");
        self.surface.open_popup(popup);
        self.clicks.mark_interaction(now);
        self.set_hovered(key, true);
        if let Some(previous) = previous.filter(|previous| self.store.contains(*previous)) {
            self.set_hovered(previous, false);
        }

        self.selection.popup()
    }

    /// Clears the selection and closes the popup. A temporary feature dies
    /// with its popup.
    pub fn close_popup(&mut self) -> Option<FeatureKey> {
        let closed = self.selection.close();
        if let Some(key) = closed {
            if !self.discard_temporary(key) {
                self.set_hovered(key, false);
            }
        }
        self.surface.close_popup();
        closed
    }

    fn discard_temporary(&mut self, key: FeatureKey) -> bool {
        let temporary = self
            .store
            .get(key)
            .is_some_and(|feature| feature.properties.temporary);
        if temporary {
            self.store.remove(key);
            self.surface.remove(key);
        }
        temporary
    }

    /// Drops an unsaved, draggable comment marker. It is anchored at the open
    /// popup's location when there is one, else at `location`.
    pub fn add_comment(&mut self, location: Option<LatLng>, now: DateTime<Utc>) -> Option<FeatureKey> {
        let anchor = self
            .selection
            .popup()
            .and_then(|popup| popup.anchor)
            .or(location)?;

        let comment = Feature::new(Geometry::Point(anchor)).with_properties(Properties {
            draggable: true,
            temporary: true,
            template: Some(self.config.comments.add_template.clone()),
            ..Properties::default()
        });
        let key = self.add_feature(comment);
        self.open_popup(key, Some(anchor), now);

        Some(key)
    }

    pub fn on_feature_click(&mut self, key: FeatureKey, location: LatLng, now: DateTime<Utc>) -> FeatureClick {
        let Some(feature) = self.store.get(key) else {
            return FeatureClick::Ignored;
        };

        if feature.properties.blocker {
            FeatureClick::Swallowed
        } else if feature.properties.clickable {
            self.open_popup(key, Some(location), now);
            FeatureClick::Opened
        } else {
            FeatureClick::Ignored
        }
    }

    /// Feeds a canvas click to the disambiguator. A pending outcome must be
    /// handed back to `resolve_click` once its delay has passed.
    pub fn on_click(&mut self, event: &ClickEvent) -> ClickOutcome {
        self.clicks.on_click(event)
    }

    pub fn on_double_click(&mut self) {
        self.clicks.on_double_click();
    }

    /// Resolves a click whose delay has passed: closes the open popup, or in
    /// comment posting mode starts a new comment at the clicked point.
    pub fn resolve_click(&mut self, pending: &PendingClick, now: DateTime<Utc>) -> ClickResolution {
        if !pending.is_due(now) {
            return ClickResolution::NotDue;
        }
        if !self.clicks.settle(pending, now) {
            return ClickResolution::Stale;
        }

        let resolution = if self.selection.selected().is_some() {
            self.close_popup()
                .map_or(ClickResolution::Nothing, ClickResolution::Closed)
        } else if self.purpose == Some(Purpose::PostComments) {
            self.add_comment(Some(pending.location), now)
                .map_or(ClickResolution::Nothing, ClickResolution::Created)
        } else {
            ClickResolution::Nothing
        };

        self.clicks.mark_interaction(now);
        debug!(?resolution, "resolved click");
        resolution
    }

    /// Moves a draggable feature unless `to` lies on a blocker, in which case
    /// the surface is told to put it back.
    pub fn on_drag(&mut self, key: FeatureKey, to: LatLng) -> Option<DragOutcome> {
        let feature = self.store.get(key)?;
        if !feature.properties.draggable {
            return None;
        }
        let from = feature.geometry.as_point()?;

        let blockers = self
            .store
            .each()
            .filter(|(_, feature)| feature.properties.blocker)
            .map(|(_, feature)| feature.geometry.rings());
        let outcome = drag::step(from, to, blockers);

        match outcome {
            DragOutcome::Accepted(to) => {
                if let Some(feature) = self.store.get_mut(key) {
                    feature.geometry = Geometry::Point(to);
                }
            }
            DragOutcome::Rejected { revert_to } => {
                trace!(key = key.get(), "drag step hit a blocker");
                self.surface.move_feature(key, revert_to);
            }
        }

        Some(outcome)
    }

    /// Dragging closes the popup on the surface; this reopens it where the
    /// feature came to rest.
    pub fn on_drag_end(&mut self, key: FeatureKey, now: DateTime<Utc>) -> Option<&Popup> {
        let point = self.store.get(key)?.geometry.as_point();
        self.open_popup(key, point, now)
    }

    /// Highlights a styled feature while hovered or selected
    pub fn set_hovered(&mut self, key: FeatureKey, hovered: bool) -> Option<Style> {
        let style = self.store.get(key)?.properties.style.clone()?;
        let opacity = if hovered || self.selection.is_selected(key) {
            1.0
        } else {
            0.5
        };
        let style = style
            .with_color(&self.config.brand_color)
            .with_opacity(opacity);
        self.surface.restyle(key, &style);
        Some(style)
    }

    pub fn set_center(&mut self, location: LatLng, zoom: Option<u8>) {
        let zoom = self.config.clamp_zoom(zoom.unwrap_or(self.config.focus_zoom));
        self.surface.set_view(location, zoom);
    }

    /// Handles a host message. Returns false for messages the widget ignores.
    pub fn receive(&mut self, message: &InboundMessage, now: DateTime<Utc>) -> bool {
        if !message.is_map_data() {
            trace!(message = %message.message, "ignoring host message");
            return false;
        }

        self.instance_id = message.instance_id.clone();
        self.purpose = message.plugin_purpose.as_deref().and_then(Purpose::parse);
        if self.purpose.is_none() {
            warn!(purpose = ?message.plugin_purpose, "no known display mode, features stay unrouted");
        }

        if let Some(comments) = &message.comments {
            let features = adapt_comments(comments, &self.config.comments);
            self.add_features(features, now);
        }

        match message.map_data() {
            Some(Ok(data)) => {
                if let Some(boundary) = &data.boundary {
                    let adapted = adapt_boundary(boundary, &self.config.world_bounds.ring());
                    self.ingest("boundary", adapted, now);
                }
                if let Some(existing) = &data.existing {
                    let adapted = adapt_routes(existing, &self.config.brand_color, &self.config.comments);
                    self.ingest("existing", adapted, now);
                }
            }
            Some(Err(error)) => warn!(%error, "ignoring malformed map data"),
            None => {}
        }

        true
    }

    fn ingest(&mut self, source: &str, adapted: Result<Vec<Feature>, IngestError>, now: DateTime<Utc>) {
        match adapted {
            Ok(features) => {
                self.add_features(features, now);
            }
            Err(error) => warn!(%error, source, "ignoring map data"),
        }
    }

    /// Runs a popup button or form. Submissions return the message to post
    /// to the parent frame and close the popup.
    pub fn popup_action<Tz: TimeZone>(
        &mut self,
        action: PopupAction,
        tz: &Tz,
        now: DateTime<Utc>,
    ) -> Result<Option<OutboundMessage>, MessageError> {
        match action {
            PopupAction::AddComment { location } => {
                if self.add_comment(location, now).is_none() {
                    warn!("add-comment needs an open popup or a location");
                }
                Ok(None)
            }
            PopupAction::SubmitRating { title } => Ok(Some(self.submit_comment(CommentDraft::rating(title)))),
            PopupAction::SubmitComment(form) => {
                let draft = form.into_draft(tz)?;
                Ok(Some(self.submit_comment(draft)))
            }
            PopupAction::SubmitVote => Ok(Some(self.submit_vote())),
            PopupAction::Dismiss => {
                self.close_popup();
                Ok(None)
            }
        }
    }

    /// Builds the comment message for the open popup and closes it
    pub fn submit_comment(&mut self, draft: CommentDraft) -> OutboundMessage {
        let location = self.selection.popup().and_then(|popup| popup.anchor);
        let linked = self.selected_feature().and_then(|feature| feature.identity.as_ref());
        let message = OutboundMessage::comment(self.instance_id.clone(), draft, location, linked);
        self.close_popup();
        message
    }

    /// Builds the vote message for the selected comment and closes its popup
    pub fn submit_vote(&mut self) -> OutboundMessage {
        let selected = self.selected_feature().and_then(|feature| feature.identity.as_ref());
        let message = OutboundMessage::vote(self.instance_id.clone(), selected);
        self.close_popup();
        message
    }
}

/// Template context: the wire properties plus this cycle's derived fields
fn popup_context(
    store: &FeatureStore,
    derived: &DerivedFields,
    key: FeatureKey,
    feature: &Feature,
) -> Map<String, Value> {
    let mut context = feature.properties.to_map();
    if let Some(identity) = &feature.identity {
        context.insert("id".to_string(), identity.to_value());
    }

    let linked = derived
        .linked(key)
        .iter()
        .filter_map(|linked| store.get(*linked))
        .filter_map(|linked| linked.identity.as_ref().map(FeatureId::to_value))
        .collect();
    context.insert("linked".to_string(), Value::Array(linked));

    if let Some(rating) = derived.rating(key) {
        context.insert("rating".to_string(), json!(rating));
    }

    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::recording::{RecordingSurface, SurfaceCall};
    use chrono::Duration;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_717_200_000_000 + ms).unwrap()
    }

    fn widget(purpose: Option<Purpose>) -> Widget<RecordingSurface> {
        let mut widget = Widget::new(WidgetConfig::default(), RecordingSurface::default());
        widget.set_purpose(purpose);
        widget.surface_mut().take();
        widget
    }

    fn comment(id: &str, lat: f64, lng: f64) -> Feature {
        Feature::new(Geometry::Point(LatLng::new(lat, lng)))
            .with_identity(id)
            .with_properties(Properties {
                clickable: true,
                template: Some("template-view-comment".to_string()),
                created_at: Some(t(-60_000)),
                ..Properties::default()
            })
    }

    fn pending(outcome: ClickOutcome) -> PendingClick {
        match outcome {
            ClickOutcome::Pending(pending) => pending,
            other => panic!("expected a pending click, got {other:?}"),
        }
    }

    fn canvas_click(widget: &mut Widget<RecordingSurface>, ms: i64) -> ClickOutcome {
        widget.on_click(&ClickEvent::new(t(ms), LatLng::new(60.17, 24.93)))
    }

    #[test]
    fn new_widget_shows_the_initial_view() {
        let widget = Widget::new(WidgetConfig::default(), RecordingSurface::default());
        assert_eq!(
            widget.surface().calls,
            vec![
                SurfaceCall::ZoomRange(3, 15),
                SurfaceCall::SetView(LatLng::new(60.1708, 24.9375), 9)
            ]
        );
    }

    #[test]
    fn click_in_post_mode_creates_one_temporary_comment() {
        let mut widget = widget(Some(Purpose::PostComments));
        let click = pending(canvas_click(&mut widget, 0));

        let resolution = widget.resolve_click(&click, t(200));

        let ClickResolution::Created(key) = resolution else {
            panic!("expected a new comment, got {resolution:?}");
        };
        let comment = widget.store().get(key).unwrap();
        assert_eq!(comment.geometry, Geometry::Point(LatLng::new(60.17, 24.93)));
        assert!(comment.properties.temporary);
        assert!(comment.properties.draggable);
        assert_eq!(comment.properties.template.as_deref(), Some("template-add-comment"));
        assert_eq!(widget.store().transient().count(), 1);
        assert!(widget.store().is_empty());
        assert_eq!(widget.selection().selected(), Some(key));
        assert_eq!(widget.surface().popups_opened(), vec![key]);
    }

    #[test]
    fn click_handed_back_early_waits_for_its_delay() {
        let mut widget = widget(Some(Purpose::PostComments));
        let click = pending(canvas_click(&mut widget, 0));

        assert_eq!(widget.resolve_click(&click, t(150)), ClickResolution::NotDue);
        assert_eq!(widget.store().transient().count(), 0);
        assert!(widget.surface().calls.is_empty());

        assert!(matches!(widget.resolve_click(&click, t(200)), ClickResolution::Created(_)));
    }

    #[test]
    fn echo_click_within_the_window_fires_nothing_extra() {
        let mut widget = widget(Some(Purpose::PostComments));
        let first = pending(canvas_click(&mut widget, 0));
        assert_eq!(canvas_click(&mut widget, 30), ClickOutcome::Duplicate);

        assert!(matches!(widget.resolve_click(&first, t(200)), ClickResolution::Created(_)));
        assert_eq!(widget.store().transient().count(), 1);
    }

    #[test]
    fn double_click_cancels_the_single_click_action() {
        let mut widget = widget(Some(Purpose::PostComments));
        let first = pending(canvas_click(&mut widget, 0));
        widget.on_double_click();

        assert_eq!(widget.resolve_click(&first, t(200)), ClickResolution::Stale);
        assert_eq!(widget.store().transient().count(), 0);
        assert!(widget.surface().calls.is_empty());
    }

    #[test]
    fn click_outside_post_mode_does_nothing() {
        let mut widget = widget(Some(Purpose::ViewComments));
        let click = pending(canvas_click(&mut widget, 0));

        assert_eq!(widget.resolve_click(&click, t(200)), ClickResolution::Nothing);
        assert!(widget.surface().calls.is_empty());
    }

    #[test]
    fn canvas_click_with_a_temporary_selection_discards_it() {
        let mut widget = widget(Some(Purpose::PostComments));
        let first = pending(canvas_click(&mut widget, 0));
        let ClickResolution::Created(key) = widget.resolve_click(&first, t(200)) else {
            panic!("expected a new comment");
        };
        widget.surface_mut().take();

        let second = pending(canvas_click(&mut widget, 1_000));
        assert_eq!(widget.resolve_click(&second, t(1_200)), ClickResolution::Closed(key));

        assert!(!widget.store().contains(key));
        assert_eq!(widget.selection().selected(), None);
        assert_eq!(
            widget.surface().calls,
            vec![SurfaceCall::Remove(key), SurfaceCall::ClosePopup]
        );
    }

    #[test]
    fn selection_survives_update_with_a_fresh_popup() {
        let mut widget = widget(Some(Purpose::ViewComments));
        let key = widget.add_features([comment("c1", 60.2, 24.9)], t(0))[0];

        assert_eq!(widget.on_feature_click(key, LatLng::new(60.2, 24.9), t(10)), FeatureClick::Opened);
        let first_seq = widget.selection().popup().unwrap().seq;

        widget.update(t(5_000));

        assert_eq!(widget.selection().selected(), Some(key));
        let popup = widget.selection().popup().unwrap();
        assert!(popup.seq > first_seq);
        assert_eq!(popup.anchor, Some(LatLng::new(60.2, 24.9)));
        assert_eq!(widget.surface().popups_opened(), vec![key, key]);
    }

    #[test]
    fn update_routes_visible_features_into_clusters() {
        let mut widget = widget(Some(Purpose::ViewComments));
        let keys = widget.add_features([comment("c1", 60.2, 24.9), comment("c2", 60.3, 24.8)], t(0));

        assert_eq!(widget.surface().calls.last(), Some(&SurfaceCall::ShowClusters(keys)));
    }

    #[test]
    fn date_filter_hides_old_comments() {
        let mut widget = widget(Some(Purpose::ViewHeatmap));
        let key = widget.add_features([comment("c1", 60.2, 24.9)], t(0))[0];
        widget.surface_mut().take();

        widget
            .set_filter(FilterKey::DateStart, FilterValue::from(t(0) - Duration::seconds(1)))
            .update(t(1_000));

        assert_eq!(
            widget.surface().calls,
            vec![SurfaceCall::Hide(key), SurfaceCall::ShowHeatmap(Vec::new())]
        );

        widget.clear_filters().update(t(2_000));
        assert_eq!(
            widget.surface().calls.last(),
            Some(&SurfaceCall::ShowHeatmap(vec![(key, 1.0)]))
        );
    }

    #[test]
    fn reingesting_a_selected_feature_moves_the_selection() {
        let mut widget = widget(Some(Purpose::ViewComments));
        let old = widget.add_features([comment("c1", 60.2, 24.9)], t(0))[0];
        widget.open_popup(old, None, t(10));

        let mut refreshed = comment("c1", 60.2, 24.9);
        refreshed.properties.weight = 3.0;
        let new = widget.add_features([refreshed], t(1_000))[0];

        assert_ne!(old, new);
        assert_eq!(widget.store().len(), 1);
        assert_eq!(widget.selection().selected(), Some(new));
        assert!(widget.surface().calls.contains(&SurfaceCall::Remove(old)));
        assert_eq!(
            widget.surface().calls.last(),
            Some(&SurfaceCall::OpenPopup(new, Some(LatLng::new(60.2, 24.9))))
        );
    }

    #[test]
    fn reingested_comment_leaves_only_the_new_key_in_the_clusters() {
        let mut widget = widget(Some(Purpose::ViewComments));
        let old = widget.add_features([comment("c1", 60.2, 24.9)], t(0))[0];
        let new = widget.add_features([comment("c1", 60.25, 24.95)], t(1_000))[0];

        assert_ne!(old, new);
        assert_eq!(widget.surface().calls.last(), Some(&SurfaceCall::ShowClusters(vec![new])));
    }

    #[test]
    fn reingested_comment_leaves_a_single_heat_sample() {
        let mut widget = widget(Some(Purpose::ViewHeatmap));
        let mut heavy = comment("c1", 60.2, 24.9);
        heavy.properties.weight = 4.0;
        widget.add_features([heavy], t(0));

        let mut light = comment("c1", 60.2, 24.9);
        light.properties.weight = 2.0;
        let new = widget.add_features([light], t(1_000))[0];

        // The retired weight no longer counts towards the maximum
        assert_eq!(
            widget.surface().calls.last(),
            Some(&SurfaceCall::ShowHeatmap(vec![(new, 1.0)]))
        );
    }

    #[test]
    fn removing_the_selected_feature_clears_the_selection() {
        let mut widget = widget(Some(Purpose::ViewComments));
        let key = widget.add_features([comment("c1", 60.2, 24.9)], t(0))[0];
        widget.open_popup(key, None, t(10));

        assert!(widget.remove_feature(key).is_some());
        assert_eq!(widget.selection().selected(), None);
        assert!(widget.remove_feature(key).is_none());

        widget.update(t(20));
        assert!(widget.selection().popup().is_none());
    }

    #[test]
    fn opening_another_popup_discards_an_unsaved_comment() {
        let mut widget = widget(Some(Purpose::PostComments));
        let key = widget.add_features([comment("c1", 60.2, 24.9)], t(0))[0];
        let draft = widget.add_comment(Some(LatLng::new(60.1, 24.8)), t(10)).unwrap();

        widget.on_feature_click(key, LatLng::new(60.2, 24.9), t(500));

        assert!(!widget.store().contains(draft));
        assert_eq!(widget.selection().selected(), Some(key));
    }

    fn blocker_square() -> Feature {
        Feature::new(Geometry::Polygon(vec![vec![
            LatLng::new(61.0, 25.0),
            LatLng::new(61.0, 24.0),
            LatLng::new(60.0, 24.0),
            LatLng::new(60.0, 25.0),
            LatLng::new(61.0, 25.0),
        ]]))
        .with_properties(Properties {
            blocker: true,
            permanent: true,
            ..Properties::default()
        })
    }

    #[test]
    fn blocker_swallows_its_clicks() {
        let mut widget = widget(Some(Purpose::PostComments));
        let key = widget.add_features([blocker_square()], t(0))[0];

        assert_eq!(
            widget.on_feature_click(key, LatLng::new(60.5, 24.5), t(10)),
            FeatureClick::Swallowed
        );
        assert_eq!(widget.selection().selected(), None);
    }

    #[test]
    fn dragging_onto_a_blocker_reverts_and_drag_end_reopens_the_popup() {
        let mut widget = widget(Some(Purpose::PostComments));
        widget.add_features([blocker_square()], t(0));
        let draft = widget.add_comment(Some(LatLng::new(59.5, 24.5)), t(10)).unwrap();

        let clear = LatLng::new(59.6, 24.5);
        assert_eq!(widget.on_drag(draft, clear), Some(DragOutcome::Accepted(clear)));

        let outcome = widget.on_drag(draft, LatLng::new(60.5, 24.5));
        assert_eq!(outcome, Some(DragOutcome::Rejected { revert_to: clear }));
        assert!(widget.surface().calls.contains(&SurfaceCall::Move(draft, clear)));

        let popup = widget.on_drag_end(draft, t(500)).unwrap();
        assert_eq!(popup.anchor, Some(clear));
    }

    #[test]
    fn non_draggable_features_ignore_drags() {
        let mut widget = widget(Some(Purpose::ViewComments));
        let key = widget.add_features([comment("c1", 60.2, 24.9)], t(0))[0];

        assert_eq!(widget.on_drag(key, LatLng::new(0.0, 0.0)), None);
    }

    #[test]
    fn map_data_message_ingests_comments_boundary_and_routes() {
        let mut widget = widget(None);
        let message: InboundMessage = serde_json::from_value(json!({
            "message": "mapData",
            "instanceId": "w1",
            "pluginPurpose": "viewComments",
            "comments": [{
                "id": 5,
                "geojson": {"type": "Feature", "geometry": {"type": "Point", "coordinates": [24.9, 60.2]}},
                "content": "Teline tähän"
            }],
            "data": json!({
                "boundary": {"type": "FeatureCollection", "features": [{
                    "type": "Feature",
                    "geometry": {"type": "Polygon", "coordinates": [[[24.0, 60.0], [25.0, 60.0], [25.0, 61.0], [24.0, 60.0]]]}
                }]},
                "existing": {"type": "FeatureCollection", "features": [{
                    "type": "Feature",
                    "geometry": {"type": "LineString", "coordinates": [[24.9, 60.1], [24.95, 60.2]]},
                    "properties": {"id": "r1", "name": "Baana"}
                }]}
            }).to_string()
        }))
        .unwrap();

        assert!(widget.receive(&message, t(0)));

        assert_eq!(widget.instance_id(), &json!("w1"));
        assert_eq!(widget.purpose(), Some(Purpose::ViewComments));
        assert_eq!(widget.store().len(), 3);
        assert!(widget.store().find_by("id", &json!(5)).is_some());
        assert!(widget.store().find_by("id", &json!("r1")).is_some());
    }

    #[test]
    fn other_messages_change_nothing() {
        let mut widget = widget(None);
        let message: InboundMessage =
            serde_json::from_value(json!({"message": "mapData", "comments": []})).unwrap();

        assert!(!widget.receive(&message, t(0)));
        assert_eq!(widget.instance_id(), &Value::Null);
        assert!(widget.surface().calls.is_empty());
    }

    #[test]
    fn vote_names_the_selected_comment_and_closes_its_popup() {
        let mut widget = widget(Some(Purpose::ViewComments));
        let key = widget.add_features([comment("c9", 60.2, 24.9)], t(0))[0];
        widget.on_feature_click(key, LatLng::new(60.2, 24.9), t(10));

        let message = widget
            .popup_action(PopupAction::SubmitVote, &Utc, t(20))
            .unwrap()
            .unwrap();

        assert_eq!(serde_json::to_value(&message).unwrap()["commentId"], json!("c9"));
        assert_eq!(widget.selection().selected(), None);
        assert_eq!(widget.surface().calls.last(), Some(&SurfaceCall::ClosePopup));
    }

    #[test]
    fn rating_links_to_the_selected_route_at_the_popup_anchor() {
        let mut widget = widget(Some(Purpose::ViewComments));
        let mut route_line = Feature::new(Geometry::LineString(vec![
            LatLng::new(60.1, 24.9),
            LatLng::new(60.2, 24.95),
        ]))
        .with_identity("r1");
        route_line.properties.clickable = true;
        route_line.properties.permanent = true;
        let key = widget.add_features([route_line], t(0))[0];
        let clicked = LatLng::new(60.15, 24.92);
        widget.on_feature_click(key, clicked, t(10));

        let message = widget
            .popup_action(PopupAction::SubmitRating { title: None }, &Utc, t(20))
            .unwrap()
            .unwrap();
        let message = serde_json::to_value(&message).unwrap();

        assert_eq!(message["message"], json!("userData"));
        assert_eq!(message["comment"]["content"], json!(""));
        assert_eq!(message["comment"]["geojson"]["properties"]["linked_id"], json!("r1"));
        assert_eq!(
            message["comment"]["geojson"]["geometry"]["coordinates"],
            json!([24.92, 60.15])
        );
    }

    #[test]
    fn add_comment_action_anchors_at_the_open_popup() {
        let mut widget = widget(Some(Purpose::ViewComments));
        let key = widget.add_features([comment("c1", 60.2, 24.9)], t(0))[0];
        let clicked = LatLng::new(60.21, 24.91);
        widget.on_feature_click(key, clicked, t(10));

        widget
            .popup_action(PopupAction::AddComment { location: None }, &Utc, t(20))
            .unwrap();

        let draft = widget.selection().selected().unwrap();
        assert_ne!(draft, key);
        assert_eq!(
            widget.store().get(draft).map(|f| f.geometry.clone()),
            Some(Geometry::Point(clicked))
        );
    }

    #[test]
    fn bad_form_time_keeps_the_popup_open() {
        let mut widget = widget(Some(Purpose::PostComments));
        widget.add_comment(Some(LatLng::new(60.1, 24.8)), t(0));
        let form = crate::host::CommentForm {
            date: chrono::NaiveDate::from_ymd_opt(2024, 6, 1),
            time: Some("noon".to_string()),
            ..crate::host::CommentForm::default()
        };

        let result = widget.popup_action(PopupAction::SubmitComment(form), &Utc, t(10));

        assert!(matches!(result, Err(MessageError::InvalidTime(_))));
        assert!(widget.selection().selected().is_some());
    }

    #[test]
    fn hover_highlights_styled_features() {
        let mut widget = widget(Some(Purpose::ViewComments));
        let mut route_line = Feature::new(Geometry::LineString(vec![
            LatLng::new(60.1, 24.9),
            LatLng::new(60.2, 24.95),
        ]));
        route_line.properties.style = Some(Style::default().with_color("#000").with_opacity(0.5));
        let key = widget.add_features([route_line], t(0))[0];

        let hovered = widget.set_hovered(key, true).unwrap();
        assert_eq!(hovered.opacity(), Some(1.0));
        assert_eq!(hovered.color(), Some("#0078A8"));
        assert_eq!(widget.set_hovered(key, false).and_then(|s| s.opacity()), Some(0.5));
    }

    #[test]
    fn set_center_defaults_to_the_focus_zoom() {
        let mut widget = widget(None);
        let target = LatLng::new(60.45, 22.27);

        widget.set_center(target, None);
        widget.set_center(target, Some(14));
        widget.set_center(target, Some(18));

        assert_eq!(
            widget.surface().calls,
            vec![
                SurfaceCall::SetView(target, 12),
                SurfaceCall::SetView(target, 14),
                SurfaceCall::SetView(target, 15)
            ]
        );
    }
}
