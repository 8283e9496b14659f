use crate::error::EngineError;
use analytics::{Classification, ColorRuleEngine};
use chrono::Utc;
use configuration::{Config, RegionDefaults};
use core_types::{
    ColorRule, CoreError, LatLng, Region, RegionId, TemporalWindow, TimeSeries, validate_name,
};
use events::{AcquisitionFailure, RegionColor, StoreEvent};
use std::collections::HashMap;
use tokio::sync::broadcast;

/// How many unread notifications a slow subscriber may fall behind by.
const EVENT_CAPACITY: usize = 256;

/// What the drawing surface hands over when a polygon is finalized and named.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionDraft {
    pub name: String,
    pub vertices: Vec<LatLng>,
}

/// A partial update to a region. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionPatch {
    pub name: Option<String>,
    /// Replaces the whole rule list, e.g. from a committed `RuleDraft`.
    pub rules: Option<Vec<ColorRule>>,
    pub field: Option<String>,
}

/// Authorizes one acquisition for one region. Only the most recently issued ticket for a
/// region is honoured when its result comes back.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionTicket {
    pub region_id: RegionId,
    pub token: u64,
    /// The region's centroid, where the series is sampled.
    pub location: LatLng,
    pub fields: Vec<String>,
}

/// What happened to a series handed to `ingest_series`.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Applied(Classification),
    /// A newer acquisition was issued for the region in the meantime.
    Stale,
    /// The region was deleted while the acquisition was in flight.
    RegionGone,
}

/// The single source of truth for regions, their series, the selection and the window.
///
/// Every mutation publishes a `StoreEvent`. Validation happens before any state is touched.
pub struct RegionStore {
    // --- Model ---
    regions: Vec<Region>,
    series: HashMap<RegionId, TimeSeries>,
    values: HashMap<RegionId, Option<f64>>,
    selected: Option<RegionId>,
    window: TemporalWindow,

    // --- Acquisition bookkeeping ---
    in_flight: HashMap<RegionId, u64>,
    next_token: u64,

    // --- Configuration ---
    horizon: usize,
    defaults: RegionDefaults,

    engine: ColorRuleEngine,
    events: broadcast::Sender<StoreEvent>,
}

impl RegionStore {
    pub fn new(window: TemporalWindow, horizon: usize, defaults: RegionDefaults) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            regions: Vec::new(),
            series: HashMap::new(),
            values: HashMap::new(),
            selected: None,
            window,
            in_flight: HashMap::new(),
            next_token: 0,
            horizon,
            defaults,
            engine: ColorRuleEngine::new(),
            events,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let window = config.window.initial_window()?;
        Ok(Self::new(
            window,
            config.window.horizon,
            config.regions.clone(),
        ))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    // ==========================================================================
    // Regions
    // ==========================================================================

    /// Validates and adds a region with the default rules, then issues its first acquisition.
    pub fn create(&mut self, draft: RegionDraft) -> Result<AcquisitionTicket, EngineError> {
        let region = Region::new(
            &draft.name,
            draft.vertices,
            &self.defaults.field,
            &self.defaults.source,
            ColorRule::default_set(),
        )?;
        let id = region.id;
        tracing::info!(region_id = %id, name = %region.name, vertices = region.vertices.len(), "Region created.");

        self.publish(StoreEvent::RegionCreated(region.clone()));
        self.regions.push(region);
        self.values.insert(id, None);
        self.issue_ticket(id)
    }

    /// Issues a fresh acquisition for an existing region, superseding any in flight.
    pub fn refetch(&mut self, id: RegionId) -> Result<AcquisitionTicket, EngineError> {
        self.issue_ticket(id)
    }

    pub fn update(&mut self, id: RegionId, patch: RegionPatch) -> Result<Region, EngineError> {
        let name = patch.name.as_deref().map(validate_name).transpose()?;
        if let Some(field) = &patch.field {
            if field.trim().is_empty() {
                return Err(CoreError::InvalidInput(
                    "field".to_string(),
                    "must not be empty".to_string(),
                )
                .into());
            }
        }

        let region = self.region_mut(id)?;
        if let Some(name) = name {
            region.name = name;
        }
        let reclassify = patch.rules.is_some() || patch.field.is_some();
        if let Some(rules) = patch.rules {
            region.rules = rules;
        }
        if let Some(field) = patch.field {
            region.field = field.trim().to_string();
        }

        let updated = region.clone();
        self.publish(StoreEvent::RegionUpdated(updated.clone()));
        if reclassify {
            self.recompute(id)?;
        }
        Ok(self.region(id).cloned().unwrap_or(updated))
    }

    /// Removes a region and everything cached for it. Clears the selection if it was selected.
    pub fn delete(&mut self, id: RegionId) -> Result<Region, EngineError> {
        let index = self
            .regions
            .iter()
            .position(|r| r.id == id)
            .ok_or(EngineError::RegionNotFound(id))?;
        let region = self.regions.remove(index);
        self.series.remove(&id);
        self.values.remove(&id);
        self.settle(id);

        self.publish(StoreEvent::RegionDeleted(id));
        if self.selected == Some(id) {
            self.selected = None;
            self.publish(StoreEvent::SelectionChanged(None));
        }
        tracing::info!(region_id = %id, name = %region.name, "Region deleted.");
        Ok(region)
    }

    pub fn select(&mut self, id: RegionId) -> Result<(), EngineError> {
        if self.region(id).is_none() {
            return Err(EngineError::RegionNotFound(id));
        }
        if self.selected != Some(id) {
            self.selected = Some(id);
            self.publish(StoreEvent::SelectionChanged(Some(id)));
        }
        Ok(())
    }

    pub fn deselect(&mut self) {
        if self.selected.take().is_some() {
            self.publish(StoreEvent::SelectionChanged(None));
        }
    }

    // ==========================================================================
    // Window and classification
    // ==========================================================================

    /// Moves the window and recomputes every region that has a series.
    pub fn set_window(&mut self, start: usize, end: usize) -> Result<TemporalWindow, EngineError> {
        let window = TemporalWindow::with_horizon(start, end, self.horizon)?;
        self.window = window;
        self.publish(StoreEvent::WindowChanged(window));

        let ids: Vec<RegionId> = self
            .regions
            .iter()
            .map(|r| r.id)
            .filter(|id| self.series.contains_key(id))
            .collect();
        for id in &ids {
            self.recompute(*id)?;
        }
        tracing::debug!(start, end, recomputed = ids.len(), "Window changed.");
        Ok(window)
    }

    /// Aggregates the region's series over the window and sets its color.
    ///
    /// Idempotent: with unchanged inputs the same color is produced again.
    pub fn recompute(&mut self, id: RegionId) -> Result<Classification, EngineError> {
        let window = self.window;
        let engine = self.engine;
        let series = self.series.get(&id);
        let region = self
            .regions
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(EngineError::RegionNotFound(id))?;

        let values = series.and_then(|s| s.values(&region.field)).unwrap_or(&[]);
        let classification = engine.evaluate(values, window, &region.rules);
        region.current_color = classification.color.clone();
        self.values.insert(id, classification.value);

        self.publish(StoreEvent::RegionRecolored(RegionColor {
            region_id: id,
            color: classification.color.clone(),
            value: classification.value,
        }));
        Ok(classification)
    }

    // ==========================================================================
    // Acquisition results
    // ==========================================================================

    /// Stores a freshly acquired series and recomputes the region's color.
    pub fn ingest_series(
        &mut self,
        ticket: &AcquisitionTicket,
        series: TimeSeries,
    ) -> Result<IngestOutcome, EngineError> {
        let id = ticket.region_id;
        if self.region(id).is_none() {
            tracing::warn!(region_id = %id, "Discarding series for a deleted region.");
            return Ok(IngestOutcome::RegionGone);
        }
        if self.in_flight.get(&id) != Some(&ticket.token) {
            tracing::warn!(region_id = %id, token = ticket.token, "Discarding stale series.");
            return Ok(IngestOutcome::Stale);
        }

        self.settle(id);
        tracing::info!(region_id = %id, samples = series.len(), "Series stored.");
        self.series.insert(id, series);
        Ok(IngestOutcome::Applied(self.recompute(id)?))
    }

    /// Records a failed acquisition. The region keeps whatever series it already had.
    ///
    /// Returns `false` if the ticket was stale or the region is gone.
    pub fn fail_acquisition(&mut self, ticket: &AcquisitionTicket, reason: &str) -> bool {
        let id = ticket.region_id;
        if self.region(id).is_none() || self.in_flight.get(&id) != Some(&ticket.token) {
            tracing::debug!(region_id = %id, "Ignoring failure of a superseded acquisition.");
            return false;
        }
        tracing::warn!(region_id = %id, %reason, "Acquisition failed.");
        self.publish(StoreEvent::AcquisitionFailed(AcquisitionFailure {
            region_id: id,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        }));
        self.settle(id);
        true
    }

    // ==========================================================================
    // Accessors
    // ==========================================================================

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn series(&self, id: RegionId) -> Option<&TimeSeries> {
        self.series.get(&id)
    }

    pub fn selected(&self) -> Option<RegionId> {
        self.selected
    }

    pub fn window(&self) -> TemporalWindow {
        self.window
    }

    /// The aggregated value behind the region's current color, if there is one.
    pub fn current_value(&self, id: RegionId) -> Option<f64> {
        self.values.get(&id).copied().flatten()
    }

    /// Whether any acquisition is in flight.
    pub fn is_loading(&self) -> bool {
        !self.in_flight.is_empty()
    }

    fn region_mut(&mut self, id: RegionId) -> Result<&mut Region, EngineError> {
        self.regions
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(EngineError::RegionNotFound(id))
    }

    fn issue_ticket(&mut self, id: RegionId) -> Result<AcquisitionTicket, EngineError> {
        let region = self.region(id).ok_or(EngineError::RegionNotFound(id))?;
        let location = region.centroid;
        let fields = self.defaults.fields_for(&region.field);

        let was_loading = self.is_loading();
        self.next_token += 1;
        let token = self.next_token;
        if let Some(previous) = self.in_flight.insert(id, token) {
            tracing::debug!(region_id = %id, previous, token, "Superseding in-flight acquisition.");
        }
        if !was_loading {
            self.publish(StoreEvent::LoadingChanged(true));
        }

        Ok(AcquisitionTicket {
            region_id: id,
            token,
            location,
            fields,
        })
    }

    /// Clears the region's in-flight marker, announcing when the last one settles.
    fn settle(&mut self, id: RegionId) {
        if self.in_flight.remove(&id).is_some() && !self.is_loading() {
            self.publish(StoreEvent::LoadingChanged(false));
        }
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine; the store is usable headless.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{hourly_series, square};
    use analytics::RuleDraft;
    use core_types::{Color, ComparisonOp};
    use tokio::sync::broadcast::error::TryRecvError;

    fn store() -> RegionStore {
        RegionStore::new(
            TemporalWindow::new(0, 24).unwrap(),
            720,
            RegionDefaults::default(),
        )
    }

    fn draft(name: &str, vertices: usize) -> RegionDraft {
        RegionDraft {
            name: name.to_string(),
            vertices: square(vertices),
        }
    }

    fn drain(rx: &mut broadcast::Receiver<StoreEvent>) -> Vec<StoreEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return events,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
    }

    #[test]
    fn create_derives_geometry_and_issues_a_ticket() {
        let mut store = store();
        let mut rx = store.subscribe();
        let ticket = store.create(draft("  R1 ", 4)).unwrap();

        let region = store.region(ticket.region_id).unwrap();
        assert_eq!(region.name, "R1");
        assert_eq!(region.rules.len(), 4);
        assert_eq!(region.current_color, Color::neutral());
        assert_eq!(ticket.location, region.centroid);
        assert_eq!(ticket.fields, vec!["temperature_2m".to_string()]);
        assert!(store.is_loading());

        let events = drain(&mut rx);
        assert!(matches!(events[0], StoreEvent::RegionCreated(_)));
        assert_eq!(events[1], StoreEvent::LoadingChanged(true));
    }

    #[test]
    fn invalid_drafts_leave_the_store_untouched() {
        let mut store = store();
        let mut rx = store.subscribe();
        assert!(matches!(
            store.create(draft("R1", 2)),
            Err(EngineError::Validation(CoreError::VertexCount { actual: 2, .. }))
        ));
        assert!(matches!(
            store.create(draft("R1", 13)),
            Err(EngineError::Validation(CoreError::VertexCount { actual: 13, .. }))
        ));
        assert!(matches!(
            store.create(draft("   ", 4)),
            Err(EngineError::Validation(CoreError::EmptyName))
        ));
        assert!(store.regions().is_empty());
        assert!(!store.is_loading());
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn r1_scenario_classifies_as_moderate() {
        let mut store = store();
        let ticket = store.create(draft("R1", 4)).unwrap();
        store.set_window(0, 2).unwrap();

        let outcome = store
            .ingest_series(&ticket, hourly_series(&[8.0, 12.0, 30.0]))
            .unwrap();
        let IngestOutcome::Applied(classification) = outcome else {
            panic!("expected the series to be applied, got {:?}", outcome);
        };
        assert!((classification.value.unwrap() - 16.6667).abs() < 1e-3);
        assert_eq!(classification.color.as_str(), Color::MODERATE);

        let id = ticket.region_id;
        assert_eq!(store.region(id).unwrap().current_color.as_str(), Color::MODERATE);
        assert!((store.current_value(id).unwrap() - 16.6667).abs() < 1e-3);
        assert!(!store.is_loading());
    }

    #[test]
    fn set_window_recomputes_regions_with_series() {
        let mut store = store();
        let with_series = store.create(draft("A", 3)).unwrap();
        let without = store.create(draft("B", 3)).unwrap();
        store
            .ingest_series(&with_series, hourly_series(&[0.0, 10.0, 20.0, 30.0]))
            .unwrap();

        store.set_window(1, 2).unwrap();
        assert_eq!(store.current_value(with_series.region_id), Some(15.0));
        store.set_window(0, 10).unwrap();
        assert_eq!(store.current_value(with_series.region_id), Some(15.0));
        assert_eq!(store.current_value(without.region_id), None);

        let before = store.window();
        assert!(matches!(
            store.set_window(5, 721),
            Err(EngineError::Validation(CoreError::WindowOutOfBounds { .. }))
        ));
        assert!(store.set_window(9, 3).is_err());
        assert_eq!(store.window(), before);
    }

    #[test]
    fn recompute_is_idempotent() {
        let mut store = store();
        let ticket = store.create(draft("R1", 5)).unwrap();
        store
            .ingest_series(&ticket, hourly_series(&[40.0; 30]))
            .unwrap();
        let first = store.recompute(ticket.region_id).unwrap();
        let second = store.recompute(ticket.region_id).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn deleting_the_selected_region_clears_selection() {
        let mut store = store();
        let a = store.create(draft("A", 3)).unwrap().region_id;
        let b = store.create(draft("B", 3)).unwrap().region_id;

        store.select(a).unwrap();
        store.delete(b).unwrap();
        assert_eq!(store.selected(), Some(a));

        let mut rx = store.subscribe();
        store.delete(a).unwrap();
        assert_eq!(store.selected(), None);
        let events = drain(&mut rx);
        assert!(events.contains(&StoreEvent::RegionDeleted(a)));
        assert!(events.contains(&StoreEvent::SelectionChanged(None)));

        assert!(matches!(store.delete(a), Err(EngineError::RegionNotFound(_))));
        assert!(store.select(a).is_err());
    }

    #[test]
    fn stale_and_orphaned_results_are_discarded() {
        let mut store = store();
        let first = store.create(draft("R1", 4)).unwrap();
        let second = store.refetch(first.region_id).unwrap();
        assert_ne!(first.token, second.token);

        let outcome = store
            .ingest_series(&first, hourly_series(&[1.0, 2.0]))
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Stale);
        assert!(store.series(first.region_id).is_none());
        assert!(!store.fail_acquisition(&first, "timeout"));
        assert!(store.is_loading());

        store.delete(first.region_id).unwrap();
        assert!(!store.is_loading());
        let outcome = store
            .ingest_series(&second, hourly_series(&[1.0, 2.0]))
            .unwrap();
        assert_eq!(outcome, IngestOutcome::RegionGone);
    }

    #[test]
    fn failed_acquisition_keeps_the_previous_series() {
        let mut store = store();
        let ticket = store.create(draft("R1", 4)).unwrap();
        let id = ticket.region_id;
        store
            .ingest_series(&ticket, hourly_series(&[5.0, 5.0]))
            .unwrap();

        let retry = store.refetch(id).unwrap();
        let mut rx = store.subscribe();
        assert!(store.fail_acquisition(&retry, "upstream returned 500"));
        assert_eq!(store.series(id).unwrap().len(), 2);
        assert_eq!(store.region(id).unwrap().current_color.as_str(), Color::COLD);

        let events = drain(&mut rx);
        assert!(matches!(&events[0], StoreEvent::AcquisitionFailed(f) if f.reason == "upstream returned 500"));
        assert_eq!(events[1], StoreEvent::LoadingChanged(false));
    }

    #[test]
    fn update_merges_partially_and_reclassifies() {
        let mut store = store();
        let ticket = store.create(draft("R1", 4)).unwrap();
        let id = ticket.region_id;
        store
            .ingest_series(&ticket, hourly_series(&[30.0, 30.0]))
            .unwrap();
        assert_eq!(store.region(id).unwrap().current_color.as_str(), Color::MODERATE);

        let warmest_first = vec![
            ColorRule::new(ComparisonOp::Ge, 25.0, Color::parse(Color::WARM).unwrap()),
            ColorRule::new(ComparisonOp::Lt, 25.0, Color::parse(Color::COLD).unwrap()),
        ];
        let updated = store
            .update(
                id,
                RegionPatch {
                    name: Some("Renamed".to_string()),
                    rules: Some(warmest_first),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.current_color.as_str(), Color::WARM);
        assert_eq!(updated.vertices.len(), 4);

        // Switching to a field the cached series lacks leaves no value.
        let updated = store
            .update(
                id,
                RegionPatch {
                    field: Some("precipitation".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.current_color, Color::neutral());
        assert_eq!(store.current_value(id), None);

        assert!(store
            .update(
                id,
                RegionPatch {
                    name: Some(" ".to_string()),
                    ..Default::default()
                }
            )
            .is_err());
        assert_eq!(store.region(id).unwrap().name, "Renamed");
    }

    #[test]
    fn committing_a_rule_draft_recolors_the_region() {
        let mut store = store();
        let ticket = store.create(draft("R1", 4)).unwrap();
        let id = ticket.region_id;
        store
            .ingest_series(&ticket, hourly_series(&[30.0, 30.0]))
            .unwrap();
        assert_eq!(store.region(id).unwrap().current_color.as_str(), Color::MODERATE);

        let committed = store.region(id).unwrap().rules.clone();
        let mut rules = RuleDraft::start(&committed);
        rules.move_rule(2, 1).unwrap();
        // Editing the draft leaves the committed rules alone.
        assert_eq!(store.region(id).unwrap().rules, committed);
        assert_eq!(store.region(id).unwrap().current_color.as_str(), Color::MODERATE);

        let mut rx = store.subscribe();
        let updated = store
            .update(
                id,
                RegionPatch {
                    rules: Some(rules.into_rules()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.rules[1].id, committed[2].id);
        assert_eq!(updated.current_color.as_str(), Color::WARM);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, StoreEvent::RegionUpdated(r) if r.current_color.as_str() == Color::WARM)));
    }
}
