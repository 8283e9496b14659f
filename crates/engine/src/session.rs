use crate::drawing::{DrawingController, DrawingOutcome, Geometry};
use crate::error::EngineError;
use crate::event::DrawingInput;
use crate::merge::SeriesMergeService;
use crate::store::{AcquisitionTicket, IngestOutcome, RegionDraft, RegionPatch, RegionStore};
use api_client::{MetricSource, OpenMeteoClient, SeriesRequest, SourceSeries};
use chrono::{Local, NaiveDate};
use configuration::Config;
use core_types::{LatLng, Region, RegionId, TemporalWindow};
use events::StoreEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex, broadcast};

/// Supplies "today" for splitting acquisitions.
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// The result of creating a region. Creation itself succeeded; the acquisition may not have.
#[derive(Debug)]
pub struct CreateOutcome {
    pub region_id: RegionId,
    pub acquisition: Result<IngestOutcome, EngineError>,
}

/// The per-process orchestrator tying the store to the metric sources.
///
/// Cheap to clone; clones share the same store. The store lock is never held across an
/// acquisition, so other operations proceed while a fetch is in flight.
#[derive(Clone)]
pub struct Session {
    // --- Shared, Thread-Safe Components ---
    store: Arc<Mutex<RegionStore>>,
    merge: SeriesMergeService,

    // --- Configuration ---
    clock: Clock,
    auto_finalize_delay: Duration,
}

impl Session {
    /// Builds a session backed by the two Open-Meteo endpoints from `config`.
    pub fn new(config: &Config) -> Result<Self, EngineError> {
        let archive = OpenMeteoClient::archive(&config.api).map_err(EngineError::SourceSetup)?;
        let forecast = OpenMeteoClient::forecast(&config.api).map_err(EngineError::SourceSetup)?;
        Self::with_sources(config, Arc::new(archive), Arc::new(forecast))
    }

    pub fn with_sources(
        config: &Config,
        retrospective: Arc<dyn MetricSource>,
        forward: Arc<dyn MetricSource>,
    ) -> Result<Self, EngineError> {
        let store = RegionStore::from_config(config)?;
        let merge = SeriesMergeService::new(
            retrospective,
            forward,
            config.window.days_before,
            config.window.days_after,
        );
        Ok(Self {
            store: Arc::new(Mutex::new(store)),
            merge,
            clock: Arc::new(|| Local::now().date_naive()),
            auto_finalize_delay: config.drawing.auto_finalize_delay(),
        })
    }

    /// Replaces the wall clock, e.g. to pin "today" in tests.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn store(&self) -> &Arc<Mutex<RegionStore>> {
        &self.store
    }

    pub async fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.lock().await.subscribe()
    }

    pub fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    /// Acquires the merged series for a single point over the default range.
    pub async fn fetch_series(
        &self,
        location: LatLng,
        fields: Vec<String>,
    ) -> Result<SourceSeries, EngineError> {
        let today = self.today();
        let (start_date, end_date) = self.merge.default_range(today);
        let request = SeriesRequest {
            location,
            start_date,
            end_date,
            fields,
        };
        self.merge.acquire(&request, today).await
    }

    /// Creates a region and runs its first acquisition to completion.
    ///
    /// Validation errors are returned before anything changes. An acquisition failure is
    /// reported in the outcome and the region stays with its neutral color.
    pub async fn create_region(&self, draft: RegionDraft) -> Result<CreateOutcome, EngineError> {
        let ticket = self.store.lock().await.create(draft)?;
        let region_id = ticket.region_id;
        let acquisition = self.acquire(ticket).await;
        Ok(CreateOutcome {
            region_id,
            acquisition,
        })
    }

    pub async fn refetch_region(&self, id: RegionId) -> Result<IngestOutcome, EngineError> {
        let ticket = self.store.lock().await.refetch(id)?;
        self.acquire(ticket).await
    }

    pub async fn set_window(&self, start: usize, end: usize) -> Result<TemporalWindow, EngineError> {
        self.store.lock().await.set_window(start, end)
    }

    pub async fn update_region(&self, id: RegionId, patch: RegionPatch) -> Result<Region, EngineError> {
        self.store.lock().await.update(id, patch)
    }

    pub async fn delete_region(&self, id: RegionId) -> Result<Region, EngineError> {
        self.store.lock().await.delete(id)
    }

    pub async fn select_region(&self, id: Option<RegionId>) -> Result<(), EngineError> {
        let mut store = self.store.lock().await;
        match id {
            Some(id) => store.select(id),
            None => {
                store.deselect();
                Ok(())
            }
        }
    }

    /// A drawing controller that posts its idle timeouts to `inputs`.
    pub fn drawing_controller(&self, inputs: &UnboundedSender<DrawingInput>) -> DrawingController {
        DrawingController::new(self.auto_finalize_delay, inputs)
    }

    /// Drives `controller` from `inputs` until every sender is dropped.
    ///
    /// Each finalized polygon is passed to `namer`; `None` discards it, a name creates a region.
    /// Acquisitions run on their own tasks so drawing continues while they are in flight; they
    /// are awaited once the input closes. Returns the ids of the regions created.
    pub async fn run_drawing<F>(
        &self,
        mut controller: DrawingController,
        mut inputs: UnboundedReceiver<DrawingInput>,
        mut namer: F,
    ) -> Vec<RegionId>
    where
        F: FnMut(&Geometry) -> Option<String>,
    {
        let mut created = Vec::new();
        let mut acquisitions = Vec::new();
        while let Some(input) = inputs.recv().await {
            let DrawingOutcome::Finalized { geometry, .. } = controller.handle(input) else {
                continue;
            };
            let Some(name) = namer(&geometry) else {
                tracing::info!(vertices = geometry.vertices().len(), "Polygon discarded without a name.");
                continue;
            };
            let draft = RegionDraft {
                name,
                vertices: geometry.into_vertices(),
            };
            let ticket = match self.store.lock().await.create(draft) {
                Ok(ticket) => ticket,
                Err(e) => {
                    tracing::warn!(error = %e, "Rejected drawn region.");
                    continue;
                }
            };
            created.push(ticket.region_id);

            let session = self.clone();
            acquisitions.push(tokio::spawn(async move {
                let region_id = ticket.region_id;
                (region_id, session.acquire(ticket).await)
            }));
        }
        controller.teardown();
        tracing::debug!(created = created.len(), "Drawing input closed.");

        for handle in acquisitions {
            match handle.await {
                Ok((region_id, Err(e))) => {
                    tracing::warn!(region_id = %region_id, error = %e, "Region created without a series.");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Acquisition task did not complete."),
            }
        }
        created
    }

    async fn acquire(&self, ticket: AcquisitionTicket) -> Result<IngestOutcome, EngineError> {
        let today = self.today();
        let (start_date, end_date) = self.merge.default_range(today);
        let request = SeriesRequest {
            location: ticket.location,
            start_date,
            end_date,
            fields: ticket.fields.clone(),
        };

        match self.merge.acquire(&request, today).await {
            Ok(source) => self.store.lock().await.ingest_series(&ticket, source.series),
            Err(e) => {
                self.store
                    .lock()
                    .await
                    .fail_acquisition(&ticket, &e.to_string());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingSource, FakeSource, date, square};
    use api_client::error::ApiError;
    use async_trait::async_trait;
    use core_types::{Color, CoreError};
    use tokio::sync::{Semaphore, mpsc};

    /// Holds each request until a permit is added to `gate`.
    struct GatedSource {
        inner: FakeSource,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl MetricSource for GatedSource {
        fn name(&self) -> &str {
            self.inner.name()
        }

        async fn fetch_hourly(&self, request: &SeriesRequest) -> Result<SourceSeries, ApiError> {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            self.inner.fetch_hourly(request).await
        }
    }

    fn session(retrospective: Arc<dyn MetricSource>, forward: Arc<dyn MetricSource>) -> Session {
        Session::with_sources(&Config::default(), retrospective, forward)
            .unwrap()
            .with_clock(|| date(2024, 3, 16))
    }

    fn draft(name: &str) -> RegionDraft {
        RegionDraft {
            name: name.to_string(),
            vertices: square(4),
        }
    }

    #[tokio::test]
    async fn create_region_acquires_both_halves_and_classifies() {
        let archive = Arc::new(FakeSource::new("archive", 8.0));
        let forecast = Arc::new(FakeSource::new("forecast", 30.0));
        let session = session(archive.clone(), forecast.clone());

        let outcome = session.create_region(draft("R1")).await.unwrap();
        let IngestOutcome::Applied(classification) = outcome.acquisition.unwrap() else {
            panic!("series was not applied");
        };
        // The default window [0, 24] lies entirely in the retrospective half.
        assert_eq!(classification.value, Some(8.0));
        assert_eq!(classification.color.as_str(), Color::COLD);

        assert_eq!(archive.calls(), vec![(date(2024, 3, 1), date(2024, 3, 15))]);
        assert_eq!(forecast.calls(), vec![(date(2024, 3, 16), date(2024, 3, 31))]);

        session.set_window(0, 720).await.unwrap();
        let store = session.store().lock().await;
        assert_eq!(store.series(outcome.region_id).unwrap().len(), 31 * 24);
        let value = store.current_value(outcome.region_id).unwrap();
        assert!(value > 8.0 && value < 25.0);
        assert_eq!(
            store.region(outcome.region_id).unwrap().current_color.as_str(),
            Color::MODERATE
        );
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn failed_acquisition_keeps_the_region_neutral() {
        let session = session(
            Arc::new(FakeSource::new("archive", 8.0)),
            Arc::new(FailingSource::new("forecast")),
        );
        let mut rx = session.subscribe().await;

        let outcome = session.create_region(draft("R1")).await.unwrap();
        assert!(matches!(outcome.acquisition, Err(EngineError::Acquisition { .. })));

        let store = session.store().lock().await;
        let region = store.region(outcome.region_id).unwrap();
        assert_eq!(region.current_color, Color::neutral());
        assert!(store.series(outcome.region_id).is_none());
        assert!(!store.is_loading());
        drop(store);

        let mut saw_failure = false;
        while let Ok(event) = rx.try_recv() {
            saw_failure |= matches!(event, StoreEvent::AcquisitionFailed(_));
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn invalid_draft_is_rejected_before_any_fetch() {
        let archive = Arc::new(FakeSource::new("archive", 8.0));
        let session = session(archive.clone(), Arc::new(FakeSource::new("forecast", 8.0)));

        let err = session
            .create_region(RegionDraft {
                name: "R1".to_string(),
                vertices: square(2),
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(matches!(err, EngineError::Validation(CoreError::VertexCount { .. })));
        assert!(archive.calls().is_empty());
        assert!(session.store().lock().await.regions().is_empty());
    }

    #[tokio::test]
    async fn result_for_a_region_deleted_mid_flight_is_discarded() {
        let gate = Arc::new(Semaphore::new(0));
        let forecast = Arc::new(GatedSource {
            inner: FakeSource::new("forecast", 30.0),
            gate: gate.clone(),
        });
        let session = session(Arc::new(FakeSource::new("archive", 8.0)), forecast);

        let worker = session.clone();
        let pending = tokio::spawn(async move { worker.create_region(draft("R1")).await });

        // The store stays usable while the fetch is parked.
        let id = loop {
            if let Some(region) = session.store().lock().await.regions().first() {
                break region.id;
            }
            tokio::task::yield_now().await;
        };
        session.select_region(Some(id)).await.unwrap();
        session.delete_region(id).await.unwrap();
        assert_eq!(session.store().lock().await.selected(), None);

        gate.add_permits(1);
        let outcome = pending.await.unwrap().unwrap();
        assert_eq!(outcome.region_id, id);
        assert!(matches!(outcome.acquisition, Ok(IngestOutcome::RegionGone)));
        assert!(session.store().lock().await.regions().is_empty());
    }

    #[tokio::test]
    async fn refetch_replaces_the_series() {
        let session = session(
            Arc::new(FakeSource::new("archive", 12.0)),
            Arc::new(FakeSource::new("forecast", 12.0)),
        );
        let outcome = session.create_region(draft("R1")).await.unwrap();
        let refreshed = session.refetch_region(outcome.region_id).await.unwrap();
        assert!(matches!(refreshed, IngestOutcome::Applied(_)));

        let missing = session.refetch_region(RegionId::new()).await;
        assert!(matches!(missing, Err(EngineError::RegionNotFound(_))));
    }

    #[tokio::test]
    async fn run_drawing_names_and_creates_finalized_polygons() {
        let session = session(
            Arc::new(FakeSource::new("archive", 8.0)),
            Arc::new(FakeSource::new("forecast", 8.0)),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = session.drawing_controller(&tx);

        for _ in 0..2 {
            tx.send(DrawingInput::Start).unwrap();
            for point in square(3) {
                tx.send(DrawingInput::Point(point)).unwrap();
            }
            tx.send(DrawingInput::DoubleCommit).unwrap();
        }
        drop(tx);

        // The first polygon is named, the second is dismissed.
        let mut names = vec![None, Some("Drawn".to_string())];
        let created = session
            .run_drawing(controller, rx, |_| names.pop().flatten())
            .await;

        assert_eq!(created.len(), 1);
        let store = session.store().lock().await;
        assert_eq!(store.regions().len(), 1);
        assert_eq!(store.regions()[0].name, "Drawn");
        assert_eq!(store.regions()[0].vertices.len(), 3);
    }

    #[tokio::test]
    async fn drawing_continues_while_an_acquisition_is_in_flight() {
        let gate = Arc::new(Semaphore::new(0));
        let forecast = Arc::new(GatedSource {
            inner: FakeSource::new("forecast", 30.0),
            gate: gate.clone(),
        });
        let session = session(Arc::new(FakeSource::new("archive", 8.0)), forecast);
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = session.drawing_controller(&tx);

        for _ in 0..2 {
            tx.send(DrawingInput::Start).unwrap();
            for point in square(3) {
                tx.send(DrawingInput::Point(point)).unwrap();
            }
            tx.send(DrawingInput::DoubleCommit).unwrap();
        }
        drop(tx);

        let worker = session.clone();
        let driver = tokio::spawn(async move {
            worker
                .run_drawing(controller, rx, |_| Some("Drawn".to_string()))
                .await
        });

        // Both polygons become regions while the first fetch is still parked.
        for _ in 0..200 {
            if session.store().lock().await.regions().len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        {
            let store = session.store().lock().await;
            assert_eq!(store.regions().len(), 2);
            assert!(store.is_loading());
            assert!(store.regions().iter().all(|r| store.series(r.id).is_none()));
        }

        gate.add_permits(2);
        let created = driver.await.unwrap();
        assert_eq!(created.len(), 2);
        let store = session.store().lock().await;
        assert!(created.iter().all(|id| store.series(*id).is_some()));
        assert!(!store.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_finalizes_through_run_drawing() {
        let session = session(
            Arc::new(FakeSource::new("archive", 8.0)),
            Arc::new(FakeSource::new("forecast", 8.0)),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = session.drawing_controller(&tx);

        let worker = session.clone();
        let driver = tokio::spawn(async move {
            worker
                .run_drawing(controller, rx, |_| Some("Idle".to_string()))
                .await
        });

        tx.send(DrawingInput::Start).unwrap();
        for point in square(5) {
            tx.send(DrawingInput::Point(point)).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(session.store().lock().await.regions().len(), 1);

        drop(tx);
        let created = driver.await.unwrap();
        assert_eq!(created.len(), 1);
    }
}
