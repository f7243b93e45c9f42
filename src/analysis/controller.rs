// Analysis readiness controller
// Owns the at-most-once generation guard and the single retry timer for one
// mounted incident view.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::readiness::{
    analysis_skipped, empty_lookup_action, EmptyLookupAction, FailureReason, ReadinessState,
};
use crate::api::{ApiError, PredictionSource};
use crate::models::Incident;

/// Delay before the single convenience re-check after requesting generation
pub const RETRY_DELAY: Duration = Duration::from_secs(30);

/// Inputs identifying the incident a controller is mounted on
#[derive(Debug, Clone, PartialEq)]
pub struct IncidentInputs {
    pub incident_id: u64,
    pub classification: String,
    pub image_url: Option<String>,
}

impl IncidentInputs {
    fn has_image(&self) -> bool {
        self.image_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}

impl From<&Incident> for IncidentInputs {
    fn from(incident: &Incident) -> Self {
        Self {
            incident_id: incident.id,
            classification: incident.type_incident.clone().unwrap_or_default(),
            image_url: incident.photo.clone(),
        }
    }
}

/// Tracks whether the analysis report for one incident exists, is in flight,
/// or has failed, and publishes the current [`ReadinessState`] to the
/// presentation layer through a watch channel.
///
/// One controller per mounted view. Generation is requested at most once per
/// controller lifetime; the retry timer is a one-shot convenience poll, not a
/// resilience mechanism.
pub struct ReadinessController {
    inputs: Mutex<IncidentInputs>,
    source: Arc<dyn PredictionSource>,
    state_tx: watch::Sender<ReadinessState>,
    generation_sent: AtomicBool,
    // Bumped on input change and disposal so in-flight lookups cannot apply
    // stale results
    epoch: AtomicU64,
    disposed: AtomicBool,
    retry: Mutex<Option<JoinHandle<()>>>,
    retry_delay: Duration,
    weak_self: Weak<ReadinessController>,
}

impl ReadinessController {
    pub fn mount(inputs: IncidentInputs, source: Arc<dyn PredictionSource>) -> Arc<Self> {
        Self::mount_with_delay(inputs, source, RETRY_DELAY)
    }

    pub fn mount_with_delay(
        inputs: IncidentInputs,
        source: Arc<dyn PredictionSource>,
        retry_delay: Duration,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ReadinessState::Checking);

        Arc::new_cyclic(|weak| Self {
            inputs: Mutex::new(inputs),
            source,
            state_tx,
            generation_sent: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
            retry: Mutex::new(None),
            retry_delay,
            weak_self: weak.clone(),
        })
    }

    /// Current readiness state
    pub fn state(&self) -> ReadinessState {
        self.state_tx.borrow().clone()
    }

    /// Watch receiver for the presentation layer to await state changes
    pub fn subscribe(&self) -> watch::Receiver<ReadinessState> {
        self.state_tx.subscribe()
    }

    pub fn generation_requested(&self) -> bool {
        self.generation_sent.load(Ordering::SeqCst)
    }

    /// Run one pass of the readiness state machine. Invoked on mount, after
    /// [`update_incident`](Self::update_incident), and once by the retry
    /// timer. A no-op once the state is terminal or the controller disposed.
    pub async fn evaluate(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        if self.state().is_terminal() {
            return;
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let (incident_id, classification, has_image) = {
            let inputs = self.inputs.lock();
            (
                inputs.incident_id,
                inputs.classification.clone(),
                inputs.has_image(),
            )
        };

        if analysis_skipped(&classification) {
            debug!(
                "Incident {}: classification '{}' needs no analysis",
                incident_id, classification
            );
            self.transition(epoch, ReadinessState::Skipped);
            return;
        }

        // Keep AwaitingGeneration visible while the convenience poll re-checks
        if !matches!(self.state(), ReadinessState::AwaitingGeneration) {
            self.transition(epoch, ReadinessState::Checking);
        }

        let lookup = {
            let source = Arc::clone(&self.source);
            self.run_blocking(move || source.fetch_prediction(incident_id))
                .await
        };

        if self.is_stale(epoch) {
            debug!("Incident {}: discarding stale lookup result", incident_id);
            return;
        }

        match lookup {
            Ok(Some(prediction)) => {
                debug!("Incident {}: report available", incident_id);
                self.transition(epoch, ReadinessState::Ready { prediction });
            }
            Ok(None) => self.handle_empty_lookup(epoch, incident_id, has_image).await,
            Err(e) => {
                warn!("Incident {}: prediction lookup failed: {}", incident_id, e);
                self.transition(
                    epoch,
                    ReadinessState::Failed {
                        reason: FailureReason::Lookup,
                    },
                );
            }
        }
    }

    /// Point the controller at different incident inputs. Cancels the pending
    /// retry, invalidates in-flight lookups and resets the published state;
    /// the caller re-runs [`evaluate`](Self::evaluate). The generation guard
    /// deliberately persists for the controller lifetime.
    pub fn update_incident(&self, inputs: IncidentInputs) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.cancel_retry();
        *self.inputs.lock() = inputs;
        self.state_tx.send_replace(ReadinessState::Checking);
    }

    /// Tear the controller down. Cancels the retry timer and suppresses any
    /// state transition from responses still in flight.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.cancel_retry();
        debug!("Readiness controller disposed");
    }

    async fn handle_empty_lookup(&self, epoch: u64, incident_id: u64, has_image: bool) {
        let action = empty_lookup_action(has_image, self.generation_sent.load(Ordering::SeqCst));

        match action {
            EmptyLookupAction::KeepWaiting => {
                debug!("Incident {}: report still pending", incident_id);
                self.transition(epoch, ReadinessState::AwaitingGeneration);
            }
            EmptyLookupAction::FailMissingImage => {
                warn!(
                    "Incident {}: no source image, generation not requested",
                    incident_id
                );
                self.transition(
                    epoch,
                    ReadinessState::Failed {
                        reason: FailureReason::MissingImage,
                    },
                );
            }
            EmptyLookupAction::RequestGeneration => {
                // Set the guard before the outcome is known so a failure can
                // never be followed by a second request
                if self.generation_sent.swap(true, Ordering::SeqCst) {
                    self.transition(epoch, ReadinessState::AwaitingGeneration);
                    return;
                }

                let result = {
                    let source = Arc::clone(&self.source);
                    self.run_blocking(move || source.request_generation(incident_id))
                        .await
                };

                if self.is_stale(epoch) {
                    return;
                }

                match result {
                    Ok(()) => {
                        debug!(
                            "Incident {}: generation requested, re-checking in {:?}",
                            incident_id, self.retry_delay
                        );
                        self.arm_retry(epoch, incident_id);
                        self.transition(epoch, ReadinessState::AwaitingGeneration);
                    }
                    Err(e) => {
                        warn!(
                            "Incident {}: generation request failed: {}",
                            incident_id, e
                        );
                        self.transition(
                            epoch,
                            ReadinessState::Failed {
                                reason: FailureReason::Generation,
                            },
                        );
                    }
                }
            }
        }
    }

    /// Arm the one-shot convenience poll, replacing any previous timer
    fn arm_retry(&self, epoch: u64, incident_id: u64) {
        let weak = self.weak_self.clone();
        let delay = self.retry_delay;

        let mut slot = self.retry.lock();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let Some(controller) = weak.upgrade() else {
                return;
            };
            if controller.is_stale(epoch) {
                return;
            }
            debug!("Incident {}: retry timer fired", incident_id);
            controller.evaluate().await;
        }));
    }

    fn cancel_retry(&self) {
        if let Some(handle) = self.retry.lock().take() {
            handle.abort();
        }
    }

    fn is_stale(&self, epoch: u64) -> bool {
        self.disposed.load(Ordering::SeqCst) || self.epoch.load(Ordering::SeqCst) != epoch
    }

    fn transition(&self, epoch: u64, next: ReadinessState) {
        if self.is_stale(epoch) {
            return;
        }
        if next.is_terminal() {
            self.cancel_retry();
        }
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            debug!("Readiness state: {:?} -> {:?}", state, next);
            *state = next;
            true
        });
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    {
        match tokio::task::spawn_blocking(f).await {
            Ok(result) => result,
            Err(e) => Err(ApiError::Transport(format!("worker task failed: {}", e))),
        }
    }
}

impl Drop for ReadinessController {
    fn drop(&mut self) {
        self.cancel_retry();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Prediction;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    struct ScriptedSource {
        lookups: Mutex<VecDeque<Result<Option<Prediction>, ApiError>>>,
        fetch_calls: AtomicUsize,
        generation_calls: AtomicUsize,
        generation_ok: bool,
        fetch_gate: Option<Arc<AtomicBool>>,
    }

    impl ScriptedSource {
        fn new(lookups: Vec<Result<Option<Prediction>, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                lookups: Mutex::new(lookups.into()),
                fetch_calls: AtomicUsize::new(0),
                generation_calls: AtomicUsize::new(0),
                generation_ok: true,
                fetch_gate: None,
            })
        }

        fn failing_generation(lookups: Vec<Result<Option<Prediction>, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                lookups: Mutex::new(lookups.into()),
                fetch_calls: AtomicUsize::new(0),
                generation_calls: AtomicUsize::new(0),
                generation_ok: false,
                fetch_gate: None,
            })
        }

        fn gated(lookups: Vec<Result<Option<Prediction>, ApiError>>) -> (Arc<Self>, Arc<AtomicBool>) {
            let gate = Arc::new(AtomicBool::new(false));
            let source = Arc::new(Self {
                lookups: Mutex::new(lookups.into()),
                fetch_calls: AtomicUsize::new(0),
                generation_calls: AtomicUsize::new(0),
                generation_ok: true,
                fetch_gate: Some(gate.clone()),
            });
            (source, gate)
        }

        fn fetches(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }

        fn generations(&self) -> usize {
            self.generation_calls.load(Ordering::SeqCst)
        }
    }

    impl PredictionSource for ScriptedSource {
        fn fetch_prediction(&self, _incident_id: u64) -> Result<Option<Prediction>, ApiError> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.fetch_gate {
                while !gate.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
            self.lookups.lock().pop_front().unwrap_or(Ok(None))
        }

        fn request_generation(&self, _incident_id: u64) -> Result<(), ApiError> {
            self.generation_calls.fetch_add(1, Ordering::SeqCst);
            if self.generation_ok {
                Ok(())
            } else {
                Err(ApiError::Transport("analysis service unavailable".into()))
            }
        }
    }

    fn inputs(incident_id: u64, classification: &str, image: Option<&str>) -> IncidentInputs {
        IncidentInputs {
            incident_id,
            classification: classification.to_string(),
            image_url: image.map(String::from),
        }
    }

    fn report(text: &str) -> Prediction {
        Prediction {
            incident_id: Some(42),
            analysis: Some(text.to_string()),
            ..Prediction::default()
        }
    }

    #[tokio::test]
    async fn test_sentinel_classification_skips_without_network() {
        let source = ScriptedSource::new(vec![]);
        let controller = ReadinessController::mount(
            inputs(7, "no environmental issue", Some("/photo.jpg")),
            source.clone(),
        );

        controller.evaluate().await;

        assert_eq!(controller.state(), ReadinessState::Skipped);
        assert_eq!(source.fetches(), 0);
        assert_eq!(source.generations(), 0);

        // Terminal: further passes stay silent
        controller.evaluate().await;
        assert_eq!(source.fetches(), 0);
    }

    #[tokio::test]
    async fn test_existing_report_goes_straight_to_ready() {
        let source = ScriptedSource::new(vec![Ok(Some(report("depot identifie")))]);
        let controller =
            ReadinessController::mount(inputs(42, "Pollution", Some("/photo.jpg")), source.clone());

        controller.evaluate().await;

        let state = controller.state();
        assert_eq!(
            state.prediction().and_then(|p| p.analysis.as_deref()),
            Some("depot identifie")
        );
        assert_eq!(source.generations(), 0);
    }

    #[tokio::test]
    async fn test_missing_image_fails_without_generation() {
        let source = ScriptedSource::new(vec![Ok(None)]);
        let controller = ReadinessController::mount(inputs(5, "Pollution", None), source.clone());

        controller.evaluate().await;

        assert_eq!(
            controller.state(),
            ReadinessState::Failed {
                reason: FailureReason::MissingImage
            }
        );
        assert_eq!(source.generations(), 0);
    }

    #[tokio::test]
    async fn test_empty_image_url_counts_as_missing() {
        let source = ScriptedSource::new(vec![Ok(None)]);
        let controller = ReadinessController::mount(inputs(5, "Pollution", Some("")), source.clone());

        controller.evaluate().await;

        assert_eq!(
            controller.state(),
            ReadinessState::Failed {
                reason: FailureReason::MissingImage
            }
        );
    }

    #[tokio::test]
    async fn test_lookup_error_fails_terminally() {
        let source =
            ScriptedSource::new(vec![Err(ApiError::Transport("connection refused".into()))]);
        let controller =
            ReadinessController::mount(inputs(9, "Pollution", Some("/photo.jpg")), source.clone());

        controller.evaluate().await;

        assert_eq!(
            controller.state(),
            ReadinessState::Failed {
                reason: FailureReason::Lookup
            }
        );
        assert_eq!(source.generations(), 0);

        controller.evaluate().await;
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_is_terminal_and_never_retried() {
        let source = ScriptedSource::failing_generation(vec![Ok(None), Ok(None)]);
        let controller =
            ReadinessController::mount(inputs(11, "Pollution", Some("/photo.jpg")), source.clone());

        controller.evaluate().await;

        assert_eq!(
            controller.state(),
            ReadinessState::Failed {
                reason: FailureReason::Generation
            }
        );
        assert_eq!(source.generations(), 1);

        controller.evaluate().await;
        assert_eq!(source.generations(), 1);
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_then_retry_reaches_ready() {
        // id 42, "Pollution", image present, lookup [] then a report:
        // Checking -> AwaitingGeneration -> Ready
        let source = ScriptedSource::new(vec![Ok(None), Ok(Some(report("analyse complete")))]);
        let controller = ReadinessController::mount_with_delay(
            inputs(42, "Pollution", Some("/photo.jpg")),
            source.clone(),
            Duration::from_secs(30),
        );
        let mut states = controller.subscribe();
        assert_eq!(*states.borrow_and_update(), ReadinessState::Checking);

        controller.evaluate().await;
        assert_eq!(controller.state(), ReadinessState::AwaitingGeneration);
        assert_eq!(source.generations(), 1);

        // The armed timer fires under paused time and re-evaluates once
        states
            .wait_for(|state| matches!(state, ReadinessState::Ready { .. }))
            .await
            .expect("controller dropped");

        assert_eq!(source.fetches(), 2);
        assert_eq!(source.generations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spent_retry_does_not_rearm() {
        let source = ScriptedSource::new(vec![Ok(None), Ok(None), Ok(None)]);
        let controller = ReadinessController::mount_with_delay(
            inputs(13, "Pollution", Some("/photo.jpg")),
            source.clone(),
            Duration::from_secs(30),
        );

        controller.evaluate().await;
        assert_eq!(source.fetches(), 1);

        // Let the one-shot poll fire, then give any (wrongly) re-armed timer
        // ample room
        tokio::time::sleep(Duration::from_secs(31)).await;
        while source.fetches() < 2 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(source.fetches(), 2);

        assert_eq!(controller.state(), ReadinessState::AwaitingGeneration);
        assert_eq!(source.generations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_reevaluation_never_duplicates_generation() {
        let source = ScriptedSource::new(vec![Ok(None), Ok(None), Ok(None), Ok(None)]);
        let controller = ReadinessController::mount_with_delay(
            inputs(13, "Pollution", Some("/photo.jpg")),
            source.clone(),
            Duration::from_secs(3600),
        );

        controller.evaluate().await;
        controller.evaluate().await;
        controller.evaluate().await;

        assert_eq!(source.generations(), 1);
        assert_eq!(controller.state(), ReadinessState::AwaitingGeneration);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_cancels_pending_retry() {
        let source = ScriptedSource::new(vec![Ok(None), Ok(Some(report("late")))]);
        let controller = ReadinessController::mount_with_delay(
            inputs(21, "Pollution", Some("/photo.jpg")),
            source.clone(),
            Duration::from_secs(30),
        );

        controller.evaluate().await;
        assert_eq!(controller.state(), ReadinessState::AwaitingGeneration);

        controller.dispose();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(source.fetches(), 1);
        assert_eq!(controller.state(), ReadinessState::AwaitingGeneration);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_late_lookup_response_ignored_after_dispose() {
        let (source, gate) = ScriptedSource::gated(vec![Ok(Some(report("too late")))]);
        let controller =
            ReadinessController::mount(inputs(33, "Pollution", Some("/photo.jpg")), source.clone());

        let running = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.evaluate().await })
        };

        // Wait for the lookup to be in flight, then dispose under it
        while source.fetches() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        controller.dispose();
        gate.store(true, Ordering::SeqCst);
        running.await.expect("evaluate task panicked");

        assert_eq!(controller.state(), ReadinessState::Checking);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_incident_cancels_retry_and_keeps_guard() {
        let source = ScriptedSource::new(vec![Ok(None), Ok(None)]);
        let controller = ReadinessController::mount_with_delay(
            inputs(1, "Pollution", Some("/photo.jpg")),
            source.clone(),
            Duration::from_secs(30),
        );

        controller.evaluate().await;
        assert_eq!(source.generations(), 1);

        controller.update_incident(inputs(2, "Pollution", Some("/other.jpg")));
        assert_eq!(controller.state(), ReadinessState::Checking);

        // The old timer must not fire for the new incident
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(source.fetches(), 1);

        // Fresh pass for the new incident: guard still set, so no second
        // generation request
        controller.evaluate().await;
        assert_eq!(source.fetches(), 2);
        assert_eq!(source.generations(), 1);
        assert_eq!(controller.state(), ReadinessState::AwaitingGeneration);
    }

    #[tokio::test]
    async fn test_inputs_from_incident_model() {
        let json = r#"{
            "id": 42,
            "title": "Depot",
            "etat": "declared",
            "type_incident": "Pollution",
            "photo": "/media/photos/42.jpg"
        }"#;
        let incident: Incident = serde_json::from_str(json).expect("fixture");
        let inputs = IncidentInputs::from(&incident);

        assert_eq!(inputs.incident_id, 42);
        assert_eq!(inputs.classification, "Pollution");
        assert!(inputs.has_image());
    }
}
