//! Validation service: cache lookup, source download, engine call, persist.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::types::{InputKind, ValidationError, ValidationOutcome, ValidationRequest};
use crate::cache_key::{CacheKey, KeyScheme};
use crate::config::{EngineConfig, StorageConfig};
use crate::engine::{EngineRequest, ValidationEngine};
use crate::fetcher::{FetchRequest, RemoteFetcher};
use crate::metrics::{VALIDATIONS_IN_FLIGHT, VALIDATIONS_TOTAL, VALIDATION_DURATION};
use crate::report::Report;
use crate::storage::{Namespace, NamespaceStore, ReportCache};

type InflightMap = StdMutex<HashMap<String, Arc<Mutex<()>>>>;

/// Validates remotely hosted models, at most once per cache key.
///
/// Concurrent requests for the same project and key serialize on a per-key
/// lock. The first one fetches and validates; the others find its report in
/// the cache once they get the lock.
pub struct ValidationService {
    namespaces: NamespaceStore,
    cache: ReportCache,
    fetcher: Arc<dyn RemoteFetcher>,
    engine: Arc<dyn ValidationEngine>,
    key_scheme: KeyScheme,
    default_ids_filename: String,
    delete_inputs: bool,
    inflight: InflightMap,
}

impl ValidationService {
    pub fn new(
        storage: &StorageConfig,
        engine_config: &EngineConfig,
        fetcher: Arc<dyn RemoteFetcher>,
        engine: Arc<dyn ValidationEngine>,
    ) -> Self {
        Self {
            namespaces: NamespaceStore::new(storage.uploads_dir.clone()),
            cache: ReportCache::new(),
            fetcher,
            engine,
            key_scheme: storage.key_scheme,
            default_ids_filename: engine_config.default_ids_filename.clone(),
            delete_inputs: storage.delete_inputs_after_validation,
            inflight: StdMutex::new(HashMap::new()),
        }
    }

    pub fn namespaces(&self) -> &NamespaceStore {
        &self.namespaces
    }

    /// Number of keys with a validation currently queued or running.
    pub fn inflight_count(&self) -> usize {
        lock_map(&self.inflight).len()
    }

    /// Return the report for `request`, validating it if not cached.
    pub async fn validate(
        &self,
        request: ValidationRequest,
    ) -> Result<ValidationOutcome, ValidationError> {
        let result = self.validate_inner(&request).await;
        let outcome = match &result {
            Ok(outcome) if outcome.cache_hit => "cache_hit",
            Ok(_) => "validated",
            Err(_) => "failed",
        };
        VALIDATIONS_TOTAL.with_label_values(&[outcome]).inc();

        if let Err(e) = &result {
            warn!(
                project_id = %request.project_id,
                filename = %request.filename,
                error = %e,
                kind = e.kind(),
                "Validation request failed"
            );
        }
        result
    }

    async fn validate_inner(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationOutcome, ValidationError> {
        request.check()?;
        let namespace = self.namespaces.resolve(&request.project_id)?;
        let key = request.cache_key(self.key_scheme);
        let format = request.report_type;

        if let Some(report) = self.cache.lookup(&namespace, &key, format).await? {
            info!(project_id = %request.project_id, key = %key, "Serving cached report");
            return Ok(ValidationOutcome {
                key,
                report,
                cache_hit: true,
            });
        }

        // Locked per key, not per format: both formats share the input files.
        let slot = InflightSlot::claim(&self.inflight, format!("{}/{}", namespace.project_id(), key));
        let _guard = slot.lock().lock().await;

        // Another caller may have finished while we waited.
        if let Some(report) = self.cache.lookup(&namespace, &key, format).await? {
            info!(key = %key, "Serving report computed by concurrent request");
            return Ok(ValidationOutcome {
                key,
                report,
                cache_hit: true,
            });
        }

        let start = Instant::now();
        let report = self.run_uncached(request, &key).await?;
        VALIDATION_DURATION.observe(start.elapsed().as_secs_f64());

        Ok(ValidationOutcome {
            key,
            report,
            cache_hit: false,
        })
    }

    /// Fetch, validate and persist. Must be called with the key's lock held.
    async fn run_uncached(
        &self,
        request: &ValidationRequest,
        key: &CacheKey,
    ) -> Result<Report, ValidationError> {
        let namespace = self.namespaces.ensure(&request.project_id).await?;
        let mut inputs = Vec::new();
        let engine_output =
            namespace.artifact_path(key, request.report_type.engine_output_extension());

        let result = self
            .fetch_and_validate(request, &namespace, key, &engine_output, &mut inputs)
            .await;

        // The report travels in the engine's answer; its output file is not kept.
        self.remove_inputs(std::slice::from_ref(&engine_output)).await;

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                self.remove_inputs(&inputs).await;
                return Err(e);
            }
        };

        if let Err(e) = self
            .cache
            .write(&namespace, key, request.report_type, &report)
            .await
        {
            self.remove_inputs(&inputs).await;
            return Err(e.into());
        }

        if self.delete_inputs {
            self.remove_inputs(&inputs).await;
        }

        info!(
            project_id = %request.project_id,
            key = %key,
            format = request.report_type.as_str(),
            total = ?report.total_specifications,
            passed = ?report.passed_specifications,
            "Validation complete"
        );
        Ok(report)
    }

    async fn fetch_and_validate(
        &self,
        request: &ValidationRequest,
        namespace: &Namespace,
        key: &CacheKey,
        engine_output: &Path,
        inputs: &mut Vec<PathBuf>,
    ) -> Result<Report, ValidationError> {
        let model = self
            .fetcher
            .fetch(&FetchRequest::interactive(&request.download_link))
            .await
            .map_err(|source| ValidationError::Fetch {
                input: InputKind::Model,
                source,
            })?;
        let model_path = self
            .namespaces
            .write_artifact(namespace, key, &request.model_extension(), &model.bytes)
            .await?;
        inputs.push(model_path.clone());

        let ids_filename = match &request.ids_download_link {
            Some(link) => {
                let spec = self
                    .fetcher
                    .fetch(&FetchRequest::interactive(link))
                    .await
                    .map_err(|source| ValidationError::Fetch {
                        input: InputKind::Specification,
                        source,
                    })?;
                let spec_path = self
                    .namespaces
                    .write_artifact(namespace, key, &request.spec_extension(), &spec.bytes)
                    .await?;
                inputs.push(spec_path.clone());
                path_string(&spec_path)
            }
            None => self.default_ids_filename.clone(),
        };

        let engine_request = EngineRequest {
            ifc_filename: path_string(&model_path),
            ids_filename,
            output_filename: path_string(engine_output),
            report_type: request.report_type,
            project_id: request.project_id.clone(),
        };
        debug!(engine = self.engine.name(), ?engine_request, "Invoking validation engine");

        Ok(self.engine.validate(&engine_request).await?)
    }

    async fn remove_inputs(&self, inputs: &[PathBuf]) {
        for path in inputs {
            if let Err(e) = self.namespaces.remove_artifact(path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove transient file");
            }
        }
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn lock_map(map: &InflightMap) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Membership in the in-flight map for one key.
///
/// Dropping the last slot for a key removes the key from the map, including
/// when the owning request future is cancelled.
struct InflightSlot<'a> {
    map: &'a InflightMap,
    id: String,
    // Only `None` while dropping.
    lock: Option<Arc<Mutex<()>>>,
}

impl<'a> InflightSlot<'a> {
    fn claim(map: &'a InflightMap, id: String) -> Self {
        let mut entries = lock_map(map);
        let lock = match entries.get(&id) {
            Some(lock) => Arc::clone(lock),
            None => {
                let lock = Arc::new(Mutex::new(()));
                entries.insert(id.clone(), Arc::clone(&lock));
                VALIDATIONS_IN_FLIGHT.inc();
                lock
            }
        };
        Self {
            map,
            id,
            lock: Some(lock),
        }
    }

    fn lock(&self) -> &Mutex<()> {
        match &self.lock {
            Some(lock) => lock,
            None => unreachable!("in-flight lock released before drop"),
        }
    }
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        let mut entries = lock_map(self.map);
        // Release this slot's reference while the map is locked, so the last
        // of several concurrent droppers always sees itself as last.
        drop(self.lock.take());
        let unused = entries
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if unused {
            entries.remove(&self.id);
            VALIDATIONS_IN_FLIGHT.dec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::fetcher::{FetchError, FetchedPayload};
    use crate::report::ReportFormat;
    use crate::testing::{fixtures, MockEngine, MockFetcher};
    use std::time::Duration;
    use tempfile::TempDir;

    const MODEL_URL: &str = "https://host/a.ifc";
    const SPEC_URL: &str = "https://host/spec.ids";

    struct Harness {
        _dir: TempDir,
        root: PathBuf,
        fetcher: Arc<MockFetcher>,
        engine: Arc<MockEngine>,
        service: ValidationService,
    }

    fn harness_with(delete_inputs: bool) -> Harness {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("uploads");
        let fetcher = Arc::new(MockFetcher::new());
        let engine = Arc::new(MockEngine::new());
        let storage = StorageConfig {
            uploads_dir: root.clone(),
            delete_inputs_after_validation: delete_inputs,
            ..Default::default()
        };
        let service = ValidationService::new(
            &storage,
            &EngineConfig::default(),
            Arc::clone(&fetcher) as Arc<dyn RemoteFetcher>,
            Arc::clone(&engine) as Arc<dyn ValidationEngine>,
        );
        Harness {
            _dir: dir,
            root,
            fetcher,
            engine,
            service,
        }
    }

    fn harness() -> Harness {
        harness_with(true)
    }

    fn list(root: &Path, project: &str) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(root.join(project)) {
            Ok(entries) => entries
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => Vec::new(),
        };
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_fresh_validation_persists_report() {
        let h = harness();
        h.fetcher.set_response(MODEL_URL, fixtures::ifc_payload()).await;

        let outcome = h
            .service
            .validate(fixtures::validation_request("p1", MODEL_URL, "a.ifc"))
            .await
            .unwrap();

        assert!(!outcome.cache_hit);
        assert_eq!(outcome.key.as_str(), "a_ifc_2024_01_01_100");
        assert_eq!(outcome.report.total_specifications, Some(4));
        assert_eq!(list(&h.root, "p1"), vec!["a_ifc_2024_01_01_100.json"]);

        let requests = h.engine.recorded_requests().await;
        assert_eq!(requests.len(), 1);
        let root = h.root.to_string_lossy();
        assert_eq!(
            requests[0].ifc_filename,
            format!("{}/p1/a_ifc_2024_01_01_100.ifc", root)
        );
        assert_eq!(requests[0].ids_filename, "ARK.ids");
        assert_eq!(
            requests[0].output_filename,
            format!("{}/p1/a_ifc_2024_01_01_100.engine.json", root)
        );
        assert_eq!(requests[0].project_id, "p1");
        assert_eq!(requests[0].report_type, ReportFormat::Json);
    }

    #[tokio::test]
    async fn test_second_request_is_cache_hit() {
        let h = harness();
        h.fetcher.set_response(MODEL_URL, fixtures::ifc_payload()).await;
        let request = fixtures::validation_request("p1", MODEL_URL, "a.ifc");

        let first = h.service.validate(request.clone()).await.unwrap();
        let second = h.service.validate(request).await.unwrap();

        assert!(second.cache_hit);
        assert_eq!(first.report, second.report);
        assert_eq!(h.fetcher.fetch_count().await, 1);
        assert_eq!(h.engine.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_inputs_kept_when_configured() {
        let h = harness_with(false);
        h.fetcher.set_response(MODEL_URL, fixtures::ifc_payload()).await;

        h.service
            .validate(fixtures::validation_request("p1", MODEL_URL, "a.ifc"))
            .await
            .unwrap();

        assert_eq!(
            list(&h.root, "p1"),
            vec!["a_ifc_2024_01_01_100.ifc", "a_ifc_2024_01_01_100.json"]
        );
    }

    #[tokio::test]
    async fn test_model_fetch_failure_skips_engine() {
        let h = harness();
        h.fetcher
            .set_error(
                MODEL_URL,
                FetchError::Status {
                    status: 404,
                    url: MODEL_URL.to_string(),
                },
            )
            .await;

        let err = h
            .service
            .validate(fixtures::validation_request("p1", MODEL_URL, "a.ifc"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Failed to download the file");
        assert!(err.is_caller_error());
        assert_eq!(h.engine.call_count().await, 0);
        assert!(list(&h.root, "p1").is_empty());
    }

    #[tokio::test]
    async fn test_spec_fetch_failure_removes_model() {
        let h = harness_with(false);
        h.fetcher.set_response(MODEL_URL, fixtures::ifc_payload()).await;
        let mut request = fixtures::validation_request("p1", MODEL_URL, "a.ifc");
        request.ids_download_link = Some(SPEC_URL.to_string());

        let err = h.service.validate(request).await.unwrap_err();

        assert!(matches!(
            err,
            ValidationError::Fetch {
                input: InputKind::Specification,
                ..
            }
        ));
        assert_eq!(h.engine.call_count().await, 0);
        assert!(list(&h.root, "p1").is_empty());
    }

    #[tokio::test]
    async fn test_supplied_spec_is_stored_and_passed_to_engine() {
        let h = harness_with(false);
        h.fetcher.set_response(MODEL_URL, fixtures::ifc_payload()).await;
        h.fetcher.set_response(SPEC_URL, fixtures::ids_payload()).await;
        let mut request = fixtures::validation_request("p1", MODEL_URL, "a.ifc");
        request.ids_download_link = Some(SPEC_URL.to_string());

        let outcome = h.service.validate(request).await.unwrap();
        assert_eq!(outcome.key.as_str(), "a_ifc_spec_ids_2024_01_01_100");

        let requests = h.engine.recorded_requests().await;
        assert!(requests[0]
            .ids_filename
            .ends_with("/p1/a_ifc_spec_ids_2024_01_01_100.ids"));
        assert_eq!(
            list(&h.root, "p1"),
            vec![
                "a_ifc_spec_ids_2024_01_01_100.ids",
                "a_ifc_spec_ids_2024_01_01_100.ifc",
                "a_ifc_spec_ids_2024_01_01_100.json",
            ]
        );
    }

    #[tokio::test]
    async fn test_engine_failure_writes_nothing() {
        let h = harness_with(false);
        h.fetcher.set_response(MODEL_URL, fixtures::ifc_payload()).await;
        h.engine
            .fail_next(EngineError::Status {
                status: 500,
                message: "IDS file ARK.ids not found".to_string(),
            })
            .await;
        let request = fixtures::validation_request("p1", MODEL_URL, "a.ifc");

        let err = h.service.validate(request.clone()).await.unwrap_err();
        assert_eq!(err.kind(), "engine_error");
        assert!(list(&h.root, "p1").is_empty());

        // Not cached: the retry reaches the engine again
        let outcome = h.service.validate(request).await.unwrap();
        assert!(!outcome.cache_hit);
        assert_eq!(h.engine.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_invalid_project_id_rejected_before_fetch() {
        let h = harness();
        let err = h
            .service
            .validate(fixtures::validation_request("../etc", MODEL_URL, "a.ifc"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "invalid_request");
        assert_eq!(h.fetcher.fetch_count().await, 0);
    }

    #[tokio::test]
    async fn test_projects_are_isolated() {
        let h = harness();
        h.fetcher.set_response(MODEL_URL, fixtures::ifc_payload()).await;

        h.service
            .validate(fixtures::validation_request("p1", MODEL_URL, "a.ifc"))
            .await
            .unwrap();
        let other = h
            .service
            .validate(fixtures::validation_request("p2", MODEL_URL, "a.ifc"))
            .await
            .unwrap();

        assert!(!other.cache_hit);
        assert_eq!(h.engine.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_engine_call() {
        let h = harness();
        h.fetcher.set_response(MODEL_URL, fixtures::ifc_payload()).await;
        h.engine.set_delay(Duration::from_millis(100)).await;
        let request = fixtures::validation_request("p1", MODEL_URL, "a.ifc");

        let results = futures::future::join_all(
            (0..5).map(|_| h.service.validate(request.clone())),
        )
        .await;

        let outcomes: Vec<_> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(outcomes.iter().filter(|o| !o.cache_hit).count(), 1);
        assert_eq!(h.engine.call_count().await, 1);
        assert_eq!(h.fetcher.fetch_count().await, 1);
        assert_eq!(h.service.inflight_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_request_releases_lock() {
        let h = harness();
        h.fetcher.set_response(MODEL_URL, fixtures::ifc_payload()).await;
        h.engine.set_delay(Duration::from_millis(200)).await;
        let request = fixtures::validation_request("p1", MODEL_URL, "a.ifc");

        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            h.service.validate(request.clone()),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(h.service.inflight_count(), 0);
        assert!(!list(&h.root, "p1").iter().any(|n| n.ends_with(".json")));

        let outcome = h.service.validate(request).await.unwrap();
        assert!(!outcome.cache_hit);
    }

    #[tokio::test]
    async fn test_corrupt_cached_report_is_replaced() {
        let h = harness();
        h.fetcher.set_response(MODEL_URL, fixtures::ifc_payload()).await;
        std::fs::create_dir_all(h.root.join("p1")).unwrap();
        std::fs::write(h.root.join("p1/a_ifc_2024_01_01_100.json"), b"{trunc").unwrap();

        let outcome = h
            .service
            .validate(fixtures::validation_request("p1", MODEL_URL, "a.ifc"))
            .await
            .unwrap();
        assert!(!outcome.cache_hit);

        let stored = std::fs::read(h.root.join("p1/a_ifc_2024_01_01_100.json")).unwrap();
        let stored: Report = serde_json::from_slice(&stored).unwrap();
        assert_eq!(stored, outcome.report);
    }

    #[tokio::test]
    async fn test_html_report_type_forwarded() {
        let h = harness();
        h.fetcher
            .set_response(MODEL_URL, FetchedPayload::new(b"ISO-10303-21;".to_vec()))
            .await;
        h.engine.set_report(Report::body_only("<html></html>")).await;
        let mut request = fixtures::validation_request("p1", MODEL_URL, "a.ifc");
        request.report_type = ReportFormat::Html;

        let outcome = h.service.validate(request).await.unwrap();
        assert_eq!(outcome.report.report, "<html></html>");

        let requests = h.engine.recorded_requests().await;
        assert_eq!(requests[0].report_type, ReportFormat::Html);
        assert!(requests[0].output_filename.ends_with(".engine.html"));
        assert_eq!(list(&h.root, "p1"), vec!["a_ifc_2024_01_01_100.html.json"]);
    }

    #[tokio::test]
    async fn test_each_report_type_gets_its_own_report() {
        let h = harness();
        h.fetcher.set_response(MODEL_URL, fixtures::ifc_payload()).await;
        let json_request = fixtures::validation_request("p1", MODEL_URL, "a.ifc");
        let mut html_request = json_request.clone();
        html_request.report_type = ReportFormat::Html;

        let json = h.service.validate(json_request.clone()).await.unwrap();

        h.engine.set_report(Report::body_only("<html></html>")).await;
        let html = h.service.validate(html_request.clone()).await.unwrap();

        assert!(!html.cache_hit);
        assert_eq!(html.key, json.key);
        assert_eq!(html.report.report, "<html></html>");
        assert_eq!(html.report.total_specifications, None);
        assert_eq!(h.engine.call_count().await, 2);

        // Both records are now served from the cache, each in its own format
        let json_again = h.service.validate(json_request).await.unwrap();
        let html_again = h.service.validate(html_request).await.unwrap();
        assert!(json_again.cache_hit && html_again.cache_hit);
        assert_eq!(json_again.report, json.report);
        assert_eq!(html_again.report.report, "<html></html>");
        assert_eq!(h.engine.call_count().await, 2);
        assert_eq!(
            list(&h.root, "p1"),
            vec!["a_ifc_2024_01_01_100.html.json", "a_ifc_2024_01_01_100.json"]
        );
    }

    #[tokio::test]
    async fn test_engine_output_file_is_removed() {
        let h = harness_with(false);
        h.fetcher.set_response(MODEL_URL, fixtures::ifc_payload()).await;
        h.engine.set_write_output(true).await;
        let mut request = fixtures::validation_request("p1", MODEL_URL, "a.ifc");
        request.report_type = ReportFormat::Html;
        h.engine.set_report(Report::body_only("<html></html>")).await;

        h.service.validate(request).await.unwrap();

        assert_eq!(h.engine.call_count().await, 1);
        assert_eq!(
            list(&h.root, "p1"),
            vec!["a_ifc_2024_01_01_100.html.json", "a_ifc_2024_01_01_100.ifc"]
        );
    }

    #[tokio::test]
    async fn test_engine_output_file_is_removed_on_failure() {
        let h = harness_with(false);
        h.fetcher.set_response(MODEL_URL, fixtures::ifc_payload()).await;
        h.engine.set_write_output(true).await;
        h.engine
            .fail_next(EngineError::Rejected("no specifications".to_string()))
            .await;

        h.service
            .validate(fixtures::validation_request("p1", MODEL_URL, "a.ifc"))
            .await
            .unwrap_err();

        assert!(list(&h.root, "p1").is_empty());
    }

    #[test]
    fn test_simultaneous_slot_drops_clear_the_entry() {
        let map: InflightMap = StdMutex::new(HashMap::new());

        for round in 0..500 {
            let id = format!("p/key{}", round);
            let first = InflightSlot::claim(&map, id.clone());
            let second = InflightSlot::claim(&map, id);
            let barrier = std::sync::Barrier::new(2);

            std::thread::scope(|scope| {
                for slot in [first, second] {
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        drop(slot);
                    });
                }
            });

            assert!(lock_map(&map).is_empty(), "entry leaked in round {}", round);
        }
    }
}
