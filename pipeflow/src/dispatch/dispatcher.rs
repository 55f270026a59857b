//! Bounded fan-out execution of thread-aware modules.

use super::{DispatchPhase, DispatchReport};
use crate::containers::{AttributeContainer, ContainerRef, ContainerStore};
use crate::errors::{DispatchError, ItemFailure, ModuleError};
use crate::events::{event_types, EventSink, NoOpEventSink};
use crate::modules::ThreadAwareModule;
use futures::stream::{FuturesUnordered, StreamExt};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinError;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Runs thread-aware modules against a shared store.
///
/// One call to [`Dispatcher::dispatch`] is one pipeline step:
///
/// 1. `pre_process` runs on the calling task. A failure ends the dispatch
///    before any worker starts.
/// 2. The containers currently stored under the module's input type become
///    the work list. Containers stored later, including by the workers
///    themselves, are not part of this dispatch.
/// 3. Each item is handed to `process` on a spawned task, with at most
///    `thread_pool_size` tasks in flight. Workers write straight into the
///    shared store, so no separate merge step exists.
/// 4. Once every worker returned, work list items are removed from the
///    store if the module does not keep them. Failed items included.
/// 5. `post_process` runs on the calling task.
/// 6. Item failures, if any, are reported together as one error.
pub struct Dispatcher {
    store: Arc<ContainerStore>,
    events: Arc<dyn EventSink>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given store.
    #[must_use]
    pub fn new(store: Arc<ContainerStore>) -> Self {
        Self {
            store,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the sink receiving dispatch lifecycle events.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the store this dispatcher works on.
    #[must_use]
    pub fn store(&self) -> &Arc<ContainerStore> {
        &self.store
    }

    /// Runs one full dispatch of `module`.
    ///
    /// Blocks until pre-processing, every worker, the retention step and
    /// post-processing have finished. There is no timeout: a `process` call
    /// that never returns stalls the dispatch.
    ///
    /// There is no cancellation either. Dropping the returned future leaves
    /// already spawned workers running detached, and the retention step and
    /// `post_process` never run for that dispatch.
    pub async fn dispatch<M: ThreadAwareModule>(
        &self,
        module: Arc<M>,
    ) -> Result<DispatchReport, DispatchError> {
        let start = Instant::now();
        let dispatch_id = Uuid::new_v4();
        let module_name = module.name().to_string();
        let container_type = <M::Input as AttributeContainer>::CONTAINER_TYPE;
        debug_assert_eq!(
            module.thread_on_container_type(),
            container_type,
            "thread_on_container_type must match the Input type"
        );
        let mut phase = DispatchPhase::Created;

        self.events.try_emit(
            event_types::DISPATCH_STARTED,
            Some(serde_json::json!({
                "dispatch_id": dispatch_id.to_string(),
                "module": &module_name,
                "container_type": container_type,
            })),
        );

        if let Err(source) = module.pre_process().await {
            self.fail(&module_name, dispatch_id, &mut phase, &source.message);
            return Err(DispatchError::PreProcess {
                module: module_name,
                source,
            });
        }

        let work_list = self.store.get_containers::<M::Input>();
        self.advance(&module_name, &mut phase, DispatchPhase::PreProcessed);
        self.events.try_emit(
            event_types::DISPATCH_PREPROCESSED,
            Some(serde_json::json!({
                "dispatch_id": dispatch_id.to_string(),
                "module": &module_name,
                "items": work_list.len(),
            })),
        );

        let requested = module.thread_pool_size();
        let pool_size = if requested == 0 {
            warn!(module = %module_name, "Thread pool size of 0 requested; using 1");
            1
        } else {
            requested
        };

        self.advance(&module_name, &mut phase, DispatchPhase::Dispatching);
        let failures = self
            .run_workers(&module, &work_list, pool_size, dispatch_id)
            .await;

        let removed = if module.keep_threaded_containers_in_state() {
            0
        } else {
            self.store.remove_containers(&work_list)
        };
        self.advance(&module_name, &mut phase, DispatchPhase::Merged);
        self.events.try_emit(
            event_types::DISPATCH_MERGED,
            Some(serde_json::json!({
                "dispatch_id": dispatch_id.to_string(),
                "module": &module_name,
                "failed": failures.len(),
                "removed": removed,
            })),
        );

        if let Err(source) = module.post_process().await {
            self.fail(&module_name, dispatch_id, &mut phase, &source.message);
            return Err(DispatchError::PostProcess {
                module: module_name,
                source,
                failures,
            });
        }
        self.advance(&module_name, &mut phase, DispatchPhase::PostProcessed);
        self.events.try_emit(
            event_types::DISPATCH_POSTPROCESSED,
            Some(serde_json::json!({
                "dispatch_id": dispatch_id.to_string(),
                "module": &module_name,
            })),
        );

        if !failures.is_empty() {
            let error = DispatchError::ItemsFailed {
                module: module_name.clone(),
                total: work_list.len(),
                failures,
            };
            self.fail(&module_name, dispatch_id, &mut phase, &error.to_string());
            return Err(error);
        }

        self.advance(&module_name, &mut phase, DispatchPhase::Done);
        let report = DispatchReport {
            dispatch_id,
            module: module_name,
            container_type: container_type.to_string(),
            pool_size,
            total_items: work_list.len(),
            succeeded: work_list.len(),
            removed,
            phase,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        };

        info!(
            module = %report.module,
            items = report.total_items,
            removed = report.removed,
            duration_ms = report.duration_ms,
            "Dispatch completed"
        );
        self.events
            .try_emit(event_types::DISPATCH_COMPLETED, Some(report.to_json()));

        Ok(report)
    }

    /// Runs `process` for every work list item, keeping at most `pool_size`
    /// workers in flight. Returns the failures ordered by item index.
    async fn run_workers<M: ThreadAwareModule>(
        &self,
        module: &Arc<M>,
        work_list: &[ContainerRef<M::Input>],
        pool_size: usize,
        dispatch_id: Uuid,
    ) -> Vec<ItemFailure> {
        let mut pending = work_list.iter().cloned().enumerate();
        let mut in_flight = FuturesUnordered::new();
        let mut failures = Vec::new();

        loop {
            while in_flight.len() < pool_size {
                let Some((index, container)) = pending.next() else {
                    break;
                };
                in_flight.push(spawn_worker(Arc::clone(module), index, container, dispatch_id));
            }

            let Some((index, joined)) = in_flight.next().await else {
                break;
            };

            let failure = match joined {
                Ok(Ok(())) => None,
                Ok(Err(error)) => Some(ItemFailure::new(index, work_list[index].describe(), error)),
                Err(join_error) => Some(
                    ItemFailure::new(
                        index,
                        work_list[index].describe(),
                        ModuleError::new(join_error_message(join_error)),
                    )
                    .with_panic(),
                ),
            };

            match failure {
                None => {
                    debug!(module = %module.name(), index, "Work item completed");
                    self.events.try_emit(
                        event_types::DISPATCH_ITEM_COMPLETED,
                        Some(serde_json::json!({
                            "dispatch_id": dispatch_id.to_string(),
                            "module": module.name(),
                            "index": index,
                        })),
                    );
                }
                Some(failure) => {
                    warn!(
                        module = %module.name(),
                        index,
                        panicked = failure.panicked,
                        error = %failure.error,
                        "Work item failed"
                    );
                    let mut payload = failure.to_dict();
                    payload.insert("dispatch_id".to_string(), serde_json::json!(dispatch_id.to_string()));
                    payload.insert("module".to_string(), serde_json::json!(module.name()));
                    self.events
                        .try_emit(event_types::DISPATCH_ITEM_FAILED, Some(serde_json::json!(payload)));
                    failures.push(failure);
                }
            }
        }

        failures.sort_by_key(|f| f.index);
        failures
    }

    fn advance(&self, module: &str, phase: &mut DispatchPhase, to: DispatchPhase) {
        debug_assert!(phase.can_transition_to(to), "invalid dispatch transition {phase} -> {to}");
        debug!(module = %module, from = %phase, to = %to, "Dispatch phase changed");
        *phase = to;
    }

    fn fail(&self, module: &str, dispatch_id: Uuid, phase: &mut DispatchPhase, error: &str) {
        warn!(module = %module, phase = %phase, error = %error, "Dispatch failed");
        self.events.try_emit(
            event_types::DISPATCH_FAILED,
            Some(serde_json::json!({
                "dispatch_id": dispatch_id.to_string(),
                "module": module,
                "phase": phase.to_string(),
                "error": error,
            })),
        );
        self.advance(module, phase, DispatchPhase::Failed);
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Spawns one worker and resolves to its item index and join result.
fn spawn_worker<M: ThreadAwareModule>(
    module: Arc<M>,
    index: usize,
    container: ContainerRef<M::Input>,
    dispatch_id: Uuid,
) -> impl Future<Output = (usize, Result<Result<(), ModuleError>, JoinError>)> {
    let span = info_span!(
        "dispatch_worker",
        module = %module.name(),
        dispatch_id = %dispatch_id,
        index
    );
    let handle = tokio::spawn(async move { module.process(container).await }.instrument(span));
    async move { (index, handle.await) }
}

fn join_error_message(err: JoinError) -> String {
    if !err.is_panic() {
        return format!("worker task did not complete: {err}");
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("worker panicked: {message}")
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;
    use crate::modules::{BaseModule, ModuleContext};
    use crate::testing::{
        assert_no_containers, assert_values_unordered, ConcurrencyProbeModule,
        FailingItemModule, OrderRecordingModule, ReemittingModule, TestContainer,
        TestContainerThree, TestContainerTwo, ThreadAwareConsumerModule,
    };
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;

    fn store_with(values: &[&str]) -> Arc<ContainerStore> {
        let store = Arc::new(ContainerStore::new());
        for value in values {
            store.store_container(TestContainer::new(*value));
        }
        store
    }

    fn ctx(store: &Arc<ContainerStore>, name: &str) -> ModuleContext {
        ModuleContext::new(name, store.clone())
    }

    fn value_of(c: &TestContainer) -> String {
        c.value.clone()
    }

    /// Stores one extra input in `pre_process`, then replaces every input
    /// with a new container of the same type.
    #[derive(Debug)]
    struct SeedingModule {
        ctx: ModuleContext,
    }

    impl BaseModule for SeedingModule {
        type Config = ();

        fn name(&self) -> &str {
            self.ctx.name()
        }

        fn set_up(&mut self, _config: ()) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    #[async_trait]
    impl ThreadAwareModule for SeedingModule {
        type Input = TestContainer;

        fn thread_pool_size(&self) -> usize {
            2
        }

        async fn pre_process(&self) -> Result<(), ModuleError> {
            self.ctx.store().store_container(TestContainer::new("seed"));
            Ok(())
        }

        async fn process(&self, container: ContainerRef<TestContainer>) -> Result<(), ModuleError> {
            let value = format!("{} out", container.read().value);
            self.ctx.store().store_container(TestContainer::new(value));
            Ok(())
        }

        async fn post_process(&self) -> Result<(), ModuleError> {
            Ok(())
        }

        fn keep_threaded_containers_in_state(&self) -> bool {
            false
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_consumer_mutates_inputs_and_shared_containers() {
        let store = Arc::new(ContainerStore::new());
        let held: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|v| store.store_container(TestContainer::new(*v)))
            .collect();
        let summary = store.store_container(TestContainerTwo::new("a,b,c"));

        let module = Arc::new(
            ThreadAwareConsumerModule::new(ctx(&store, "consumer"))
                .with_delay(std::time::Duration::from_millis(20)),
        );
        let report = Dispatcher::new(store.clone())
            .dispatch(module)
            .await
            .unwrap();

        assert_eq!(report.total_items, 3);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.pool_size, 2);
        assert_eq!(report.removed, 0);
        assert_eq!(report.phase, DispatchPhase::Done);
        assert_eq!(report.container_type, "test_container");

        let values: Vec<String> = held.iter().map(|c| c.read().value.clone()).collect();
        assert_eq!(values, vec!["a appended", "b appended", "c appended"]);
        assert_eq!(summary.read().value, "a,b,c appended appended appended");
        assert_values_unordered::<TestContainerThree, _>(
            &store,
            |c| c.value.clone(),
            &["output one", "output two", "output three"],
        );
        assert_values_unordered::<TestContainer, _>(
            &store,
            value_of,
            &["a appended", "b appended", "c appended"],
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_size_bounds_concurrency() {
        let store = store_with(&["1", "2", "3", "4", "5"]);
        let module = ConcurrencyProbeModule::new(ctx(&store, "probe"), 2);
        let max_in_flight = module.max_in_flight();
        let processed = module.processed();

        Dispatcher::new(store.clone())
            .dispatch(Arc::new(module))
            .await
            .unwrap();

        assert_eq!(processed.load(Ordering::SeqCst), 5);
        let max = max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 2, "observed {max} concurrent workers");
        assert!(max >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_size_one_is_sequential() {
        let store = store_with(&["1", "2", "3"]);
        let module = ConcurrencyProbeModule::new(ctx(&store, "probe"), 1);
        let max_in_flight = module.max_in_flight();

        let report = Dispatcher::new(store.clone())
            .dispatch(Arc::new(module))
            .await
            .unwrap();

        assert_eq!(report.pool_size, 1);
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_size_zero_is_clamped() {
        let store = store_with(&["1", "2"]);
        let module = ConcurrencyProbeModule::new(ctx(&store, "probe"), 0);
        let processed = module.processed();

        let report = Dispatcher::new(store.clone())
            .dispatch(Arc::new(module))
            .await
            .unwrap();

        assert_eq!(report.pool_size, 1);
        assert_eq!(processed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pre_process_before_and_post_process_after_workers() {
        let store = store_with(&["a", "b", "c", "d"]);
        let module = OrderRecordingModule::new(ctx(&store, "recorder"));
        let timeline = module.timeline();

        Dispatcher::new(store.clone())
            .dispatch(Arc::new(module))
            .await
            .unwrap();

        let timeline = timeline.lock().clone();
        assert_eq!(timeline.len(), 2 + 2 * 4);
        assert_eq!(timeline.first().unwrap().label, "pre_process");
        assert_eq!(timeline.last().unwrap().label, "post_process");

        let pre = timeline.first().unwrap().at;
        let post = timeline.last().unwrap().at;
        for entry in timeline.iter().filter(|e| e.label.starts_with("process.")) {
            assert!(pre <= entry.at, "{} started before pre_process", entry.label);
            assert!(entry.at <= post, "{} ended after post_process", entry.label);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_size_one_runs_items_back_to_back() {
        let store = store_with(&["a", "b", "c"]);
        let module = OrderRecordingModule::new(ctx(&store, "recorder")).with_pool_size(1);
        let timeline = module.timeline();

        let report = Dispatcher::new(store.clone())
            .dispatch(Arc::new(module))
            .await
            .unwrap();

        assert_eq!(report.pool_size, 1);
        let labels: Vec<String> = timeline.lock().iter().map(|e| e.label.clone()).collect();
        assert_eq!(
            labels,
            vec![
                "pre_process",
                "process.start:a",
                "process.end:a",
                "process.start:b",
                "process.end:b",
                "process.start:c",
                "process.end:c",
                "post_process",
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_work_list_includes_containers_stored_by_pre_process() {
        let store = store_with(&["a", "b"]);
        let module = SeedingModule {
            ctx: ctx(&store, "seeding"),
        };

        let report = Dispatcher::new(store.clone())
            .dispatch(Arc::new(module))
            .await
            .unwrap();

        assert_eq!(report.total_items, 3);
        assert_eq!(report.removed, 3);
        assert_values_unordered::<TestContainer, _>(
            &store,
            value_of,
            &["a out", "b out", "seed out"],
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_outputs_of_input_type_survive_retention() {
        let store = Arc::new(ContainerStore::new());
        let inputs: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|v| store.store_container(TestContainer::new(*v)))
            .collect();
        let module = SeedingModule {
            ctx: ctx(&store, "seeding"),
        };

        let report = Dispatcher::new(store.clone())
            .dispatch(Arc::new(module))
            .await
            .unwrap();

        assert_eq!(report.removed, 4);
        let remaining = store.get_containers::<TestContainer>();
        assert_eq!(remaining.len(), 4);
        for input in &inputs {
            assert!(remaining.iter().all(|c| !c.same_instance(input)));
        }
        assert_values_unordered::<TestContainer, _>(
            &store,
            value_of,
            &["a out", "b out", "c out", "seed out"],
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_retention_false_removes_inputs_before_post_process() {
        let store = store_with(&["a", "b", "c"]);
        let module = OrderRecordingModule::new(ctx(&store, "recorder")).with_keep(false);
        let inputs_at_post = module.inputs_at_post_process();

        let report = Dispatcher::new(store.clone())
            .dispatch(Arc::new(module))
            .await
            .unwrap();

        assert_eq!(report.removed, 3);
        assert_eq!(inputs_at_post.load(Ordering::SeqCst), 0);
        assert_no_containers::<TestContainer>(&store);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_retention_true_keeps_inputs() {
        let store = store_with(&["a", "b", "c"]);
        let module = OrderRecordingModule::new(ctx(&store, "recorder")).with_keep(true);
        let inputs_at_post = module.inputs_at_post_process();

        let report = Dispatcher::new(store.clone())
            .dispatch(Arc::new(module))
            .await
            .unwrap();

        assert_eq!(report.removed, 0);
        assert_eq!(inputs_at_post.load(Ordering::SeqCst), 3);
        assert_values_unordered::<TestContainer, _>(&store, value_of, &["a", "b", "c"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_self_referential_output_is_not_reprocessed() {
        let store = store_with(&["1", "2", "3"]);
        let dispatcher = Dispatcher::new(store.clone());

        let report = dispatcher
            .dispatch(Arc::new(ReemittingModule::new(ctx(&store, "reemit"))))
            .await
            .unwrap();

        assert_eq!(report.total_items, 3);
        assert_eq!(report.removed, 3);
        assert_values_unordered::<TestContainer, _>(
            &store,
            value_of,
            &["1 Processed", "2 Processed", "3 Processed"],
        );

        // The outputs become the next dispatch's input.
        dispatcher
            .dispatch(Arc::new(ReemittingModule::new(ctx(&store, "reemit"))))
            .await
            .unwrap();
        assert_values_unordered::<TestContainer, _>(
            &store,
            value_of,
            &["1 Processed Processed", "2 Processed Processed", "3 Processed Processed"],
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_empty_work_list_still_runs_pre_and_post() {
        let store = Arc::new(ContainerStore::new());
        let module = OrderRecordingModule::new(ctx(&store, "recorder"));
        let timeline = module.timeline();

        let report = Dispatcher::new(store.clone())
            .dispatch(Arc::new(module))
            .await
            .unwrap();

        assert_eq!(report.total_items, 0);
        let labels: Vec<String> = timeline.lock().iter().map(|e| e.label.clone()).collect();
        assert_eq!(labels, vec!["pre_process", "post_process"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_single_failure_is_isolated() {
        let store = store_with(&["a", "b", "c", "d"]);
        let module = FailingItemModule::new(ctx(&store, "flaky")).failing_on("c");
        let processed = module.processed();
        let post_ran = module.post_process_ran();

        let err = Dispatcher::new(store.clone())
            .dispatch(Arc::new(module))
            .await
            .unwrap_err();

        assert_eq!(processed.load(Ordering::SeqCst), 3);
        assert!(post_ran.load(Ordering::SeqCst));

        let DispatchError::ItemsFailed { module, total, failures } = &err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(module, "flaky");
        assert_eq!(*total, 4);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 2);
        assert_eq!(failures[0].error.message, "cannot process c");
        assert!(failures[0].container.contains("\"c\""));
        assert!(!err.is_critical());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failed_items_are_removed_when_not_kept() {
        let store = store_with(&["a", "b", "c"]);
        let module = FailingItemModule::new(ctx(&store, "flaky"))
            .failing_on("b")
            .with_keep(false);

        let err = Dispatcher::new(store.clone())
            .dispatch(Arc::new(module))
            .await
            .unwrap_err();

        assert_eq!(err.item_failures().len(), 1);
        assert_no_containers::<TestContainer>(&store);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_panic_is_reported_as_item_failure() {
        let store = store_with(&["a", "b", "c"]);
        let module = FailingItemModule::new(ctx(&store, "explosive")).panicking_on("a");
        let processed = module.processed();
        let post_ran = module.post_process_ran();

        let err = Dispatcher::new(store.clone())
            .dispatch(Arc::new(module))
            .await
            .unwrap_err();

        assert_eq!(processed.load(Ordering::SeqCst), 2);
        assert!(post_ran.load(Ordering::SeqCst));
        let failures = err.item_failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].panicked);
        assert!(failures[0].error.message.contains("worker exploded on a"));
        assert!(err.is_critical());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pre_process_failure_starts_no_worker() {
        let store = store_with(&["a", "b"]);
        let module = FailingItemModule::new(ctx(&store, "blocked")).failing_pre_process();
        let processed = module.processed();
        let post_ran = module.post_process_ran();

        let err = Dispatcher::new(store.clone())
            .dispatch(Arc::new(module))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::PreProcess { .. }));
        assert!(err.is_critical());
        assert_eq!(processed.load(Ordering::SeqCst), 0);
        assert!(!post_ran.load(Ordering::SeqCst));
        assert_eq!(store.container_count::<TestContainer>(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_post_process_failure_carries_item_failures() {
        let store = store_with(&["a", "b"]);
        let module = FailingItemModule::new(ctx(&store, "teardown"))
            .failing_on("a")
            .failing_post_process();

        let err = Dispatcher::new(store.clone())
            .dispatch(Arc::new(module))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::PostProcess { .. }));
        assert_eq!(err.item_failures().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_events_follow_lifecycle_order() {
        let store = store_with(&["a", "b"]);
        let sink = Arc::new(CollectingEventSink::new());
        let module = FailingItemModule::new(ctx(&store, "flaky")).failing_on("b");

        let _ = Dispatcher::new(store.clone())
            .with_event_sink(sink.clone())
            .dispatch(Arc::new(module))
            .await;

        let started = sink.position_of(event_types::DISPATCH_STARTED).unwrap();
        let pre = sink.position_of(event_types::DISPATCH_PREPROCESSED).unwrap();
        let merged = sink.position_of(event_types::DISPATCH_MERGED).unwrap();
        let post = sink.position_of(event_types::DISPATCH_POSTPROCESSED).unwrap();
        let failed = sink.position_of(event_types::DISPATCH_FAILED).unwrap();
        assert!(started < pre && pre < merged && merged < post && post < failed);

        assert_eq!(sink.events_of_type(event_types::DISPATCH_ITEM_COMPLETED).len(), 1);
        assert_eq!(sink.events_of_type(event_types::DISPATCH_ITEM_FAILED).len(), 1);
        assert!(sink.position_of(event_types::DISPATCH_COMPLETED).is_none());
    }
}
