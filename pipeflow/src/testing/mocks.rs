//! Thread-aware fixture modules.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

use super::fixtures::{TestContainer, TestContainerThree, TestContainerTwo};
use crate::containers::ContainerRef;
use crate::errors::ModuleError;
use crate::modules::{BaseModule, ModuleContext, ThreadAwareModule};

/// Consumes `TestContainer`s two at a time.
///
/// Each call appends `" appended"` to its input, appends the same suffix to
/// every stored `TestContainerTwo`, and stores one `TestContainerThree`
/// taken from a lock-guarded list of output values.
#[derive(Debug)]
pub struct ThreadAwareConsumerModule {
    ctx: ModuleContext,
    output_values: Mutex<Vec<String>>,
    delay: Duration,
}

impl ThreadAwareConsumerModule {
    /// Creates the module.
    #[must_use]
    pub fn new(ctx: ModuleContext) -> Self {
        Self {
            ctx,
            output_values: Mutex::new(vec![
                "one".to_string(),
                "two".to_string(),
                "three".to_string(),
            ]),
            delay: Duration::from_millis(50),
        }
    }

    /// Sets how long each `process` call sleeps before working.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl BaseModule for ThreadAwareConsumerModule {
    type Config = ();

    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn set_up(&mut self, _config: ()) -> Result<(), ModuleError> {
        self.ctx.logger().info(format_args!("{} SetUp!", self.ctx.name()));
        Ok(())
    }
}

#[async_trait]
impl ThreadAwareModule for ThreadAwareConsumerModule {
    type Input = TestContainer;

    fn thread_pool_size(&self) -> usize {
        2
    }

    async fn pre_process(&self) -> Result<(), ModuleError> {
        self.ctx.logger().info("ThreadAwareConsumerModule Static Pre Process");
        Ok(())
    }

    async fn process(&self, container: ContainerRef<TestContainer>) -> Result<(), ModuleError> {
        async {
            self.ctx.logger().info(format_args!("{} Process!", self.ctx.name()));
            tokio::time::sleep(self.delay).await;

            container.write().value.push_str(" appended");

            for summary in self.ctx.store().get_containers::<TestContainerTwo>() {
                summary.write().value.push_str(" appended");
            }

            let output = self
                .output_values
                .lock()
                .pop()
                .ok_or_else(|| ModuleError::new("no output values left"))?;
            self.ctx
                .store()
                .store_container(TestContainerThree::new(format!("output {output}")));
            Ok::<(), ModuleError>(())
        }
        .instrument(self.ctx.logger().span())
        .await
    }

    async fn post_process(&self) -> Result<(), ModuleError> {
        self.ctx.logger().info("ThreadAwareConsumerModule Static Post Process");
        Ok(())
    }
}

/// Consumes `TestContainer`s and stores a new `TestContainer` per input,
/// with `" Processed"` appended. Inputs are dropped from the store.
#[derive(Debug)]
pub struct ReemittingModule {
    ctx: ModuleContext,
}

impl ReemittingModule {
    /// Creates the module.
    #[must_use]
    pub fn new(ctx: ModuleContext) -> Self {
        Self { ctx }
    }
}

impl BaseModule for ReemittingModule {
    type Config = ();

    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn set_up(&mut self, _config: ()) -> Result<(), ModuleError> {
        Ok(())
    }
}

#[async_trait]
impl ThreadAwareModule for ReemittingModule {
    type Input = TestContainer;

    fn thread_pool_size(&self) -> usize {
        2
    }

    async fn pre_process(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn process(&self, container: ContainerRef<TestContainer>) -> Result<(), ModuleError> {
        let value = format!("{} Processed", container.read().value);
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

/// One recorded lifecycle step.
#[derive(Debug, Clone)]
pub struct TimelineEntry {
    /// What happened, e.g. `pre_process` or `process.end:a`.
    pub label: String,
    /// When it happened.
    pub at: Instant,
}

/// Records the instant of every lifecycle step it goes through.
#[derive(Debug)]
pub struct OrderRecordingModule {
    ctx: ModuleContext,
    pool_size: usize,
    keep: bool,
    delay: Duration,
    timeline: Arc<Mutex<Vec<TimelineEntry>>>,
    inputs_at_post_process: Arc<AtomicUsize>,
}

impl OrderRecordingModule {
    /// Creates the module with a pool of two and retention enabled.
    #[must_use]
    pub fn new(ctx: ModuleContext) -> Self {
        Self {
            ctx,
            pool_size: 2,
            keep: true,
            delay: Duration::from_millis(20),
            timeline: Arc::new(Mutex::new(Vec::new())),
            inputs_at_post_process: Arc::new(AtomicUsize::new(usize::MAX)),
        }
    }

    /// Sets the worker pool size.
    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Sets the retention policy.
    #[must_use]
    pub fn with_keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    /// Returns a handle to the recorded timeline.
    #[must_use]
    pub fn timeline(&self) -> Arc<Mutex<Vec<TimelineEntry>>> {
        self.timeline.clone()
    }

    /// Returns a handle to the number of input containers still stored
    /// when `post_process` started (`usize::MAX` until then).
    #[must_use]
    pub fn inputs_at_post_process(&self) -> Arc<AtomicUsize> {
        self.inputs_at_post_process.clone()
    }

    fn record(&self, label: impl Into<String>) {
        self.timeline.lock().push(TimelineEntry {
            label: label.into(),
            at: Instant::now(),
        });
    }
}

impl BaseModule for OrderRecordingModule {
    type Config = ();

    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn set_up(&mut self, _config: ()) -> Result<(), ModuleError> {
        self.record("set_up");
        Ok(())
    }
}

#[async_trait]
impl ThreadAwareModule for OrderRecordingModule {
    type Input = TestContainer;

    fn thread_pool_size(&self) -> usize {
        self.pool_size
    }

    async fn pre_process(&self) -> Result<(), ModuleError> {
        self.record("pre_process");
        Ok(())
    }

    async fn process(&self, container: ContainerRef<TestContainer>) -> Result<(), ModuleError> {
        let value = container.read().value.clone();
        self.record(format!("process.start:{value}"));
        tokio::time::sleep(self.delay).await;
        self.record(format!("process.end:{value}"));
        Ok(())
    }

    async fn post_process(&self) -> Result<(), ModuleError> {
        let remaining = self.ctx.store().container_count::<TestContainer>();
        self.inputs_at_post_process.store(remaining, Ordering::SeqCst);
        self.record("post_process");
        Ok(())
    }

    fn keep_threaded_containers_in_state(&self) -> bool {
        self.keep
    }
}

/// Tracks how many `process` calls are in flight at once.
#[derive(Debug)]
pub struct ConcurrencyProbeModule {
    ctx: ModuleContext,
    pool_size: usize,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: Arc<AtomicUsize>,
    processed: Arc<AtomicUsize>,
}

impl ConcurrencyProbeModule {
    /// Creates a probe with the given pool size.
    #[must_use]
    pub fn new(ctx: ModuleContext, pool_size: usize) -> Self {
        Self {
            ctx,
            pool_size,
            delay: Duration::from_millis(40),
            in_flight: AtomicUsize::new(0),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            processed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns a handle to the highest observed concurrency.
    #[must_use]
    pub fn max_in_flight(&self) -> Arc<AtomicUsize> {
        self.max_in_flight.clone()
    }

    /// Returns a handle to the number of completed `process` calls.
    #[must_use]
    pub fn processed(&self) -> Arc<AtomicUsize> {
        self.processed.clone()
    }
}

impl BaseModule for ConcurrencyProbeModule {
    type Config = ();

    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn set_up(&mut self, _config: ()) -> Result<(), ModuleError> {
        Ok(())
    }
}

#[async_trait]
impl ThreadAwareModule for ConcurrencyProbeModule {
    type Input = TestContainer;

    fn thread_pool_size(&self) -> usize {
        self.pool_size
    }

    async fn pre_process(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    async fn process(&self, _container: ContainerRef<TestContainer>) -> Result<(), ModuleError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.processed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn post_process(&self) -> Result<(), ModuleError> {
        Ok(())
    }
}

/// Fails, or panics, on selected container values.
#[derive(Debug)]
pub struct FailingItemModule {
    ctx: ModuleContext,
    fail_on: HashSet<String>,
    panic_on: HashSet<String>,
    critical: bool,
    fail_pre_process: bool,
    fail_post_process: bool,
    keep: bool,
    processed: Arc<AtomicUsize>,
    post_process_ran: Arc<AtomicBool>,
}

impl FailingItemModule {
    /// Creates a module that fails on nothing yet.
    #[must_use]
    pub fn new(ctx: ModuleContext) -> Self {
        Self {
            ctx,
            fail_on: HashSet::new(),
            panic_on: HashSet::new(),
            critical: false,
            fail_pre_process: false,
            fail_post_process: false,
            keep: true,
            processed: Arc::new(AtomicUsize::new(0)),
            post_process_ran: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns an error when processing a container with this value.
    #[must_use]
    pub fn failing_on(mut self, value: impl Into<String>) -> Self {
        self.fail_on.insert(value.into());
        self
    }

    /// Panics when processing a container with this value.
    #[must_use]
    pub fn panicking_on(mut self, value: impl Into<String>) -> Self {
        self.panic_on.insert(value.into());
        self
    }

    /// Makes item errors critical.
    #[must_use]
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// Makes `pre_process` fail.
    #[must_use]
    pub fn failing_pre_process(mut self) -> Self {
        self.fail_pre_process = true;
        self
    }

    /// Makes `post_process` fail.
    #[must_use]
    pub fn failing_post_process(mut self) -> Self {
        self.fail_post_process = true;
        self
    }

    /// Sets the retention policy.
    #[must_use]
    pub fn with_keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    /// Returns a handle to the number of successful `process` calls.
    #[must_use]
    pub fn processed(&self) -> Arc<AtomicUsize> {
        self.processed.clone()
    }

    /// Returns a handle set once `post_process` has run.
    #[must_use]
    pub fn post_process_ran(&self) -> Arc<AtomicBool> {
        self.post_process_ran.clone()
    }
}

impl BaseModule for FailingItemModule {
    type Config = ();

    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn set_up(&mut self, _config: ()) -> Result<(), ModuleError> {
        Ok(())
    }
}

#[async_trait]
impl ThreadAwareModule for FailingItemModule {
    type Input = TestContainer;

    fn thread_pool_size(&self) -> usize {
        3
    }

    async fn pre_process(&self) -> Result<(), ModuleError> {
        if self.fail_pre_process {
            return Err(ModuleError::new("could not acquire shared resource"));
        }
        Ok(())
    }

    async fn process(&self, container: ContainerRef<TestContainer>) -> Result<(), ModuleError> {
        let value = container.read().value.clone();
        tokio::time::sleep(Duration::from_millis(10)).await;

        if self.panic_on.contains(&value) {
            panic!("worker exploded on {value}");
        }
        if self.fail_on.contains(&value) {
            return Err(ModuleError::new(format!("cannot process {value}"))
                .with_critical(self.critical));
        }
        self.processed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn post_process(&self) -> Result<(), ModuleError> {
        self.post_process_ran.store(true, Ordering::SeqCst);
        if self.fail_post_process {
            return Err(ModuleError::new("could not release shared resource"));
        }
        Ok(())
    }

    fn keep_threaded_containers_in_state(&self) -> bool {
        self.keep
    }
}
