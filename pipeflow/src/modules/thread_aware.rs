//! Thread-aware module contract.

use super::BaseModule;
use crate::containers::{AttributeContainer, ContainerRef};
use crate::errors::ModuleError;
use async_trait::async_trait;

/// A module whose `process` step fans out, once per container of its input
/// type, across a bounded worker pool.
///
/// The dispatcher guarantees that `pre_process` completes before any
/// `process` call starts and that `post_process` starts only after every
/// `process` call has returned. `process` calls run concurrently with each
/// other, so any state they share beyond their own input container must be
/// guarded by the module (for example a `parking_lot::Mutex` field).
#[async_trait]
pub trait ThreadAwareModule: BaseModule {
    /// The container type that drives fan-out.
    type Input: AttributeContainer;

    /// Maximum number of concurrent `process` calls.
    fn thread_pool_size(&self) -> usize;

    /// Runs once on the orchestrating task, before any worker starts.
    async fn pre_process(&self) -> Result<(), ModuleError>;

    /// Processes one container. The handle is the stored instance itself.
    async fn process(&self, container: ContainerRef<Self::Input>) -> Result<(), ModuleError>;

    /// Runs once on the orchestrating task, after every worker finished.
    async fn post_process(&self) -> Result<(), ModuleError>;

    /// Whether consumed containers stay in the store after processing.
    fn keep_threaded_containers_in_state(&self) -> bool {
        true
    }

    /// Returns the type tag of the fan-out input.
    ///
    /// Always `Self::Input::CONTAINER_TYPE`. The dispatcher selects work by
    /// `Input`, so this is not an override point.
    fn thread_on_container_type(&self) -> &'static str {
        <Self::Input as AttributeContainer>::CONTAINER_TYPE
    }
}
