//! Testing utilities for pipeflow modules.
//!
//! This module provides:
//! - Fixture containers and a generator module
//! - Thread-aware fixture modules instrumented for ordering, concurrency
//!   and failure tests
//! - Assertions over store contents

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_no_containers, assert_values_in_order, assert_values_unordered};
pub use fixtures::{
    ContainerGeneratorModule, GeneratorConfig, TestContainer, TestContainerThree,
    TestContainerTwo,
};
pub use mocks::{
    ConcurrencyProbeModule, FailingItemModule, OrderRecordingModule, ReemittingModule,
    ThreadAwareConsumerModule, TimelineEntry,
};
