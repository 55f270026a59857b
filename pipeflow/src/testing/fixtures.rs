//! Fixture containers and a generator module.

use serde::Deserialize;

use crate::containers::AttributeContainer;
use crate::errors::ModuleError;
use crate::modules::{BaseModule, Module, ModuleContext};
use async_trait::async_trait;

/// Primary fixture container; the usual fan-out input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestContainer {
    /// Payload.
    pub value: String,
}

impl TestContainer {
    /// Creates a container with the given payload.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl AttributeContainer for TestContainer {
    const CONTAINER_TYPE: &'static str = "test_container";
}

/// Summary fixture container, shared by all workers of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestContainerTwo {
    /// Payload.
    pub value: String,
}

impl TestContainerTwo {
    /// Creates a container with the given payload.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl AttributeContainer for TestContainerTwo {
    const CONTAINER_TYPE: &'static str = "test_container_two";
}

/// Output fixture container, produced by workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestContainerThree {
    /// Payload.
    pub value: String,
}

impl TestContainerThree {
    /// Creates a container with the given payload.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl AttributeContainer for TestContainerThree {
    const CONTAINER_TYPE: &'static str = "test_container_three";
}

/// Configuration for [`ContainerGeneratorModule`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeneratorConfig {
    /// One `TestContainer` is stored per value.
    pub values: Vec<String>,
}

impl GeneratorConfig {
    /// Builds a config from a comma-separated list.
    #[must_use]
    pub fn from_csv(csv: &str) -> Self {
        Self {
            values: csv.split(',').map(str::to_string).collect(),
        }
    }
}

/// Stores one `TestContainer` per configured value, then a single
/// `TestContainerTwo` holding all values joined by commas.
#[derive(Debug)]
pub struct ContainerGeneratorModule {
    ctx: ModuleContext,
    values: Vec<String>,
}

impl ContainerGeneratorModule {
    /// Creates the module.
    #[must_use]
    pub fn new(ctx: ModuleContext) -> Self {
        Self {
            ctx,
            values: Vec::new(),
        }
    }
}

impl BaseModule for ContainerGeneratorModule {
    type Config = GeneratorConfig;

    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn set_up(&mut self, config: GeneratorConfig) -> Result<(), ModuleError> {
        if config.values.is_empty() {
            return Err(ModuleError::critical("at least one value is required"));
        }
        self.ctx.logger().info(format_args!("{} SetUp!", self.ctx.name()));
        self.values = config.values;
        Ok(())
    }
}

#[async_trait]
impl Module for ContainerGeneratorModule {
    async fn process(&mut self) -> Result<(), ModuleError> {
        self.ctx.logger().info(format_args!("{} Process!", self.ctx.name()));
        let store = self.ctx.store();
        for value in &self.values {
            store.store_container(TestContainer::new(value.clone()));
        }
        store.store_container(TestContainerTwo::new(self.values.join(",")));
        Ok(())
    }
}
