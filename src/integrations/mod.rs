//! Integration records and admission policy.
//!
//! An [`Integration`] is created by the manager from a [`NewIntegration`]
//! request once policy, scan and license checks pass.

pub mod policy;
pub mod types;

pub use policy::{AutoUpdatePolicy, IntegrationPolicy};
pub use types::{
    ApiConfig, ContainerConfig, Integration, IntegrationConfig, IntegrationMetadata,
    IntegrationStatus, IntegrationType, LibraryConfig, McpServerConfig, NewIntegration,
    PluginConfig, ResourceState, SecurityState,
};
