//! In-process application facade over the access-control core.
//!
//! The enclosing HR system calls [`app::PermissionAdmin`] with a
//! [`context::RequestContext`] built from its authenticated principal.

pub mod app;
pub mod authz;
pub mod config;
pub mod context;

pub use app::errors::AdminError;
pub use app::seed::SeedReport;
pub use app::templates::{
    ImportOptions, ImportOutcome, ImportResult, ImportStrategy, RoleImportDetail, RoleTemplate, RoleTemplateExport,
};
pub use app::{AdminSettings, PermissionAdmin};
pub use config::{ConfigError, HrGateConfig};
pub use context::RequestContext;
