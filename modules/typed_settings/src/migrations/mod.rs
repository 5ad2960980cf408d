//! Settings migrations: blueprints of schema operations and the migrator
//! that applies them idempotently

pub mod blueprint;
pub mod migration;
pub mod migrator;

pub use blueprint::{BlueprintOperation, OperationKind, SettingsBlueprint, UpdateFn};
pub use migration::{run_down, run_up, CreateSettingsMigration, SettingsMigration};
pub use migrator::{OperationOutcome, SettingsMigrator};
