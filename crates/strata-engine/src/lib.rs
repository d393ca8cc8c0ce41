mod delete;
mod deploy;
mod error;
mod fs_util;
mod manifest;
mod project;
mod resolve;
mod sort;
mod template;
mod validate;

pub use delete::{delete_configs, load_delete_file};
pub use deploy::{DeployContext, DeployOptions, DeployPlan, PlannedConfig, build_deploy_plan, deploy};
pub use error::{
    DeleteError, DeployError, ManifestError, ProjectError, ResolveError, SortError, TemplateError,
    ValidationError,
};
pub use fs_util::{FileAccess, OsFiles, normalize_path};
pub use manifest::{ManifestFilter, load_manifest, write_manifest};
pub use project::load_projects;
pub use resolve::{EntityRegistry, ResolveContext, resolve_parameter};
pub use sort::{sort_configs, sort_parameters, sort_projects};
pub use template::{placeholder_keys, render};
pub use validate::validate;
