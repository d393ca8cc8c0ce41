use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context as _, anyhow};
use serde_json::Value;
use strata_client::ClientSet;
use strata_domain::{Config, Entity, Parameter, Project};
use strata_report::{Detail, ReportState, Reporter};
use tracing::{debug, info, warn};

use crate::error::{DeployError, ResolveError, SortError};
use crate::fs_util::FileAccess;
use crate::resolve::{EntityRegistry, ResolveContext, resolve_parameter};
use crate::sort::{sort_configs, sort_parameters, sort_projects};
use crate::template;

#[derive(Debug, Clone, Copy, Default)]
pub struct DeployOptions {
    pub continue_on_error: bool,
    pub dry_run: bool,
}

/// One config with its parameters already in resolution order.
#[derive(Debug, Clone)]
pub struct PlannedConfig {
    pub config: Config,
    pub parameters: Vec<(String, Parameter)>,
}

/// The fully sorted deploy order: per environment, configs in the order the
/// deployer will walk them.
#[derive(Debug, Default)]
pub struct DeployPlan {
    pub environments: BTreeMap<String, Vec<PlannedConfig>>,
}

/// Run all three sort layers up front. Deploy is only entered with a plan
/// that is free of dependency cycles at every level.
pub fn build_deploy_plan(
    projects: &[Project],
    environments: &[String],
) -> Result<DeployPlan, Vec<SortError>> {
    let sorted_projects = sort_projects(projects, environments)?;

    let mut plan = DeployPlan::default();
    let mut errors = Vec::new();

    for (environment, ordered_projects) in sorted_projects {
        let mut planned = Vec::new();

        for project in ordered_projects {
            let configs = project.configs_for_environment(&environment);
            let order = match sort_configs(&configs) {
                Ok(order) => order,
                Err(mut sort_errors) => {
                    errors.append(&mut sort_errors);
                    continue;
                }
            };

            for coordinate in order {
                let Some(config) = configs.iter().find(|c| c.coordinate == coordinate) else {
                    continue;
                };
                match sort_parameters(config) {
                    Ok(parameters) => planned.push(PlannedConfig {
                        config: (*config).clone(),
                        parameters,
                    }),
                    Err(mut sort_errors) => errors.append(&mut sort_errors),
                }
            }
        }

        plan.environments.insert(environment, planned);
    }

    if errors.is_empty() { Ok(plan) } else { Err(errors) }
}

/// Everything a deploy run shares: the reporter travels here, never through
/// a global.
#[derive(Clone)]
pub struct DeployContext {
    pub reporter: Arc<dyn Reporter>,
    pub files: Arc<dyn FileAccess>,
    /// Cooperative cancellation; checked between configs and honoured at the
    /// next suspension point.
    pub cancel: Arc<AtomicBool>,
}

impl DeployContext {
    #[must_use]
    pub fn new(reporter: Arc<dyn Reporter>, files: Arc<dyn FileAccess>) -> Self {
        Self {
            reporter,
            files,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

enum EnvironmentOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// Deploy the sorted plan. Environments run as parallel tasks; inside one
/// environment the observable upsert order equals the plan order.
pub async fn deploy(
    plan: DeployPlan,
    mut client_sets: BTreeMap<String, ClientSet>,
    options: DeployOptions,
    ctx: &DeployContext,
) -> Result<(), DeployError> {
    let mut tasks = Vec::new();

    for (environment, configs) in plan.environments {
        let Some(clients) = client_sets.remove(&environment) else {
            warn!("no client set for environment {environment}, skipping");
            continue;
        };
        let ctx = ctx.clone();
        let task = tokio::spawn(async move {
            let outcome = deploy_environment(&environment, configs, &clients, options, &ctx).await;
            (environment, outcome)
        });
        tasks.push(task);
    }

    let mut failed = Vec::new();
    let mut cancelled = None;
    for task in tasks {
        match task.await {
            Ok((environment, EnvironmentOutcome::Completed)) => {
                info!("environment {environment} finished without errors");
            }
            Ok((environment, EnvironmentOutcome::Failed)) => failed.push(environment),
            Ok((environment, EnvironmentOutcome::Cancelled)) => {
                cancelled.get_or_insert(environment);
            }
            Err(join_error) => {
                warn!("environment deploy task aborted: {join_error}");
            }
        }
    }

    if let Some(environment) = cancelled {
        return Err(DeployError::Cancelled { environment });
    }
    if !failed.is_empty() {
        return Err(DeployError::EnvironmentsFailed {
            environments: failed,
        });
    }
    Ok(())
}

async fn deploy_environment(
    environment: &str,
    configs: Vec<PlannedConfig>,
    clients: &ClientSet,
    options: DeployOptions,
    ctx: &DeployContext,
) -> EnvironmentOutcome {
    let mut registry = EntityRegistry::new();
    let mut failed = false;

    info!("deploying {} config(s) to {environment}", configs.len());

    for planned in configs {
        if ctx.cancel.load(Ordering::Relaxed) {
            // remaining configs are un-attempted and deliberately unreported
            return EnvironmentOutcome::Cancelled;
        }

        let config = &planned.config;

        if config.skip {
            debug!("skipping {}", config.coordinate);
            ctx.reporter.report_deployment(
                config.coordinate.clone(),
                ReportState::Skipped,
                Vec::new(),
                None,
            );
            continue;
        }

        if !clients.supports(&config.type_) {
            debug!(
                "excluding {}: environment {environment} has no transport for it",
                config.coordinate
            );
            ctx.reporter.report_deployment(
                config.coordinate.clone(),
                ReportState::Excluded,
                Vec::new(),
                None,
            );
            continue;
        }

        match deploy_config(&planned, clients, options, ctx, &registry).await {
            Ok(entity) => {
                registry.put(config.coordinate.clone(), entity.into_properties());
                ctx.reporter.report_deployment(
                    config.coordinate.clone(),
                    ReportState::Success,
                    Vec::new(),
                    None,
                );
            }
            Err(error) => {
                failed = true;
                warn!("failed to deploy {}: {error:#}", config.coordinate);
                ctx.reporter.report_deployment(
                    config.coordinate.clone(),
                    ReportState::Error,
                    error_details(&error),
                    Some(format!("{error:#}")),
                );
                if !options.continue_on_error {
                    warn!("aborting environment {environment} after the first error");
                    return EnvironmentOutcome::Failed;
                }
            }
        }
    }

    if failed {
        EnvironmentOutcome::Failed
    } else {
        EnvironmentOutcome::Completed
    }
}

async fn deploy_config(
    planned: &PlannedConfig,
    clients: &ClientSet,
    options: DeployOptions,
    ctx: &DeployContext,
    registry: &EntityRegistry,
) -> Result<Entity, anyhow::Error> {
    let config = &planned.config;
    let base_dir = template_dir(config);

    let mut resolved = BTreeMap::new();
    for (name, parameter) in &planned.parameters {
        let resolve_ctx = ResolveContext {
            registry,
            coordinate: &config.coordinate,
            peers: &resolved,
            files: ctx.files.as_ref(),
            base_dir: &base_dir,
        };
        let value = resolve_parameter(name, parameter, &resolve_ctx)?;
        resolved.insert(name.clone(), value);
    }

    let name = display_name(config, &resolved)?;

    let body = template::render(&config.template.content, &resolved).map_err(|source| {
        ResolveError::TemplateRenderFailed {
            config: config.coordinate.clone(),
            what: format!("template {}", config.template.path.display()),
            source,
        }
    })?;
    let body: Value = serde_json::from_str(&body)
        .with_context(|| format!("rendered template of {} is not valid JSON", config.coordinate))?;

    if options.dry_run {
        debug!("dry run: would upsert {}", config.coordinate);
        return Ok(Entity::new(config.coordinate.to_string(), name));
    }

    let entity = clients
        .upsert(
            &config.type_,
            &config.coordinate,
            &name,
            &body,
            config.original_object_id.as_deref(),
        )
        .await?;
    Ok(entity)
}

/// The resolved `name` parameter; mandatory and non-empty for classic APIs,
/// defaulted to the config id elsewhere.
fn display_name(config: &Config, resolved: &BTreeMap<String, Value>) -> Result<String, anyhow::Error> {
    match resolved.get(Config::NAME_PARAMETER).and_then(Value::as_str) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ if config.type_.is_classic_api() => Err(ResolveError::EmptyName {
            config: config.coordinate.clone(),
        }
        .into()),
        Some(_) => Err(anyhow!(
            "{}: name resolved to an empty string",
            config.coordinate
        )),
        None => Ok(config.coordinate.config_id.clone()),
    }
}

fn template_dir(config: &Config) -> PathBuf {
    config
        .template
        .path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

fn error_details(error: &anyhow::Error) -> Vec<Detail> {
    let mut details = vec![Detail::new("ERROR", format!("{error:#}"))];
    if let Some(resp) = error.downcast_ref::<strata_client::ClientError>()
        && let strata_client::ClientError::Response(response) = resp
        && let Some(hint) = response.concurrency_hint()
    {
        details.push(Detail::new("HINT", hint));
    }
    details
}
