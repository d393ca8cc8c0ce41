use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use strata_client::{ClientSet, TransportOptions};
use strata_domain::Manifest;
use strata_engine::{
    DeployContext, DeployOptions, ManifestError, ManifestFilter, OsFiles, build_deploy_plan,
    delete_configs, deploy, load_delete_file, load_manifest, load_projects, validate,
};
use strata_report::{
    ColorChoice, DiscardReporter, FileReporter, RenderOptions, Reporter, collect_secret_values,
    redact_secrets,
};
use tracing::error;

mod error;

pub use error::CliError;

/// Exit codes of the contract: 0 success, 1 validation error, 2 deploy
/// failure, 3 I/O error.
const EXIT_OK: i32 = 0;
const EXIT_VALIDATION: i32 = 1;
const EXIT_DEPLOY: i32 = 2;
const EXIT_IO: i32 = 3;

#[derive(Debug, Parser)]
#[command(name = "strata", about = "Configuration-as-code for observability tenants")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Deploy the configuration tree to the selected environments.
    Deploy {
        #[command(flatten)]
        selection: SelectionFlags,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        continue_on_error: bool,
        /// Write a JSON-lines deploy report to this file.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Delete the objects listed in a delete file from the selected
    /// environments.
    Delete {
        #[command(flatten)]
        selection: SelectionFlags,
        /// The delete file (defaults to delete.yaml next to the manifest).
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
struct SelectionFlags {
    #[arg(long, default_value = "manifest.yaml")]
    manifest: PathBuf,
    #[arg(short, long = "environment")]
    environments: Vec<String>,
    #[arg(short, long = "group")]
    groups: Vec<String>,
    #[arg(short, long = "project")]
    projects: Vec<String>,
    #[arg(long)]
    verbose: bool,
    #[arg(long, value_enum, default_value_t = ColorArg::Auto)]
    color: ColorArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorArg {
    Auto,
    Always,
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(value: ColorArg) -> Self {
        match value {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

impl SelectionFlags {
    fn manifest_filter(&self) -> ManifestFilter {
        ManifestFilter {
            groups: self.groups.clone(),
            environments: self.environments.clone(),
            require_environment_groups: true,
        }
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            color: self.color.into(),
            verbose: self.verbose,
        }
    }
}

/// Run the CLI using process arguments.
///
/// # Errors
///
/// Returns an error when argument parsing fails (excluding help/version) or
/// the runtime cannot start.
pub fn run() -> Result<i32, CliError> {
    run_from(std::env::args_os())
}

fn run_from<I, T>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(parsed) => parsed,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(EXIT_OK);
            }
            _ => return Err(error.into()),
        },
    };

    init_tracing(&cli);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|source| CliError::Runtime { source })?;

    match cli.command {
        Commands::Deploy {
            selection,
            dry_run,
            continue_on_error,
            report,
        } => {
            let options = DeployOptions {
                continue_on_error,
                dry_run,
            };
            Ok(runtime.block_on(run_deploy(&selection, options, report.as_deref())))
        }
        Commands::Delete { selection, file } => {
            let delete_file = file.unwrap_or_else(|| {
                selection
                    .manifest
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join("delete.yaml")
            });
            Ok(runtime.block_on(run_delete(&selection, &delete_file)))
        }
    }
}

fn init_tracing(cli: &Cli) {
    let verbose = match &cli.command {
        Commands::Deploy { selection, .. } | Commands::Delete { selection, .. } => {
            selection.verbose
        }
    };
    let default_filter = if verbose {
        "info,strata_cli=debug,strata_client=debug,strata_engine=debug,strata_report=debug"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    // a second init in tests is fine, keep the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}

async fn run_deploy(
    selection: &SelectionFlags,
    options: DeployOptions,
    report_path: Option<&Path>,
) -> i32 {
    let reporter: Arc<dyn Reporter> = match report_path {
        Some(path) => match FileReporter::create(path) {
            Ok(file_reporter) => Arc::new(file_reporter),
            Err(report_error) => {
                error!("{report_error}");
                return EXIT_IO;
            }
        },
        None => Arc::new(DiscardReporter::new()),
    };

    let exit = deploy_with_reporter(selection, options, Arc::clone(&reporter)).await;
    reporter.stop();
    exit
}

async fn deploy_with_reporter(
    selection: &SelectionFlags,
    options: DeployOptions,
    reporter: Arc<dyn Reporter>,
) -> i32 {
    let manifest = match load_and_report_manifest(selection, reporter.as_ref()) {
        Ok(manifest) => manifest,
        Err(exit) => return exit,
    };
    let manifest_dir = manifest_dir(&selection.manifest);

    let (projects, project_errors) =
        load_projects(&manifest_dir, &manifest, &selection.projects);
    if !project_errors.is_empty() {
        for project_error in &project_errors {
            error!("{project_error}");
            reporter.report_loading(project_error.to_string());
        }
        return EXIT_VALIDATION;
    }

    let validation_errors = validate(&projects, &manifest);
    if !validation_errors.is_empty() {
        for validation_error in &validation_errors {
            error!("{validation_error}");
            reporter.report_loading(validation_error.to_string());
        }
        return EXIT_VALIDATION;
    }

    let environments: Vec<String> = manifest.environment_names();
    let plan = match build_deploy_plan(&projects, &environments) {
        Ok(plan) => plan,
        Err(sort_errors) => {
            for sort_error in &sort_errors {
                error!("{sort_error}");
                reporter.report_loading(sort_error.to_string());
            }
            return EXIT_VALIDATION;
        }
    };

    let Some(client_sets) = build_client_sets(&manifest, reporter.as_ref()) else {
        return EXIT_VALIDATION;
    };

    let ctx = DeployContext::new(Arc::clone(&reporter), Arc::new(OsFiles));

    // Ctrl-C cancels cooperatively: in-flight configs stop at the next
    // suspension point, later configs stay un-attempted.
    let cancel = Arc::clone(&ctx.cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            error!("cancellation requested, stopping after the current config");
            cancel.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    });

    let deploy_result = deploy(plan, client_sets, options, &ctx).await;

    let summary = reporter.summary();
    print_summary(&summary.render(&selection.render_options()), &manifest);

    match deploy_result {
        Ok(()) => EXIT_OK,
        Err(deploy_error) => {
            error!("{deploy_error}");
            EXIT_DEPLOY
        }
    }
}

async fn run_delete(selection: &SelectionFlags, delete_file: &Path) -> i32 {
    let reporter = DiscardReporter::new();
    let manifest = match load_and_report_manifest(selection, &reporter) {
        Ok(manifest) => manifest,
        Err(exit) => return exit,
    };

    let pointers = match load_delete_file(delete_file) {
        Ok(pointers) => pointers,
        Err(errors) => {
            let mut exit = EXIT_VALIDATION;
            for delete_error in &errors {
                error!("{delete_error}");
                if matches!(delete_error, strata_engine::DeleteError::Read { .. }) {
                    exit = EXIT_IO;
                }
            }
            return exit;
        }
    };

    let Some(client_sets) = build_client_sets(&manifest, &reporter) else {
        return EXIT_VALIDATION;
    };

    match delete_configs(&client_sets, &pointers).await {
        Ok(()) => EXIT_OK,
        Err(errors) => {
            for delete_error in &errors {
                error!("{delete_error}");
            }
            EXIT_DEPLOY
        }
    }
}

fn load_and_report_manifest(
    selection: &SelectionFlags,
    reporter: &dyn Reporter,
) -> Result<Manifest, i32> {
    match load_manifest(&selection.manifest, &selection.manifest_filter()) {
        Ok(manifest) => Ok(manifest),
        Err(errors) => {
            for manifest_error in &errors {
                error!("{manifest_error}");
                reporter.report_loading(manifest_error.to_string());
            }
            Err(manifest_error_exit_code(&errors))
        }
    }
}

fn manifest_dir(manifest_path: &Path) -> PathBuf {
    manifest_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

fn build_client_sets(
    manifest: &Manifest,
    reporter: &dyn Reporter,
) -> Option<BTreeMap<String, ClientSet>> {
    let options = TransportOptions::from_env();
    let mut client_sets = BTreeMap::new();

    for definition in manifest.environments.values() {
        match ClientSet::for_environment(definition, &options) {
            Ok(clients) => {
                client_sets.insert(definition.name.clone(), clients);
            }
            Err(client_error) => {
                error!("failed to build clients for {}: {client_error}", definition.name);
                reporter.report_loading(client_error.to_string());
                return None;
            }
        }
    }

    Some(client_sets)
}

fn print_summary(rendered: &str, manifest: &Manifest) {
    let secrets = collect_secret_values(manifest);
    print!("{}", redact_secrets(rendered, &secrets));
}

/// Exit code for a manifest loading failure: unreadable files are I/O
/// problems, everything else is a validation problem.
fn manifest_error_exit_code(errors: &[ManifestError]) -> i32 {
    if errors
        .iter()
        .any(|error| matches!(error, ManifestError::Read { .. }))
    {
        EXIT_IO
    } else {
        EXIT_VALIDATION
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn deploy_flags_parse() {
        let cli = Cli::try_parse_from([
            "strata",
            "deploy",
            "--manifest",
            "deploy/manifest.yaml",
            "-e",
            "dev",
            "-e",
            "prod",
            "-g",
            "non-prod",
            "-p",
            "infra",
            "--dry-run",
            "--continue-on-error",
        ])
        .expect("parse");

        match cli.command {
            Commands::Deploy {
                selection,
                dry_run,
                continue_on_error,
                report,
            } => {
                assert_eq!(selection.manifest.to_string_lossy(), "deploy/manifest.yaml");
                assert_eq!(selection.environments, vec!["dev", "prod"]);
                assert_eq!(selection.groups, vec!["non-prod"]);
                assert_eq!(selection.projects, vec!["infra"]);
                assert!(dry_run);
                assert!(continue_on_error);
                assert!(report.is_none());
            }
            Commands::Delete { .. } => panic!("expected deploy"),
        }
    }

    #[test]
    fn delete_defaults_the_file_next_to_the_manifest() {
        let cli = Cli::try_parse_from(["strata", "delete", "--manifest", "work/manifest.yaml"])
            .expect("parse");
        match cli.command {
            Commands::Delete { selection, file } => {
                assert_eq!(selection.manifest.to_string_lossy(), "work/manifest.yaml");
                assert!(file.is_none());
            }
            Commands::Deploy { .. } => panic!("expected delete"),
        }
    }

    #[test]
    fn unknown_flags_are_an_argument_error() {
        assert!(Cli::try_parse_from(["strata", "deploy", "--explode"]).is_err());
    }
}
