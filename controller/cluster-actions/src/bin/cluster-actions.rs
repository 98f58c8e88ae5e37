//! Cluster Actions binary - watches HPAs (and any extra audited kinds) and runs
//! playbook actions, or invokes a single callback action by hand

use anyhow::Context;
use clap::{Parser, Subcommand};
use cluster_actions::{
    ActionError, Config, Dispatcher, DryRunHpaClient, FindingSink, GitRepoManager, HpaClient,
    KubeHpaClient, LogFindingSink, Playbook, WebhookFindingSink,
};
use findings::CallbackChoice;
use futures_util::future::{try_join_all, FutureExt, LocalBoxFuture};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cluster-actions", version)]
#[command(about = "Runs HPA and Git audit actions against cluster changes")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch HPAs and dispatch every change to the playbook's actions
    Watch,
    /// Run one callback action against a named HPA
    Callback {
        /// Action to invoke (e.g. scale_hpa_callback)
        #[arg(long)]
        action: String,
        #[arg(long)]
        namespace: String,
        #[arg(long)]
        name: String,
        /// Action params as JSON
        #[arg(long, default_value = "{}")]
        params: String,
    },
    /// Parse and validate the playbook, then exit
    Validate,
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let _ = if log_json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.config;
    init_tracing(config.log_json);

    info!("Starting Cluster Actions");
    info!("Configuration:");
    info!("  Playbook: {}", config.playbook.display());
    info!("  Watch scope: {}", config.watch_scope());
    info!("  Repo workdir: {}", config.repo_workdir.display());
    info!("  Dry-run: {}", config.dry_run);

    let playbook = Playbook::load(&config.playbook)
        .with_context(|| format!("Failed to load playbook {}", config.playbook.display()))?;
    let actions = playbook
        .configured_actions()
        .context("Invalid playbook")?;

    let audit_gvks = config.audit_gvks().context("Invalid --audit-kinds")?;

    if let Commands::Validate = cli.cmd {
        for action in &actions {
            println!("{}", action.name());
        }
        info!(count = actions.len(), "Playbook is valid");
        return Ok(());
    }

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let hpa_client: Arc<dyn HpaClient> = if config.dry_run {
        info!("Using dry-run HPA client");
        Arc::new(DryRunHpaClient::new(KubeHpaClient::new(client.clone())))
    } else {
        Arc::new(KubeHpaClient::new(client.clone()))
    };

    let sink: Arc<dyn FindingSink> = match config.finding_webhook() {
        Some(endpoint) => {
            info!("Publishing findings to webhook: {}", endpoint);
            Arc::new(WebhookFindingSink::new(
                endpoint.to_string(),
                config.webhook_timeout_secs,
            )?)
        }
        None => {
            info!("Logging findings (no webhook configured)");
            Arc::new(LogFindingSink)
        }
    };

    let repos = Arc::new(GitRepoManager::with_system_git(
        config.repo_workdir.clone(),
        config.git_user_email.clone(),
    ));

    let dispatcher = Dispatcher::new(actions, hpa_client, repos, sink);

    match cli.cmd {
        Commands::Watch => {
            let mut watchers: Vec<LocalBoxFuture<'_, Result<(), ActionError>>> = vec![
                cluster_actions::watch::run_hpa_watcher(
                    client.clone(),
                    config.namespace.as_deref(),
                    &dispatcher,
                )
                .boxed_local(),
            ];
            for gvk in &audit_gvks {
                info!(group = %gvk.group, version = %gvk.version, kind = %gvk.kind, "Auditing kind");
                watchers.push(
                    cluster_actions::watch::run_resource_watcher(
                        client.clone(),
                        gvk,
                        config.namespace.as_deref(),
                        &dispatcher,
                    )
                    .boxed_local(),
                );
            }

            match try_join_all(watchers).await {
                Ok(_) => {
                    info!("Watchers exited normally");
                    Ok(())
                }
                Err(e) => {
                    error!("Watcher failed: {}", e);
                    Err(e.into())
                }
            }
        }
        Commands::Callback {
            action,
            namespace,
            name,
            params,
        } => {
            let action_params: serde_json::Value =
                serde_json::from_str(&params).context("Callback params must be valid JSON")?;
            let choice = CallbackChoice::new(format!("Run {}", action), action, action_params);

            let findings = dispatcher
                .run_callback_for(&namespace, &name, &choice)
                .await
                .with_context(|| format!("Callback failed for HPA {}/{}", namespace, name))?;
            info!(count = findings.len(), "Callback finished");
            Ok(())
        }
        Commands::Validate => Ok(()),
    }
}
