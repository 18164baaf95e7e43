use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use shotline_core::assembly::AssemblyDocument;
use shotline_core::collaboration::LockOutcome;
use shotline_core::paths::Entity;
use shotline_core::project::ProjectConfig;
use shotline_core::types::LOCK_TIMESTAMP_FORMAT;
use shotline_events::{Notifier, NullNotifier, WebhookNotifier};
use shotline_pipeline::{CreatedEntity, OpenOutcome, OperationStatus, Pipeline, PipelineConfig};

use crate::{AssemblyCommand, Cli, Command, EntityCommand, LockCommand, Target, VersionCommand};

/// How long to wait for queued webhook deliveries before exiting.
const WEBHOOK_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(cli: Cli) -> anyhow::Result<OperationStatus> {
    if let Command::Init {
        root,
        name,
        single_user,
    } = &cli.command
    {
        return Ok(init(root, name, *single_user));
    }

    let mut config = PipelineConfig::from_env();
    if let Some(project) = cli.project {
        config = config.with_project(project);
    }
    if let Some(user) = cli.user {
        config = config.with_user(user);
    }

    let webhook = match &config.webhook_url {
        Some(url) => Some(Arc::new(
            WebhookNotifier::from_current(url.clone())
                .context("Failed to set up webhook delivery")?,
        )),
        None => None,
    };
    let notifier: Arc<dyn Notifier> = match &webhook {
        Some(webhook) => webhook.clone(),
        None => Arc::new(NullNotifier),
    };

    let pipeline = match Pipeline::open(&config, notifier) {
        Ok(pipeline) => pipeline,
        Err(e) => return Ok(OperationStatus::failure(e.user_message())),
    };
    let status = dispatch(&pipeline, cli.command);

    if let Some(webhook) = webhook {
        webhook.flush(WEBHOOK_FLUSH_TIMEOUT).await;
    }
    Ok(status)
}

fn init(root: &Path, name: &str, single_user: bool) -> OperationStatus {
    let result = ProjectConfig::create(root, name).and_then(|mut config| {
        if single_user {
            config.single_user = true;
            config.save()?;
        }
        Ok(config)
    });
    match result {
        Ok(config) => OperationStatus::success(format!(
            "Created project '{}' (prefix {}) at {}",
            config.name,
            config.prefix,
            root.display()
        )),
        Err(e) => OperationStatus::failure(e.to_string()),
    }
}

fn entity(target: &Target) -> Entity<'_> {
    if target.asset {
        Entity::Asset(&target.entity)
    } else {
        Entity::Shot(&target.entity)
    }
}

fn dispatch(pipeline: &Pipeline, command: Command) -> OperationStatus {
    match command {
        Command::Init { .. } => OperationStatus::failure("init does not take a selected project"),

        Command::Shot(EntityCommand::Create { name, roles }) => {
            let roles: Vec<&str> = roles.iter().map(String::as_str).collect();
            OperationStatus::from_result(&pipeline.create_shot(name.as_deref(), &roles), |created| {
                format!("Created shot {} with roles: {}", created.name, role_list(created))
            })
        }

        Command::Asset(EntityCommand::Create { name, roles }) => {
            let Some(name) = name else {
                return OperationStatus::failure("Assets need a name");
            };
            let roles: Vec<&str> = roles.iter().map(String::as_str).collect();
            OperationStatus::from_result(&pipeline.create_asset(&name, &roles), |created| {
                format!("Created asset {} with roles: {}", created.name, role_list(created))
            })
        }

        Command::Version(VersionCommand::New { target, from }) => {
            let content = match from.as_deref().map(std::fs::read).transpose() {
                Ok(content) => content,
                Err(e) => return OperationStatus::failure(format!("Cannot read source file: {e}")),
            };
            let result = pipeline.new_version(entity(&target), &target.role, content.as_deref());
            OperationStatus::from_result(&result, |wip| {
                format!("Saved version {:03}: {}", wip.version, wip.path.display())
            })
        }

        Command::Version(VersionCommand::Latest { target }) => {
            let result = pipeline.latest_wip(entity(&target), &target.role);
            OperationStatus::from_result(&result, |latest| match latest {
                Some(wip) => format!("Latest version {:03}: {}", wip.version, wip.path.display()),
                None => "No WIP versions yet".to_string(),
            })
        }

        Command::Version(VersionCommand::List { target }) => {
            let result = pipeline.list_wips(entity(&target), &target.role);
            OperationStatus::from_result(&result, |wips| {
                if wips.is_empty() {
                    return "No WIP versions yet".to_string();
                }
                wips.iter()
                    .map(|w| format!("{:03}  {}", w.version, w.path.display()))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }

        Command::Version(VersionCommand::Next { target }) => {
            let result = pipeline.next_wip_path(entity(&target), &target.role);
            OperationStatus::from_result(&result, |next| {
                format!("Next version {:03}: {}", next.version, next.path.display())
            })
        }

        Command::Version(VersionCommand::Status { wip }) => {
            let status = pipeline.status(&wip);
            OperationStatus::success(format!("{}: {}", wip.display(), status.label()))
        }

        Command::Publish { wip } => OperationStatus::from_result(&pipeline.publish(&wip), |record| {
            format!(
                "Published version {:03} to {}",
                record.version,
                record.publish_path.display()
            )
        }),

        Command::Open { publish } => {
            OperationStatus::from_result(&pipeline.open_published(&publish), |opened| {
                let lock = match &opened.lock {
                    OpenOutcome::Locked | OpenOutcome::AlreadyOurs => "locked by you".to_string(),
                    OpenOutcome::ReadOnly { owner } => format!("read-only, locked by {owner}"),
                };
                let origin = if opened.bootstrapped { " (created from publish)" } else { "" };
                format!("Opened {}{origin}, {lock}", opened.path.display())
            })
        }

        Command::Assembly(AssemblyCommand::Rebuild { shot }) => {
            OperationStatus::from_result(&pipeline.rebuild_assembly(&shot), |report| {
                report.summary()
            })
        }

        Command::Assembly(AssemblyCommand::Open { shot }) => {
            OperationStatus::from_result(&pipeline.open_assembly(&shot), |doc| {
                format!("Assembly: {}", doc.path().display())
            })
        }

        Command::Lock(LockCommand::Acquire { path, note }) => {
            OperationStatus::from_result(&pipeline.lock(&path, &note), |outcome| match outcome {
                LockOutcome::Refreshed => format!("Lock refreshed: {}", path.display()),
                _ => format!("Locked: {}", path.display()),
            })
        }

        Command::Lock(LockCommand::Release { path }) => match pipeline.unlock(&path) {
            Ok(true) => OperationStatus::success(format!("Unlocked: {}", path.display())),
            Ok(false) => not_holding(&path),
            Err(e) => OperationStatus::failure(e.user_message()),
        },

        Command::Lock(LockCommand::Note { path, note }) => match pipeline.set_note(&path, &note) {
            Ok(true) => OperationStatus::success(format!("Note updated: {}", path.display())),
            Ok(false) => not_holding(&path),
            Err(e) => OperationStatus::failure(e.user_message()),
        },

        Command::Lock(LockCommand::List) => {
            let locks = pipeline.list_locks();
            if locks.is_empty() {
                return OperationStatus::success("No files are locked");
            }
            let lines: Vec<String> = locks
                .iter()
                .map(|(path, record)| {
                    let note = if record.note.is_empty() {
                        String::new()
                    } else {
                        format!("  \"{}\"", record.note)
                    };
                    format!(
                        "{}  {}  {}{note}",
                        record.timestamp.format(LOCK_TIMESTAMP_FORMAT),
                        record.user,
                        path
                    )
                })
                .collect();
            OperationStatus::success(lines.join("\n"))
        }

        Command::Lock(LockCommand::ForceRelease { path }) => {
            OperationStatus::from_result(&pipeline.force_unlock(&path), |removed| match removed {
                Some(record) => format!("Released {}'s lock on {}", record.user, path.display()),
                None => format!("{} was not locked", path.display()),
            })
        }
    }
}

fn role_list(created: &CreatedEntity) -> String {
    created
        .roles
        .iter()
        .map(|(id, _)| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn not_holding(path: &Path) -> OperationStatus {
    OperationStatus::failure(format!("You do not hold a lock on {}", path.display()))
}
