//! Terminal board client: `jobboard board`.
//!
//! Every subcommand hydrates a reconciliation controller from the server,
//! applies one gesture and reports how the server answered.

use anyhow::{Context, Result, bail};

use super::super::BoardCommands;
use jobboard::client::{FailurePolicy, HttpTransport, ReconciliationController, SyncOutcome};
use jobboard::config::ClientSection;
use jobboard_common::protocol::{AddJobRequest, EditJobRequest};
use jobboard_common::{Dashboard, Location};

pub async fn cmd_board(client: &ClientSection, command: BoardCommands) -> Result<()> {
    if client.token.is_none() {
        bail!("No session token. Pass --token or set JOBBOARD_TOKEN.");
    }
    let transport = match client.timeout() {
        Some(timeout) => HttpTransport::with_timeout(&client.server_url, client.token.clone(), timeout)?,
        None => HttpTransport::new(&client.server_url, client.token.clone()),
    };
    let controller = ReconciliationController::new(transport)
        .with_policy(client.on_failure)
        .with_timeout(client.timeout());
    controller
        .refresh()
        .await
        .with_context(|| format!("Failed to load board from {}", client.server_url))?;

    match command {
        BoardCommands::Show => {
            print_board(&controller.dashboard());
            return Ok(());
        }
        BoardCommands::Add {
            title,
            company,
            status,
            description,
        } => {
            let outcome = controller
                .add(AddJobRequest {
                    title,
                    company,
                    status,
                    description,
                })
                .await?;
            report("add", outcome, client.on_failure)?;
        }
        BoardCommands::Move {
            task_id,
            column,
            index,
        } => {
            let board = controller.dashboard();
            let from = locate(&board, &task_id)?;
            let to = destination(&board, &from, &column, index);
            let outcome = controller.drag(from, to).await?;
            report("move", outcome, client.on_failure)?;
        }
        BoardCommands::Edit {
            task_id,
            title,
            company,
            status,
            description,
            clear_description,
        } => {
            let board = controller.dashboard();
            let location = locate(&board, &task_id)?;
            let current = board
                .task(&task_id)
                .with_context(|| format!("Task {} not found", task_id))?;
            let req = EditJobRequest {
                title: title.unwrap_or_else(|| current.content.clone()),
                company: company.unwrap_or_else(|| current.company.clone()),
                status: status.unwrap_or(location.column),
                description: if clear_description {
                    None
                } else {
                    description.or_else(|| current.description.clone())
                },
            };
            let outcome = controller.edit(&task_id, req).await?;
            report("edit", outcome, client.on_failure)?;
        }
        BoardCommands::Delete { task_id } => {
            let outcome = controller.delete(&task_id).await?;
            report("delete", outcome, client.on_failure)?;
        }
    }

    print_board(&controller.dashboard());
    Ok(())
}

fn locate(board: &Dashboard, task_id: &str) -> Result<Location> {
    board
        .find(task_id)
        .with_context(|| format!("Task {} not found on your board", task_id))
}

/// Target slot for a move. Without an index the card goes to the end.
fn destination(board: &Dashboard, from: &Location, column: &str, index: Option<usize>) -> Location {
    let len = board.column(column).map_or(0, |c| c.tasks.len());
    let last = if from.column == column { len.saturating_sub(1) } else { len };
    Location::new(column, index.map_or(last, |i| i.min(last)))
}

fn report(op: &str, outcome: SyncOutcome, policy: FailurePolicy) -> Result<()> {
    match outcome {
        SyncOutcome::Unchanged => println!("Nothing to {}.", op),
        SyncOutcome::Confirmed { task_id } => println!("{} confirmed for task {}.", capitalized(op), task_id),
        SyncOutcome::RolledBack { error } | SyncOutcome::Resynced { error } => {
            bail!("Server rejected {} ({:?} applied): {}", op, policy, error)
        }
    }
    Ok(())
}

fn capitalized(op: &str) -> String {
    jobboard_common::models::capitalize(op)
}

fn print_board(board: &Dashboard) {
    for column in board.columns.values() {
        println!("{} ({})", column.name, column.tasks.len());
        for task in &column.tasks {
            println!("  [{}] {} @ {}", task.id, task.content, task.company);
            if let Some(description) = &task.description {
                println!("      {}", description);
            }
        }
    }
}
