use super::utils::{GlobalOptions, TerminalNotifier, open_session};
use anyhow::{Result, anyhow};
use colored::Colorize;
use kako_core::channel::{ChannelEvent, ChannelKind};
use kako_core::task::{SortKey, StatusColumn, TaskFilter, TaskNotifier, TaskStatus};
use kako_infrastructure::init_logging;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

pub async fn run(
    options: &GlobalOptions,
    search: Option<String>,
    status: Option<String>,
    sort: &str,
    watch: bool,
) -> Result<()> {
    let sort: SortKey = sort
        .parse()
        .map_err(|_| anyhow!("unknown sort '{}' (use recent, oldest, a-z or z-a)", sort))?;
    let filter = TaskFilter {
        search: search.unwrap_or_default(),
        status: status.as_deref().map(TaskStatus::from),
        ..TaskFilter::default()
    };

    let config = options.load_config()?;
    init_logging(&config.log_level, None)?;

    let notifier = watch.then(|| Arc::new(TerminalNotifier) as Arc<dyn TaskNotifier>);
    let sync = open_session(options, &config, notifier)?;
    sync.set_task_view(filter, sort).await;

    if !watch {
        let result = sync.refresh_tasks().await;
        if result.is_ok() {
            let engine = sync.read().await;
            print!("{}", render_board(&engine.store().tasks_by_status()));
        }
        sync.shutdown();
        result?;
        return Ok(());
    }

    let mut updates = sync.subscribe();
    sync.start().await?;
    print!("{}", render_board(&sync.read().await.store().tasks_by_status()));
    println!("{}", "Watching for task updates, Ctrl-C to stop.".bright_black());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => {
                let update = match update {
                    Ok(update) => update,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                };
                if update.channel != ChannelKind::Tasks {
                    continue;
                }
                match update.event {
                    ChannelEvent::Message(_) => {
                        println!();
                        print!("{}", render_board(&sync.read().await.store().tasks_by_status()));
                    }
                    ChannelEvent::Disconnected { reason } => {
                        println!(
                            "{}",
                            format!("Task channel lost ({}), reconnecting", reason).yellow()
                        );
                    }
                    ChannelEvent::PermanentlyDisconnected { attempts } => {
                        println!(
                            "{}",
                            format!("Task channel gave up after {} attempts", attempts).red()
                        );
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    sync.shutdown();
    Ok(())
}

/// Renders board columns, one block per status.
pub fn render_board(columns: &[StatusColumn<'_>]) -> String {
    let mut out = String::new();

    for column in columns {
        let _ = writeln!(
            out,
            "{}",
            format!("{} ({})", column.status, column.tasks.len()).bold()
        );
        if column.tasks.is_empty() {
            let _ = writeln!(out, "  {}", "-".bright_black());
        }
        for task in &column.tasks {
            let _ = writeln!(
                out,
                "  #{} {} {}",
                task.id,
                task.title,
                task.created_at.format("%Y-%m-%d").to_string().bright_black()
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kako_core::store::SessionStore;
    use kako_core::task::{TaskPatch, TaskUpdate};

    fn task(id: &str, title: &str, status: &str) -> TaskUpdate {
        TaskUpdate::new(
            id,
            TaskPatch {
                title: Some(title.to_string()),
                status: Some(TaskStatus::from(status)),
                created_at: Some("2026-03-01T10:00:00Z".parse().unwrap()),
                ..TaskPatch::default()
            },
        )
    }

    #[test]
    fn board_lists_columns_in_order() {
        colored::control::set_override(false);

        let mut store = SessionStore::new();
        store.set_tasks(vec![
            task("1", "Write docs", "todo"),
            task("2", "Ship", "done"),
            task("3", "Archive", "failed"),
        ]);

        let board = render_board(&store.tasks_by_status());
        let headers: Vec<&str> = board.lines().filter(|l| !l.starts_with(' ')).collect();
        assert_eq!(
            headers,
            vec![
                "backlog (0)",
                "todo (1)",
                "in_progress (0)",
                "review (0)",
                "done (1)"
            ]
        );
        assert!(board.contains("  #1 Write docs 2026-03-01"));
        assert!(!board.contains("Archive"));
    }
}
