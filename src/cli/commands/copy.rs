//! Copy-task CLI commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::Cell;

use crate::cli::display::{colorize_read, list_table, render_list};
use crate::cli::engine::Engine;
use crate::cli::output::{output, short_id, CommandOutput};
use crate::domain::models::{CopyTask, CopyTaskQuery, CopyTaskRead, Page, PageRequest, ReadUserNames};

#[derive(Args, Debug)]
pub struct CopyArgs {
    #[command(subcommand)]
    pub command: CopyCommands,
}

#[derive(Subcommand, Debug)]
pub enum CopyCommands {
    /// Unread copy tasks of a user
    List {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        business_key: Option<String>,
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
    /// Copy tasks a user has read
    History {
        #[arg(short, long)]
        user: String,
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
    /// Mark a copy task as read
    Read {
        id: String,
        #[arg(short, long)]
        user: String,
    },
    /// Who has read the copies of an activity instance
    Readers {
        activity_instance_id: String,
        /// Number of names to show
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct CopyListOutput {
    pub page: Page<CopyTask>,
}

impl CommandOutput for CopyListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "node", "instance", "business key", "state"]);
        for copy in &self.page.items {
            table.add_row(vec![
                Cell::new(short_id(&copy.id)),
                Cell::new(&copy.node_name),
                Cell::new(short_id(&copy.process_instance_id)),
                Cell::new(copy.business_key.as_deref().unwrap_or("-")),
                Cell::new(colorize_read(copy.is_read)),
            ]);
        }
        render_list("copy task", &table, self.page.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ReadListOutput {
    pub page: Page<CopyTaskRead>,
}

impl CommandOutput for ReadListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["copy task", "node", "reader", "read at"]);
        for read in &self.page.items {
            table.add_row(vec![
                Cell::new(short_id(&read.copy_task_id)),
                Cell::new(&read.node_name),
                Cell::new(&read.reader_name),
                Cell::new(read.read_at.format("%Y-%m-%d %H:%M:%S")),
            ]);
        }
        render_list("read", &table, self.page.total)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct MessageOutput {
    pub message: String,
}

impl CommandOutput for MessageOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

impl CommandOutput for ReadUserNames {
    fn to_human(&self) -> String {
        if self.total == 0 {
            "Nobody has read it yet.".to_string()
        } else {
            format!("Read by {}", self.summary())
        }
    }
}

pub async fn execute(args: CopyArgs, json_mode: bool) -> Result<()> {
    let engine = Engine::load().await?;
    let copies = engine.copies();

    match args.command {
        CopyCommands::List {
            user,
            business_key,
            limit,
        } => {
            let query = CopyTaskQuery {
                business_key,
                ..CopyTaskQuery::for_user(&user)
            };
            let page = copies.get_user_copy_tasks(&query, PageRequest::first(limit)).await?;
            output(&CopyListOutput { page }, json_mode);
        }
        CopyCommands::History { user, limit } => {
            let page = copies
                .get_user_reader_copy_tasks(&CopyTaskQuery::for_user(&user), PageRequest::first(limit))
                .await?;
            output(&ReadListOutput { page }, json_mode);
        }
        CopyCommands::Read { id, user } => {
            copies.complete_copy_task(&id, &user).await?;
            output(
                &MessageOutput {
                    message: format!("Copy task {id} read by {user}"),
                },
                json_mode,
            );
        }
        CopyCommands::Readers {
            activity_instance_id,
            limit,
        } => {
            let names = copies.get_copy_task_read_user_names(&activity_instance_id, limit).await?;
            output(&names, json_mode);
        }
    }
    Ok(())
}
