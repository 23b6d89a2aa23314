//! Process CLI commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::Cell;

use crate::cli::commands::parse_variables;
use crate::cli::display::{list_table, render_list};
use crate::cli::engine::Engine;
use crate::cli::output::{output, short_id, CommandOutput};
use crate::domain::models::{Execution, ProcessInstance, VariableValue};
use crate::domain::ports::ProcessGraph;

#[derive(Args, Debug)]
pub struct ProcessArgs {
    #[command(subcommand)]
    pub command: ProcessCommands,
}

#[derive(Subcommand, Debug)]
pub enum ProcessCommands {
    /// List deployed process definitions
    List,
    /// Start an instance of the latest version of a definition
    Start {
        /// Definition key
        key: String,
        /// Business key of the instance
        #[arg(short, long)]
        business_key: Option<String>,
        /// Starting user, also exposed as the `starter` variable
        #[arg(short, long)]
        starter: Option<String>,
        /// Variables (format: name=value, values parsed as JSON when possible)
        #[arg(short, long = "var")]
        vars: Vec<String>,
    },
    /// Show an instance and its active executions
    Show {
        /// Process instance ID
        id: String,
    },
    /// Show the nodes of a definition with their predecessors
    Graph {
        /// Definition key
        key: String,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct DefinitionRow {
    pub id: String,
    pub key: String,
    pub name: String,
    pub nodes: usize,
}

#[derive(Debug, serde::Serialize)]
pub struct DefinitionListOutput {
    pub definitions: Vec<DefinitionRow>,
}

impl CommandOutput for DefinitionListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "key", "name", "nodes"]);
        for def in &self.definitions {
            table.add_row(vec![
                Cell::new(&def.id),
                Cell::new(&def.key),
                Cell::new(&def.name),
                Cell::new(def.nodes),
            ]);
        }
        render_list("definition", &table, self.definitions.len() as u64)
    }
}

#[derive(Debug, serde::Serialize)]
pub struct StartOutput {
    pub process_instance_id: String,
    pub new_task_ids: Vec<String>,
    pub ended: bool,
}

impl CommandOutput for StartOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("Started process instance {}", self.process_instance_id)];
        for id in &self.new_task_ids {
            lines.push(format!("  task {id}"));
        }
        if self.ended {
            lines.push("  instance already ended".to_string());
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct InstanceOutput {
    pub instance: ProcessInstance,
    pub active_executions: Vec<Execution>,
}

impl CommandOutput for InstanceOutput {
    fn to_human(&self) -> String {
        let i = &self.instance;
        let mut lines = vec![
            format!("Process instance {}", i.id),
            format!("  Definition:   {}", i.definition_id),
            format!("  Business key: {}", i.business_key.as_deref().unwrap_or("-")),
            format!("  Started:      {}", i.started_at.format("%Y-%m-%d %H:%M:%S UTC")),
        ];
        match i.ended_at {
            Some(ended) => lines.push(format!("  Ended:        {}", ended.format("%Y-%m-%d %H:%M:%S UTC"))),
            None => {
                lines.push("  Active at:".to_string());
                for execution in &self.active_executions {
                    lines.push(format!(
                        "    {} {}",
                        short_id(&execution.id),
                        execution.node_key.as_deref().unwrap_or("-")
                    ));
                }
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, serde::Serialize)]
pub struct NodeRow {
    pub key: String,
    pub kind: String,
    pub path_predecessors: Vec<String>,
    pub task_predecessors: Vec<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct GraphOutput {
    pub definition_id: String,
    pub nodes: Vec<NodeRow>,
}

impl CommandOutput for GraphOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["node", "kind", "entered from", "prior tasks"]);
        for node in &self.nodes {
            table.add_row(vec![
                Cell::new(&node.key),
                Cell::new(&node.kind),
                Cell::new(node.path_predecessors.join(", ")),
                Cell::new(node.task_predecessors.join(", ")),
            ]);
        }
        format!("Definition {}\n{table}", self.definition_id)
    }
}

/// Every node of the latest version of `key` with its static predecessors.
pub fn definition_graph(graph: &dyn ProcessGraph, key: &str) -> Result<GraphOutput> {
    let definition = graph.latest_definition(key)?;
    let mut nodes = Vec::with_capacity(definition.nodes.len());
    for node in &definition.nodes {
        nodes.push(NodeRow {
            key: node.key.clone(),
            kind: node.kind.as_str().to_string(),
            path_predecessors: graph.predecessor_path_nodes(&definition.id, &node.key)?,
            task_predecessors: graph.predecessor_task_nodes(&definition.id, &node.key)?,
        });
    }
    Ok(GraphOutput {
        definition_id: definition.id.clone(),
        nodes,
    })
}

pub async fn execute(args: ProcessArgs, json_mode: bool) -> Result<()> {
    let engine = Engine::load().await?;
    match args.command {
        ProcessCommands::List => {
            let mut definitions = Vec::new();
            for key in engine.registry.keys() {
                let def = engine.ctx.graph.latest_definition(&key)?;
                definitions.push(DefinitionRow {
                    id: def.id.clone(),
                    key: def.key.clone(),
                    name: def.name.clone(),
                    nodes: def.nodes.len(),
                });
            }
            output(&DefinitionListOutput { definitions }, json_mode);
        }
        ProcessCommands::Start {
            key,
            business_key,
            starter,
            vars,
        } => {
            let mut variables = parse_variables(&vars)?;
            if let Some(user) = &starter {
                variables
                    .entry("starter".to_string())
                    .or_insert_with(|| VariableValue::String(user.clone()));
            }
            let outcome = engine
                .runtime()
                .start_process_instance_by_key(&key, business_key.as_deref(), &variables, starter.as_deref())
                .await?;
            output(
                &StartOutput {
                    process_instance_id: outcome.process_instance_id,
                    new_task_ids: outcome.new_task_ids,
                    ended: outcome.ended,
                },
                json_mode,
            );
        }
        ProcessCommands::Show { id } => {
            let runtime = engine.runtime();
            let instance = runtime.get_process_instance(&id).await?;
            let active_executions = runtime.list_active_executions(&id).await?;
            output(&InstanceOutput { instance, active_executions }, json_mode);
        }
        ProcessCommands::Graph { key } => {
            output(&definition_graph(engine.ctx.graph.as_ref(), &key)?, json_mode);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryProcessRegistry;
    use crate::domain::models::ProcessDefinitionBuilder;

    #[test]
    fn test_definition_graph_lists_predecessors_across_gateways() {
        let registry = InMemoryProcessRegistry::new();
        registry
            .deploy(
                ProcessDefinitionBuilder::new("merge")
                    .start_event("start")
                    .user_task("a", "A")
                    .exclusive_gateway("split")
                    .user_task("b", "B")
                    .exclusive_gateway("merge")
                    .user_task("d", "D")
                    .end_event("end")
                    .flow("start", "a")
                    .flow("a", "split")
                    .conditional_flow("split", "b", "${approved}")
                    .default_flow("split", "merge")
                    .flow("b", "merge")
                    .flow("merge", "d")
                    .flow("d", "end")
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let graph = definition_graph(&registry, "merge").unwrap();
        let d = graph.nodes.iter().find(|n| n.key == "d").unwrap();
        assert_eq!(d.path_predecessors, vec!["merge"]);
        assert_eq!(d.task_predecessors, vec!["a", "b"]);
        let start = graph.nodes.iter().find(|n| n.key == "start").unwrap();
        assert!(start.path_predecessors.is_empty());
        assert!(graph.to_human().contains("prior tasks"));
    }

    #[test]
    fn test_definition_graph_unknown_key_fails() {
        assert!(definition_graph(&InMemoryProcessRegistry::new(), "nope").is_err());
    }
}
