use clap::Parser;
use procflow::cli::commands::copy::CopyCommands;
use procflow::cli::commands::process::ProcessCommands;
use procflow::cli::commands::task::TaskCommands;
use procflow::cli::{Cli, Commands};

#[test]
fn test_parse_process_start() {
    let cli = Cli::try_parse_from([
        "procflow", "process", "start", "leave", "-b", "req-7", "--starter", "kermit", "--var", "days=3",
    ])
    .unwrap();

    match cli.command {
        Commands::Process(args) => match args.command {
            ProcessCommands::Start {
                key,
                business_key,
                starter,
                vars,
            } => {
                assert_eq!(key, "leave");
                assert_eq!(business_key.as_deref(), Some("req-7"));
                assert_eq!(starter.as_deref(), Some("kermit"));
                assert_eq!(vars, vec!["days=3"]);
            }
            other => panic!("Wrong process command: {other:?}"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_task_reject_by_path_with_return() {
    let cli = Cli::try_parse_from([
        "procflow", "task", "reject", "t-1", "--path", "--return", "--reason", "incomplete", "--json",
    ])
    .unwrap();
    assert!(cli.json);

    match cli.command {
        Commands::Task(args) => match args.command {
            TaskCommands::Reject {
                id,
                to,
                path,
                return_to_reject,
                reason,
                ..
            } => {
                assert_eq!(id, "t-1");
                assert_eq!(to, None);
                assert!(path);
                assert!(return_to_reject);
                assert_eq!(reason.as_deref(), Some("incomplete"));
            }
            other => panic!("Wrong task command: {other:?}"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_claim_needs_a_user_unless_releasing() {
    assert!(Cli::try_parse_from(["procflow", "task", "claim", "t-1"]).is_err());
    assert!(Cli::try_parse_from(["procflow", "task", "claim", "t-1", "--release"]).is_ok());
    assert!(Cli::try_parse_from(["procflow", "task", "claim", "t-1", "-u", "kermit"]).is_ok());
}

#[test]
fn test_delete_requires_ids() {
    assert!(Cli::try_parse_from(["procflow", "task", "delete"]).is_err());
    let cli = Cli::try_parse_from(["procflow", "task", "delete", "t-1", "t-2", "--cascade"]).unwrap();
    match cli.command {
        Commands::Task(args) => match args.command {
            TaskCommands::Delete { ids, cascade, .. } => {
                assert_eq!(ids.len(), 2);
                assert!(cascade);
            }
            other => panic!("Wrong task command: {other:?}"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_copy_list_defaults() {
    let cli = Cli::try_parse_from(["procflow", "copy", "list", "--user", "gonzo"]).unwrap();
    match cli.command {
        Commands::Copy(args) => match args.command {
            CopyCommands::List { user, limit, business_key } => {
                assert_eq!(user, "gonzo");
                assert_eq!(limit, 20);
                assert_eq!(business_key, None);
            }
            other => panic!("Wrong copy command: {other:?}"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_task_history() {
    let cli = Cli::try_parse_from(["procflow", "--json", "task", "history", "t-1"]).unwrap();
    assert!(cli.json);
    match cli.command {
        Commands::Task(args) => match args.command {
            TaskCommands::History { id } => assert_eq!(id, "t-1"),
            other => panic!("Wrong task command: {other:?}"),
        },
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_process_graph() {
    let cli = Cli::try_parse_from(["procflow", "process", "graph", "leave"]).unwrap();
    match cli.command {
        Commands::Process(args) => match args.command {
            ProcessCommands::Graph { key } => assert_eq!(key, "leave"),
            other => panic!("Wrong process command: {other:?}"),
        },
        _ => panic!("Wrong top-level command"),
    }
}
