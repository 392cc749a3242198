//! Purpose: Hold top-level CLI command dispatch for `alchemist`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Local and `--remote` variants of a command print the same JSON shape.

use super::*;

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "alchemist", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Decode { input, remote } => {
            let packages = match remote {
                Some(base_url) => RemoteClient::new(base_url)?.decode(&input)?,
                None => decode(&input)?,
            };
            emit_json(json!(packages));
            Ok(RunOutcome::ok())
        }
        Command::History { db, limit, remote } => {
            let entries = match remote {
                Some(base_url) => RemoteClient::new(base_url)?.history(Some(limit))?.history,
                None => {
                    if !db.exists() {
                        return Err(Error::new(ErrorKind::NotFound)
                            .with_message(format!(
                                "history database not found: {}",
                                db.display()
                            ))
                            .with_hint("Run `alchemist serve` first or pass --db."));
                    }
                    HistoryStore::open(&db)?.recent(limit)?
                }
            };
            emit_json(json!({
                "total_records": entries.len(),
                "history": entries,
            }));
            Ok(RunOutcome::ok())
        }
        Command::Serve {
            bind,
            db,
            max_input_len,
            max_history_limit,
        } => {
            let config = serve::ServeConfig {
                bind,
                db_path: db,
                max_input_len,
                max_history_limit,
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
    }
}
