//! Stdio host for the bridge.
//!
//! Reads one JSON command per line from stdin and writes results and
//! listener events as JSON lines to stdout. Commands run concurrently, so a
//! slow `get` does not hold up a `put_answer` behind it; all output goes
//! through the main loop, which is the only writer to stdout.
//!
//! # Protocol
//!
//! ```text
//! → {"id":1,"op":"get","host":"localhost","port":9695,"request":"01d2","timeout_ms":1000}
//! ← {"id":1,"result":"0482..."}
//! → {"id":2,"op":"put","host":"localhost","port":9695,"request":"01d2","name":"alice","reply":"0482"}
//! ← {"id":2,"result":"STARTED PUBLISHING"}
//! ← {"event":"received_interest","data":"01d2...","name":"alice"}
//! → {"id":3,"op":"put_answer","name":"alice","reply":"0482"}
//! → {"id":4,"op":"connect_and_start","host":"localhost","port":6363,"request":"01d2"}
//! → {"id":5,"op":"set_route","host":"localhost","port":6363}
//! → {"id":6,"op":"query","request":"01d2"}
//! → {"id":7,"op":"close","name":"alice"}
//! ```
//!
//! Lines that fail to parse are answered with `{"id":null,"error":"..."}`.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task::{JoinError, JoinSet};

use crate::bridge::BridgeService;
use crate::config::Config;
use crate::listener::ChannelListener;

/// One command line from the host.
#[derive(Debug, Deserialize)]
pub struct Request {
    /// Caller-chosen id echoed back with the result.
    #[serde(default)]
    pub id: Value,
    /// The operation to run.
    #[serde(flatten)]
    pub command: Command,
}

/// Bridge operations available over stdio.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    /// `get`.
    Get {
        /// Remote host.
        host: String,
        /// Remote port.
        port: u16,
        /// Hex request payload.
        request: String,
        /// Deadline; the configured default when absent.
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    /// `put`.
    Put {
        /// Remote host.
        host: String,
        /// Remote port.
        port: u16,
        /// Hex request payload.
        request: String,
        /// Name to register the connection under.
        name: String,
        /// Hex canned reply.
        reply: String,
    },
    /// `putAnswer`.
    PutAnswer {
        /// Registered connection name.
        name: String,
        /// Hex reply payload.
        reply: String,
    },
    /// `connectAndStart`.
    ConnectAndStart {
        /// Remote host.
        host: String,
        /// Remote port.
        port: u16,
        /// Hex request payload.
        request: String,
    },
    /// Set the default route for `query`.
    SetRoute {
        /// Route host.
        host: String,
        /// Route port.
        port: u16,
    },
    /// `connectAndStart` against the default route.
    Query {
        /// Hex request payload.
        request: String,
    },
    /// Close a named connection.
    Close {
        /// Registered connection name.
        name: String,
    },
}

/// Parse one command line.
pub fn parse_request(line: &str) -> serde_json::Result<Request> {
    serde_json::from_str(line)
}

/// Execute `command` and return its result string.
pub async fn execute(service: &BridgeService, command: Command) -> String {
    match command {
        Command::Get {
            host,
            port,
            request,
            timeout_ms,
        } => {
            let timeout =
                timeout_ms.map_or_else(|| service.config().default_get_timeout(), Duration::from_millis);
            service.get(&host, port, &request, timeout).await.to_string()
        }
        Command::Put {
            host,
            port,
            request,
            name,
            reply,
        } => service.put(&host, port, &request, &name, &reply).await.to_string(),
        Command::PutAnswer { name, reply } => service.put_answer(&name, &reply).await.to_string(),
        Command::ConnectAndStart {
            host,
            port,
            request,
        } => service.connect_and_start(&host, port, &request).await,
        Command::SetRoute { host, port } => {
            service.set_route(&host, port).await;
            crate::constants::SUCCESS.to_string()
        }
        Command::Query { request } => service.query(&request).await,
        Command::Close { name } => {
            if service.close(&name).await {
                crate::constants::SUCCESS.to_string()
            } else {
                crate::constants::FAILURE.to_string()
            }
        }
    }
}

/// Run the stdio host until stdin closes and in-flight commands finish.
pub fn run(config: Config) -> Result<()> {
    let rt = super::runtime()?;
    rt.block_on(run_async(config))
}

async fn run_async(config: Config) -> Result<()> {
    let (listener, mut events) = ChannelListener::new();
    let service = Arc::new(BridgeService::new(config, Arc::new(listener)));

    // Spawn stdin reader on a blocking thread (stdin is synchronous)
    let (stdin_tx, mut stdin_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    tokio::task::spawn_blocking(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) if !l.trim().is_empty() => {
                    if stdin_tx.send(l).is_err() {
                        break;
                    }
                }
                Ok(_) => {} // skip empty lines
                Err(e) => {
                    log::error!("[Serve] stdin read error: {e}");
                    break;
                }
            }
        }
    });

    let mut commands: JoinSet<Value> = JoinSet::new();
    let mut stdin_open = true;
    let mut stdout = io::stdout();

    while stdin_open || !commands.is_empty() {
        tokio::select! {
            line = stdin_rx.recv(), if stdin_open => {
                let Some(line) = line else {
                    log::info!("[Serve] stdin closed, waiting for {} command(s)", commands.len());
                    stdin_open = false;
                    continue;
                };
                match parse_request(&line) {
                    Ok(Request { id, command }) => {
                        log::debug!("[Serve] {id} -> {command:?}");
                        let service = Arc::clone(&service);
                        commands.spawn(async move {
                            let result = execute(&service, command).await;
                            json!({"id": id, "result": result})
                        });
                    }
                    Err(e) => {
                        log::warn!("[Serve] Invalid command: {e}");
                        writeln!(stdout, "{}", json!({"id": null, "error": e.to_string()}))?;
                        stdout.flush()?;
                    }
                }
            }
            Some(joined) = commands.join_next(), if !commands.is_empty() => {
                let result = command_outcome(joined);
                writeln!(stdout, "{result}")?;
                stdout.flush()?;
            }
            Some(event) = events.recv() => {
                writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
                stdout.flush()?;
            }
        }
    }

    service.shutdown().await;
    while let Ok(event) = events.try_recv() {
        writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
    }
    stdout.flush()?;
    Ok(())
}

/// Output line for a finished command task.
///
/// A task that panicked has lost its id, so it is reported like an
/// unparseable line.
fn command_outcome(joined: Result<Value, JoinError>) -> Value {
    match joined {
        Ok(result) => result,
        Err(e) => {
            log::error!("[Serve] Command task failed: {e}");
            json!({"id": null, "error": format!("command task failed: {e}")})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get_with_default_timeout() {
        let req = parse_request(r#"{"id":1,"op":"get","host":"localhost","port":9695,"request":"01d2"}"#)
            .unwrap();
        assert_eq!(req.id, json!(1));
        assert_eq!(
            req.command,
            Command::Get {
                host: "localhost".to_string(),
                port: 9695,
                request: "01d2".to_string(),
                timeout_ms: None,
            }
        );
    }

    #[test]
    fn test_parse_put_answer_without_id() {
        let req = parse_request(r#"{"op":"put_answer","name":"alice","reply":"ff"}"#).unwrap();
        assert!(req.id.is_null());
        assert_eq!(
            req.command,
            Command::PutAnswer {
                name: "alice".to_string(),
                reply: "ff".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_op_and_bad_port() {
        assert!(parse_request(r#"{"id":1,"op":"explode"}"#).is_err());
        assert!(parse_request(r#"{"id":1,"op":"query"}"#).is_err());
        assert!(parse_request(
            r#"{"id":1,"op":"connect_and_start","host":"h","port":70000,"request":""}"#
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_execute_route_and_close_without_network() {
        let (listener, mut events) = ChannelListener::new();
        let service = BridgeService::new(Config::default(), Arc::new(listener));

        assert_eq!(execute(&service, Command::Query { request: "00".to_string() }).await, "");
        assert_eq!(
            execute(
                &service,
                Command::SetRoute {
                    host: "127.0.0.1".to_string(),
                    port: 6363
                }
            )
            .await,
            "SUCCESS"
        );
        assert_eq!(
            execute(&service, Command::Close { name: "nobody".to_string() }).await,
            "FAILURE"
        );

        // Ready, then the NoRoute error from the first query.
        assert!(matches!(events.recv().await, Some(crate::listener::BridgeEvent::Ready)));
        assert!(matches!(events.recv().await, Some(crate::listener::BridgeEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_panicked_command_still_produces_output() {
        let mut commands: JoinSet<Value> = JoinSet::new();
        commands.spawn(async {
            let missing: Option<Value> = None;
            missing.expect("command blew up")
        });
        commands.spawn(async { json!({"id": 4, "result": "SUCCESS"}) });

        let mut lines = Vec::new();
        while let Some(joined) = commands.join_next().await {
            lines.push(command_outcome(joined));
        }

        assert!(commands.is_empty());
        assert_eq!(lines.len(), 2);
        assert!(lines.contains(&json!({"id": 4, "result": "SUCCESS"})));
        assert!(lines.iter().any(|line| {
            line["id"].is_null()
                && line["error"]
                    .as_str()
                    .is_some_and(|e| e.starts_with("command task failed"))
        }));
    }
}
