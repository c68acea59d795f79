use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use tm_bridge::tm::*;
use tm_bridge::{BridgeConfig, ConnectionConfig};

/// One line from the host on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HostCommand {
    Operate(Operation),
    Configure(ConnectionConfig),
    Quit,
}

impl HostCommand {
    fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or("empty command")?;
        let args: Vec<&str> = words.collect();

        let field_arg = |args: &[&str]| -> Result<u32, String> {
            args.first()
                .ok_or_else(|| format!("{} needs a field id", verb))?
                .parse()
                .map_err(|_| format!("{}: field id must be a number", verb))
        };

        let op = match verb {
            "start" => Operation::Start,
            "end" => Operation::EndEarly,
            "toggle" => Operation::StartOrEnd,
            "abort" => Operation::Abort,
            "reset" => Operation::ResetTimer,
            "next" => Operation::QueueNextMatch,
            "prev" => Operation::QueuePrevMatch,
            "skills-driving" => Operation::QueueDrivingSkills {
                field_id: field_arg(&args)?,
            },
            "skills-programming" => Operation::QueueProgrammingSkills {
                field_id: field_arg(&args)?,
            },
            "field" => Operation::MoveMatchToField {
                field_id: field_arg(&args)?,
            },
            "display" => {
                let name = args.first().ok_or("display needs a screen name")?;
                Operation::SelectDisplay(name.parse()?)
            }
            "config" => {
                let [address, secret, field_set, rest @ ..] = args.as_slice() else {
                    return Err("usage: config <address> <secret> <fieldset> [binary|legacy]".into());
                };
                let field_set = field_set
                    .parse::<u32>()
                    .map_err(|_| format!("config: bad field set '{}'", field_set))?;
                let generation = match rest.first() {
                    Some(g) => g.parse::<Generation>()?,
                    None => Generation::default(),
                };
                return Ok(HostCommand::Configure(ConnectionConfig {
                    address: address.to_string(),
                    secret: secret.to_string(),
                    field_set,
                    generation,
                }));
            }
            "quit" | "exit" => return Ok(HostCommand::Quit),
            other => return Err(format!("unknown command '{}'", other)),
        };
        Ok(HostCommand::Operate(op))
    }
}

fn spawn_engine(
    config: &BridgeConfig,
) -> anyhow::Result<(FieldControlEngine, mpsc::UnboundedReceiver<EngineEvent>)> {
    let policy = ReconnectPolicy::every(config.reconnect_interval);
    let connection = config.connection.clone();
    tracing::info!(
        "Starting {} engine for field set {} at {}",
        connection.generation,
        connection.field_set,
        connection.address
    );
    let spawned = match connection.generation {
        Generation::Binary => FieldControlEngine::spawn(BinaryClient::new(), connection, policy),
        Generation::Legacy => FieldControlEngine::spawn(LegacyClient::new()?, connection, policy),
    };
    Ok(spawned)
}

async fn write_event(out: &mut tokio::io::Stdout, event: &EngineEvent) -> anyhow::Result<()> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    out.write_all(line.as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries events, so tracing goes to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tm_bridge=info")),
        )
        .init();

    let mut config = BridgeConfig::from_env();
    let (mut engine, mut events) = spawn_engine(&config)?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::error!("Engine stopped unexpectedly");
                    break;
                };
                write_event(&mut stdout, &event).await?;
            }

            line = stdin.next_line() => {
                let Some(line) = line? else {
                    tracing::info!("stdin closed, shutting down");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let command = match HostCommand::parse(&line) {
                    Ok(command) => command,
                    Err(e) => {
                        tracing::warn!("{}", e);
                        continue;
                    }
                };

                match command {
                    HostCommand::Operate(op) => {
                        if let Err(e) = engine.submit(op) {
                            tracing::warn!("{}: {}", op.name(), e);
                        }
                    }
                    HostCommand::Configure(connection) => {
                        let switching = connection.generation != engine.generation();
                        config.connection = connection;
                        if switching {
                            engine.close().await;
                            (engine, events) = spawn_engine(&config)?;
                        } else if let Err(e) = engine.reconfigure(config.connection.clone()) {
                            tracing::warn!("Reconfigure failed: {}", e);
                        }
                    }
                    HostCommand::Quit => break,
                }
            }
        }
    }

    engine.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_operations() {
        assert_eq!(
            HostCommand::parse("toggle").unwrap(),
            HostCommand::Operate(Operation::StartOrEnd)
        );
        assert_eq!(
            HostCommand::parse("  skills-driving 2 ").unwrap(),
            HostCommand::Operate(Operation::QueueDrivingSkills { field_id: 2 })
        );
        assert_eq!(
            HostCommand::parse("display rankings").unwrap(),
            HostCommand::Operate(Operation::SelectDisplay(AudienceDisplay::Rankings))
        );
        assert_eq!(HostCommand::parse("quit").unwrap(), HostCommand::Quit);
    }

    #[test]
    fn test_parse_config() {
        assert_eq!(
            HostCommand::parse("config 10.0.0.5 pw 1 legacy").unwrap(),
            HostCommand::Configure(ConnectionConfig {
                address: "10.0.0.5".into(),
                secret: "pw".into(),
                field_set: 1,
                generation: Generation::Legacy,
            })
        );
        let HostCommand::Configure(config) = HostCommand::parse("config tm key 0").unwrap() else {
            panic!("expected config");
        };
        assert_eq!(config.generation, Generation::Binary);
    }

    #[test]
    fn test_parse_errors() {
        assert!(HostCommand::parse("field").is_err());
        assert!(HostCommand::parse("field one").is_err());
        assert!(HostCommand::parse("display NOPE").is_err());
        assert!(HostCommand::parse("config tm").is_err());
        assert!(HostCommand::parse("dance").is_err());
    }
}
