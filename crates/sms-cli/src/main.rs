use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use sms_core::{DataBag, DispatchConfig, Message, SendSmsRequest, SendVoiceRequest, parse_duration};
use sms_provider_registry::{ProviderRegistry, providers, register_configured};
use sms_retry::Cancellation;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    sms_telemetry::install("sms-dispatch")?;

    let config = DispatchConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    let registry = ProviderRegistry::from_config(&config);
    let registered = register_configured(&registry, &config)?;
    info!(providers = ?registered, "backends registered");

    match cli.command {
        CliCommand::Providers => handle_providers(&registry, &config, cli.json),
        CliCommand::Sms(args) => handle_sms(&registry, args, cli.json).await,
        CliCommand::Call(args) => handle_call(&registry, args, cli.json).await,
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "sms-dispatch",
    version,
    about = "Send SMS messages and voice calls through configured backends"
)]
struct Cli {
    /// Dispatch configuration file (.yaml, .yml or .json).
    #[arg(long, short, value_name = "PATH")]
    config: PathBuf,
    /// Print machine-readable JSON instead of a summary line.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// List configured backends and the active one
    Providers,
    /// Send a text message
    Sms(SendArgs),
    /// Start a voice call that reads the rendered text aloud
    Call(SendArgs),
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Recipient phone number.
    #[arg(long)]
    to: String,
    /// Sender number or brand name.
    #[arg(long)]
    from: String,
    /// Tag of the application sending the message.
    #[arg(long, default_value = "")]
    by: String,
    /// Template overriding the configured default.
    #[arg(long)]
    template: Option<String>,
    /// Template variable; values parse as JSON, else as plain strings. Can be repeated.
    #[arg(long = "data", value_name = "KEY=VALUE", value_parser = parse_pair)]
    data: Vec<(String, Value)>,
    /// Backend-specific option; same syntax as --data. Can be repeated.
    #[arg(long = "option", value_name = "KEY=VALUE", value_parser = parse_pair)]
    options: Vec<(String, Value)>,
    /// Switch to this backend before sending.
    #[arg(long)]
    provider: Option<String>,
    /// Overall deadline for the send including retries (e.g. 30s, 1m).
    #[arg(long, value_parser = parse_timeout)]
    timeout: Option<Duration>,
}

impl SendArgs {
    fn message(&self) -> Message {
        Message::new(&self.from, &self.to, &self.by)
    }

    fn cancellation(&self) -> Cancellation {
        match self.timeout {
            Some(timeout) => Cancellation::never().with_timeout(timeout),
            None => Cancellation::never(),
        }
    }

    fn select(&self, registry: &ProviderRegistry) -> Result<()> {
        if let Some(name) = &self.provider {
            registry
                .switch_provider(name)
                .with_context(|| format!("cannot use provider {name}"))?;
        }
        Ok(())
    }
}

fn parse_pair(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn parse_timeout(raw: &str) -> Result<Duration, String> {
    parse_duration(raw)
        .filter(|timeout| !timeout.is_zero())
        .ok_or_else(|| format!("invalid timeout `{raw}`"))
}

fn into_bag(pairs: Vec<(String, Value)>) -> DataBag {
    pairs.into_iter().collect()
}

fn handle_providers(registry: &ProviderRegistry, config: &DispatchConfig, json: bool) -> Result<()> {
    let active = registry.active_name();
    let registered = registry.names();
    let configured: Vec<&String> = config.providers.keys().collect();
    if json {
        let report = json!({
            "active": active,
            "registered": registered,
            "configured": configured,
            "supported": providers::supported(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for name in &registered {
        let marker = if active.as_deref() == Some(name.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{marker} {name}");
    }
    for name in configured {
        if !registered.contains(name) {
            println!("  {name} (unsupported by this build)");
        }
    }
    Ok(())
}

async fn handle_sms(registry: &ProviderRegistry, args: SendArgs, json: bool) -> Result<()> {
    args.select(registry)?;
    let cancellation = args.cancellation();
    let mut request = SendSmsRequest::new(args.message());
    request.template = args.template;
    request.data = into_bag(args.data);
    request.options = into_bag(args.options);

    let response = registry
        .send_sms(&cancellation, &request)
        .await
        .context("sms dispatch failed")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("{response}");
    }
    Ok(())
}

async fn handle_call(registry: &ProviderRegistry, args: SendArgs, json: bool) -> Result<()> {
    args.select(registry)?;
    let cancellation = args.cancellation();
    let mut request = SendVoiceRequest::new(args.message());
    request.template = args.template;
    request.data = into_bag(args.data);
    request.options = into_bag(args.options);

    let response = registry
        .send_voice_call(&cancellation, &request)
        .await
        .context("voice dispatch failed")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("{response}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_parse_json_then_text() {
        assert_eq!(parse_pair("code=123456").unwrap(), ("code".into(), json!(123456)));
        assert_eq!(parse_pair("name=John").unwrap(), ("name".into(), json!("John")));
        assert_eq!(parse_pair("speed=1.5").unwrap(), ("speed".into(), json!(1.5)));
        assert_eq!(parse_pair("url=a=b").unwrap(), ("url".into(), json!("a=b")));
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=x").is_err());
    }

    #[test]
    fn timeouts_use_duration_syntax() {
        assert_eq!(parse_timeout("1m30s").unwrap(), Duration::from_secs(90));
        assert!(parse_timeout("0s").is_err());
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn cli_shape_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
