use std::collections::HashMap;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;

use p2pub_core::provider::{DataSource, Provider, Timeouts};
use p2pub_core::resource::{ResourceId, State, Value};
use p2pub_core::schema::ResourceSchema;
use p2pub_provider::system_storage::{DATA_SOURCE_NAME, system_storage_schema};
use p2pub_provider::{Credentials, HttpClientConfig, P2pubProvider, ProviderContext};

#[derive(Parser)]
#[command(name = "p2pub")]
#[command(about = "Read-only lookups against the IIJ GIO P2 public resource API", long_about = None)]
struct Cli {
    /// API endpoint
    #[arg(long, global = true, env = "P2PUB_ENDPOINT", default_value = HttpClientConfig::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// API version path segment
    #[arg(long, global = true, env = "P2PUB_API_VERSION", default_value = HttpClientConfig::DEFAULT_API_VERSION)]
    api_version: String,

    /// GIS service code every call is scoped to
    #[arg(long, global = true, env = "P2PUB_GIS_SERVICE_CODE")]
    gis: Option<String>,

    /// API access key
    #[arg(long, global = true, env = "P2PUB_ACCESS_KEY")]
    access_key: Option<String>,

    /// API secret key
    #[arg(long, global = true, env = "P2PUB_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up a single system storage
    SystemStorage {
        /// Service code of the storage (bypasses filters when found)
        #[arg(long)]
        service_code: Option<String>,

        /// Filter as name=value; name is one of os_type, label, type
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,

        /// Pick by start date when several storages match
        #[arg(long)]
        most_recent: bool,

        /// Read timeout in seconds
        #[arg(long, default_value_t = Timeouts::DEFAULT_READ.as_secs())]
        timeout: u64,

        /// Name given to the data source instance in messages
        #[arg(long, default_value = "this")]
        name: String,

        /// Print the state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the attribute schema of a data source
    Schema {
        /// Data source name (e.g., system-storage)
        #[arg(default_value = "system-storage")]
        data_source: String,
    },
}

fn parse_filter(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("invalid filter '{}': expected name=value", s)),
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::SystemStorage {
            ref service_code,
            ref filters,
            most_recent,
            timeout,
            ref name,
            json,
        } => {
            let attributes = build_attributes(service_code.as_deref(), filters, most_recent);
            run_read(&cli, name, attributes, Duration::from_secs(timeout), json).await
        }
        Commands::Schema { ref data_source } => run_schema(data_source),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Turn command line flags into data source configuration attributes
fn build_attributes(
    service_code: Option<&str>,
    filters: &[(String, String)],
    most_recent: bool,
) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();

    if let Some(code) = service_code {
        attributes.insert("service_code".to_string(), Value::from(code));
    }

    if !filters.is_empty() {
        let entries = filters
            .iter()
            .map(|(name, value)| {
                let mut entry = HashMap::new();
                entry.insert("name".to_string(), Value::from(name.as_str()));
                entry.insert("value".to_string(), Value::from(value.as_str()));
                Value::Map(entry)
            })
            .collect();
        attributes.insert("filter".to_string(), Value::List(entries));
    }

    attributes.insert("most_recent".to_string(), Value::Bool(most_recent));
    attributes
}

fn required<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str, String> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("{} is required", what))
}

fn get_provider(cli: &Cli, timeout: Duration) -> Result<P2pubProvider, String> {
    let gis = required(&cli.gis, "GIS service code (--gis or P2PUB_GIS_SERVICE_CODE)")?;
    let access_key = required(&cli.access_key, "Access key (--access-key or P2PUB_ACCESS_KEY)")?;
    let secret_key = required(&cli.secret_key, "Secret key (--secret-key or P2PUB_SECRET_KEY)")?;

    let config = HttpClientConfig::new(&cli.endpoint, Credentials::new(access_key, secret_key))
        .with_api_version(&cli.api_version)
        .with_timeout(timeout);
    let context = ProviderContext::from_config(&config, gis).map_err(|e| e.to_string())?;
    Ok(P2pubProvider::new(context))
}

async fn run_read(
    cli: &Cli,
    name: &str,
    attributes: HashMap<String, Value>,
    timeout: Duration,
    json: bool,
) -> Result<(), String> {
    let provider = get_provider(cli, timeout)?;
    let data_source = provider
        .data_source(DATA_SOURCE_NAME)
        .map_err(|e| e.to_string())?;
    let timeouts = data_source.timeouts().with_read(timeout);

    let state = read_with_timeout(data_source.as_ref(), name, &attributes, timeouts).await?;

    if json {
        let out = serde_json::to_string_pretty(&state_to_json(&state))
            .map_err(|e| format!("Failed to serialize state: {}", e))?;
        println!("{}", out);
    } else {
        print_state(&state);
    }
    Ok(())
}

async fn read_with_timeout(
    data_source: &dyn DataSource,
    name: &str,
    attributes: &HashMap<String, Value>,
    timeouts: Timeouts,
) -> Result<State, String> {
    let id = ResourceId::new(data_source.name(), name);
    log::debug!("reading {} (timeout {:?})", id, timeouts.read);

    match tokio::time::timeout(timeouts.read, data_source.read(&id, attributes)).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => Err(format!(
            "[{}] read timed out after {}s",
            id,
            timeouts.read.as_secs()
        )),
    }
}

fn run_schema(data_source: &str) -> Result<(), String> {
    let schema = match data_source {
        "system-storage" | "system_storage" | DATA_SOURCE_NAME => system_storage_schema(),
        other => return Err(format!("Unknown data source: {}", other)),
    };
    print_schema(&schema);
    Ok(())
}

fn print_schema(schema: &ResourceSchema) {
    println!("{}", schema.resource_type.bold());
    if let Some(desc) = &schema.description {
        println!("  {}", desc.dimmed());
    }
    println!();

    for attr in schema.sorted_attributes() {
        let flags = match (attr.required, attr.computed) {
            (true, _) => "required",
            (false, true) => "optional, computed",
            (false, false) => "optional",
        };
        print!("  {} {} ({})", attr.name.cyan(), attr.attr_type, flags);
        if let Some(default) = &attr.default {
            print!(" = {}", format_value(default));
        }
        println!();
        if let Some(desc) = &attr.description {
            println!("      {}", desc.dimmed());
        }
    }
}

fn print_state(state: &State) {
    println!(
        "{} {}",
        format!("{}.{}", state.id.resource_type, state.id.name).bold(),
        state.identifier.as_deref().unwrap_or("-").green()
    );

    let mut keys: Vec<&String> = state.attributes.keys().collect();
    keys.sort();
    let width = keys.iter().map(|k| k.len()).max().unwrap_or(0);
    for key in keys {
        println!(
            "  {:width$} = {}",
            key.cyan(),
            format_value(&state.attributes[key]),
            width = width
        );
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut strs: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            strs.sort();
            format!("{{{}}}", strs.join(", "))
        }
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}

fn state_to_json(state: &State) -> serde_json::Value {
    let attributes: serde_json::Map<String, serde_json::Value> = state
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), value_to_json(v)))
        .collect();

    serde_json::json!({
        "id": state.identifier,
        "attributes": attributes,
    })
}
