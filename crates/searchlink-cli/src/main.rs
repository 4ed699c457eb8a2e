//! # searchlink CLI Entry Point
//!
//! Sends requests to a search cluster through the searchlink transport, so
//! retries, node quarantine and sniffing behave exactly as they do for
//! library users.
//!
//! ## Usage
//!
//! ```bash
//! # Raw request, output is the JSON body
//! searchlink -H http://127.0.0.1:9200 request GET /_cluster/health
//!
//! # Index a document with query parameters
//! searchlink request PUT /books/_doc/1 -p refresh=true -d '{"title": "Dune"}'
//!
//! # Document operations
//! searchlink get books 1
//! searchlink search books -q '{"query": {"match": {"title": "dune"}}}'
//!
//! # Show the nodes the cluster reports
//! searchlink --config cluster.json sniff
//! ```
//!
//! Logs go to stderr (`RUST_LOG`, default `warn`), so stdout can be piped
//! straight into `jq`.

use anyhow::Result;
use argh::FromArgs;
use searchlink_cli::{parse_json, parse_method, parse_param, ConfigOverrides};
use searchlink_client::Client;
use searchlink_transport::{SelectorKind, Transport};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(FromArgs)]
/// searchlink - talk to a search cluster from the shell
struct Cli {
    /// JSON transport config file; flags below override its values
    #[argh(option)]
    config: Option<PathBuf>,

    /// seed host, e.g. http://127.0.0.1:9200 (repeatable)
    #[argh(option, short = 'H', long = "host")]
    hosts: Vec<String>,

    /// retries after the first attempt
    #[argh(option, long = "max-retries")]
    max_retries: Option<usize>,

    /// sniff the cluster before the first request
    #[argh(switch, long = "sniff-on-start")]
    sniff_on_start: bool,

    /// sniff the cluster after a connection failure
    #[argh(switch, long = "sniff-on-connection-fail")]
    sniff_on_connection_fail: bool,

    /// sniff the cluster every N requests
    #[argh(option, long = "sniff-after-requests")]
    sniff_after_requests: Option<u64>,

    /// node selection: round_robin, sticky_round_robin or random
    #[argh(option, from_str_fn(parse_selector))]
    selector: Option<SelectorKind>,

    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Request(RequestArgs),
    Get(GetArgs),
    Search(SearchArgs),
    Sniff(SniffArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "request")]
/// send a raw request
struct RequestArgs {
    /// HTTP method (GET, POST, PUT, DELETE, HEAD)
    #[argh(positional)]
    method: String,

    /// request path, e.g. /_cat/indices
    #[argh(positional)]
    path: String,

    /// query parameter as key=value (repeatable)
    #[argh(option, short = 'p', long = "param")]
    params: Vec<String>,

    /// JSON request body
    #[argh(option, short = 'd', long = "data")]
    data: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "get")]
/// fetch a document by id
struct GetArgs {
    /// index name
    #[argh(positional)]
    index: String,

    /// document id
    #[argh(positional)]
    id: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "search")]
/// search one index, or all of them
struct SearchArgs {
    /// index name; omit to search every index
    #[argh(positional)]
    index: Option<String>,

    /// JSON query body
    #[argh(option, short = 'q', long = "query")]
    query: Option<String>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "sniff")]
/// ask the cluster for its nodes and print them
struct SniffArgs {}

fn parse_selector(value: &str) -> Result<SelectorKind, String> {
    value.parse().map_err(|e: searchlink_common::SearchlinkError| e.to_string())
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config: self.config.clone(),
            hosts: self.hosts.clone(),
            max_retries: self.max_retries,
            sniff_on_start: self.sniff_on_start,
            sniff_on_connection_fail: self.sniff_on_connection_fail,
            sniff_after_requests: self.sniff_after_requests,
            selector: self.selector,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Default log level is WARN, RUST_LOG overrides. Stderr keeps stdout clean.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.overrides().resolve()?;
    tracing::debug!(hosts = ?config.hosts, selector = ?config.selector, "Resolved transport config");
    let transport = Arc::new(Transport::new(config)?);

    match cli.command {
        Commands::Request(args) => run_request(&transport, args).await,
        Commands::Get(args) => {
            let client = Client::from_transport(transport);
            let doc = client.get(&args.index, &args.id, &[]).await?;
            println!("{}", serde_json::to_string(&doc)?);
            Ok(())
        }
        Commands::Search(args) => {
            let query = parse_json(args.query.as_deref(), "--query")?;
            let client = Client::from_transport(transport);
            let hits = client
                .search(args.index.as_deref(), query.as_ref(), &[])
                .await?;
            println!("{}", serde_json::to_string(&hits)?);
            Ok(())
        }
        Commands::Sniff(_) => run_sniff(&transport).await,
    }
}

/// Executes the `request` subcommand and prints the raw JSON body.
async fn run_request(transport: &Transport, args: RequestArgs) -> Result<()> {
    let method = parse_method(&args.method)?;
    let params = args
        .params
        .iter()
        .map(|p| parse_param(p))
        .collect::<Result<Vec<_>>>()?;
    let body = parse_json(args.data.as_deref(), "--data")?;

    let result = transport
        .perform_request(method, &args.path, &params, body.as_ref())
        .await?;

    println!("{}", serde_json::to_string(&result.data)?);
    Ok(())
}

async fn run_sniff(transport: &Transport) -> Result<()> {
    transport.sniff().await?;

    let nodes: Vec<_> = transport
        .nodes()
        .await
        .into_iter()
        .map(|node| {
            json!({
                "address": node.address(),
                "url": node.base_url(),
                "params": node.params,
            })
        })
        .collect();
    println!("{}", serde_json::to_string(&json!({ "nodes": nodes }))?);
    Ok(())
}

/// CLI argument parsing tests.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_request() {
        let args: Cli = Cli::from_args(
            &["searchlink"],
            &["request", "POST", "/books/_doc", "-p", "refresh=true", "-d", "{}"],
        )
        .unwrap();
        match args.command {
            Commands::Request(RequestArgs { method, path, params, data }) => {
                assert_eq!(method, "POST");
                assert_eq!(path, "/books/_doc");
                assert_eq!(params, vec!["refresh=true".to_string()]);
                assert_eq!(data, Some("{}".to_string()));
            }
            _ => panic!("Expected Request command"),
        }
    }

    #[test]
    fn test_cli_parse_global_options() {
        let args: Cli = Cli::from_args(
            &["searchlink"],
            &[
                "-H", "http://10.0.0.1:9200",
                "--host", "http://10.0.0.2:9200",
                "--max-retries", "1",
                "--sniff-on-start",
                "--sniff-after-requests", "50",
                "--selector", "sticky",
                "sniff",
            ],
        )
        .unwrap();

        assert!(matches!(args.command, Commands::Sniff(_)));
        let overrides = args.overrides();
        assert_eq!(overrides.hosts.len(), 2);
        assert_eq!(overrides.max_retries, Some(1));
        assert!(overrides.sniff_on_start);
        assert!(!overrides.sniff_on_connection_fail);
        assert_eq!(overrides.sniff_after_requests, Some(50));
        assert_eq!(overrides.selector, Some(SelectorKind::StickyRoundRobin));
    }

    #[test]
    fn test_cli_parse_unknown_selector() {
        let args = Cli::from_args(&["searchlink"], &["--selector", "fastest", "sniff"]);
        assert!(args.is_err());
    }

    #[test]
    fn test_cli_parse_get() {
        let args: Cli = Cli::from_args(&["searchlink"], &["get", "books", "1"]).unwrap();
        match args.command {
            Commands::Get(GetArgs { index, id }) => {
                assert_eq!(index, "books");
                assert_eq!(id, "1");
            }
            _ => panic!("Expected Get command"),
        }
    }

    #[test]
    fn test_cli_parse_search() {
        let args: Cli = Cli::from_args(&["searchlink"], &["search"]).unwrap();
        match args.command {
            Commands::Search(SearchArgs { index, query }) => {
                assert!(index.is_none());
                assert!(query.is_none());
            }
            _ => panic!("Expected Search command"),
        }

        let args: Cli = Cli::from_args(
            &["searchlink"],
            &["search", "books", "-q", r#"{"size":1}"#],
        )
        .unwrap();
        match args.command {
            Commands::Search(SearchArgs { index, query }) => {
                assert_eq!(index, Some("books".to_string()));
                assert_eq!(query, Some(r#"{"size":1}"#.to_string()));
            }
            _ => panic!("Expected Search command"),
        }
    }
}
