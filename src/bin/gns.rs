use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gene_network_search::app::SearchApp;
use gene_network_search::config::{ConfigLoader, ResolvedConfig};
use gene_network_search::cx::CxConverter;
use gene_network_search::cyrest::CyRestHttpClient;
use gene_network_search::domain::{JobId, MergedSearchResult, SearchQuery};
use gene_network_search::error::SearchError;
use gene_network_search::events::EventSink;
use gene_network_search::monitor::AvailabilityMonitor;
use gene_network_search::mygene::MyGeneHttpClient;
use gene_network_search::network::NetworkRequest;
use gene_network_search::output::{JsonOutput, OutputMode};
use gene_network_search::search_service::SearchServiceHttpClient;

type HttpSearchApp = SearchApp<
    MyGeneHttpClient,
    SearchServiceHttpClient,
    SearchServiceHttpClient,
    SearchServiceHttpClient,
    CxConverter,
>;

#[derive(Parser)]
#[command(name = "gns")]
#[command(about = "Search gene sets across network sources and assemble hit networks")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    /// Pretty-print events instead of one JSON object per line
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Submit a gene search and follow it to completion")]
    Search(SearchArgs),
    #[command(about = "List the sources known to the search service")]
    Sources,
    #[command(about = "Fetch one hit network and assemble its graph model")]
    Network(NetworkArgs),
    #[command(about = "Report local Cytoscape availability until interrupted")]
    Watch,
}

#[derive(Args)]
struct SearchArgs {
    #[arg(required = true)]
    genes: Vec<String>,

    #[arg(long = "source")]
    sources: Vec<String>,

    /// Assemble the first network hit once the search completes
    #[arg(long)]
    open_first: bool,
}

#[derive(Args)]
struct NetworkArgs {
    #[arg(long)]
    job_id: String,

    #[arg(long)]
    source_uuid: String,

    #[arg(long)]
    network_uuid: String,

    #[arg(long, default_value_t = 0)]
    nodes: usize,

    #[arg(long, default_value_t = 0)]
    edges: usize,

    #[arg(long, value_delimiter = ',')]
    genes: Vec<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<SearchError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SearchError) -> u8 {
    match error {
        SearchError::InvalidQuery(_)
        | SearchError::ConfigRead(_)
        | SearchError::ConfigParse(_)
        | SearchError::ConfigInvalid(_) => 2,
        error if error.is_remote() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let output = JsonOutput::new(if cli.pretty {
        OutputMode::Pretty
    } else {
        OutputMode::Lines
    });

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;
    runtime.block_on(async move {
        match cli.command {
            Commands::Search(args) => run_search(args, &config, output).await,
            Commands::Sources => run_sources(&config, output).await,
            Commands::Network(args) => run_network(args, &config, output).await,
            Commands::Watch => run_watch(&config, output).await,
        }
    })
}

fn build_app(config: &ResolvedConfig, output: JsonOutput) -> Result<HttpSearchApp, SearchError> {
    let annotations = MyGeneHttpClient::new(
        config.gene_annotation_url.clone(),
        config.species.clone(),
        config.request_timeout,
    )?;
    let search = SearchServiceHttpClient::new(config.search_base_url.clone(), config.request_timeout)?;
    let sink: Arc<dyn EventSink> = Arc::new(output);
    Ok(SearchApp::new(
        annotations,
        search.clone(),
        Arc::new(search.clone()),
        search,
        CxConverter::new(),
        sink,
    )
    .configure(config))
}

async fn run_search(
    args: SearchArgs,
    config: &ResolvedConfig,
    output: JsonOutput,
) -> miette::Result<()> {
    let query = SearchQuery::new(args.genes, args.sources)?;
    let mut app = build_app(config, output)?;

    let outcome = app.search(&query).await?;
    app.fetch_results(outcome.job_id.clone());
    let Some(result) = app.wait_for_results().await else {
        return Err(miette::Report::msg("result aggregation did not finish"));
    };
    let summary = result?;
    info!(job_id = %outcome.job_id, polls = summary.polls, "search finished");

    if args.open_first {
        match first_hit(&summary.merged, query.genes()) {
            Some(request) => {
                info!(
                    url = %request.original_network_url(&config.ndex_base_url),
                    "assembling first hit"
                );
                app.fetch_network(&request).await?;
            }
            None => info!("search returned no network hits"),
        }
    }
    Ok(())
}

fn first_hit(merged: &MergedSearchResult, query_genes: &[String]) -> Option<NetworkRequest> {
    merged.sources.iter().find_map(|source| {
        source.results.first().and_then(|hit| {
            NetworkRequest::from_hit(merged.job_id.clone(), source, hit, query_genes)
        })
    })
}

async fn run_sources(config: &ResolvedConfig, output: JsonOutput) -> miette::Result<()> {
    let app = build_app(config, output)?;
    app.find_sources().await?;
    Ok(())
}

async fn run_network(
    args: NetworkArgs,
    config: &ResolvedConfig,
    output: JsonOutput,
) -> miette::Result<()> {
    let request = NetworkRequest {
        job_id: JobId::new(args.job_id),
        source_uuid: args.source_uuid,
        network_uuid: args.network_uuid,
        network_name: None,
        node_count: args.nodes,
        edge_count: args.edges,
        query_genes: args.genes,
        hit_genes: Vec::new(),
    };
    info!(url = %request.original_network_url(&config.ndex_base_url), "fetching network");
    let mut app = build_app(config, output)?;
    app.fetch_network(&request).await?;
    Ok(())
}

async fn run_watch(config: &ResolvedConfig, output: JsonOutput) -> miette::Result<()> {
    let check = CyRestHttpClient::new(config.cyrest_port, config.request_timeout)?;
    let mut monitor = AvailabilityMonitor::new(Arc::new(check), Arc::new(output))
        .with_interval(config.heartbeat_interval);
    monitor.start();
    tokio::signal::ctrl_c().await.into_diagnostic()?;
    monitor.stop().await;
    Ok(())
}
