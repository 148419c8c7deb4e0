// nft-deploy CLI
//
// Deploys the NFT marketplace and token contracts and verifies them on the
// explorer of the verification chain.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use ethers::abi::token::{LenientTokenizer, Tokenizer};
use ethers::types::Address;
use log::info;

use common::VerificationRequest;
use nft_deploy::config::DEFAULT_CONFIG_FILE;
use nft_deploy::ethereum::{ChainRegistry, EthereumConnector, EtherscanVerifier};
use nft_deploy::orchestrator::verify_with_timeout;
use nft_deploy::report::{EXIT_FAILURE, EXIT_SUCCESS, EXIT_VERIFICATION_FAILED};
use nft_deploy::{
    ArtifactStore, ConfigManager, ContractFactory, DeploymentOrchestrator, DeploymentReport,
    HarnessConfig, ReportFormat, ReportFormatter,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => ReportFormat::Text,
            OutputFormat::Json => ReportFormat::Json,
        }
    }
}

/// Deploy and verify the NFT marketplace and token contracts
#[derive(Parser)]
#[command(name = "nft-deploy", version, about, long_about = None)]
struct Cli {
    /// Path to the harness configuration
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy both contracts and verify them on the verification chain
    Deploy {
        /// Network name from the configuration
        #[arg(short, long)]
        network: Option<String>,

        /// Compiler artifacts directory (overrides the configuration)
        #[arg(short, long)]
        artifacts: Option<PathBuf>,

        /// Write the deployment report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Verify an already deployed contract
    Verify {
        /// Network name from the configuration
        #[arg(short, long)]
        network: Option<String>,

        /// Contract name as found in the artifacts
        #[arg(long)]
        contract: String,

        /// Deployed address
        #[arg(long)]
        address: String,

        /// Constructor argument, repeated in declaration order
        #[arg(long = "constructor-arg")]
        constructor_args: Vec<String>,

        /// Compiler artifacts directory (overrides the configuration)
        #[arg(short, long)]
        artifacts: Option<PathBuf>,
    },

    /// List configured networks and known chains
    Networks,

    /// Write the default configuration
    Config {
        /// Output file path
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env file if it exists
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("Error: {:?}", err);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Commands::Deploy {
            network,
            artifacts,
            output,
            format,
        } => {
            let config = ConfigManager::load_or_default(&cli.config)?;
            deploy(&config, network.as_deref(), artifacts, output, format.into()).await
        }
        Commands::Verify {
            network,
            contract,
            address,
            constructor_args,
            artifacts,
        } => {
            let config = ConfigManager::load_or_default(&cli.config)?;
            verify(&config, network.as_deref(), &contract, &address, &constructor_args, artifacts).await
        }
        Commands::Networks => {
            let config = ConfigManager::load_or_default(&cli.config)?;
            list_networks(&config);
            Ok(EXIT_SUCCESS)
        }
        Commands::Config { output } => {
            ConfigManager::save_to_file(&HarnessConfig::default(), &output)
                .context("Failed to save configuration")?;
            println!("Default configuration saved to {:?}", output);
            Ok(EXIT_SUCCESS)
        }
    }
}

async fn deploy(
    config: &HarnessConfig,
    network: Option<&str>,
    artifacts: Option<PathBuf>,
    output: Option<PathBuf>,
    format: ReportFormat,
) -> Result<u8> {
    let ctx = config.resolve(network)?;
    let artifacts_dir = artifacts.unwrap_or_else(|| config.artifacts.clone());
    let factory = ArtifactStore::new(&artifacts_dir);
    info!("loading artifacts from {}", factory.root().display());

    let connector = EthereumConnector::new(&ctx)?;
    connector.ensure_chain_id(ctx.chain_id).await?;
    info!("deployer account {:?}", connector.deployer());

    let verifier = match (&ctx.explorer, ctx.verification_enabled()) {
        (Some(endpoint), true) => Some(EtherscanVerifier::new(
            endpoint.clone(),
            &ctx.compiler_version,
            ArtifactStore::new(&artifacts_dir),
        )?),
        _ => None,
    };

    let run = DeploymentOrchestrator::new(&ctx, &factory, &connector, verifier.as_ref())
        .run()
        .await?;

    let report = DeploymentReport::new(&ctx, &run);
    println!("{}", ReportFormatter::render(&report, format)?);
    if let Some(path) = output {
        ReportFormatter::save_to_file(&report, &path, format)
            .with_context(|| format!("Failed to save report to {}", path.display()))?;
        info!("report saved to {}", path.display());
    }

    Ok(report.exit_code())
}

async fn verify(
    config: &HarnessConfig,
    network: Option<&str>,
    contract: &str,
    address: &str,
    raw_args: &[String],
    artifacts: Option<PathBuf>,
) -> Result<u8> {
    let ctx = config.resolve(network)?;
    let endpoint = ctx
        .explorer
        .clone()
        .with_context(|| format!("network `{}` has no explorer configured", ctx.network))?;
    let address: Address = address
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid contract address {}", address))?;

    let factory = ArtifactStore::new(artifacts.unwrap_or_else(|| config.artifacts.clone()));
    let artifact = factory.load(contract)?;
    let inputs = artifact
        .abi
        .constructor()
        .map(|c| c.inputs.clone())
        .unwrap_or_default();
    if inputs.len() != raw_args.len() {
        bail!(
            "{} takes {} constructor argument(s), {} given",
            contract,
            inputs.len(),
            raw_args.len()
        );
    }
    let args = inputs
        .iter()
        .zip(raw_args)
        .map(|(param, value)| {
            LenientTokenizer::tokenize(&param.kind, value)
                .with_context(|| format!("invalid value {:?} for `{}`", value, param.name))
        })
        .collect::<Result<Vec<_>>>()?;

    let verifier = EtherscanVerifier::new(endpoint, &ctx.compiler_version, factory)?;
    let request = VerificationRequest::new(contract, address, args);
    match verify_with_timeout(&verifier, &request, ctx.verification_timeout()).await {
        Ok(_) => {
            println!("{} verified: {}", contract, verifier.contract_url(address));
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("{} verification failed: {}", contract, e);
            Ok(EXIT_VERIFICATION_FAILED)
        }
    }
}

fn list_networks(config: &HarnessConfig) {
    println!("Configured networks:");
    println!("--------------------");
    for (name, network) in &config.networks {
        let marker = if network.chain_id == config.verification_chain_id {
            " [verified]"
        } else {
            ""
        };
        println!("- {} (Chain ID: {}){}", name, network.chain_id, marker);
        println!("  RPC: {}", network.url);
        println!("  Signing key: ${}", network.private_key_env);
    }
    println!();

    println!("Known chains:");
    println!("-------------");
    for chain in ChainRegistry::new().chains() {
        println!("- {} (Chain ID: {})", chain.name, chain.chain_id);
        println!("  Block Time: {} seconds", chain.block_time);
        println!("  Currency: {}", chain.currency_symbol);
        if let Some(explorer) = &chain.explorer {
            println!("  Explorer: {}", explorer.browser_url);
        }
    }
}
