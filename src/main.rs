use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;

use alloy::primitives::{Address, B256, U256};
use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use eireg::config::{self, Config};
use eireg::domain::abi::format_value;
use eireg::gateway::{SendOptions, Session, TransactionSubmission};
use eireg::infrastructure::abi::DescriptorSource;
use eireg::infrastructure::ethereum::ProviderConfig;
use eireg::poller::Confirmation;
use eireg::registry::{read_csv, Importer, RegistryClient};
use eireg::store::StateStore;

#[derive(Debug, Parser)]
#[command(
    name = "eireg",
    version,
    about = "Query and update the e-invoicing address registry contract"
)]
struct Args {
    /// HTTP JSON-RPC endpoint (e.g. http://localhost:8545)
    #[arg(long, global = true)]
    rpc: Option<String>,

    /// WebSocket endpoint (e.g. ws://localhost:8546)
    #[arg(long, global = true)]
    ws: Option<String>,

    /// Interface descriptor document, a path or an http(s) URL
    #[arg(long, global = true)]
    descriptors: Option<String>,

    /// Registry contract address (defaults to the last one used)
    #[arg(long, global = true)]
    contract: Option<String>,

    /// Blocks to wait for a transaction before giving up
    #[arg(long, global = true)]
    budget: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check that the node answers
    Status,
    /// Verify a registry contract and make it the default
    Use { address: String },
    /// Look up the company behind an invoicing address (OVT:xxx or IBAN:xxx)
    QueryAddress { address: String },
    /// Show a company's registry records
    QueryVat { vat_id: String },
    GetData { key: String },
    Owners { key: String },
    UpdateData {
        key: String,
        data: String,
        #[command(flatten)]
        submit: SubmitArgs,
    },
    /// Invoke a read-only contract method
    Call { method: String, args: Vec<String> },
    /// Submit a transaction to a contract method
    Send {
        method: String,
        args: Vec<String>,
        #[command(flatten)]
        submit: SubmitArgs,
    },
    /// Wait for an already submitted transaction
    Wait { tx_hash: String },
    /// Import a Tieke CSV export
    Import {
        csv: PathBuf,
        /// Only import these Y-tunnus values
        #[arg(long, num_args = 1..)]
        limit_to: Vec<String>,
        #[arg(long)]
        gas_limit: Option<u64>,
    },
}

#[derive(Debug, ClapArgs)]
struct SubmitArgs {
    /// Wei to send along
    #[arg(long)]
    value: Option<String>,

    #[arg(long)]
    gas_limit: Option<u64>,

    /// Return after submission instead of waiting for inclusion
    #[arg(long)]
    no_wait: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = config::load();
    let endpoint = endpoint_from_args_and_config(&args, &config);

    let mut session = Session::connect(endpoint, config.poll_interval())
        .await?
        .with_confirmation_budget(args.budget.unwrap_or_else(|| config.confirmation_budget()));
    if let Some(sender) = config.sender()? {
        session = session.with_sender(sender);
    }

    match &args.command {
        Command::Status => {
            let status = session.check_ready().await?;
            println!("endpoint:       {}", status.endpoint);
            println!("client version: {}", status.client_version);
            println!("head block:     {}", status.head_block);
            for account in &status.accounts {
                println!("account:        {}", account);
            }
            return Ok(ExitCode::SUCCESS);
        }
        Command::Wait { tx_hash } => {
            let tx_hash: B256 = tx_hash.parse().context("invalid transaction hash")?;
            let outcome = session.poller().wait(tx_hash).await?;
            return Ok(report_confirmation(tx_hash, outcome));
        }
        _ => {}
    }

    let source = args
        .descriptors
        .as_deref()
        .map(DescriptorSource::parse)
        .unwrap_or_else(|| config.descriptor_source());
    session.load_descriptors(&source).await?;

    let store = open_store();

    if let Command::Use { address } = &args.command {
        let address: Address = address.parse().context("invalid contract address")?;
        let active = session.activate(config.contract_name(), address).await?;
        println!("{} {}", active.handle.address(), active.version);
        if let Some(store) = &store {
            store.remember_contract(address)?;
        }
        return Ok(ExitCode::SUCCESS);
    }

    let address = match &args.contract {
        Some(raw) => raw.parse().context("invalid contract address")?,
        None => match store.as_ref().map(StateStore::last_contract).transpose()?.flatten() {
            Some(address) => address,
            None => bail!("no contract selected; pass --contract or run `eireg use <address>`"),
        },
    };
    session.activate(config.contract_name(), address).await?;

    let client = RegistryClient::new(&session);
    match &args.command {
        Command::QueryAddress { address } => {
            let Some(vat_id) = client.vat_id_by_address(address).await? else {
                bail!(
                    "No company found for invoicing address {}. Use OVT:xxx or IBAN:xxx prefix when typing in the address",
                    address
                );
            };
            let report = client.company_report(&vat_id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::QueryVat { vat_id } => {
            let report = client.company_report(vat_id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::GetData { key } => {
            let data = client.get_data(key).await?;
            match std::str::from_utf8(&data) {
                Ok(text) => println!("{}", text),
                Err(_) => println!("0x{}", hex::encode(&data)),
            }
        }
        Command::Owners { key } => {
            for owner in client.owners(key).await? {
                println!("{}", owner);
            }
        }
        Command::UpdateData { key, data, submit } => {
            let client = client.with_send_options(send_options(submit, &config)?);
            return submit_transaction(&session, submit.no_wait, async {
                client.update_data(key, data).await.map_err(anyhow::Error::from)
            })
            .await;
        }
        Command::Call { method, args } => {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            for value in session.call(method, &args).await? {
                println!("{}", format_value(&value));
            }
        }
        Command::Send {
            method,
            args,
            submit,
        } => {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            let options = send_options(submit, &config)?;
            return submit_transaction(&session, submit.no_wait, async {
                session
                    .send(method, &args, options)
                    .await
                    .map_err(anyhow::Error::from)
            })
            .await;
        }
        Command::Import {
            csv,
            limit_to,
            gas_limit,
        } => {
            let records = read_csv(csv, limit_to)?;
            let options = SendOptions {
                value: None,
                gas_limit: gas_limit.unwrap_or_else(|| config.gas_limit()),
            };
            let importer = Importer::new(client.with_send_options(options));
            let summary = importer.import_all(&records).await?;
            println!(
                "imported {}, already present {}, failed {}",
                summary.imported,
                summary.skipped,
                summary.failed.len()
            );
            for (y_tunnus, err) in &summary.failed {
                println!("  {}: {}", y_tunnus, err);
            }
            if !summary.failed.is_empty() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Status | Command::Wait { .. } | Command::Use { .. } => {}
    }

    Ok(ExitCode::SUCCESS)
}

fn endpoint_from_args_and_config(args: &Args, config: &Config) -> ProviderConfig {
    // CLI arguments take precedence
    if let Some(ws) = args.ws.clone() {
        return ProviderConfig::WebSocket(ws);
    }
    if let Some(rpc) = args.rpc.clone() {
        return ProviderConfig::Http(rpc);
    }
    config.endpoint()
}

fn open_store() -> Option<StateStore> {
    let path = config::state_db_path()?;
    match StateStore::open(&path) {
        Ok(store) => Some(store),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %format!("{:#}", err), "state store unavailable");
            None
        }
    }
}

fn send_options(submit: &SubmitArgs, config: &Config) -> Result<SendOptions> {
    let value = submit
        .value
        .as_deref()
        .map(|raw| raw.parse::<U256>().with_context(|| format!("invalid value {}", raw)))
        .transpose()?;
    Ok(SendOptions {
        value,
        gas_limit: submit.gas_limit.unwrap_or_else(|| config.gas_limit()),
    })
}

async fn submit_transaction<F>(session: &Session, no_wait: bool, submit: F) -> Result<ExitCode>
where
    F: Future<Output = Result<TransactionSubmission>>,
{
    // Dev nodes mine the moment a transaction arrives, watch before sending
    let armed = if no_wait {
        None
    } else {
        Some(session.poller().arm().await?)
    };
    let submission = submit.await?;
    println!("{}", submission.tx_hash);

    let Some(armed) = armed else {
        return Ok(ExitCode::SUCCESS);
    };
    let outcome = armed.wait(submission.tx_hash).await?;
    Ok(report_confirmation(submission.tx_hash, outcome))
}

fn report_confirmation(tx_hash: B256, outcome: Confirmation) -> ExitCode {
    match outcome {
        Confirmation::Confirmed {
            block_hash,
            blocks_observed,
        } => {
            println!("confirmed in block {} ({} blocks)", block_hash, blocks_observed);
            ExitCode::SUCCESS
        }
        Confirmation::Expired { blocks_observed } => {
            eprintln!(
                "transaction {} not included within {} blocks",
                tx_hash, blocks_observed
            );
            ExitCode::FAILURE
        }
    }
}
