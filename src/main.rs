use alloy::primitives::utils::{format_units, parse_units, ParseUnits};
use alloy::primitives::Address;
use alloy::providers::Provider;
use clap::{Args, Parser, Subcommand};
use eyre::{bail, eyre, Result};
use log::{debug, info, warn};
use tokio::sync::Notify;
use tokio::time::{interval, MissedTickBehavior};

use issue_pools::catalog::SubgraphClient;
use issue_pools::config::Config;
use issue_pools::pricing::SwapSide;
use issue_pools::sync::subscriber::subscribe_vault_logs;
use issue_pools::sync::{AlloyBatchReader, BatchReader, EventOutcome};
use issue_pools::utils::logger::setup_logger;
use issue_pools::utils::providers::{create_http_provider, create_ws_provider};
use issue_pools::venue::IssueVenue;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the catalog and print every pool with its main tokens
    Pools,
    /// Price one pair across every route
    Quote(QuoteArgs),
    /// Follow vault logs and keep pool state live
    Watch,
}

#[derive(Args)]
struct QuoteArgs {
    #[arg(long)]
    from: Address,
    #[arg(long)]
    to: Address,
    /// Decimal amount of `from`, or of `to` with --buy
    #[arg(long)]
    amount: String,
    #[arg(long)]
    buy: bool,
    /// Defaults to the latest block
    #[arg(long)]
    block: Option<u64>,
    #[arg(long)]
    creator: Option<Address>,
}

type Venue<R> = IssueVenue<R, SubgraphClient>;

fn print_pools<R: BatchReader>(venue: &Venue<R>) {
    for pool in venue.pools() {
        let tokens: Vec<String> = venue
            .main_tokens(&pool.address)
            .iter()
            .map(ToString::to_string)
            .collect();
        println!(
            "{} {} security={} currency={} main_tokens=[{}]",
            pool.address,
            pool.kind.name(),
            pool.security,
            pool.currency,
            tokens.join(", ")
        );
    }
}

async fn quote<R: BatchReader>(
    venue: &Venue<R>,
    provider: &impl Provider,
    args: QuoteArgs,
) -> Result<()> {
    let QuoteArgs {
        from,
        to,
        amount,
        buy,
        block,
        creator,
    } = args;
    let side = if buy { SwapSide::Buy } else { SwapSide::Sell };
    let (fixed, priced) = if buy { (to, from) } else { (from, to) };
    let fixed_decimals = venue
        .decimals(fixed)
        .ok_or_else(|| eyre!("token {fixed} is not in any pool"))?;
    let priced_decimals = venue
        .decimals(priced)
        .ok_or_else(|| eyre!("token {priced} is not in any pool"))?;

    let amount = match parse_units(&amount, fixed_decimals)? {
        ParseUnits::U256(amount) => amount,
        ParseUnits::I256(_) => bail!("amount {amount} is negative"),
    };
    let block = match block {
        Some(block) => block,
        None => provider.get_block_number().await?,
    };

    let mut cache = venue.new_block_cache();
    let prices = venue
        .get_prices_volume(&mut cache, from, to, &[amount], side, block, creator)
        .await?;
    if prices.is_empty() {
        println!("no route prices {from} -> {to} at block {block}");
    }
    for route in prices {
        println!(
            "{} unit={} amount={}",
            route.pool,
            format_units(route.unit, priced_decimals)?,
            format_units(route.prices[0], priced_decimals)?
        );
    }
    Ok(())
}

async fn watch<R: BatchReader>(venue: &Venue<R>, config: &Config) -> Result<()> {
    let provider = create_ws_provider(&config.rpc_ws_url).await?;
    let subscribed = Notify::new();
    let mut refresh = interval(config.catalog_ttl);
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately and the catalog is already loaded
    refresh.tick().await;

    let subscription = subscribe_vault_logs(
        &provider,
        config.vault,
        || subscribed.notify_one(),
        |log| match venue.handle_log(&log) {
            Ok(Some(EventOutcome::Applied)) => {
                info!("watch: applied log from tx {:?}", log.transaction_hash);
            }
            Ok(Some(outcome)) => debug!("watch: log not applied: {outcome:?}"),
            Ok(None) => {}
            Err(e) => warn!("watch: skipping undecodable log: {e}"),
        },
    );
    tokio::pin!(subscription);

    loop {
        tokio::select! {
            result = &mut subscription => return result,
            () = subscribed.notified() => {
                // Logs queue on the subscription while the pools are read
                let block = provider.get_block_number().await?;
                match venue.sync_live_state(block).await {
                    Ok(live) => info!("watch: {live} pools live at block {block}"),
                    Err(e) => warn!("watch: reading pools at block {block} failed: {e}"),
                }
            }
            _ = refresh.tick() => {
                if let Err(e) = venue.refresh_catalog().await {
                    warn!("watch: catalog refresh failed, keeping the previous one: {e}");
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    setup_logger(config.log_level)?;

    let provider = create_http_provider(&config.rpc_url);
    let reader = AlloyBatchReader::new(provider.clone(), config.multicall);
    let source = SubgraphClient::new(config.subgraph_url.clone())?;
    let venue = IssueVenue::new(&config, reader, source);
    venue.initialize().await?;

    match cli.command {
        Commands::Pools => print_pools(&venue),
        Commands::Quote(args) => quote(&venue, &provider, args).await?,
        Commands::Watch => watch(&venue, &config).await?,
    }
    Ok(())
}
