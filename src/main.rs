use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

use cold_wallet::chain::{BitcoinAdapter, SnapshotNode};
use cold_wallet::multisig::MultisigAddressBuilder;
use cold_wallet::storage::JsonStore;
use cold_wallet::tx::{cancel_tx, monitor_action, monitor_all, send_file, sign_file, TxBuilder};
use cold_wallet::wallet::{
    create_hd_keys, create_seed, export_addresses, export_full_pubkey, generate_mnemonic,
    import_addresses, import_full_pubkey, import_private_keys, Role, SeedSource,
};
use cold_wallet::{AccountType, ActionType, WalletConfig};

#[derive(Parser)]
#[command(name = "cold-wallet", version, about = "Offline multisig custody for UTXO coins")]
struct Cli {
    /// TOML config; built-in testnet defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON store of this process
    #[arg(long, global = true, default_value = "wallet.json")]
    store: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Offline wallet holding the account keys
    #[command(subcommand)]
    Keygen(KeygenCommand),
    /// Offline wallet holding the authorization keys
    #[command(subcommand)]
    Sign(SignCommand),
    /// Online wallet: builds, sends and tracks transactions
    #[command(subcommand)]
    Watch(WatchCommand),
}

#[derive(Subcommand)]
enum KeygenCommand {
    CreateSeed(SeedArgs),
    CreateHdkey(HdKeyArgs),
    ImportPrivkey(AccountArg),
    ImportFullpubkey(FileArg),
    CreateMultisig(AccountArg),
    ExportAddress(AccountArg),
    Sign(FileArg),
}

#[derive(Subcommand)]
enum SignCommand {
    CreateSeed(SeedArgs),
    CreateHdkey(HdKeyArgs),
    ImportPrivkey(AccountArg),
    ExportFullpubkey(AccountArg),
    Sign(FileArg),
}

#[derive(Subcommand)]
enum WatchCommand {
    ImportAddress(FileArg),
    AddPaymentRequest {
        #[arg(long)]
        address: String,
        /// Satoshis
        #[arg(long)]
        amount: u64,
    },
    CreateDeposit(FeeArg),
    CreatePayment(FeeArg),
    CreateTransfer {
        #[arg(long)]
        from: AccountType,
        #[arg(long)]
        to: AccountType,
        /// Satoshis; 0 sweeps the sender
        #[arg(long, default_value_t = 0)]
        amount: u64,
        #[command(flatten)]
        fee: FeeArg,
    },
    Send(FileArg),
    Monitor {
        /// Only this action; every action when omitted
        #[arg(long)]
        action: Option<ActionType>,
    },
    Cancel {
        #[arg(long)]
        tx_id: i64,
    },
}

#[derive(Args)]
struct SeedArgs {
    /// Hex encoded seed
    #[arg(long, conflicts_with_all = ["mnemonic", "new_mnemonic"])]
    seed_hex: Option<String>,
    /// BIP39 phrase to derive the seed from
    #[arg(long, conflicts_with = "new_mnemonic")]
    mnemonic: Option<String>,
    #[arg(long, default_value = "")]
    passphrase: String,
    /// Generate a 24-word phrase, print it and seed from it
    #[arg(long)]
    new_mnemonic: bool,
}

#[derive(Args)]
struct HdKeyArgs {
    #[arg(long)]
    account: AccountType,
    #[arg(long, default_value_t = 10)]
    count: u32,
}

#[derive(Args)]
struct AccountArg {
    #[arg(long)]
    account: AccountType,
}

#[derive(Args)]
struct FileArg {
    #[arg(long)]
    file: PathBuf,
}

#[derive(Args)]
struct FeeArg {
    /// Fee multiplier within the configured range
    #[arg(long)]
    fee_adjust: Option<f64>,
}

#[derive(Serialize)]
struct SeedCreated {
    mnemonic: Option<String>,
}

fn load_config(path: Option<&Path>) -> Result<WalletConfig> {
    match path {
        Some(path) => WalletConfig::load(path).with_context(|| format!("loading {}", path.display())),
        None => Ok(WalletConfig::default()),
    }
}

fn init_logger(config: &WalletConfig) {
    let env = env_logger::Env::default().default_filter_or(config.logger.level.as_str());
    env_logger::Builder::from_env(env).format_timestamp_millis().init();
}

fn print<T: Serialize>(json: bool, value: &T, human: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", human());
    }
    Ok(())
}

fn seed_source(args: SeedArgs) -> Result<(SeedSource, Option<String>)> {
    if args.new_mnemonic {
        let phrase = generate_mnemonic()?;
        let shown = phrase.to_string();
        let source = SeedSource::Mnemonic {
            phrase,
            passphrase: Zeroizing::new(args.passphrase),
        };
        return Ok((source, Some(shown)));
    }
    let source = match (args.seed_hex, args.mnemonic) {
        (Some(hex_seed), _) => SeedSource::Hex(Zeroizing::new(hex_seed)),
        (None, Some(phrase)) => SeedSource::Mnemonic {
            phrase: Zeroizing::new(phrase),
            passphrase: Zeroizing::new(args.passphrase),
        },
        (None, None) => SeedSource::Random,
    };
    Ok((source, None))
}

fn run_seed(store: &mut JsonStore, json: bool, args: SeedArgs) -> Result<()> {
    let (source, mnemonic) = seed_source(args)?;
    create_seed(store, source)?;
    let shown = mnemonic.clone();
    print(json, &SeedCreated { mnemonic }, || match shown {
        Some(phrase) => format!("seed created; write down this phrase:\n{}", phrase),
        None => "seed created".to_string(),
    })
}

fn run_hdkey(store: &mut JsonStore, config: &WalletConfig, json: bool, role: Role, args: HdKeyArgs) -> Result<()> {
    let batch = create_hd_keys(store, config, role, args.account, args.count)?;
    print(json, &batch, || {
        format!(
            "{} {} keys generated from index {}\n{}",
            batch.count,
            batch.account,
            batch.idx_from,
            batch.addresses.join("\n")
        )
    })
}

fn run_import_privkey(store: &mut JsonStore, config: &WalletConfig, json: bool, role: Role, account: AccountType) -> Result<()> {
    let count = import_private_keys(store, config, role, account)?;
    print(json, &count, || format!("{} {} keys imported", count, account))
}

fn run_sign(store: &JsonStore, config: &WalletConfig, json: bool, file: &Path) -> Result<()> {
    let round = sign_file(store, config, file)?;
    print(json, &round, || {
        format!(
            "tx {}: {} signatures added, complete: {}\n{}",
            round.tx_id,
            round.signatures_added,
            round.is_complete,
            round.file_path.display()
        )
    })
}

fn run_keygen(command: KeygenCommand, store: &mut JsonStore, config: &WalletConfig, json: bool) -> Result<()> {
    match command {
        KeygenCommand::CreateSeed(args) => run_seed(store, json, args),
        KeygenCommand::CreateHdkey(args) => run_hdkey(store, config, json, Role::Keygen, args),
        KeygenCommand::ImportPrivkey(arg) => run_import_privkey(store, config, json, Role::Keygen, arg.account),
        KeygenCommand::ImportFullpubkey(arg) => {
            let count = import_full_pubkey(store, &arg.file)?;
            print(json, &count, || format!("{} full pubkeys imported", count))
        }
        KeygenCommand::CreateMultisig(arg) => {
            let report = MultisigAddressBuilder::from_config(config)?.create_multisig_addresses(store, arg.account)?;
            print(json, &report, || {
                format!(
                    "{} multisig addresses created, {} skipped",
                    report.created,
                    report.skipped.len()
                )
            })
        }
        KeygenCommand::ExportAddress(arg) => {
            let path = export_addresses(store, config, arg.account)?;
            print(json, &path, || format!("addresses exported to {}", path.display()))
        }
        KeygenCommand::Sign(arg) => run_sign(store, config, json, &arg.file),
    }
}

fn run_signer(command: SignCommand, store: &mut JsonStore, config: &WalletConfig, json: bool) -> Result<()> {
    match command {
        SignCommand::CreateSeed(args) => run_seed(store, json, args),
        SignCommand::CreateHdkey(args) => run_hdkey(store, config, json, Role::Sign, args),
        SignCommand::ImportPrivkey(arg) => run_import_privkey(store, config, json, Role::Sign, arg.account),
        SignCommand::ExportFullpubkey(arg) => {
            let path = export_full_pubkey(&*store, config, arg.account)?;
            print(json, &path, || format!("full pubkey exported to {}", path.display()))
        }
        SignCommand::Sign(arg) => run_sign(store, config, json, &arg.file),
    }
}

fn run_watch(command: WatchCommand, store: &mut JsonStore, config: &WalletConfig, json: bool) -> Result<()> {
    if !config.coin_type.is_utxo() {
        bail!("the watch wallet supports UTXO coins only, configured {}", config.coin_type);
    }
    let chain = BitcoinAdapter::new(SnapshotNode::from_config(&config.node), config)?;
    let builder = TxBuilder::new(&chain, config);

    let built = match command {
        WatchCommand::ImportAddress(arg) => {
            let added = import_addresses(store, config, &arg.file)?;
            return print(json, &added, || format!("{} addresses imported", added));
        }
        WatchCommand::AddPaymentRequest { address, amount } => {
            let id = builder.add_payment_request(store, &address, amount)?;
            return print(json, &id, || format!("payment request {} queued", id));
        }
        WatchCommand::Send(arg) => {
            let sent = send_file(&chain, store, &arg.file)?;
            return print(json, &sent, || format!("tx {} sent as {}", sent.tx_id, sent.txid));
        }
        WatchCommand::Monitor { action } => {
            let report = match action {
                Some(action) => monitor_action(&chain, store, action, config.confirmation_num)?,
                None => monitor_all(&chain, store, config.confirmation_num)?,
            };
            return print(json, &report, || {
                format!(
                    "{} confirmed, {} notified, {} pending",
                    report.confirmed.len(),
                    report.notified.len(),
                    report.pending
                )
            });
        }
        WatchCommand::Cancel { tx_id } => {
            cancel_tx(store, tx_id)?;
            return print(json, &tx_id, || format!("tx {} canceled", tx_id));
        }
        WatchCommand::CreateDeposit(fee) => builder.create_deposit_tx(store, fee.fee_adjust)?,
        WatchCommand::CreatePayment(fee) => builder.create_payment_tx(store, fee.fee_adjust)?,
        WatchCommand::CreateTransfer { from, to, amount, fee } => {
            builder.create_transfer_tx(store, from, to, amount, fee.fee_adjust)?
        }
    };

    print(json, &built, || match &built.file_path {
        Some(path) if !built.is_noop() => format!(
            "{} tx {} created: inputs {} sat, outputs {} sat, fee {} sat\n{}",
            built.action,
            built.tx_id,
            built.input_total,
            built.output_total,
            built.fee,
            path.display()
        ),
        _ => format!("no {} transaction needed", built.action),
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logger(&config);

    let mut store = JsonStore::open(&cli.store).with_context(|| format!("opening store {}", cli.store.display()))?;
    match cli.command {
        Command::Keygen(command) => run_keygen(command, &mut store, &config, cli.json),
        Command::Sign(command) => run_signer(command, &mut store, &config, cli.json),
        Command::Watch(command) => run_watch(command, &mut store, &config, cli.json),
    }
}
