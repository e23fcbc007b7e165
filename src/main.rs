use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
mod auth;
use auth::{PasswordSource, TerminalState};
use serde_json::{Value, json};
use sollet_recover::{Outcome, StoreWorkflow, Unlock, discover, scan_all};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "sollet-recover")]
#[command(
    version,
    about = "Recovers the encrypted Sollet wallet seed from browser Local Storage, offline."
)]
struct Cli {
    /// Directory to search for browser Local Storage databases
    #[arg(long, value_name = "DIR", env = "SOLLET_RECOVER_ROOT")]
    root: Option<PathBuf>,

    /// Scan this leveldb directory instead of searching (repeatable)
    #[arg(long = "store", value_name = "PATH")]
    stores: Vec<PathBuf>,

    /// Only report encrypted wallet data, never ask for a password
    #[arg(long, default_value_t = false)]
    no_decrypt: bool,

    /// Print results as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Copy the recovered seed phrase to the clipboard
    #[arg(long, default_value_t = false)]
    copy: bool,

    /// More log output (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sollet_recover={level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_stores(args: &Cli) -> Result<Vec<PathBuf>> {
    if !args.stores.is_empty() {
        return args
            .stores
            .iter()
            .map(|p| std::path::absolute(p).with_context(|| format!("invalid path {}", p.display())))
            .collect();
    }

    let root = match &args.root {
        Some(root) => root.clone(),
        None => discover::default_search_root()?,
    };
    info!("scanning for browser storage folders in {}", root.display());
    Ok(discover::find_candidate_stores(&root))
}

/// Asks for passphrases until the record opens or the source runs dry.
fn unlock(workflow: &mut StoreWorkflow, source: &PasswordSource) -> Result<()> {
    let mut attempt = 0;
    while let Some(password) = source.next(workflow.path(), attempt)? {
        match workflow.try_passphrase(&password) {
            Unlock::Decrypted | Unlock::NothingToUnlock => return Ok(()),
            Unlock::AuthFailed => eprintln!("Incorrect password"),
        }
        attempt += 1;
    }
    warn!(path = %workflow.path().display(), "leaving wallet data encrypted");
    Ok(())
}

fn to_json(workflow: &StoreWorkflow) -> Result<Option<Value>> {
    let path = workflow.path().display().to_string();
    Ok(match workflow.outcome() {
        Outcome::Skipped(_) => None,
        Outcome::Found(record) => Some(json!({
            "path": path,
            "status": "encrypted",
            "record": serde_json::to_value(record)?,
        })),
        Outcome::Decrypted(credential) => Some(json!({
            "path": path,
            "status": "decrypted",
            "mnemonic": credential.mnemonic(),
            "seed": credential.seed().map(hex::encode),
            "derivationPath": credential.derivation_path(),
        })),
    })
}

fn print_text(workflow: &StoreWorkflow) -> Result<()> {
    match workflow.outcome() {
        Outcome::Skipped(_) => {}
        Outcome::Found(record) => {
            println!("Encrypted wallet data in {}:", workflow.path().display());
            println!("{}", serde_json::to_string_pretty(record)?);
        }
        Outcome::Decrypted(credential) => {
            println!("Wallet data in {}:", workflow.path().display());
            match credential.mnemonic() {
                Some(mnemonic) => println!("  seed phrase:     {mnemonic}"),
                None => println!(
                    "  plaintext:       {}",
                    String::from_utf8_lossy(credential.plaintext())
                ),
            }
            if let Some(seed) = credential.seed() {
                println!("  seed:            {}", hex::encode(seed));
            }
            if let Some(path) = credential.derivation_path() {
                println!("  derivation path: {path}");
            }
        }
    }
    Ok(())
}

fn copy_to_clipboard(workflows: &[StoreWorkflow]) {
    let Some(mnemonic) = workflows
        .iter()
        .filter_map(|w| w.credential())
        .find_map(|c| c.mnemonic())
    else {
        warn!("no decrypted seed phrase to copy");
        return;
    };

    match arboard::Clipboard::new().and_then(|mut cb| cb.set_text(mnemonic.to_string())) {
        Ok(()) => eprintln!("Seed phrase copied to clipboard"),
        Err(e) => warn!("could not copy to clipboard: {e}"),
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let terminal = TerminalState::capture();
    ctrlc::set_handler(move || {
        if let Some(terminal) = &terminal {
            terminal.restore();
        }
        eprintln!("\ninterrupted");
        std::process::exit(130);
    })
    .context("failed to install Ctrl-C handler")?;

    let paths = resolve_stores(&args)?;
    let mut workflows = scan_all(&paths);

    let found = workflows.iter().filter(|w| w.record().is_some()).count();
    if found == 0 {
        if args.json {
            println!("[]");
        } else {
            println!("No Sollet keys found");
        }
        return Ok(());
    }
    if !args.json {
        println!("Found {found} Sollet key{}", if found > 1 { "s" } else { "" });
    }

    if !args.no_decrypt {
        let source = PasswordSource::detect();
        for workflow in workflows.iter_mut().filter(|w| w.record().is_some()) {
            unlock(workflow, &source)?;
        }
    }

    if args.json {
        let results = workflows
            .iter()
            .map(to_json)
            .filter_map(Result::transpose)
            .collect::<Result<Vec<_>>>()?;
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for workflow in &workflows {
            print_text(workflow)?;
        }
    }

    if args.copy {
        copy_to_clipboard(&workflows);
    }

    Ok(())
}
