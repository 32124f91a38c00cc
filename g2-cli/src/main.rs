use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use g2_core::model::Location;
use g2_core::session::SessionMachine;
use g2_core::{MessageQueue, Observer, PatchDb, RusbTransport};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "g2-cli")]
#[command(about = "Clavia Nord Modular G2 editor/control host")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to a G2, run the handshake, and poll until Ctrl-C
    Run {
        /// Patch slot to select once the handshake completes (A=0..D=3)
        #[arg(long, default_value_t = 0)]
        slot: u8,
    },
    /// Detect if a G2 is connected, without starting a session
    Probe,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Run { slot } => run(slot),
        Command::Probe => probe(),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn probe() -> Result<()> {
    match RusbTransport::open() {
        Ok(_) => println!("G2 detected."),
        Err(e) => {
            println!("G2 not detected: {e}");
            println!("Check the USB cable and that the device is powered on.");
        }
    }
    Ok(())
}

fn run(slot: u8) -> Result<()> {
    let transport = RusbTransport::open().context("opening G2 USB device")?;
    let db = Arc::new(PatchDb::new());
    let queue = MessageQueue::default();
    let sender = queue.sender();
    // No signal-handling crate is part of this workspace's dependency
    // stack, so Ctrl-C falls through to the process default (abrupt
    // exit) rather than setting this flag; see `spec.md` §9 on the
    // original's SIGINT/SIGBUS/SIGSEGV handlers being a crash-safety
    // fallback outside the core's design. `shutdown` stays here for
    // embedding hosts that do wire one up.
    let shutdown = Arc::new(AtomicBool::new(false));

    sender
        .post(g2_core::EditCommand::SelectSlot { slot })
        .map_err(|_| anyhow::anyhow!("message queue full before session started"))?;

    let observer = PrintingObserver { db: Arc::clone(&db), slot };
    let mut machine = SessionMachine::new(transport, db, queue, observer, shutdown);
    machine.run();
    Ok(())
}

/// Prints a one-line-per-module summary of `slot` to stdout every time
/// the patch settles (`Observer::on_full_patch_change`).
struct PrintingObserver {
    db: Arc<PatchDb>,
    slot: u8,
}

impl Observer for PrintingObserver {
    fn on_wake(&mut self) {
        log::debug!("slot {}: indication applied", self.slot);
    }

    fn on_full_patch_change(&mut self) {
        println!("slot {} patch:", self.slot);
        for location in [Location::Voice, Location::Fx] {
            let mut walk = self.db.begin_walk_modules(self.slot, location);
            let mut count = 0u32;
            while let Some(m) = walk.next() {
                let name = g2_core::catalog::name(m.module_type);
                println!("  {location:?} #{:<3} {name} (type {})", m.key.index, m.module_type);
                count += 1;
            }
            drop(walk);
            if count == 0 {
                println!("  {location:?}: (empty)");
            }
        }
    }
}
