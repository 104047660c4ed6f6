//! `stickfight`: plays a duel between two simulated peers.
//!
//! Both peers run in this process and pick random legal actions each turn.
//! `duel` syncs them through a shared [`MemoryStore`]; `local` pushes
//! results over a [`BroadcastHub`] channel instead.
//!
//! Set `RUST_LOG=stickfight_core=debug` to watch the session machinery.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use stickfight_core::local::LocalPeer;
use stickfight_core::session::{
    EndReason, SessionEvent, SessionRecord, SessionState, SessionView, Submission,
};
use stickfight_core::{ActionId, Ruleset, SessionBuilder, SessionConfig, Side};
use stickfight_store::{BroadcastHub, DeliveryMode, MemoryStore};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Simulated Stickfight duels.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[clap(flatten)]
    opts: MatchOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct MatchOpts {
    /// Seed for combat rolls and action choice. Random when omitted.
    #[arg(global = true, long)]
    seed: Option<u64>,

    /// JSON ruleset to play with instead of the standard one.
    #[arg(global = true, long)]
    rules: Option<PathBuf>,

    /// Play the four-button classic ruleset.
    #[arg(global = true, long, default_value_t = false, conflicts_with = "rules")]
    classic: bool,

    /// Requested room code.
    #[arg(global = true, long, default_value = "dojo")]
    room: String,

    /// Host player name.
    #[arg(global = true, long, default_value = "Host")]
    host: String,

    /// Guest player name.
    #[arg(global = true, long, default_value = "Guest")]
    guest: String,

    /// Stop after this many turns even if nobody is down.
    #[arg(global = true, long, default_value_t = 50)]
    max_turns: u32,

    /// Print the final record as JSON.
    #[arg(global = true, long, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Sync both peers through a shared record store.
    Duel {
        /// How the store delivers snapshots to subscribers.
        #[arg(long, value_enum, default_value_t = Delivery::EveryWrite)]
        delivery: Delivery,

        /// JSON file with session tunables.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Refuse record deletion so ending the game falls back to gameover.
        #[arg(long, default_value_t = false)]
        deny_deletes: bool,
    },
    /// Host pushes results to the guest over a broadcast channel.
    Local,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Delivery {
    EveryWrite,
    LatestOnly,
}

impl From<Delivery> for DeliveryMode {
    fn from(delivery: Delivery) -> Self {
        match delivery {
            Delivery::EveryWrite => DeliveryMode::EveryWrite,
            Delivery::LatestOnly => DeliveryMode::LatestOnly,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    debug!(?cli, "parsed arguments");

    let rules = load_rules(&cli.opts)?;
    let seed = cli.opts.seed.unwrap_or_else(rand::random);
    info!(seed, "starting match");

    let record = match cli.command {
        Command::Duel {
            delivery,
            config,
            deny_deletes,
        } => {
            let config = match config {
                Some(path) => {
                    let json = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    SessionConfig::from_json(&json)
                        .with_context(|| format!("parsing {}", path.display()))?
                }
                None => SessionConfig::default(),
            };
            let store = MemoryStore::new()
                .with_delivery(delivery.into())
                .deny_deletes(deny_deletes);
            duel(&cli.opts, rules, config, store, seed)?
        }
        Command::Local => local(&cli.opts, rules, seed)?,
    };

    if cli.opts.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    }
    Ok(())
}

fn load_rules(opts: &MatchOpts) -> Result<Ruleset> {
    if let Some(path) = &opts.rules {
        return Ruleset::load(path).with_context(|| format!("loading {}", path.display()));
    }
    Ok(if opts.classic {
        Ruleset::classic()
    } else {
        Ruleset::standard()
    })
}

/// Seeds each peer from the match seed so runs replay exactly.
fn builder(rules: &Ruleset, seed: u64, salt: u64) -> SessionBuilder {
    SessionBuilder::new()
        .rules(rules.clone())
        .seed(seed.wrapping_add(salt))
}

// =============================================================================
// Shared-store duel
// =============================================================================

fn duel(
    opts: &MatchOpts,
    rules: Ruleset,
    config: SessionConfig,
    store: MemoryStore,
    seed: u64,
) -> Result<SessionRecord> {
    let (mut host, allocation) = builder(&rules, seed, 0)
        .config(config.clone())
        .host(store.clone(), &opts.host, &opts.room)?;
    if allocation.renamed() {
        warn!(requested = %allocation.requested, room = %allocation.session_id, "room renamed");
    }
    let Some(mut guest) = builder(&rules, seed, 1)
        .config(config)
        .join(store, &opts.guest, allocation.session_id.as_str())?
        .into_participant()
    else {
        bail!("room {} vanished before the guest joined", allocation.session_id);
    };
    report(&host.poll()?);
    report(&guest.poll()?);

    let mut chooser = ChaCha8Rng::seed_from_u64(seed ^ 0x5eed);
    for _ in 0..opts.max_turns {
        if host.record().state != SessionState::Playing {
            break;
        }
        let host_pick = pick(&rules, &host.view(), &mut chooser)?;
        let guest_pick = pick(&rules, &guest.view(), &mut chooser)?;
        note_submission("host", &host_pick, host.submit_action(&host_pick)?);
        note_submission("guest", &guest_pick, guest.submit_action(&guest_pick)?);
        report(&host.poll()?);
        report(&guest.poll()?);
    }

    let record = host.record().clone();
    report(&[host.end_session()?]);
    report(&guest.poll()?);
    Ok(record)
}

// =============================================================================
// Broadcast duel
// =============================================================================

fn local(opts: &MatchOpts, rules: Ruleset, seed: u64) -> Result<SessionRecord> {
    let hub = BroadcastHub::new();
    let mut host = LocalPeer::host(builder(&rules, seed, 0), &hub, &opts.host, &opts.room)?;
    let mut guest = LocalPeer::join(builder(&rules, seed, 1), &hub, &opts.guest, &opts.room)?;
    report(&host.poll()?);
    report(&guest.poll()?);

    let mut chooser = ChaCha8Rng::seed_from_u64(seed ^ 0x5eed);
    for _ in 0..opts.max_turns {
        if host.record().state != SessionState::Playing {
            break;
        }
        let host_pick = pick(&rules, &host.view(), &mut chooser)?;
        let guest_pick = pick(&rules, &guest.view(), &mut chooser)?;
        note_submission("guest", &guest_pick, guest.submit_action(&guest_pick)?);
        note_submission("host", &host_pick, host.submit_action(&host_pick)?);
        report(&host.poll()?);
        report(&guest.poll()?);
    }
    Ok(host.record().clone())
}

// =============================================================================
// Helpers
// =============================================================================

fn pick<R: Rng>(rules: &Ruleset, view: &SessionView, rng: &mut R) -> Result<ActionId> {
    let legal: Vec<&ActionId> = rules
        .action_ids()
        .filter(|action| view.can_submit(action))
        .collect();
    match legal.choose(rng) {
        Some(action) => Ok((*action).clone()),
        None => bail!("{} has no legal action on turn {}", view.own_name, view.turn),
    }
}

fn note_submission(seat: &str, action: &ActionId, submission: Submission) {
    match submission {
        Submission::Accepted => debug!(seat, %action, "submitted"),
        Submission::Rejected(reason) => warn!(seat, %action, %reason, "submission rejected"),
    }
}

fn report(events: &[SessionEvent]) {
    for event in events {
        match event {
            SessionEvent::StateChanged(view) => debug!(
                side = %view.side,
                state = %view.state,
                turn = view.turn,
                "state changed"
            ),
            SessionEvent::TurnResolved(turn) if turn.own_side == Side::Guest => info!(
                turn = turn.turn,
                host = turn.host_action.as_ref().map_or("-", ActionId::as_str),
                guest = turn.guest_action.as_ref().map_or("-", ActionId::as_str),
                host_hp = turn.hp_after.host,
                guest_hp = turn.hp_after.guest,
                "turn resolved"
            ),
            SessionEvent::TurnResolved(_) => {}
            SessionEvent::SessionEnded(EndReason::GameOver { winner: Some(side) }) => {
                info!(winner = %side, "game over");
            }
            SessionEvent::SessionEnded(EndReason::GameOver { winner: None }) => {
                info!("game over without a winner");
            }
            SessionEvent::SessionEnded(EndReason::Abandoned) => info!("session closed"),
        }
    }
}
