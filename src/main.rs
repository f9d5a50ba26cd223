use clap::{Parser, Subcommand};
use ppplink::config::{self, Config};
use ppplink::engine::status;
use ppplink::engine::{Link, LinkAction, Mode};
use ppplink::protocol::{PppBuilder, PppFrame};
use ppplink::telemetry::init_logging;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "ppplink")]
#[command(about = "PPP link negotiation engine (LCP, PAP, IPCP)")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Negotiate two links against each other in memory
    Simulate {
        /// Configuration of the local link
        #[arg(short, long, default_value = "ppplink.toml")]
        config: PathBuf,

        /// Configuration of the peer; mirrored from the local one if absent
        #[arg(long)]
        peer: Option<PathBuf>,

        /// Apply the quick preset to both ends
        #[arg(long)]
        quick: bool,

        /// Upper bound on processed events
        #[arg(long, default_value_t = 200)]
        rounds: u32,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Check a configuration file
    Validate {
        #[arg(short, long, default_value = "ppplink.toml")]
        config: PathBuf,
    },
    /// Print the effective configuration with all defaults filled in
    Show {
        #[arg(short, long, default_value = "ppplink.toml")]
        config: PathBuf,

        /// Apply the quick preset first
        #[arg(long)]
        quick: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Config { action } => {
            init_logging(None);
            match action {
                ConfigAction::Validate { config } => cmd_config_validate(&config),
                ConfigAction::Show { config, quick } => cmd_config_show(&config, quick),
            }
        }
        Commands::Simulate {
            config,
            peer,
            quick,
            rounds,
        } => cmd_simulate(&config, peer.as_ref(), quick, rounds),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn load_config(path: &PathBuf) -> Result<Config, String> {
    config::load(path).map_err(|e| format!("Failed to load {}: {}", path.display(), e))
}

fn cmd_config_validate(config_path: &PathBuf) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = load_config(config_path)?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}

fn cmd_config_show(config_path: &PathBuf, quick: bool) -> Result<(), String> {
    let mut cfg = load_config(config_path)?;
    if quick {
        config::apply_quick(&mut cfg);
    }

    // Never echo secrets
    if cfg.pap.password.is_some() {
        cfg.pap.password = Some("********".to_string());
    }
    for user in &mut cfg.pap.users {
        user.password = "********".to_string();
    }

    let text = config::to_toml(&cfg).map_err(|e| e.to_string())?;
    print!("{}", text);
    Ok(())
}

/// Peer configuration mirroring ours: passive, addresses swapped, and
/// credentials we accept if we demand authentication
fn mirror_config(cfg: &Config) -> Config {
    let mut peer = cfg.clone();
    peer.link.name = format!("{}-peer", cfg.link.name);
    peer.lcp.fsm.mode = Mode::Passive;
    peer.lcp.local.auth = None;
    peer.ipcp.local_address = cfg.ipcp.peer_address;
    peer.ipcp.peer_address = cfg.ipcp.local_address;
    peer.pap.users.clear();
    if let Some(user) = cfg.pap.users.first() {
        peer.pap.username = Some(user.username.clone());
        peer.pap.password = Some(user.password.clone());
    }
    peer
}

fn cmd_simulate(
    config_path: &PathBuf,
    peer_path: Option<&PathBuf>,
    quick: bool,
    rounds: u32,
) -> Result<(), String> {
    let mut cfg = load_config(config_path)?;
    init_logging(Some(&cfg.log));

    let mut peer_cfg = match peer_path {
        Some(path) => load_config(path)?,
        None => mirror_config(&cfg),
    };
    if quick {
        config::apply_quick(&mut cfg);
        config::apply_quick(&mut peer_cfg);
    }

    for (label, c) in [("local", &cfg), ("peer", &peer_cfg)] {
        let validation = config::validate(c);
        if validation.has_errors() {
            validation.print_diagnostics();
            return Err(format!("{} configuration is invalid", label));
        }
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| format!("Failed to create runtime: {}", e))?;

    let (local, peer) = runtime.block_on(simulate(
        Link::from_config(&cfg),
        Link::from_config(&peer_cfg),
        rounds,
    ));

    println!("{}", status::render(&local));
    println!("{}", status::render(&peer));

    if local.is_network_up() && peer.is_network_up() {
        return Ok(());
    }
    match local.failure().or_else(|| peer.failure()) {
        Some(e) => Err(e.to_string()),
        None => Err("links did not reach the network phase".to_string()),
    }
}

/// Hand every action of `link` to the wire
fn dispatch(link: &Link, actions: Vec<LinkAction>, wire: &mpsc::UnboundedSender<Vec<u8>>) {
    for action in actions {
        match action {
            LinkAction::Send { protocol, payload } => {
                let frame = PppBuilder::new(protocol).payload(&payload).build();
                if wire.send(frame).is_err() {
                    warn!("{}: wire closed", link.name());
                }
            }
            LinkAction::NetworkUp(params) => {
                info!(
                    "{}: IP up {} -> {} (vj rx {:?}, tx {:?})",
                    link.name(),
                    params.local,
                    params.peer,
                    params.rx_compression,
                    params.tx_compression
                );
            }
            LinkAction::NetworkDown => info!("{}: IP down", link.name()),
        }
    }
}

fn deliver(link: &mut Link, frame: &[u8]) -> Vec<LinkAction> {
    match PppFrame::parse(frame) {
        Ok(frame) => link.receive(frame.protocol(), frame.payload()),
        Err(e) => {
            debug!("{}: bad frame: {}", link.name(), e);
            Vec::new()
        }
    }
}

async fn simulate(mut local: Link, mut peer: Link, rounds: u32) -> (Link, Link) {
    let (to_peer, mut peer_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (to_local, mut local_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let mut ticker = tokio::time::interval(Duration::from_millis(100));

    for (link, wire) in [(&mut peer, &to_local), (&mut local, &to_peer)] {
        let mut actions = link.open();
        actions.extend(link.lower_up());
        dispatch(link, actions, wire);
    }

    for _ in 0..rounds {
        if local.is_network_up() && peer.is_network_up() {
            break;
        }
        tokio::select! {
            Some(frame) = peer_rx.recv() => {
                let actions = deliver(&mut peer, &frame);
                dispatch(&peer, actions, &to_local);
            }
            Some(frame) = local_rx.recv() => {
                let actions = deliver(&mut local, &frame);
                dispatch(&local, actions, &to_peer);
            }
            _ = ticker.tick() => {
                let now = Instant::now();
                let actions = local.poll(now);
                dispatch(&local, actions, &to_peer);
                let actions = peer.poll(now);
                dispatch(&peer, actions, &to_local);
            }
        }
    }

    (local, peer)
}
