//! Tipline daemon and CLI
//!
//! `run` polls the inbound spool and replies over SMS; the remaining
//! subcommands manage the roster and tips and process single messages.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tipline::config::Config;
use tipline::engine::Engine;
use tipline::inbound::{Cursor, InboundReader};
use tipline::notify::SmsCliNotifier;
use tipline::store::{BetType, Store};
use tipline::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Tipline - SMS tip distribution and bet confirmation
#[derive(Parser)]
#[command(name = "tipline")]
#[command(about = "Broadcast betting tips over SMS and record punter replies")]
struct Cli {
    /// Database file (defaults to ~/.local/share/tipline/tipline.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon: poll the inbound spool and reply over SMS
    Run,

    /// Process one inbound message and print the reply body
    Reply {
        /// Sender phone number
        #[arg(long)]
        from: String,

        /// Message body
        body: String,
    },

    /// Append an inbound message to the spool (gateway hook)
    Receive {
        /// Sender phone number
        #[arg(long)]
        from: String,

        /// Message body
        body: String,
    },

    /// Add a punter to the roster
    AddPunter {
        first_name: String,
        surname: String,
        phone_number: String,
    },

    /// Publish a tip and broadcast the invitation
    AddTip {
        #[arg(long)]
        horse: String,

        /// Scheduled time, e.g. 14:30
        #[arg(long)]
        time: String,

        #[arg(long)]
        meeting: String,

        /// win or e/w
        #[arg(long, value_parser = parse_bet_type, default_value = "win")]
        bet_type: BetType,

        #[arg(long)]
        min_price: String,

        #[arg(long)]
        stake: String,

        /// Publish without sending invitations
        #[arg(long)]
        no_broadcast: bool,
    },

    /// Re-send the invitation for the latest tip
    Broadcast,

    /// List punters
    Punters {
        #[arg(long)]
        json: bool,
    },

    /// List tips
    Tips {
        #[arg(long)]
        json: bool,
    },

    /// List recorded bets
    Bets {
        #[arg(long)]
        json: bool,
    },
}

fn parse_bet_type(s: &str) -> std::result::Result<BetType, String> {
    s.parse().map_err(|e: tipline::Error| e.to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = Config::default();
    if let Some(db) = cli.db {
        config.db_file = db;
    }

    match cli.command {
        Commands::Run => cmd_run(&config),
        Commands::Reply { from, body } => cmd_reply(&config, &from, &body),
        Commands::Receive { from, body } => cmd_receive(&config, &from, &body),
        Commands::AddPunter {
            first_name,
            surname,
            phone_number,
        } => cmd_add_punter(&config, &first_name, &surname, &phone_number),
        Commands::AddTip {
            horse,
            time,
            meeting,
            bet_type,
            min_price,
            stake,
            no_broadcast,
        } => cmd_add_tip(
            &config,
            &horse,
            &time,
            &meeting,
            bet_type,
            &min_price,
            &stake,
            no_broadcast,
        ),
        Commands::Broadcast => cmd_broadcast(&config),
        Commands::Punters { json } => cmd_punters(&config, json),
        Commands::Tips { json } => cmd_tips(&config, json),
        Commands::Bets { json } => cmd_bets(&config, json),
    }
}

fn open_engine(config: &Config) -> Result<Engine<SmsCliNotifier>> {
    let store = Store::open(&config.db_file)?;
    let notifier = SmsCliNotifier::new(config);
    Ok(Engine::new(store, notifier))
}

// ============================================================================
// Daemon Loop
// ============================================================================

fn cmd_run(config: &Config) -> Result<()> {
    info!("Tipline daemon starting");

    let engine = open_engine(config)?;
    let reader = InboundReader::new(config);
    let cursor = Cursor::new(config);

    // Start after the newest spool row when there is no saved cursor
    let mut last_id = match cursor.load()? {
        Some(id) => id,
        None => reader.max_id()?,
    };
    info!("Starting from inbound id {}", last_id);

    loop {
        match reader.poll(last_id) {
            Ok(messages) => {
                for msg in messages {
                    info!(
                        "Inbound from {}: {}",
                        msg.sender,
                        msg.body.chars().take(50).collect::<String>()
                    );

                    match engine.handle_inbound(&msg.sender, &msg.body) {
                        Ok(response) => {
                            if let Err(e) = engine.send_reply(&msg.sender, &response) {
                                error!("Failed to reply to {}: {}", msg.sender, e);
                            }
                        }
                        Err(e) => {
                            error!("Failed to handle message {}: {}", msg.id, e);
                        }
                    }

                    last_id = last_id.max(msg.id);
                }

                if let Err(e) = cursor.save(last_id) {
                    error!("Failed to save cursor: {}", e);
                }
            }
            Err(e) => {
                error!("Failed to poll inbound spool: {}", e);
            }
        }

        std::thread::sleep(Duration::from_millis(config.poll_interval_ms));
    }
}

// ============================================================================
// CLI Commands
// ============================================================================

fn cmd_reply(config: &Config, from: &str, body: &str) -> Result<()> {
    let engine = open_engine(config)?;
    let response = engine.handle_inbound(from, body)?;
    println!("{}", response.body);
    Ok(())
}

fn cmd_receive(config: &Config, from: &str, body: &str) -> Result<()> {
    let store = Store::open(&config.db_file)?;
    let id = store.append_inbound(from, body)?;
    println!("Queued inbound message {}", id);
    Ok(())
}

fn cmd_add_punter(config: &Config, first_name: &str, surname: &str, phone: &str) -> Result<()> {
    let store = Store::open(&config.db_file)?;
    let punter = store.add_punter(first_name, surname, phone)?;
    println!(
        "Added punter {} {} ({})",
        punter.first_name, punter.surname, punter.phone_number
    );
    Ok(())
}

fn cmd_add_tip(
    config: &Config,
    horse: &str,
    time: &str,
    meeting: &str,
    bet_type: BetType,
    min_price: &str,
    stake: &str,
    no_broadcast: bool,
) -> Result<()> {
    let engine = open_engine(config)?;
    let tip = engine
        .store()
        .add_tip(horse, time, meeting, bet_type, min_price, stake)?;
    println!("Published tip {}: {} at {}", tip.id, tip.horse, tip.meeting);

    if no_broadcast {
        return Ok(());
    }

    let sent = engine.broadcast_tip(&tip)?;
    println!("Invited {} punters", sent);
    Ok(())
}

fn cmd_broadcast(config: &Config) -> Result<()> {
    let engine = open_engine(config)?;

    match engine.store().latest_tip()? {
        Some(tip) => {
            let sent = engine.broadcast_tip(&tip)?;
            println!("Invited {} punters to tip {}", sent, tip.id);
        }
        None => println!("No tip published yet"),
    }

    Ok(())
}

fn cmd_punters(config: &Config, json: bool) -> Result<()> {
    let store = Store::open(&config.db_file)?;
    let punters = store.punters()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&punters)?);
    } else {
        for p in punters {
            println!("{}  {} {}  {}", p.id, p.first_name, p.surname, p.phone_number);
        }
    }
    Ok(())
}

fn cmd_tips(config: &Config, json: bool) -> Result<()> {
    let store = Store::open(&config.db_file)?;
    let tips = store.tips()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tips)?);
    } else {
        for t in tips {
            println!(
                "{}  {} {} on {}, {} at {}, min price {}",
                t.id, t.stake, t.bet_type, t.horse, t.time, t.meeting, t.min_price
            );
        }
    }
    Ok(())
}

fn cmd_bets(config: &Config, json: bool) -> Result<()> {
    let store = Store::open(&config.db_file)?;
    let bets = store.bets()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&bets)?);
    } else {
        for b in bets {
            println!(
                "{}  punter {} tip {}  {} at {}",
                b.id, b.punter_id, b.tip_id, b.stake, b.price
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bet_type() {
        assert_eq!(parse_bet_type("win").unwrap(), BetType::Win);
        assert_eq!(parse_bet_type("e/w").unwrap(), BetType::EachWay);
        assert!(parse_bet_type("treble").is_err());
    }
}
