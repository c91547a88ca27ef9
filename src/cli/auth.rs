use clap::{Args, Subcommand};

use crate::services::Services;
use crate::trust::{AddPartner, Direction};

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum DirectionArg {
    /// The other server can send requests to this one
    In,
    /// This server can send requests to the other one
    Out,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::In => Direction::In,
            DirectionArg::Out => Direction::Out,
        }
    }
}

#[derive(Args)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Add or update a partner authorization
    Add {
        /// A unique server identifier
        id: String,

        /// Direction of the authorization
        #[arg(value_enum)]
        direction: DirectionArg,

        /// Secret key for requests to/from the server (default: randomly
        /// generate a secure key)
        #[arg(long)]
        key: Option<String>,

        /// Display name for the server
        #[arg(long)]
        label: Option<String>,

        /// Base URL for sending requests to the other server
        /// (<base-url>/match must be a valid endpoint); required for
        /// outgoing authorizations
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Remove a partner authorization
    Rm {
        /// Server identifier
        id: String,

        /// Direction of the authorization
        #[arg(value_enum)]
        direction: DirectionArg,
    },

    /// List all partner authorizations
    List,
}

/// Execute auth subcommand
///
/// # Errors
///
/// Returns an error for invalid trust configuration (insecure base URL,
/// duplicate entries).
pub fn run(args: &AuthArgs, services: &Services) -> anyhow::Result<()> {
    match &args.command {
        AuthCommands::Add {
            id,
            direction,
            key,
            label,
            base_url,
        } => {
            let entry = services.servers.add(AddPartner {
                server_id: id.clone(),
                direction: (*direction).into(),
                key: key.clone(),
                label: label.clone(),
                base_url: base_url.clone(),
            })?;
            println!(
                "Authorized {} ({}) with key: {}",
                entry.server_id, entry.direction, entry.server_key
            );
        }
        AuthCommands::Rm { id, direction } => {
            let n = services.servers.remove(id, (*direction).into())?;
            println!("Removed {n} authorization(s) for {id}");
        }
        AuthCommands::List => {
            println!("server_id\tdirection\tlabel\tbase_url");
            for direction in [Direction::In, Direction::Out] {
                for entry in services.servers.list(direction)? {
                    println!(
                        "{}\t{}\t{}\t{}",
                        entry.server_id,
                        entry.direction,
                        entry.server_label,
                        entry.base_url.as_deref().unwrap_or("-"),
                    );
                }
            }
        }
    }
    Ok(())
}
