use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "stackwise")]
#[command(about = "Container yard block and slot management")]
pub struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "stackwise.toml")]
    pub config: PathBuf,

    /// Override the yard data file from config
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a block and all of its slots
    CreateBlock {
        #[arg(long)]
        name: String,
        #[arg(long)]
        bays: u32,
        #[arg(long)]
        rows: u32,
        /// Stacking height, defaults to yard.default_tiers
        #[arg(long)]
        tiers: Option<u32>,
        /// regular, reefer, hazardous or empty
        #[arg(long = "type", default_value = "regular")]
        block_type: String,
    },
    /// List all blocks
    ListBlocks,
    /// Delete an empty block
    DeleteBlock { block: String },
    /// Create a container and place it in the next free slot
    Place {
        block: String,
        #[command(flatten)]
        container: ContainerArgs,
    },
    /// Clear a slot; the container is kept as unplaced
    Remove {
        block: String,
        #[command(flatten)]
        slot: SlotArgs,
    },
    /// Show the next slot a placement would use
    NextSlot { block: String },
    /// Occupied and total slot counts for a block
    Utilization { block: String },
    /// Containers that must be moved before the target can be pulled
    AccessPath {
        block: String,
        #[command(flatten)]
        slot: SlotArgs,
    },
    /// Print a per-tier map of the block
    Layout { block: String },
    /// Look up a container by number
    Find { container_number: String },
    /// Move a container to another holding area
    Transfer {
        container_number: String,
        /// unplaced, awaiting-arrival, verification, stripping or exited
        #[arg(long)]
        area: String,
    },
    /// Place every container listed in a CSV manifest
    Import { block: String, file: PathBuf },
    /// Write the block occupancy as CSV
    Export {
        block: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Utilization of every block and the whole yard
    Summary,
}

#[derive(Debug, Args)]
pub struct SlotArgs {
    #[arg(long)]
    pub bay: u32,
    #[arg(long)]
    pub row: u32,
    #[arg(long)]
    pub tier: u32,
}

#[derive(Debug, Args)]
pub struct ContainerArgs {
    #[arg(long = "number")]
    pub container_number: String,
    #[arg(long = "consignee")]
    pub consignee_name: String,
    #[arg(long)]
    pub iso_type: Option<String>,
    #[arg(long)]
    pub size: Option<String>,
    /// empty, loaded, held or damaged
    #[arg(long, default_value = "empty")]
    pub condition: String,
    #[arg(long = "seal")]
    pub seal_number: Option<String>,
    #[arg(long = "weight")]
    pub gross_weight_kg: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_place_command() {
        let cli = Cli::try_parse_from([
            "stackwise",
            "--store",
            "/tmp/yard.json",
            "place",
            "D",
            "--number",
            "MSKU1234565",
            "--consignee",
            "ACME",
            "--weight",
            "21500",
        ])
        .unwrap();

        assert_eq!(cli.store, Some(PathBuf::from("/tmp/yard.json")));
        match cli.command {
            Command::Place { block, container } => {
                assert_eq!(block, "D");
                assert_eq!(container.container_number, "MSKU1234565");
                assert_eq!(container.condition, "empty");
                assert_eq!(container.gross_weight_kg, Some(21500.0));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_access_path_requires_full_coordinate() {
        assert!(Cli::try_parse_from(["stackwise", "access-path", "D", "--bay", "1", "--row", "1"]).is_err());

        let cli = Cli::try_parse_from([
            "stackwise", "access-path", "D", "--bay", "1", "--row", "2", "--tier", "1",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::AccessPath { slot: SlotArgs { bay: 1, row: 2, tier: 1 }, .. }
        ));
    }
}
