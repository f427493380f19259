use clap::Parser;
use serde::Serialize;
use stackwise::config::cli::{ContainerArgs, SlotArgs};
use stackwise::core::manifest::{export_block, import_manifest};
use stackwise::domain::model::{BlockDraft, ContainerDraft, HoldingArea, SlotCoord};
use stackwise::domain::ports::YardStore;
use stackwise::utils::error::ErrorSeverity;
use stackwise::utils::{logger, validation::Validate};
use stackwise::{
    BlockLayout, Cli, Command, InMemoryYardStore, JsonFileYardStore, Result, StoreKind,
    YardConfig, YardService,
};
use std::path::PathBuf;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // 載入配置（檔案不存在時使用預設值）
    let config = match YardConfig::load_or_default(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", cli.config.display(), e);
            eprintln!("💡 Make sure the file is valid TOML");
            std::process::exit(1);
        }
    };

    // 初始化日誌
    if config.json_logging() {
        logger::init_json_logger(if cli.verbose { "debug" } else { config.log_level() });
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());
        std::process::exit(1);
    }

    // --store 一律使用 JSON 檔
    let store_path = cli.store.clone();
    let kind = if store_path.is_some() {
        StoreKind::Json
    } else {
        config.store.kind
    };

    let result = match kind {
        StoreKind::Json => {
            let path = store_path.unwrap_or_else(|| PathBuf::from(&config.store.path));
            tracing::debug!("Using yard data file {}", path.display());
            match JsonFileYardStore::open(&path).await {
                Ok(store) => run(&YardService::new(store, config.yard.clone()), &cli).await,
                Err(e) => Err(e),
            }
        }
        StoreKind::Memory => {
            tracing::warn!("Memory store selected; changes are discarded on exit");
            let store = InMemoryYardStore::new();
            run(&YardService::new(store, config.yard.clone()), &cli).await
        }
    };

    if let Err(e) = result {
        tracing::error!(
            "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

async fn run<S: YardStore>(service: &YardService<S>, cli: &Cli) -> Result<()> {
    let json = cli.json;

    match &cli.command {
        Command::CreateBlock {
            name,
            bays,
            rows,
            tiers,
            block_type,
        } => {
            let block = service
                .create_block(BlockDraft {
                    name: name.clone(),
                    bays: *bays,
                    rows: *rows,
                    tiers: *tiers,
                    block_type: block_type.clone(),
                })
                .await?;
            emit(json, &block, || {
                println!(
                    "✅ Created block '{}' ({}x{}x{}, {} slots)",
                    block.name, block.bays, block.rows, block.tiers, block.capacity
                );
                println!("🆔 {}", block.id);
            })?;
        }
        Command::ListBlocks => {
            let blocks = service.list_blocks().await?;
            emit(json, &blocks, || {
                if blocks.is_empty() {
                    println!("No blocks yet");
                }
                for block in &blocks {
                    println!(
                        "{:<10} {:>3}x{:<3}x{:<2} {:<9} {}",
                        block.name, block.bays, block.rows, block.tiers, block.block_type, block.id
                    );
                }
            })?;
        }
        Command::DeleteBlock { block } => {
            let block = service.resolve_block(block).await?;
            service.delete_block(block.id).await?;
            emit(json, &block.id, || println!("🗑️  Deleted block '{}'", block.name))?;
        }
        Command::Place { block, container } => {
            let block = service.resolve_block(block).await?;
            let (container, slot) = service
                .place_container(block.id, container_draft(container)?)
                .await?;
            emit(json, &(&container, &slot), || {
                println!(
                    "✅ Placed {} in block '{}' at {}",
                    container.container_number, block.name, slot.coord
                );
            })?;
        }
        Command::Remove { block, slot } => {
            let block = service.resolve_block(block).await?;
            let slot = service.slot_at(block.id, coord(slot)).await?;
            let container = service.remove_container(slot.id).await?;
            emit(json, &container, || {
                println!(
                    "✅ Removed {} from block '{}' at {}",
                    container.container_number, block.name, slot.coord
                );
            })?;
        }
        Command::NextSlot { block } => {
            let block = service.resolve_block(block).await?;
            let slot = service.find_next_available_slot(block.id).await?;
            emit(json, &slot, || match &slot {
                Some(slot) => println!("➡️  Next free slot in '{}': {}", block.name, slot.coord),
                None => println!("Block '{}' is full", block.name),
            })?;
        }
        Command::Utilization { block } => {
            let block = service.resolve_block(block).await?;
            let util = service.compute_utilization(block.id).await?;
            emit(json, &util, || {
                println!(
                    "📊 '{}': {}/{} slots occupied ({}%)",
                    block.name, util.occupied_slots, util.total_slots, util.utilization_percentage
                );
            })?;
        }
        Command::AccessPath { block, slot } => {
            let block = service.resolve_block(block).await?;
            let path = service.compute_access_path_at(block.id, coord(slot)).await?;
            emit(json, &path, || {
                if path.directly_accessible {
                    println!("✅ {} can be pulled directly", path.target.coord);
                } else {
                    println!(
                        "⚠️  {} is blocked; move these first (top to bottom):",
                        path.target.coord
                    );
                    for (idx, blocking) in path.blocking_containers.iter().enumerate() {
                        println!(
                            "  {}. {} at {}",
                            idx + 1,
                            blocking.container.container_number,
                            blocking.slot.coord
                        );
                    }
                }
            })?;
        }
        Command::Layout { block } => {
            let block = service.resolve_block(block).await?;
            let (block, occupancy) = service.block_occupancy(block.id).await?;
            let layout = BlockLayout::build(&block, &occupancy);
            emit(json, &layout.stack_heights(), || {
                println!("Block '{}' ({})", block.name, block.block_type);
                print!("{}", layout.render());
            })?;
        }
        Command::Find { container_number } => {
            let location = service.find_container(container_number).await?;
            emit(json, &location, || {
                let c = &location.container;
                println!(
                    "📦 {} ({}, {}) consignee {}",
                    c.container_number,
                    c.condition,
                    c.holding_area,
                    c.consignee_name
                );
                if let (Some(block), Some(slot)) = (&location.block, &location.slot) {
                    println!("📍 Block '{}' at {}", block.name, slot.coord);
                }
            })?;
        }
        Command::Transfer {
            container_number,
            area,
        } => {
            let area: HoldingArea = area.parse()?;
            let location = service.find_container(container_number).await?;
            let container = service
                .transfer_to_area(location.container.id, area)
                .await?;
            emit(json, &container, || {
                println!("✅ {} moved to {}", container.container_number, container.holding_area);
            })?;
        }
        Command::Import { block, file } => {
            let block = service.resolve_block(block).await?;
            let reader = std::fs::File::open(file)?;
            let report = import_manifest(service, block.id, reader).await?;
            emit(json, &report, || {
                println!(
                    "📥 Imported into '{}': {} placed, {} failed",
                    block.name,
                    report.placed.len(),
                    report.failures.len()
                );
                for failure in &report.failures {
                    println!(
                        "  line {}: {} ({})",
                        failure.line,
                        failure.container_number.as_deref().unwrap_or("-"),
                        failure.reason
                    );
                }
            })?;
        }
        Command::Export { block, output } => {
            let block = service.resolve_block(block).await?;
            match output {
                Some(path) => {
                    let file = std::fs::File::create(path)?;
                    let rows = export_block(service, block.id, file).await?;
                    tracing::info!("📁 Wrote {} slot rows to {}", rows, path.display());
                }
                None => {
                    export_block(service, block.id, std::io::stdout().lock()).await?;
                }
            }
        }
        Command::Summary => {
            let summary = service.yard_summary().await?;
            emit(json, &summary, || {
                for entry in &summary.blocks {
                    println!(
                        "{:<10} {:>5}/{:<5} {:>3}%",
                        entry.block.name,
                        entry.utilization.occupied_slots,
                        entry.utilization.total_slots,
                        entry.utilization.utilization_percentage
                    );
                }
                println!(
                    "📊 Yard total: {}/{} slots ({}%)",
                    summary.total.occupied_slots,
                    summary.total.total_slots,
                    summary.total.utilization_percentage
                );
            })?;
        }
    }

    Ok(())
}

fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce()) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human();
    }
    Ok(())
}

fn coord(args: &SlotArgs) -> SlotCoord {
    SlotCoord::new(args.bay, args.row, args.tier)
}

fn container_draft(args: &ContainerArgs) -> Result<ContainerDraft> {
    Ok(ContainerDraft {
        container_number: args.container_number.clone(),
        iso_type: args.iso_type.clone(),
        size: args.size.clone(),
        consignee_name: args.consignee_name.clone(),
        condition: args.condition.parse()?,
        seal_number: args.seal_number.clone(),
        gross_weight_kg: args.gross_weight_kg,
    })
}
