use anyhow::Result;
use stackwise::domain::model::{BlockDraft, BlockType, ContainerDraft, SlotCoord, YardEvent};
use stackwise::domain::ports::{ChangeFeed, YardStore};
use stackwise::{InMemoryYardStore, JsonFileYardStore, YardError, YardService, YardSettings};
use std::collections::HashSet;
use tempfile::TempDir;

fn service() -> YardService<InMemoryYardStore> {
    YardService::new(InMemoryYardStore::new(), YardSettings::default())
}

#[tokio::test]
async fn test_create_block_covers_full_cross_product() -> Result<()> {
    let yard = service();

    for (bays, rows, tiers) in [(1, 1, 1), (3, 2, 4), (5, 1, 2), (2, 6, 1)] {
        let block = yard
            .create_block(BlockDraft::new("X", bays, rows).with_tiers(tiers))
            .await?;
        let slots = yard.get_slots(block.id).await?;

        let expected = (bays * rows * tiers) as usize;
        assert_eq!(slots.len(), expected);
        assert_eq!(block.capacity, expected as u64);

        let coords: HashSet<SlotCoord> = slots.iter().map(|s| s.coord).collect();
        assert_eq!(coords.len(), expected);
        for bay in 1..=bays {
            for row in 1..=rows {
                for tier in 1..=tiers {
                    assert!(coords.contains(&SlotCoord::new(bay, row, tier)));
                }
            }
        }
        assert!(slots.iter().all(|s| s.is_empty()));

        let util = yard.compute_utilization(block.id).await?;
        assert_eq!(util.occupied_slots, 0);
        assert_eq!(util.utilization_percentage, 0);
    }
    Ok(())
}

#[tokio::test]
async fn test_create_block_defaults_tiers_from_settings() -> Result<()> {
    let settings = YardSettings {
        default_tiers: 5,
        ..YardSettings::default()
    };
    let yard = YardService::new(InMemoryYardStore::new(), settings);

    let block = yard
        .create_block(BlockDraft::new("RF1", 2, 2).with_type("reefer"))
        .await?;
    assert_eq!(block.tiers, 5);
    assert_eq!(block.block_type, BlockType::Reefer);
    assert_eq!(yard.get_slots(block.id).await?.len(), 20);
    Ok(())
}

#[tokio::test]
async fn test_create_block_reports_every_violation() {
    let yard = service();
    let draft = BlockDraft {
        name: String::new(),
        bays: 0,
        rows: 3,
        tiers: Some(0),
        block_type: "chilled".to_string(),
    };

    match yard.create_block(draft).await {
        Err(YardError::ValidationError { violations }) => {
            assert_eq!(violations.len(), 4, "{:?}", violations);
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(yard.list_blocks().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_block_name_longer_than_limit_is_rejected() {
    let yard = service();
    let err = yard
        .create_block(BlockDraft::new("ABCDEFGHIJK", 1, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, YardError::ValidationError { .. }));

    assert!(yard.create_block(BlockDraft::new("ABCDEFGHIJ", 1, 1)).await.is_ok());
}

#[tokio::test]
async fn test_delete_block_only_when_empty() -> Result<()> {
    let yard = service();
    let block = yard.create_block(BlockDraft::new("DEL", 1, 1).with_tiers(2)).await?;
    let (_, slot) = yard
        .place_container(block.id, ContainerDraft::new("DELU0000001", "ACME"))
        .await?;

    let err = yard.delete_block(block.id).await.unwrap_err();
    assert!(matches!(err, YardError::BlockNotEmptyError { occupied: 1, .. }));

    yard.remove_container(slot.id).await?;
    yard.delete_block(block.id).await?;

    let err = yard.get_block(block.id).await.unwrap_err();
    assert!(matches!(err, YardError::NotFoundError { entity: "Block", .. }));
    // 貨櫃本身仍然存在
    assert!(yard.find_container("DELU0000001").await.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_resolve_block_by_name_or_id() -> Result<()> {
    let yard = service();
    let a = yard.create_block(BlockDraft::new("A1", 1, 1)).await?;
    yard.create_block(BlockDraft::new("B1", 1, 1)).await?;
    yard.create_block(BlockDraft::new("B1", 1, 1)).await?;

    assert_eq!(yard.resolve_block("a1").await?.id, a.id);
    assert_eq!(yard.resolve_block(&a.id.to_string()).await?.id, a.id);
    assert!(matches!(
        yard.resolve_block("B1").await.unwrap_err(),
        YardError::ValidationError { .. }
    ));
    assert!(matches!(
        yard.resolve_block("Z9").await.unwrap_err(),
        YardError::NotFoundError { .. }
    ));
    Ok(())
}

#[tokio::test]
async fn test_resolve_block_folds_non_ascii_names() -> Result<()> {
    let yard = service();
    let north = yard.create_block(BlockDraft::new("  Ärea-N ", 1, 1)).await?;
    assert_eq!(north.name, "Ärea-N");

    assert_eq!(yard.resolve_block("ärea-n").await?.id, north.id);
    assert_eq!(yard.resolve_block(" ÄREA-N").await?.id, north.id);
    Ok(())
}

#[tokio::test]
async fn test_oversized_block_is_rejected_before_allocation() -> Result<()> {
    let yard = service();

    let err = yard
        .create_block(BlockDraft::new("H", 65536, 65536).with_tiers(4))
        .await
        .unwrap_err();
    match err {
        YardError::ValidationError { violations } => {
            assert!(violations.iter().any(|v| v.contains("limit of 10000 slots")));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(yard.list_blocks().await?.is_empty());

    let settings = YardSettings {
        max_block_capacity: 8,
        ..YardSettings::default()
    };
    let small = YardService::new(InMemoryYardStore::new(), settings);
    assert!(small.create_block(BlockDraft::new("S", 2, 2).with_tiers(2)).await.is_ok());
    assert!(small.create_block(BlockDraft::new("S", 3, 1).with_tiers(3)).await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_slot_set_round_trips_through_json_store() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("yard.json");

    let (block_id, created) = {
        let yard = YardService::new(JsonFileYardStore::open(&path).await?, YardSettings::default());
        let block = yard.create_block(BlockDraft::new("J", 3, 2).with_tiers(3)).await?;
        yard.place_container(block.id, ContainerDraft::new("JSON0000001", "ACME"))
            .await?;
        let coords: HashSet<SlotCoord> =
            yard.get_slots(block.id).await?.iter().map(|s| s.coord).collect();
        (block.id, coords)
    };

    let yard = YardService::new(JsonFileYardStore::open(&path).await?, YardSettings::default());
    let slots = yard.get_slots(block_id).await?;
    let reloaded: HashSet<SlotCoord> = slots.iter().map(|s| s.coord).collect();

    assert_eq!(slots.len(), 18);
    assert_eq!(reloaded, created);
    assert_eq!(yard.compute_utilization(block_id).await?.occupied_slots, 1);
    assert_eq!(
        yard.find_next_available_slot(block_id).await?.unwrap().coord,
        SlotCoord::new(1, 1, 2)
    );
    Ok(())
}

#[tokio::test]
async fn test_change_feed_sees_block_and_placement_events() -> Result<()> {
    let store = InMemoryYardStore::new();
    let mut events = store.subscribe();
    let yard = YardService::new(store, YardSettings::default());

    let block = yard.create_block(BlockDraft::new("EV", 1, 1).with_tiers(1)).await?;
    let (container, slot) = yard
        .place_container(block.id, ContainerDraft::new("EVTU0000001", "ACME"))
        .await?;

    assert_eq!(events.recv().await?, YardEvent::BlockCreated { block_id: block.id });
    assert_eq!(
        events.recv().await?,
        YardEvent::SlotsCreated {
            block_id: block.id,
            count: 1
        }
    );
    assert_eq!(
        events.recv().await?,
        YardEvent::ContainerCreated {
            container_id: container.id
        }
    );
    assert_eq!(
        events.recv().await?,
        YardEvent::SlotChanged {
            block_id: block.id,
            slot_id: slot.id,
            container_id: Some(container.id),
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_yard_summary_totals_all_blocks() -> Result<()> {
    let yard = service();
    let a = yard.create_block(BlockDraft::new("SA", 1, 1).with_tiers(2)).await?;
    let b = yard.create_block(BlockDraft::new("SB", 1, 1).with_tiers(2)).await?;
    yard.place_container(a.id, ContainerDraft::new("SUMU0000001", "ACME")).await?;
    yard.place_container(a.id, ContainerDraft::new("SUMU0000002", "ACME")).await?;
    yard.place_container(b.id, ContainerDraft::new("SUMU0000003", "ACME")).await?;

    let summary = yard.yard_summary().await?;
    assert_eq!(summary.blocks.len(), 2);
    assert_eq!(summary.total.total_slots, 4);
    assert_eq!(summary.total.occupied_slots, 3);
    assert_eq!(summary.total.utilization_percentage, 75);
    Ok(())
}
