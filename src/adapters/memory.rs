use crate::domain::model::{
    normalize_container_number, Block, BlockId, Container, ContainerId, HoldingArea, Slot, SlotId,
    YardEvent,
};
use crate::domain::ports::{ChangeFeed, SlotFilter, SlotUpdate, YardStore};
use crate::utils::error::{Result, YardError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

const EVENT_CAPACITY: usize = 256;

/// 可序列化的完整儲存內容
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YardSnapshot {
    pub blocks: Vec<Block>,
    pub slots: Vec<Slot>,
    pub containers: Vec<Container>,
}

#[derive(Debug, Default)]
struct YardState {
    blocks: HashMap<BlockId, Block>,
    slots: HashMap<SlotId, Slot>,
    containers: HashMap<ContainerId, Container>,
    // 索引
    block_slots: HashMap<BlockId, Vec<SlotId>>,
    numbers: HashMap<String, ContainerId>,
    occupants: HashMap<ContainerId, SlotId>,
}

impl YardState {
    fn from_snapshot(snapshot: YardSnapshot) -> Result<Self> {
        let mut state = Self::default();
        for block in snapshot.blocks {
            state.put_block(block)?;
        }
        state.put_slots(snapshot.slots)?;
        for container in snapshot.containers {
            state.put_container(container)?;
        }
        for slot in state.slots.values() {
            if let Some(container_id) = slot.container_id {
                if !state.containers.contains_key(&container_id) {
                    return Err(YardError::store(format!(
                        "slot {} references missing container {}",
                        slot.id, container_id
                    )));
                }
                if state.occupants.insert(container_id, slot.id).is_some() {
                    return Err(YardError::store(format!(
                        "container {} occupies more than one slot",
                        container_id
                    )));
                }
            }
        }
        Ok(state)
    }

    fn to_snapshot(&self) -> YardSnapshot {
        let mut blocks: Vec<Block> = self.blocks.values().cloned().collect();
        blocks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));

        let mut slots = Vec::with_capacity(self.slots.len());
        for block in &blocks {
            slots.extend(self.sorted_slots(block.id));
        }

        let mut containers: Vec<Container> = self.containers.values().cloned().collect();
        containers.sort_by(|a, b| a.container_number.cmp(&b.container_number));

        YardSnapshot {
            blocks,
            slots,
            containers,
        }
    }

    fn put_block(&mut self, block: Block) -> Result<()> {
        if self.blocks.contains_key(&block.id) {
            return Err(YardError::store(format!("block {} already exists", block.id)));
        }
        self.block_slots.insert(block.id, Vec::new());
        self.blocks.insert(block.id, block);
        Ok(())
    }

    fn put_slots(&mut self, slots: Vec<Slot>) -> Result<()> {
        // 先完整檢查，確保失敗時不留下部分格位
        let mut seen_ids = HashSet::new();
        let mut seen_coords = HashSet::new();
        for slot in &slots {
            let block = self
                .blocks
                .get(&slot.block_id)
                .ok_or_else(|| YardError::not_found("Block", slot.block_id))?;
            if !block.contains(&slot.coord) {
                return Err(YardError::store(format!(
                    "slot {} lies outside block {}",
                    slot.coord, block.name
                )));
            }
            if self.slots.contains_key(&slot.id) || !seen_ids.insert(slot.id) {
                return Err(YardError::store(format!("slot {} already exists", slot.id)));
            }
            let taken = self
                .block_slots
                .get(&slot.block_id)
                .into_iter()
                .flatten()
                .filter_map(|id| self.slots.get(id))
                .any(|existing| existing.coord == slot.coord);
            if taken || !seen_coords.insert((slot.block_id, slot.coord)) {
                return Err(YardError::DuplicateSlotError {
                    block_id: slot.block_id.to_string(),
                    coord: slot.coord.to_string(),
                });
            }
        }

        let mut touched = HashSet::new();
        for slot in slots {
            touched.insert(slot.block_id);
            if let Some(ids) = self.block_slots.get_mut(&slot.block_id) {
                ids.push(slot.id);
            }
            self.slots.insert(slot.id, slot);
        }
        for block_id in touched {
            self.sort_block_slots(block_id);
        }
        Ok(())
    }

    fn sort_block_slots(&mut self, block_id: BlockId) {
        let slots = &self.slots;
        if let Some(ids) = self.block_slots.get_mut(&block_id) {
            ids.sort_by_key(|id| slots.get(id).map(|slot| slot.coord));
        }
    }

    fn sorted_slots(&self, block_id: BlockId) -> Vec<Slot> {
        self.block_slots
            .get(&block_id)
            .map(|ids| ids.iter().filter_map(|id| self.slots.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    fn put_container(&mut self, container: Container) -> Result<()> {
        let number = normalize_container_number(&container.container_number);
        if self.numbers.contains_key(&number) {
            return Err(YardError::DuplicateContainerError {
                container_number: number,
            });
        }
        if self.containers.contains_key(&container.id) {
            return Err(YardError::store(format!(
                "container {} already exists",
                container.id
            )));
        }
        self.numbers.insert(number, container.id);
        self.containers.insert(container.id, container);
        Ok(())
    }

    fn remove_block(&mut self, block_id: BlockId) -> Result<()> {
        let ids = self
            .block_slots
            .get(&block_id)
            .ok_or_else(|| YardError::not_found("Block", block_id))?;
        let occupied = ids
            .iter()
            .filter(|id| self.slots.get(*id).is_some_and(|slot| !slot.is_empty()))
            .count();
        if occupied > 0 {
            return Err(YardError::BlockNotEmptyError {
                block_id: block_id.to_string(),
                occupied,
            });
        }

        if let Some(ids) = self.block_slots.remove(&block_id) {
            for id in ids {
                self.slots.remove(&id);
            }
        }
        self.blocks.remove(&block_id);
        Ok(())
    }

    fn apply_slot_update(&mut self, slot_id: SlotId, update: SlotUpdate) -> Result<Slot> {
        let current = self
            .slots
            .get(&slot_id)
            .ok_or_else(|| YardError::not_found("Slot", slot_id))?
            .container_id;
        if current != update.expected {
            return Err(YardError::SlotConflictError {
                slot_id: slot_id.to_string(),
            });
        }

        if let Some(container_id) = update.container_id {
            if !self.containers.contains_key(&container_id) {
                return Err(YardError::not_found("Container", container_id));
            }
            if let Some(other) = self.occupants.get(&container_id) {
                if *other != slot_id {
                    return Err(YardError::store(format!(
                        "container {} already occupies slot {}",
                        container_id, other
                    )));
                }
            }
        }

        if let Some(previous) = current {
            self.occupants.remove(&previous);
            if let Some(container) = self.containers.get_mut(&previous) {
                container.holding_area = HoldingArea::Unplaced;
            }
        }
        if let Some(container_id) = update.container_id {
            self.occupants.insert(container_id, slot_id);
            if let Some(container) = self.containers.get_mut(&container_id) {
                container.holding_area = HoldingArea::Yard;
            }
        }

        let slot = self
            .slots
            .get_mut(&slot_id)
            .ok_or_else(|| YardError::not_found("Slot", slot_id))?;
        slot.container_id = update.container_id;
        Ok(slot.clone())
    }

    fn place_new(&mut self, container: Container, slot_id: SlotId) -> Result<(Container, Slot)> {
        let slot = self
            .slots
            .get(&slot_id)
            .ok_or_else(|| YardError::not_found("Slot", slot_id))?;
        if !slot.is_empty() {
            return Err(YardError::SlotConflictError {
                slot_id: slot_id.to_string(),
            });
        }

        let container_id = container.id;
        self.put_container(container)?;
        match self.apply_slot_update(slot_id, SlotUpdate::occupy(container_id)) {
            Ok(slot) => {
                let container = self
                    .containers
                    .get(&container_id)
                    .cloned()
                    .ok_or_else(|| YardError::not_found("Container", container_id))?;
                Ok((container, slot))
            }
            Err(e) => {
                self.remove_container(container_id)?;
                Err(e)
            }
        }
    }

    fn replace_container(&mut self, container: Container) -> Result<Container> {
        let existing = self
            .containers
            .get(&container.id)
            .ok_or_else(|| YardError::not_found("Container", container.id))?;

        let placed = self.occupants.contains_key(&container.id);
        if placed != (container.holding_area == HoldingArea::Yard) {
            return Err(YardError::validation(vec![format!(
                "container {} cannot be {} while {}",
                container.container_number,
                container.holding_area,
                if placed { "placed in a slot" } else { "outside every slot" }
            )]));
        }

        let old_number = normalize_container_number(&existing.container_number);
        let new_number = normalize_container_number(&container.container_number);
        if old_number != new_number {
            if self.numbers.contains_key(&new_number) {
                return Err(YardError::DuplicateContainerError {
                    container_number: new_number,
                });
            }
            self.numbers.remove(&old_number);
            self.numbers.insert(new_number, container.id);
        }
        self.containers.insert(container.id, container.clone());
        Ok(container)
    }

    fn remove_container(&mut self, container_id: ContainerId) -> Result<()> {
        if let Some(slot_id) = self.occupants.get(&container_id) {
            return Err(YardError::store(format!(
                "container {} is still placed in slot {}",
                container_id, slot_id
            )));
        }
        let container = self
            .containers
            .remove(&container_id)
            .ok_or_else(|| YardError::not_found("Container", container_id))?;
        self.numbers
            .remove(&normalize_container_number(&container.container_number));
        Ok(())
    }
}

/// 行程內的儲存實作，所有寫入都在同一把寫鎖內完成
#[derive(Clone)]
pub struct InMemoryYardStore {
    state: Arc<RwLock<YardState>>,
    events: broadcast::Sender<YardEvent>,
}

impl InMemoryYardStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(YardState::default())),
            events,
        }
    }

    pub fn from_snapshot(snapshot: YardSnapshot) -> Result<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            state: Arc::new(RwLock::new(YardState::from_snapshot(snapshot)?)),
            events,
        })
    }

    pub async fn snapshot(&self) -> YardSnapshot {
        self.state.read().await.to_snapshot()
    }

    /// 以快照整份取代目前狀態（不發出事件）
    pub async fn restore(&self, snapshot: YardSnapshot) -> Result<()> {
        let state = YardState::from_snapshot(snapshot)?;
        *self.state.write().await = state;
        Ok(())
    }

    fn publish(&self, event: YardEvent) {
        // 沒有訂閱者時 send 會回傳錯誤，可忽略
        let _ = self.events.send(event);
    }
}

impl Default for InMemoryYardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed for InMemoryYardStore {
    fn subscribe(&self) -> broadcast::Receiver<YardEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl YardStore for InMemoryYardStore {
    async fn insert_block(&self, block: Block) -> Result<Block> {
        self.state.write().await.put_block(block.clone())?;
        self.publish(YardEvent::BlockCreated { block_id: block.id });
        Ok(block)
    }

    async fn insert_slots(&self, slots: Vec<Slot>) -> Result<()> {
        let mut counts: HashMap<BlockId, usize> = HashMap::new();
        for slot in &slots {
            *counts.entry(slot.block_id).or_default() += 1;
        }
        self.state.write().await.put_slots(slots)?;
        for (block_id, count) in counts {
            self.publish(YardEvent::SlotsCreated { block_id, count });
        }
        Ok(())
    }

    async fn get_block(&self, block_id: BlockId) -> Result<Option<Block>> {
        Ok(self.state.read().await.blocks.get(&block_id).cloned())
    }

    async fn list_blocks(&self) -> Result<Vec<Block>> {
        Ok(self.state.read().await.to_snapshot().blocks)
    }

    async fn delete_block(&self, block_id: BlockId) -> Result<()> {
        self.state.write().await.remove_block(block_id)?;
        self.publish(YardEvent::BlockDeleted { block_id });
        Ok(())
    }

    async fn get_slots_for_block(&self, block_id: BlockId) -> Result<Vec<Slot>> {
        Ok(self.state.read().await.sorted_slots(block_id))
    }

    async fn get_slot(&self, slot_id: SlotId) -> Result<Option<Slot>> {
        Ok(self.state.read().await.slots.get(&slot_id).cloned())
    }

    async fn find_slot_by_container(&self, container_id: ContainerId) -> Result<Option<Slot>> {
        let state = self.state.read().await;
        Ok(state
            .occupants
            .get(&container_id)
            .and_then(|slot_id| state.slots.get(slot_id))
            .cloned())
    }

    async fn update_slot(&self, slot_id: SlotId, update: SlotUpdate) -> Result<Slot> {
        let slot = self.state.write().await.apply_slot_update(slot_id, update)?;
        self.publish(YardEvent::SlotChanged {
            block_id: slot.block_id,
            slot_id: slot.id,
            container_id: slot.container_id,
        });
        for container_id in update.expected.into_iter().chain(update.container_id) {
            self.publish(YardEvent::ContainerUpdated { container_id });
        }
        Ok(slot)
    }

    async fn count_slots(&self, block_id: BlockId, filter: SlotFilter) -> Result<usize> {
        let state = self.state.read().await;
        Ok(state
            .block_slots
            .get(&block_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.slots.get(id))
                    .filter(|slot| filter.matches(slot))
                    .count()
            })
            .unwrap_or(0))
    }

    async fn get_container(&self, container_id: ContainerId) -> Result<Option<Container>> {
        Ok(self.state.read().await.containers.get(&container_id).cloned())
    }

    async fn find_container_by_number(&self, container_number: &str) -> Result<Option<Container>> {
        let state = self.state.read().await;
        Ok(state
            .numbers
            .get(&normalize_container_number(container_number))
            .and_then(|id| state.containers.get(id))
            .cloned())
    }

    async fn insert_container(&self, container: Container) -> Result<Container> {
        self.state.write().await.put_container(container.clone())?;
        self.publish(YardEvent::ContainerCreated {
            container_id: container.id,
        });
        Ok(container)
    }

    async fn place_new_container(
        &self,
        container: Container,
        slot_id: SlotId,
    ) -> Result<(Container, Slot)> {
        let (container, slot) = self.state.write().await.place_new(container, slot_id)?;
        self.publish(YardEvent::ContainerCreated {
            container_id: container.id,
        });
        self.publish(YardEvent::SlotChanged {
            block_id: slot.block_id,
            slot_id: slot.id,
            container_id: slot.container_id,
        });
        Ok((container, slot))
    }

    async fn update_container(&self, container: Container) -> Result<Container> {
        let container = self.state.write().await.replace_container(container)?;
        self.publish(YardEvent::ContainerUpdated {
            container_id: container.id,
        });
        Ok(container)
    }

    async fn delete_container(&self, container_id: ContainerId) -> Result<()> {
        self.state.write().await.remove_container(container_id)?;
        self.publish(YardEvent::ContainerDeleted { container_id });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{BlockDraft, ContainerDraft, HoldingArea, SlotCoord};

    async fn seeded_store() -> (InMemoryYardStore, Block, Vec<Slot>) {
        let store = InMemoryYardStore::new();
        let block = BlockDraft::new("T1", 1, 1).with_tiers(3).build(10, 4, 10_000).unwrap();
        let slots: Vec<Slot> = block.coords().map(|c| Slot::empty(block.id, c)).collect();
        store.insert_block(block.clone()).await.unwrap();
        store.insert_slots(slots.clone()).await.unwrap();
        (store, block, slots)
    }

    fn container(number: &str) -> Container {
        ContainerDraft::new(number, "ACME").into_container(HoldingArea::Unplaced)
    }

    #[tokio::test]
    async fn test_insert_slots_rejects_duplicate_coordinates_atomically() {
        let (store, block, _) = seeded_store().await;

        let dup = vec![Slot::empty(block.id, SlotCoord::new(1, 1, 1))];
        let err = store.insert_slots(dup).await.unwrap_err();
        assert!(matches!(err, YardError::DuplicateSlotError { .. }));
        assert_eq!(store.count_slots(block.id, SlotFilter::All).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_update_slot_is_guarded_by_expected_occupant() {
        let (store, _, slots) = seeded_store().await;
        let first = store.insert_container(container("AAAU1000001")).await.unwrap();
        let second = store.insert_container(container("AAAU1000002")).await.unwrap();

        store
            .update_slot(slots[0].id, SlotUpdate::occupy(first.id))
            .await
            .unwrap();
        let err = store
            .update_slot(slots[0].id, SlotUpdate::occupy(second.id))
            .await
            .unwrap_err();
        assert!(matches!(err, YardError::SlotConflictError { .. }));

        let slot = store.get_slot(slots[0].id).await.unwrap().unwrap();
        assert_eq!(slot.container_id, Some(first.id));
    }

    #[tokio::test]
    async fn test_container_cannot_occupy_two_slots() {
        let (store, _, slots) = seeded_store().await;
        let c = store.insert_container(container("AAAU1000001")).await.unwrap();

        store.update_slot(slots[0].id, SlotUpdate::occupy(c.id)).await.unwrap();
        assert!(store.update_slot(slots[1].id, SlotUpdate::occupy(c.id)).await.is_err());
        assert_eq!(
            store.find_slot_by_container(c.id).await.unwrap().unwrap().id,
            slots[0].id
        );
    }

    #[tokio::test]
    async fn test_container_numbers_are_unique_case_insensitively() {
        let store = InMemoryYardStore::new();
        store.insert_container(container("msku1234565")).await.unwrap();

        let err = store.insert_container(container("MSKU1234565")).await.unwrap_err();
        assert!(matches!(err, YardError::DuplicateContainerError { .. }));
        assert!(store.find_container_by_number(" Msku1234565").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_block_refuses_while_occupied() {
        let (store, block, slots) = seeded_store().await;
        let c = store.insert_container(container("AAAU1000001")).await.unwrap();
        store.update_slot(slots[2].id, SlotUpdate::occupy(c.id)).await.unwrap();

        let err = store.delete_block(block.id).await.unwrap_err();
        assert!(matches!(err, YardError::BlockNotEmptyError { occupied: 1, .. }));

        store.update_slot(slots[2].id, SlotUpdate::vacate(c.id)).await.unwrap();
        store.delete_block(block.id).await.unwrap();
        assert!(store.get_block(block.id).await.unwrap().is_none());
        assert!(store.get_slot(slots[0].id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_restores_indexes() {
        let (store, block, slots) = seeded_store().await;
        let c = store.insert_container(container("AAAU1000001")).await.unwrap();
        store.update_slot(slots[1].id, SlotUpdate::occupy(c.id)).await.unwrap();

        let restored = InMemoryYardStore::from_snapshot(store.snapshot().await).unwrap();
        assert_eq!(restored.count_slots(block.id, SlotFilter::Occupied).await.unwrap(), 1);
        assert_eq!(
            restored.find_slot_by_container(c.id).await.unwrap().unwrap().id,
            slots[1].id
        );
        assert!(restored.find_container_by_number("AAAU1000001").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_change_feed_reports_slot_changes() {
        let (store, block, slots) = seeded_store().await;
        let mut rx = store.subscribe();
        let c = store.insert_container(container("AAAU1000001")).await.unwrap();
        store.update_slot(slots[0].id, SlotUpdate::occupy(c.id)).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            YardEvent::ContainerCreated { container_id: c.id }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            YardEvent::SlotChanged {
                block_id: block.id,
                slot_id: slots[0].id,
                container_id: Some(c.id),
            }
        );
    }

    #[tokio::test]
    async fn test_update_slot_moves_holding_area_with_occupancy() {
        let (store, _, slots) = seeded_store().await;
        let c = store.insert_container(container("AAAU1000001")).await.unwrap();

        store.update_slot(slots[0].id, SlotUpdate::occupy(c.id)).await.unwrap();
        let placed = store.get_container(c.id).await.unwrap().unwrap();
        assert_eq!(placed.holding_area, HoldingArea::Yard);

        store.update_slot(slots[0].id, SlotUpdate::vacate(c.id)).await.unwrap();
        let cleared = store.get_container(c.id).await.unwrap().unwrap();
        assert_eq!(cleared.holding_area, HoldingArea::Unplaced);

        // 不在格位中的貨櫃不能直接改成 Yard
        let err = store
            .update_container(Container {
                holding_area: HoldingArea::Yard,
                ..cleared
            })
            .await
            .unwrap_err();
        assert!(matches!(err, YardError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn test_place_new_container_writes_nothing_on_conflict() {
        let (store, _, slots) = seeded_store().await;
        let first = ContainerDraft::new("AAAU1000001", "ACME").into_container(HoldingArea::Yard);
        let (placed, slot) = store.place_new_container(first, slots[0].id).await.unwrap();
        assert_eq!(slot.container_id, Some(placed.id));
        assert_eq!(placed.holding_area, HoldingArea::Yard);

        let second = ContainerDraft::new("AAAU1000002", "ACME").into_container(HoldingArea::Yard);
        let err = store
            .place_new_container(second, slots[0].id)
            .await
            .unwrap_err();
        assert!(matches!(err, YardError::SlotConflictError { .. }));
        assert!(store.find_container_by_number("AAAU1000002").await.unwrap().is_none());

        let duplicate = ContainerDraft::new("aaau1000001", "ACME").into_container(HoldingArea::Yard);
        let err = store
            .place_new_container(duplicate, slots[1].id)
            .await
            .unwrap_err();
        assert!(matches!(err, YardError::DuplicateContainerError { .. }));
        assert!(store.get_slot(slots[1].id).await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restore_replaces_state() {
        let (store, block, slots) = seeded_store().await;
        let before = store.snapshot().await;
        let c = store.insert_container(container("AAAU1000001")).await.unwrap();
        store.update_slot(slots[0].id, SlotUpdate::occupy(c.id)).await.unwrap();

        store.restore(before).await.unwrap();
        assert_eq!(store.count_slots(block.id, SlotFilter::Occupied).await.unwrap(), 0);
        assert!(store.get_container(c.id).await.unwrap().is_none());
    }
}
