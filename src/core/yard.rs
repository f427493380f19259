use crate::config::YardSettings;
use crate::core::access_path::scan_column;
use crate::domain::model::{
    AccessPath, Block, BlockDraft, BlockId, BlockUtilization, BlockingContainer, Container,
    ContainerDraft, ContainerId, ContainerLocation, HoldingArea, Slot, SlotCoord, SlotId,
    Utilization, YardSummary,
};
use crate::domain::ports::{SlotFilter, SlotUpdate, YardStore};
use crate::utils::error::{Result, YardError};

/// 堆場佔用模型：區塊、格位與貨櫃之間的所有規則都在這裡
pub struct YardService<S: YardStore> {
    store: S,
    settings: YardSettings,
}

impl<S: YardStore> YardService<S> {
    pub fn new(store: S, settings: YardSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &YardSettings {
        &self.settings
    }

    /// 建立區塊並一次建立全部 bays × rows × tiers 個空格位
    pub async fn create_block(&self, draft: BlockDraft) -> Result<Block> {
        let block = draft.build(
            self.settings.max_block_name_len,
            self.settings.default_tiers,
            self.settings.max_block_capacity,
        )?;
        let slots: Vec<Slot> = block.coords().map(|coord| Slot::empty(block.id, coord)).collect();

        let block = self.store.insert_block(block).await?;
        if let Err(e) = self.store.insert_slots(slots).await {
            tracing::error!("Creating slots for block '{}' failed: {}", block.name, e);
            // 補償：不留下沒有格位的區塊
            if let Err(cleanup) = self.store.delete_block(block.id).await {
                tracing::error!("Could not remove half-created block {}: {}", block.id, cleanup);
            }
            return Err(e);
        }

        tracing::info!(
            "Created block '{}' ({}x{}x{}, {} slots, {})",
            block.name,
            block.bays,
            block.rows,
            block.tiers,
            block.capacity,
            block.block_type
        );
        Ok(block)
    }

    pub async fn get_block(&self, block_id: BlockId) -> Result<Block> {
        self.store
            .get_block(block_id)
            .await?
            .ok_or_else(|| YardError::not_found("Block", block_id))
    }

    pub async fn list_blocks(&self) -> Result<Vec<Block>> {
        self.store.list_blocks().await
    }

    /// 依 id 或名稱找區塊；名稱重複時要求改用 id
    pub async fn resolve_block(&self, reference: &str) -> Result<Block> {
        if let Ok(block_id) = reference.parse::<BlockId>() {
            return self.get_block(block_id).await;
        }

        let wanted = reference.trim();
        let folded = wanted.to_lowercase();
        let mut matches: Vec<Block> = self
            .store
            .list_blocks()
            .await?
            .into_iter()
            .filter(|block| block.name.to_lowercase() == folded)
            .collect();

        match matches.len() {
            0 => Err(YardError::not_found("Block", wanted)),
            1 => Ok(matches.remove(0)),
            n => Err(YardError::validation(vec![format!(
                "block name '{}' is ambiguous ({} blocks), use the block id",
                wanted, n
            )])),
        }
    }

    /// 只有全部格位都空著時才能刪除區塊
    pub async fn delete_block(&self, block_id: BlockId) -> Result<()> {
        let block = self.get_block(block_id).await?;
        let occupied = self.store.count_slots(block_id, SlotFilter::Occupied).await?;
        if occupied > 0 {
            return Err(YardError::BlockNotEmptyError {
                block_id: block_id.to_string(),
                occupied,
            });
        }

        self.store.delete_block(block_id).await?;
        tracing::info!("Deleted block '{}' ({})", block.name, block.id);
        Ok(())
    }

    pub async fn get_slots(&self, block_id: BlockId) -> Result<Vec<Slot>> {
        self.get_block(block_id).await?;
        self.store.get_slots_for_block(block_id).await
    }

    pub async fn slot_at(&self, block_id: BlockId, coord: SlotCoord) -> Result<Slot> {
        let block = self.get_block(block_id).await?;
        if !block.contains(&coord) {
            return Err(YardError::validation(vec![format!(
                "{} is outside block '{}' ({}x{}x{})",
                coord, block.name, block.bays, block.rows, block.tiers
            )]));
        }

        self.store
            .get_slots_for_block(block_id)
            .await?
            .into_iter()
            .find(|slot| slot.coord == coord)
            .ok_or_else(|| YardError::not_found("Slot", coord))
    }

    /// 依 bay、row、tier 遞增順序找第一個空格位
    pub async fn find_next_available_slot(&self, block_id: BlockId) -> Result<Option<Slot>> {
        self.get_block(block_id).await?;
        self.next_empty_slot(block_id).await
    }

    async fn next_empty_slot(&self, block_id: BlockId) -> Result<Option<Slot>> {
        let slots = self.store.get_slots_for_block(block_id).await?;
        Ok(slots
            .into_iter()
            .filter(Slot::is_empty)
            .min_by_key(|slot| slot.coord))
    }

    /// 建立貨櫃並放入下一個空格位。建立與佔用是同一次儲存寫入，
    /// 失敗或中途取消都不會留下沒有格位的貨櫃。
    pub async fn place_container(
        &self,
        block_id: BlockId,
        draft: ContainerDraft,
    ) -> Result<(Container, Slot)> {
        draft.validate()?;
        let block = self.get_block(block_id).await?;
        let container = draft.into_container(HoldingArea::Yard);
        let attempts = self.settings.placement_attempts.max(1);

        let mut last_conflict = None;
        for attempt in 1..=attempts {
            let Some(candidate) = self.next_empty_slot(block_id).await? else {
                return Err(no_capacity(&block));
            };

            match self
                .store
                .place_new_container(container.clone(), candidate.id)
                .await
            {
                Ok((container, slot)) => {
                    tracing::info!(
                        "Placed container {} in block '{}' at {}",
                        container.container_number,
                        block.name,
                        slot.coord
                    );
                    return Ok((container, slot));
                }
                Err(YardError::SlotConflictError { slot_id }) => {
                    tracing::warn!(
                        "Slot {} in block '{}' was taken concurrently (attempt {}/{})",
                        candidate.coord,
                        block.name,
                        attempt,
                        attempts
                    );
                    last_conflict = Some(slot_id);
                }
                Err(e) => return Err(e),
            }
        }

        Err(YardError::SlotConflictError {
            slot_id: last_conflict.unwrap_or_default(),
        })
    }

    /// 把已存在、尚未上架的貨櫃放進指定格位。格位有櫃時拒絕，不覆蓋。
    pub async fn assign_container(
        &self,
        slot_id: SlotId,
        container_id: ContainerId,
    ) -> Result<(Container, Slot)> {
        let slot = self.require_slot(slot_id).await?;
        let container = self.require_container(container_id).await?;

        if let Some(occupant) = slot.container_id {
            return Err(YardError::SlotOccupiedError {
                slot_id: slot_id.to_string(),
                occupant: occupant.to_string(),
            });
        }
        if let Some(current) = self.store.find_slot_by_container(container_id).await? {
            return Err(YardError::validation(vec![format!(
                "container {} is already placed at {}",
                container.container_number, current.coord
            )]));
        }

        let slot = match self
            .store
            .update_slot(slot_id, SlotUpdate::occupy(container_id))
            .await
        {
            Ok(slot) => slot,
            Err(YardError::SlotConflictError { .. }) => {
                let occupant = self
                    .store
                    .get_slot(slot_id)
                    .await?
                    .and_then(|s| s.container_id)
                    .map(|id| id.to_string())
                    .unwrap_or_default();
                return Err(YardError::SlotOccupiedError {
                    slot_id: slot_id.to_string(),
                    occupant,
                });
            }
            Err(e) => return Err(e),
        };

        // 儲存在佔用格位時已把貨櫃轉為 Yard
        let container = self.require_container(container.id).await?;
        tracing::info!("Assigned container {} to {}", container.container_number, slot.coord);
        Ok((container, slot))
    }

    /// 清空格位；貨櫃本身保留，由儲存標記為未上架
    pub async fn remove_container(&self, slot_id: SlotId) -> Result<Container> {
        let slot = self.require_slot(slot_id).await?;
        let Some(container_id) = slot.container_id else {
            return Err(YardError::NotOccupiedError {
                slot_id: slot_id.to_string(),
            });
        };

        let container = self.vacate(&slot, container_id).await?;
        tracing::info!(
            "Removed container {} from {}",
            container.container_number,
            slot.coord
        );
        Ok(container)
    }

    async fn vacate(&self, slot: &Slot, container_id: ContainerId) -> Result<Container> {
        match self
            .store
            .update_slot(slot.id, SlotUpdate::vacate(container_id))
            .await
        {
            Ok(_) => {}
            Err(YardError::SlotConflictError { .. }) => {
                let now_empty = self
                    .store
                    .get_slot(slot.id)
                    .await?
                    .is_some_and(|s| s.is_empty());
                return Err(if now_empty {
                    YardError::NotOccupiedError {
                        slot_id: slot.id.to_string(),
                    }
                } else {
                    YardError::SlotConflictError {
                        slot_id: slot.id.to_string(),
                    }
                });
            }
            Err(e) => return Err(e),
        }

        self.require_container(container_id).await
    }

    pub async fn compute_utilization(&self, block_id: BlockId) -> Result<Utilization> {
        self.get_block(block_id).await?;
        let total = self.store.count_slots(block_id, SlotFilter::All).await?;
        let occupied = self.store.count_slots(block_id, SlotFilter::Occupied).await?;
        tracing::debug!("Block {} utilization: {}/{}", block_id, occupied, total);
        Ok(Utilization::from_counts(occupied, total))
    }

    /// 目標貨櫃能否直接吊出；不能時列出需先移走的貨櫃（最上層在前）
    pub async fn compute_access_path(
        &self,
        block_id: BlockId,
        target: SlotId,
    ) -> Result<AccessPath> {
        let slots = self.get_slots(block_id).await?;
        let scan = scan_column(&slots, target)?;

        let mut blocking_containers = Vec::with_capacity(scan.blocking.len());
        for slot in &scan.blocking {
            let container_id = slot
                .container_id
                .ok_or_else(|| YardError::store(format!("slot {} lost its occupant", slot.id)))?;
            blocking_containers.push(BlockingContainer {
                slot: (*slot).clone(),
                container: self.require_container(container_id).await?,
            });
        }

        Ok(AccessPath {
            target: scan.target.clone(),
            directly_accessible: blocking_containers.is_empty(),
            blocking_containers,
        })
    }

    pub async fn compute_access_path_at(
        &self,
        block_id: BlockId,
        coord: SlotCoord,
    ) -> Result<AccessPath> {
        let slot = self.slot_at(block_id, coord).await?;
        self.compute_access_path(block_id, slot.id).await
    }

    /// 依櫃號查詢貨櫃與目前位置
    pub async fn find_container(&self, container_number: &str) -> Result<ContainerLocation> {
        let container = self
            .store
            .find_container_by_number(container_number)
            .await?
            .ok_or_else(|| YardError::not_found("Container", container_number.trim()))?;

        let slot = self.store.find_slot_by_container(container.id).await?;
        let block = match &slot {
            Some(slot) => self.store.get_block(slot.block_id).await?,
            None => None,
        };

        Ok(ContainerLocation {
            container,
            block,
            slot,
        })
    }

    /// 移到其他作業區（查驗、拆櫃、出場等）；若仍在格位中會先清空格位
    pub async fn transfer_to_area(
        &self,
        container_id: ContainerId,
        area: HoldingArea,
    ) -> Result<Container> {
        if area == HoldingArea::Yard {
            return Err(YardError::validation(vec![
                "containers enter the yard through placement, not transfer".to_string(),
            ]));
        }

        let container = self.require_container(container_id).await?;
        let container = match self.store.find_slot_by_container(container_id).await? {
            Some(slot) => {
                tracing::debug!(
                    "Clearing {} before moving {} to {}",
                    slot.coord,
                    container.container_number,
                    area
                );
                self.vacate(&slot, container_id).await?
            }
            None => container,
        };

        let container = self
            .store
            .update_container(Container {
                holding_area: area,
                ..container
            })
            .await?;
        tracing::info!("Moved container {} to {}", container.container_number, area);
        Ok(container)
    }

    /// 各區塊與全場的使用率
    pub async fn yard_summary(&self) -> Result<YardSummary> {
        let mut blocks = Vec::new();
        let mut total_slots = 0;
        let mut occupied_slots = 0;

        for block in self.store.list_blocks().await? {
            let utilization = self.compute_utilization(block.id).await?;
            total_slots += utilization.total_slots;
            occupied_slots += utilization.occupied_slots;
            blocks.push(BlockUtilization { block, utilization });
        }

        Ok(YardSummary {
            blocks,
            total: Utilization::from_counts(occupied_slots, total_slots),
        })
    }

    /// 區塊內每個格位與其貨櫃，依掃描順序
    pub async fn block_occupancy(
        &self,
        block_id: BlockId,
    ) -> Result<(Block, Vec<(Slot, Option<Container>)>)> {
        let block = self.get_block(block_id).await?;
        let slots = self.store.get_slots_for_block(block_id).await?;

        let mut rows = Vec::with_capacity(slots.len());
        for slot in slots {
            let container = match slot.container_id {
                Some(id) => Some(self.require_container(id).await?),
                None => None,
            };
            rows.push((slot, container));
        }
        Ok((block, rows))
    }

    async fn require_slot(&self, slot_id: SlotId) -> Result<Slot> {
        self.store
            .get_slot(slot_id)
            .await?
            .ok_or_else(|| YardError::not_found("Slot", slot_id))
    }

    async fn require_container(&self, container_id: ContainerId) -> Result<Container> {
        self.store
            .get_container(container_id)
            .await?
            .ok_or_else(|| YardError::not_found("Container", container_id))
    }
}

fn no_capacity(block: &Block) -> YardError {
    YardError::NoCapacityError {
        block_id: block.id.to_string(),
        block_name: block.name.clone(),
    }
}
