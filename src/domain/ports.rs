use crate::domain::model::{
    Block, BlockId, Container, ContainerId, Slot, SlotId, YardEvent,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotFilter {
    #[default]
    All,
    Occupied,
    Empty,
}

impl SlotFilter {
    pub fn matches(&self, slot: &Slot) -> bool {
        match self {
            Self::All => true,
            Self::Occupied => !slot.is_empty(),
            Self::Empty => slot.is_empty(),
        }
    }
}

/// 有條件的格位更新：只有目前佔用者等於 `expected` 時才寫入 `container_id`，
/// 否則回傳 `SlotConflictError`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotUpdate {
    pub expected: Option<ContainerId>,
    pub container_id: Option<ContainerId>,
}

impl SlotUpdate {
    pub fn occupy(container_id: ContainerId) -> Self {
        Self {
            expected: None,
            container_id: Some(container_id),
        }
    }

    pub fn vacate(current: ContainerId) -> Self {
        Self {
            expected: Some(current),
            container_id: None,
        }
    }
}

/// 持久化儲存的最小契約。每個方法各自是一個原子操作。
#[async_trait]
pub trait YardStore: Send + Sync {
    async fn insert_block(&self, block: Block) -> Result<Block>;

    /// 全部寫入或全部不寫入；`(block_id, bay, row, tier)` 必須唯一
    async fn insert_slots(&self, slots: Vec<Slot>) -> Result<()>;

    async fn get_block(&self, block_id: BlockId) -> Result<Option<Block>>;

    async fn list_blocks(&self) -> Result<Vec<Block>>;

    /// 連同格位一起刪除；仍有格位被佔用時拒絕
    async fn delete_block(&self, block_id: BlockId) -> Result<()>;

    /// 依 bay、row、tier 排序
    async fn get_slots_for_block(&self, block_id: BlockId) -> Result<Vec<Slot>>;

    async fn get_slot(&self, slot_id: SlotId) -> Result<Option<Slot>>;

    async fn find_slot_by_container(&self, container_id: ContainerId) -> Result<Option<Slot>>;

    /// 佔用時貨櫃轉為 `Yard`，清空時原佔用者轉為 `Unplaced`，與格位同一次寫入
    async fn update_slot(&self, slot_id: SlotId, update: SlotUpdate) -> Result<Slot>;

    async fn count_slots(&self, block_id: BlockId, filter: SlotFilter) -> Result<usize>;

    async fn get_container(&self, container_id: ContainerId) -> Result<Option<Container>>;

    async fn find_container_by_number(&self, container_number: &str) -> Result<Option<Container>>;

    /// `container_number` 必須唯一
    async fn insert_container(&self, container: Container) -> Result<Container>;

    /// 新增貨櫃並放入空格位，兩者一起成功或一起不寫入。
    /// 格位已被佔用時回傳 `SlotConflictError`
    async fn place_new_container(
        &self,
        container: Container,
        slot_id: SlotId,
    ) -> Result<(Container, Slot)>;

    async fn update_container(&self, container: Container) -> Result<Container>;

    /// 仍在格位中的貨櫃不可刪除
    async fn delete_container(&self, container_id: ContainerId) -> Result<()>;
}

/// 變更通知。核心服務不依賴它，畫面層自行訂閱後重新讀取
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<YardEvent>;
}
