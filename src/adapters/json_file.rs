use crate::adapters::memory::{InMemoryYardStore, YardSnapshot};
use crate::domain::model::{Block, BlockId, Container, ContainerId, Slot, SlotId, YardEvent};
use crate::domain::ports::{ChangeFeed, SlotFilter, SlotUpdate, YardStore};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::{broadcast, Mutex};

/// 以 JSON 快照檔保存的儲存實作。每次寫入後整份快照落盤（先寫暫存檔再改名）
pub struct JsonFileYardStore {
    inner: InMemoryYardStore,
    path: PathBuf,
    flush_lock: Mutex<()>,
}

impl JsonFileYardStore {
    /// 檔案不存在時視為空堆場
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = if tokio::fs::try_exists(&path).await? {
            let data = tokio::fs::read(&path).await?;
            let snapshot: YardSnapshot = serde_json::from_slice(&data)?;
            tracing::debug!(
                "Loaded yard snapshot from {} ({} blocks, {} containers)",
                path.display(),
                snapshot.blocks.len(),
                snapshot.containers.len()
            );
            InMemoryYardStore::from_snapshot(snapshot)?
        } else {
            tracing::debug!("No yard snapshot at {}, starting empty", path.display());
            InMemoryYardStore::new()
        };

        Ok(Self {
            inner,
            path,
            flush_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 執行一次寫入並落盤。落盤失敗時把記憶體狀態還原到寫入前，
    /// 磁碟與記憶體不會出現不同的內容
    async fn commit<T: Send>(&self, op: impl Future<Output = Result<T>> + Send) -> Result<T> {
        let _guard = self.flush_lock.lock().await;
        let before = self.inner.snapshot().await;
        let value = op.await?;

        if let Err(e) = self.write_snapshot().await {
            tracing::error!("Persisting {} failed, reverting change: {}", self.path.display(), e);
            self.inner.restore(before).await?;
            return Err(e);
        }
        Ok(value)
    }

    async fn write_snapshot(&self) -> Result<()> {
        let snapshot = self.inner.snapshot().await;
        let data = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &data).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        tracing::debug!("Yard snapshot written ({} bytes) to {}", data.len(), self.path.display());
        Ok(())
    }
}

impl ChangeFeed for JsonFileYardStore {
    fn subscribe(&self) -> broadcast::Receiver<YardEvent> {
        self.inner.subscribe()
    }
}

#[async_trait]
impl YardStore for JsonFileYardStore {
    async fn insert_block(&self, block: Block) -> Result<Block> {
        self.commit(self.inner.insert_block(block)).await
    }

    async fn insert_slots(&self, slots: Vec<Slot>) -> Result<()> {
        self.commit(self.inner.insert_slots(slots)).await
    }

    async fn get_block(&self, block_id: BlockId) -> Result<Option<Block>> {
        self.inner.get_block(block_id).await
    }

    async fn list_blocks(&self) -> Result<Vec<Block>> {
        self.inner.list_blocks().await
    }

    async fn delete_block(&self, block_id: BlockId) -> Result<()> {
        self.commit(self.inner.delete_block(block_id)).await
    }

    async fn get_slots_for_block(&self, block_id: BlockId) -> Result<Vec<Slot>> {
        self.inner.get_slots_for_block(block_id).await
    }

    async fn get_slot(&self, slot_id: SlotId) -> Result<Option<Slot>> {
        self.inner.get_slot(slot_id).await
    }

    async fn find_slot_by_container(&self, container_id: ContainerId) -> Result<Option<Slot>> {
        self.inner.find_slot_by_container(container_id).await
    }

    async fn update_slot(&self, slot_id: SlotId, update: SlotUpdate) -> Result<Slot> {
        self.commit(self.inner.update_slot(slot_id, update)).await
    }

    async fn count_slots(&self, block_id: BlockId, filter: SlotFilter) -> Result<usize> {
        self.inner.count_slots(block_id, filter).await
    }

    async fn get_container(&self, container_id: ContainerId) -> Result<Option<Container>> {
        self.inner.get_container(container_id).await
    }

    async fn find_container_by_number(&self, container_number: &str) -> Result<Option<Container>> {
        self.inner.find_container_by_number(container_number).await
    }

    async fn insert_container(&self, container: Container) -> Result<Container> {
        self.commit(self.inner.insert_container(container)).await
    }

    async fn place_new_container(
        &self,
        container: Container,
        slot_id: SlotId,
    ) -> Result<(Container, Slot)> {
        self.commit(self.inner.place_new_container(container, slot_id)).await
    }

    async fn update_container(&self, container: Container) -> Result<Container> {
        self.commit(self.inner.update_container(container)).await
    }

    async fn delete_container(&self, container_id: ContainerId) -> Result<()> {
        self.commit(self.inner.delete_container(container_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{BlockDraft, ContainerDraft, HoldingArea};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_missing_file_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileYardStore::open(temp_dir.path().join("nested/yard.json"))
            .await
            .unwrap();

        assert!(store.list_blocks().await.unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_mutations_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data/yard.json");

        let block = BlockDraft::new("R7", 1, 2).with_tiers(2).build(10, 4, 10_000).unwrap();
        let slots: Vec<Slot> = block.coords().map(|c| Slot::empty(block.id, c)).collect();
        let container = ContainerDraft::new("TGHU7654321", "ACME").into_container(HoldingArea::Unplaced);
        {
            let store = JsonFileYardStore::open(&path).await.unwrap();
            store.insert_block(block.clone()).await.unwrap();
            store.insert_slots(slots.clone()).await.unwrap();
            store.insert_container(container.clone()).await.unwrap();
            store
                .update_slot(slots[3].id, SlotUpdate::occupy(container.id))
                .await
                .unwrap();
        }

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = JsonFileYardStore::open(&path).await.unwrap();
        assert_eq!(reopened.get_block(block.id).await.unwrap(), Some(block.clone()));
        assert_eq!(reopened.get_slots_for_block(block.id).await.unwrap().len(), 4);
        assert_eq!(
            reopened.count_slots(block.id, SlotFilter::Occupied).await.unwrap(),
            1
        );
        let slot = reopened.find_slot_by_container(container.id).await.unwrap().unwrap();
        assert_eq!(slot.coord, slots[3].coord);
    }

    #[tokio::test]
    async fn test_corrupted_snapshot_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("yard.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let err = JsonFileYardStore::open(&path).await.err().unwrap();
        assert!(matches!(err, crate::utils::error::YardError::SerializationError(_)));
    }

    #[tokio::test]
    async fn test_failed_write_reverts_in_memory_change() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("yard.json");
        let store = JsonFileYardStore::open(&path).await.unwrap();

        let block = BlockDraft::new("W1", 1, 1).with_tiers(1).build(10, 4, 100).unwrap();
        let slots: Vec<Slot> = block.coords().map(|c| Slot::empty(block.id, c)).collect();
        store.insert_block(block.clone()).await.unwrap();
        store.insert_slots(slots.clone()).await.unwrap();

        // 暫存檔路徑被目錄佔住，寫檔必定失敗
        let tmp_path = path.with_extension("json.tmp");
        std::fs::create_dir(&tmp_path).unwrap();

        let container = ContainerDraft::new("WRTU0000001", "ACME").into_container(HoldingArea::Yard);
        let err = store
            .place_new_container(container.clone(), slots[0].id)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::utils::error::YardError::IoError(_)));
        assert!(store.find_container_by_number("WRTU0000001").await.unwrap().is_none());
        assert_eq!(store.count_slots(block.id, SlotFilter::Occupied).await.unwrap(), 0);

        std::fs::remove_dir(&tmp_path).unwrap();
        store.place_new_container(container, slots[0].id).await.unwrap();
        let reopened = JsonFileYardStore::open(&path).await.unwrap();
        assert_eq!(reopened.count_slots(block.id, SlotFilter::Occupied).await.unwrap(), 1);
    }
}
