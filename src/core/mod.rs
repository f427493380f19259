pub mod access_path;
pub mod layout;
pub mod manifest;
pub mod yard;

pub use crate::domain::model::{
    AccessPath, Block, BlockDraft, BlockId, Container, ContainerDraft, ContainerId, Slot,
    SlotCoord, SlotId, Utilization,
};
pub use crate::domain::ports::{ChangeFeed, SlotFilter, SlotUpdate, YardStore};
pub use crate::utils::error::Result;
