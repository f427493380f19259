use crate::domain::model::{Slot, SlotId, SlotState};
use crate::utils::error::{Result, YardError};

/// 單一堆疊柱的掃描結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnScan<'a> {
    pub target: &'a Slot,
    /// 壓在目標上方的已佔用格位，最上層在前（即實際移櫃順序）
    pub blocking: Vec<&'a Slot>,
}

impl ColumnScan<'_> {
    pub fn directly_accessible(&self) -> bool {
        self.blocking.is_empty()
    }
}

/// 重力堆疊：同一 (bay, row) 中層數較高且有櫃的格位都會擋住目標。
/// 只看同一柱，不考慮相鄰 bay 的側向淨空。
pub fn scan_column(slots: &[Slot], target: SlotId) -> Result<ColumnScan<'_>> {
    let target_slot = slots
        .iter()
        .find(|slot| slot.id == target)
        .ok_or_else(|| YardError::not_found("Slot", target))?;

    if target_slot.state() == SlotState::Empty {
        return Err(YardError::NotFoundError {
            entity: "Container",
            id: format!("slot {} is empty", target_slot.coord),
        });
    }

    let mut blocking: Vec<&Slot> = slots
        .iter()
        .filter(|slot| {
            slot.block_id == target_slot.block_id
                && slot.coord.same_column(&target_slot.coord)
                && slot.coord.tier > target_slot.coord.tier
                && matches!(slot.state(), SlotState::Occupied(_))
        })
        .collect();
    blocking.sort_by(|a, b| b.coord.tier.cmp(&a.coord.tier));

    Ok(ColumnScan {
        target: target_slot,
        blocking,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{BlockDraft, ContainerId, SlotCoord};

    fn column_with(occupied_tiers: &[u32], tiers: u32) -> Vec<Slot> {
        let block = BlockDraft::new("C", 2, 1).with_tiers(tiers).build(10, 4, 10_000).unwrap();
        block
            .coords()
            .map(|coord| {
                let mut slot = Slot::empty(block.id, coord);
                if coord.bay == 1 && occupied_tiers.contains(&coord.tier) {
                    slot.container_id = Some(ContainerId::new());
                }
                slot
            })
            .collect()
    }

    fn slot_at(slots: &[Slot], bay: u32, tier: u32) -> &Slot {
        slots
            .iter()
            .find(|s| s.coord == SlotCoord::new(bay, 1, tier))
            .unwrap()
    }

    #[test]
    fn test_top_of_stack_is_directly_accessible() {
        let slots = column_with(&[1, 2], 3);
        let scan = scan_column(&slots, slot_at(&slots, 1, 2).id).unwrap();

        assert!(scan.directly_accessible());
        assert!(scan.blocking.is_empty());
    }

    #[test]
    fn test_bottom_container_is_blocked_by_occupied_tiers_above() {
        let slots = column_with(&[1, 2], 3);
        let scan = scan_column(&slots, slot_at(&slots, 1, 1).id).unwrap();

        assert!(!scan.directly_accessible());
        assert_eq!(scan.blocking.len(), 1);
        assert_eq!(scan.blocking[0].coord.tier, 2);
    }

    #[test]
    fn test_blocking_order_is_topmost_first_and_skips_gaps() {
        let slots = column_with(&[1, 2, 4, 5], 5);
        let scan = scan_column(&slots, slot_at(&slots, 1, 1).id).unwrap();

        let tiers: Vec<u32> = scan.blocking.iter().map(|s| s.coord.tier).collect();
        assert_eq!(tiers, vec![5, 4, 2]);
    }

    #[test]
    fn test_other_columns_do_not_block() {
        let mut slots = column_with(&[1], 3);
        for slot in slots.iter_mut().filter(|s| s.coord.bay == 2) {
            slot.container_id = Some(ContainerId::new());
        }

        let scan = scan_column(&slots, slot_at(&slots, 1, 1).id).unwrap();
        assert!(scan.directly_accessible());
    }

    #[test]
    fn test_empty_or_unknown_target_is_not_found() {
        let slots = column_with(&[1], 3);

        let empty = scan_column(&slots, slot_at(&slots, 1, 3).id).unwrap_err();
        assert!(matches!(empty, YardError::NotFoundError { entity: "Container", .. }));

        let unknown = scan_column(&slots, SlotId::new()).unwrap_err();
        assert!(matches!(unknown, YardError::NotFoundError { entity: "Slot", .. }));
    }
}
