use crate::domain::model::{Block, Container, Slot, SlotCoord};
use std::fmt::Write;

/// 區塊的平面圖：每一層一張 bays × rows 的格子
#[derive(Debug, Clone)]
pub struct BlockLayout {
    block: Block,
    cells: Vec<Option<String>>,
}

impl BlockLayout {
    pub fn build(block: &Block, occupancy: &[(Slot, Option<Container>)]) -> Self {
        let mut cells = vec![None; block.capacity as usize];
        for (slot, container) in occupancy {
            if let (Some(idx), Some(container)) = (cell_index(block, &slot.coord), container) {
                cells[idx] = Some(container.container_number.clone());
            }
        }
        Self {
            block: block.clone(),
            cells,
        }
    }

    pub fn occupant(&self, coord: SlotCoord) -> Option<&str> {
        cell_index(&self.block, &coord).and_then(|idx| self.cells[idx].as_deref())
    }

    /// 每個 (bay, row) 柱的已佔用層數，索引為 [row - 1][bay - 1]
    pub fn stack_heights(&self) -> Vec<Vec<u32>> {
        (1..=self.block.rows)
            .map(|row| {
                (1..=self.block.bays)
                    .map(|bay| {
                        (1..=self.block.tiers)
                            .filter(|&tier| self.occupant(SlotCoord::new(bay, row, tier)).is_some())
                            .count() as u32
                    })
                    .collect()
            })
            .collect()
    }

    /// 由最上層往下輸出，`#` 有櫃、`.` 空位
    pub fn render(&self) -> String {
        let mut out = String::new();
        for tier in (1..=self.block.tiers).rev() {
            let _ = writeln!(out, "Tier {}", tier);
            let _ = write!(out, "     ");
            for bay in 1..=self.block.bays {
                let _ = write!(out, "{:>4}", format!("B{}", bay));
            }
            out.push('\n');
            for row in 1..=self.block.rows {
                let _ = write!(out, "{:<5}", format!("R{}", row));
                for bay in 1..=self.block.bays {
                    let mark = if self.occupant(SlotCoord::new(bay, row, tier)).is_some() {
                        '#'
                    } else {
                        '.'
                    };
                    let _ = write!(out, "{:>4}", mark);
                }
                out.push('\n');
            }
        }
        out
    }
}

fn cell_index(block: &Block, coord: &SlotCoord) -> Option<usize> {
    if !block.contains(coord) {
        return None;
    }
    let (bays, rows) = (block.bays as usize, block.rows as usize);
    Some(
        (coord.tier as usize - 1) * bays * rows
            + (coord.row as usize - 1) * bays
            + (coord.bay as usize - 1),
    )
}
