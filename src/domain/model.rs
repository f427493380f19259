use crate::utils::error::{Result, YardError};
use crate::utils::validation::Violations;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }
    };
}

entity_id!(BlockId);
entity_id!(SlotId);
entity_id!(ContainerId);

/// 區塊分類，僅供顯示，不限制擺放
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Regular,
    Reefer,
    Hazardous,
    Empty,
}

impl BlockType {
    pub const NAMES: [&'static str; 4] = ["regular", "reefer", "hazardous", "empty"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Reefer => "reefer",
            Self::Hazardous => "hazardous",
            Self::Empty => "empty",
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockType {
    type Err = YardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regular" => Ok(Self::Regular),
            "reefer" => Ok(Self::Reefer),
            "hazardous" => Ok(Self::Hazardous),
            "empty" => Ok(Self::Empty),
            other => Err(YardError::validation(vec![format!(
                "block type '{}' is not recognized (expected one of: {})",
                other,
                Self::NAMES.join(", ")
            )])),
        }
    }
}

/// 格位座標。欄位順序即掃描順序：bay、row、tier 依序遞增
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotCoord {
    pub bay: u32,
    pub row: u32,
    pub tier: u32,
}

impl SlotCoord {
    pub fn new(bay: u32, row: u32, tier: u32) -> Self {
        Self { bay, row, tier }
    }

    /// 同一個 (bay, row) 堆疊柱
    pub fn same_column(&self, other: &SlotCoord) -> bool {
        self.bay == other.bay && self.row == other.row
    }
}

impl fmt::Display for SlotCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}-R{}-T{}", self.bay, self.row, self.tier)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    pub bays: u32,
    pub rows: u32,
    pub tiers: u32,
    pub block_type: BlockType,
    pub capacity: u64,
    pub created_at: DateTime<Utc>,
}

impl Block {
    pub fn contains(&self, coord: &SlotCoord) -> bool {
        (1..=self.bays).contains(&coord.bay)
            && (1..=self.rows).contains(&coord.row)
            && (1..=self.tiers).contains(&coord.tier)
    }

    /// 依掃描順序列出所有座標
    pub fn coords(&self) -> impl Iterator<Item = SlotCoord> + '_ {
        (1..=self.bays).flat_map(move |bay| {
            (1..=self.rows)
                .flat_map(move |row| (1..=self.tiers).map(move |tier| SlotCoord::new(bay, row, tier)))
        })
    }
}

/// 建立區塊的輸入；`block_type` 保留原始字串，以便與其他欄位一起回報錯誤
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockDraft {
    pub name: String,
    pub bays: u32,
    pub rows: u32,
    pub tiers: Option<u32>,
    pub block_type: String,
}

impl BlockDraft {
    pub fn new(name: impl Into<String>, bays: u32, rows: u32) -> Self {
        Self {
            name: name.into(),
            bays,
            rows,
            tiers: None,
            block_type: BlockType::Regular.as_str().to_string(),
        }
    }

    pub fn with_tiers(mut self, tiers: u32) -> Self {
        self.tiers = Some(tiers);
        self
    }

    pub fn with_type(mut self, block_type: impl Into<String>) -> Self {
        self.block_type = block_type.into();
        self
    }

    /// `max_capacity` 限制單一區塊的格位總數
    pub fn build(
        &self,
        max_name_len: usize,
        default_tiers: u32,
        max_capacity: u64,
    ) -> Result<Block> {
        let tiers = self.tiers.unwrap_or(default_tiers);

        let mut violations = Violations::new();
        violations.non_empty_string("name", &self.name);
        violations.max_chars("name", &self.name, max_name_len);
        violations.at_least("bays", self.bays.into(), 1);
        violations.at_least("rows", self.rows.into(), 1);
        violations.at_least("tiers", tiers.into(), 1);
        violations.one_of("type", &self.block_type, &BlockType::NAMES);

        let capacity = u64::from(self.bays)
            .checked_mul(u64::from(self.rows))
            .and_then(|n| n.checked_mul(u64::from(tiers)));
        match capacity {
            None => violations.push("bays x rows x tiers overflows the slot count"),
            Some(n) if n > max_capacity => violations.push(format!(
                "block of {} slots exceeds the limit of {} slots per block",
                n, max_capacity
            )),
            Some(_) => {}
        }
        violations.into_result()?;

        Ok(Block {
            id: BlockId::new(),
            name: self.name.trim().to_string(),
            bays: self.bays,
            rows: self.rows,
            tiers,
            block_type: self.block_type.parse()?,
            capacity: capacity.unwrap_or_default(),
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Occupied(ContainerId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub block_id: BlockId,
    #[serde(flatten)]
    pub coord: SlotCoord,
    pub container_id: Option<ContainerId>,
}

impl Slot {
    pub fn empty(block_id: BlockId, coord: SlotCoord) -> Self {
        Self {
            id: SlotId::new(),
            block_id,
            coord,
            container_id: None,
        }
    }

    pub fn state(&self) -> SlotState {
        match self.container_id {
            Some(id) => SlotState::Occupied(id),
            None => SlotState::Empty,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.container_id.is_none()
    }
}

/// 貨櫃目前所在的作業區
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HoldingArea {
    Unplaced,
    AwaitingArrival,
    Yard,
    Verification,
    Stripping,
    Exited,
}

impl HoldingArea {
    pub const NAMES: [&'static str; 6] = [
        "unplaced",
        "awaiting-arrival",
        "yard",
        "verification",
        "stripping",
        "exited",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unplaced => "unplaced",
            Self::AwaitingArrival => "awaiting-arrival",
            Self::Yard => "yard",
            Self::Verification => "verification",
            Self::Stripping => "stripping",
            Self::Exited => "exited",
        }
    }
}

impl fmt::Display for HoldingArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HoldingArea {
    type Err = YardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "unplaced" => Ok(Self::Unplaced),
            "awaiting-arrival" => Ok(Self::AwaitingArrival),
            "yard" | "in-yard" => Ok(Self::Yard),
            "verification" => Ok(Self::Verification),
            "stripping" => Ok(Self::Stripping),
            "exited" => Ok(Self::Exited),
            other => Err(YardError::validation(vec![format!(
                "holding area '{}' is not recognized (expected one of: {})",
                other,
                Self::NAMES.join(", ")
            )])),
        }
    }
}

/// 貨櫃狀況，與所在位置分開記錄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerCondition {
    #[default]
    Empty,
    Loaded,
    Held,
    Damaged,
}

impl ContainerCondition {
    pub const NAMES: [&'static str; 4] = ["empty", "loaded", "held", "damaged"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Loaded => "loaded",
            Self::Held => "held",
            Self::Damaged => "damaged",
        }
    }
}

impl fmt::Display for ContainerCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerCondition {
    type Err = YardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "empty" => Ok(Self::Empty),
            "loaded" => Ok(Self::Loaded),
            "held" => Ok(Self::Held),
            "damaged" => Ok(Self::Damaged),
            other => Err(YardError::validation(vec![format!(
                "condition '{}' is not recognized (expected one of: {})",
                other,
                Self::NAMES.join(", ")
            )])),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub container_number: String,
    pub iso_type: Option<String>,
    pub size: Option<String>,
    pub consignee_name: String,
    pub condition: ContainerCondition,
    pub holding_area: HoldingArea,
    pub seal_number: Option<String>,
    pub gross_weight_kg: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerDraft {
    pub container_number: String,
    pub iso_type: Option<String>,
    pub size: Option<String>,
    pub consignee_name: String,
    pub condition: ContainerCondition,
    pub seal_number: Option<String>,
    pub gross_weight_kg: Option<f64>,
}

impl ContainerDraft {
    pub fn new(container_number: impl Into<String>, consignee_name: impl Into<String>) -> Self {
        Self {
            container_number: container_number.into(),
            consignee_name: consignee_name.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut violations = Violations::new();
        violations.non_empty_string("container_number", &self.container_number);
        violations.non_empty_string("consignee_name", &self.consignee_name);
        if let Some(weight) = self.gross_weight_kg {
            if !weight.is_finite() || weight < 0.0 {
                violations.push(format!("gross_weight_kg must be a non-negative number (got {})", weight));
            }
        }
        violations.into_result()
    }

    pub fn into_container(self, holding_area: HoldingArea) -> Container {
        Container {
            id: ContainerId::new(),
            container_number: normalize_container_number(&self.container_number),
            iso_type: non_blank(self.iso_type),
            size: non_blank(self.size),
            consignee_name: self.consignee_name.trim().to_string(),
            condition: self.condition,
            holding_area,
            seal_number: non_blank(self.seal_number),
            gross_weight_kg: self.gross_weight_kg,
            created_at: Utc::now(),
        }
    }
}

/// 櫃號一律去空白並轉大寫，查詢時也使用相同規則
pub fn normalize_container_number(number: &str) -> String {
    number.trim().to_ascii_uppercase()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utilization {
    pub total_slots: usize,
    pub occupied_slots: usize,
    pub utilization_percentage: u32,
}

impl Utilization {
    pub fn from_counts(occupied_slots: usize, total_slots: usize) -> Self {
        let utilization_percentage = if total_slots == 0 {
            0
        } else {
            (occupied_slots as f64 / total_slots as f64 * 100.0).round() as u32
        };
        Self {
            total_slots,
            occupied_slots,
            utilization_percentage,
        }
    }

    /// 未四捨五入的比例 (0.0 ~ 1.0)
    pub fn ratio(&self) -> f64 {
        if self.total_slots == 0 {
            0.0
        } else {
            self.occupied_slots as f64 / self.total_slots as f64
        }
    }

    pub fn free_slots(&self) -> usize {
        self.total_slots.saturating_sub(self.occupied_slots)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockingContainer {
    pub slot: Slot,
    pub container: Container,
}

/// 取出目標貨櫃前必須先移走的貨櫃，`blocking_containers` 由最上層開始
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPath {
    pub target: Slot,
    pub directly_accessible: bool,
    pub blocking_containers: Vec<BlockingContainer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerLocation {
    pub container: Container,
    pub block: Option<Block>,
    pub slot: Option<Slot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockUtilization {
    pub block: Block,
    pub utilization: Utilization,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YardSummary {
    pub blocks: Vec<BlockUtilization>,
    pub total: Utilization,
}

/// 儲存層發出的變更通知，訂閱者收到後自行重新讀取
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum YardEvent {
    BlockCreated { block_id: BlockId },
    SlotsCreated { block_id: BlockId, count: usize },
    BlockDeleted { block_id: BlockId },
    SlotChanged {
        block_id: BlockId,
        slot_id: SlotId,
        container_id: Option<ContainerId>,
    },
    ContainerCreated { container_id: ContainerId },
    ContainerUpdated { container_id: ContainerId },
    ContainerDeleted { container_id: ContainerId },
}
