use crate::core::yard::YardService;
use crate::domain::model::{BlockId, ContainerCondition, ContainerDraft};
use crate::domain::ports::YardStore;
use crate::utils::error::{Result, YardError};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// 貨櫃清單的一列。只有櫃號與收貨人為必填
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestRow {
    #[serde(default)]
    pub container_number: String,
    pub iso_type: Option<String>,
    pub size: Option<String>,
    #[serde(default)]
    pub consignee_name: String,
    pub condition: Option<String>,
    pub seal_number: Option<String>,
    pub gross_weight_kg: Option<f64>,
}

impl ManifestRow {
    fn into_draft(self) -> Result<ContainerDraft> {
        let condition = match self.condition.as_deref().map(str::trim) {
            None | Some("") => ContainerCondition::default(),
            Some(value) => value.parse::<ContainerCondition>()?,
        };
        Ok(ContainerDraft {
            container_number: self.container_number,
            iso_type: self.iso_type,
            size: self.size,
            consignee_name: self.consignee_name,
            condition,
            seal_number: self.seal_number,
            gross_weight_kg: self.gross_weight_kg,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportFailure {
    /// CSV 行號（含標題列，從 1 起算）
    pub line: usize,
    pub container_number: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub placed: Vec<PlacedRow>,
    pub failures: Vec<ImportFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlacedRow {
    pub line: usize,
    pub container_number: String,
    pub slot: String,
}

impl ImportReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// 逐列放櫃；單列失敗不影響其他列，區塊滿了之後其餘列直接記為失敗
pub async fn import_manifest<S: YardStore, R: Read>(
    service: &YardService<S>,
    block_id: BlockId,
    reader: R,
) -> Result<ImportReport> {
    let block = service.get_block(block_id).await?;
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut report = ImportReport::default();
    let mut full = false;

    for (idx, row) in csv_reader.deserialize::<ManifestRow>().enumerate() {
        let line = idx + 2;
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                report.failures.push(ImportFailure {
                    line,
                    container_number: None,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        let number = Some(row.container_number.clone()).filter(|n| !n.is_empty());

        if full {
            report.failures.push(ImportFailure {
                line,
                container_number: number,
                reason: format!("block '{}' is full", block.name),
            });
            continue;
        }

        let outcome = match row.into_draft() {
            Ok(draft) => service.place_container(block_id, draft).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok((container, slot)) => report.placed.push(PlacedRow {
                line,
                container_number: container.container_number,
                slot: slot.coord.to_string(),
            }),
            Err(e @ YardError::NoCapacityError { .. }) => {
                full = true;
                report.failures.push(ImportFailure {
                    line,
                    container_number: number,
                    reason: e.to_string(),
                });
            }
            Err(e) if e.is_recoverable() => report.failures.push(ImportFailure {
                line,
                container_number: number,
                reason: e.to_string(),
            }),
            Err(e) => {
                tracing::error!("Manifest import aborted at line {}: {}", line, e);
                return Err(e);
            }
        }
    }

    tracing::info!(
        "Manifest import into '{}': {} placed, {} failed",
        block.name,
        report.placed.len(),
        report.failures.len()
    );
    Ok(report)
}

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    bay: u32,
    row: u32,
    tier: u32,
    container_number: &'a str,
    iso_type: &'a str,
    consignee_name: &'a str,
    condition: &'a str,
}

/// 匯出區塊的每個格位（掃描順序），回傳寫出的列數
pub async fn export_block<S: YardStore, W: Write>(
    service: &YardService<S>,
    block_id: BlockId,
    writer: W,
) -> Result<usize> {
    let (_, occupancy) = service.block_occupancy(block_id).await?;
    let mut csv_writer = csv::Writer::from_writer(writer);

    for (slot, container) in &occupancy {
        csv_writer.serialize(ExportRow {
            bay: slot.coord.bay,
            row: slot.coord.row,
            tier: slot.coord.tier,
            container_number: container.as_ref().map_or("", |c| c.container_number.as_str()),
            iso_type: container
                .as_ref()
                .and_then(|c| c.iso_type.as_deref())
                .unwrap_or(""),
            consignee_name: container.as_ref().map_or("", |c| c.consignee_name.as_str()),
            condition: container.as_ref().map_or("", |c| c.condition.as_str()),
        })?;
    }
    csv_writer.flush()?;

    Ok(occupancy.len())
}
