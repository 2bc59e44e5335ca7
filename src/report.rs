use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};

use crate::anchor;
use crate::assets::find_student_assets;
use crate::config::Config;
use crate::docx::Docx;
use crate::error::{Error, ErrorScope};
use crate::floating;
use crate::geometry;
use crate::grades::{self, StudentRecord};
use crate::image_prep;
use crate::model::PictureSlotSpec;

#[derive(Debug)]
pub enum SlotStatus {
    Placed { object_id: u32 },
    Skipped(Error),
}

#[derive(Debug)]
pub struct SlotOutcome {
    pub stem: String,
    pub status: SlotStatus,
}

#[derive(Debug)]
pub struct ReportSummary {
    pub student: String,
    pub output: PathBuf,
    pub slots: Vec<SlotOutcome>,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub reports: Vec<ReportSummary>,
    pub failures: Vec<(String, Error)>,
}

/// Locate, prepare, resolve and inject one slot.
pub fn place_slot(
    doc: &mut Docx,
    slot: &PictureSlotSpec,
    assets: &BTreeMap<String, PathBuf>,
) -> Result<u32, Error> {
    let path = assets
        .get(&slot.stem)
        .ok_or_else(|| Error::AssetMissing(slot.stem.clone()))?;
    let anchor = anchor::locate(doc, slot)?;
    let image = image_prep::prepare(path)?;
    let placement = geometry::resolve(slot, image.width, image.height)?;
    floating::inject(doc, anchor, &placement, image)
}

/// Places every slot in declared order. A failing slot is recorded and skipped;
/// only configuration errors stop the loop.
pub fn place_slots(
    doc: &mut Docx,
    slots: &[PictureSlotSpec],
    assets: &BTreeMap<String, PathBuf>,
) -> Result<Vec<SlotOutcome>, Error> {
    let mut outcomes = Vec::with_capacity(slots.len());
    for slot in slots {
        let status = match place_slot(doc, slot, assets) {
            Ok(object_id) => SlotStatus::Placed { object_id },
            Err(e) if e.scope() == ErrorScope::Run => return Err(e),
            Err(e) => {
                match &e {
                    Error::AssetMissing(_) | Error::AnchorNotFound(_) => {
                        warn!("Slot {:?} skipped: {e}", slot.stem)
                    }
                    _ => error!("Slot {:?} failed: {e}", slot.stem),
                }
                SlotStatus::Skipped(e)
            }
        };
        outcomes.push(SlotOutcome { stem: slot.stem.clone(), status });
    }
    Ok(outcomes)
}

/// `{template_stem}_{student}.{ext}` inside `output_dir`.
pub fn output_path(output_dir: &Path, template: &Path, student: &str) -> PathBuf {
    let stem = template
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("report");
    let ext = template
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("docx");
    let student: String = student
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') || c.is_control() { '_' } else { c })
        .collect();
    output_dir.join(format!("{stem}_{student}.{ext}"))
}

pub fn generate_report(config: &Config, record: &StudentRecord) -> Result<ReportSummary, Error> {
    let mut doc = Docx::open(&config.template)?;

    let named = format!("{}{}", config.name_marker, record.name);
    if doc.find_and_replace(&config.name_marker, &named)? == 0 {
        warn!("Name marker {:?} not found in template", config.name_marker);
    }
    debug!("{}: {} grade field(s)", record.name, record.grades.len());

    let assets = find_student_assets(&config.pictures_dir, &record.name);
    if assets.is_empty() {
        warn!("No pictures found for {}", record.name);
    }
    let slots = place_slots(&mut doc, &config.pictures, &assets)?;

    let output = output_path(&config.output_dir, &config.template, &record.name);
    doc.save(&output)?;
    Ok(ReportSummary { student: record.name.clone(), output, slots })
}

/// Generates one report per student (at most `limit`). A failed student is
/// logged and recorded; the batch only stops on run-level errors.
pub fn run_batch(config: &Config, limit: Option<usize>) -> Result<BatchSummary, Error> {
    info!("Table path:    {}", config.table.display());
    info!("Template path: {}", config.template.display());
    info!("Output dir:    {}", config.output_dir.display());
    std::fs::create_dir_all(&config.output_dir)?;

    info!("Workbook info:");
    grades::workbook_info(&config.table)?;
    let table = grades::read_table(&config.table, config.sheet.as_deref())?;
    let records = table.records(&config.student_column, &config.grades)?;
    info!("Loaded {} students, {} columns", records.len(), table.headers.len());

    let mut summary = BatchSummary::default();
    for record in records.iter().take(limit.unwrap_or(usize::MAX)) {
        match generate_report(config, record) {
            Ok(report) => {
                info!("Saved: {}", report.output.display());
                summary.reports.push(report);
            }
            Err(e) if e.scope() == ErrorScope::Run => return Err(e),
            Err(e) => {
                error!("Report for {} failed: {e}", record.name);
                summary.failures.push((record.name.clone(), e));
            }
        }
    }
    info!(
        "Done: {} report(s) saved to {}, {} failed",
        summary.reports.len(),
        config.output_dir.display(),
        summary.failures.len()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_combines_template_and_student() {
        let path = output_path(
            Path::new("/out"),
            Path::new("/in/informe 4 anys.docx"),
            " Joan/Pere ",
        );
        assert_eq!(path, PathBuf::from("/out/informe 4 anys_Joan_Pere.docx"));
    }
}
