//! Run envelopes and on-disk report layout.
//!
//! ```text
//! <out>/run_<YYYYmmdd_HHMMSS>_<run id prefix>/
//!   report.json   envelope (run metadata + report)
//!   report.md     action report
//!   images/       captures and diff masks
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vizdiff_core::{CaptureTarget, Report, ViewportProfile};

pub const REPORT_JSON: &str = "report.json";
pub const REPORT_MD: &str = "report.md";
pub const IMAGES_DIR: &str = "images";

/// Persisted record of one comparison run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEnvelope {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub engine_version: String,
    pub baseline: CaptureTarget,
    pub candidate: CaptureTarget,
    pub viewport: ViewportProfile,
    pub duration_ms: u64,
    pub report: Report,
}

/// Directory for run `run_id` started at `at`. The id prefix keeps runs
/// started within the same second apart.
pub fn run_dir(out: &Path, at: DateTime<Utc>, run_id: &str) -> PathBuf {
    let suffix: String = run_id.chars().filter(|c| *c != '-').take(8).collect();
    out.join(format!("run_{}_{suffix}", at.format("%Y%m%d_%H%M%S")))
}

/// Write `report.json` and `report.md` into `dir`.
pub fn write_envelope(dir: &Path, envelope: &RunEnvelope) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;

    let json_path = dir.join(REPORT_JSON);
    let content = serde_json::to_string_pretty(envelope).context("serialize run envelope")?;
    std::fs::write(&json_path, content).with_context(|| format!("write {:?}", json_path))?;

    let md_path = dir.join(REPORT_MD);
    let md = render_envelope_md(envelope);
    std::fs::write(&md_path, md).with_context(|| format!("write {:?}", md_path))?;
    Ok(())
}

/// Load a report from either a run envelope or a bare report document.
pub fn read_report(path: &Path) -> Result<Report> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("read report {:?}", path))?;
    if let Ok(envelope) = serde_json::from_str::<RunEnvelope>(&content) {
        return Ok(envelope.report);
    }
    serde_json::from_str(&content).with_context(|| format!("invalid report JSON in {:?}", path))
}

fn render_envelope_md(envelope: &RunEnvelope) -> String {
    let header = format!(
        "_run `{}` at {} ({} ms)_\n\n- baseline: {} ({})\n- candidate: {} ({})\n- viewport: {}x{} @{}x\n\n",
        envelope.run_id,
        envelope.generated_at.to_rfc3339(),
        envelope.duration_ms,
        envelope.baseline.id,
        envelope.baseline.base_url,
        envelope.candidate.id,
        envelope.candidate.base_url,
        envelope.viewport.width,
        envelope.viewport.height,
        envelope.viewport.pixel_density,
    );
    format!("{header}{}", envelope.report.render_markdown())
}
