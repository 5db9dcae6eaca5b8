//! JSON output for a finished run.
//!
//! The document is the serialized [`PipelineRun`] with its human readable
//! `status` alongside, so a caller can tell "nothing found" apart from a
//! partial run without recomputing it.

use crate::models::PipelineRun;
use crate::utils::slugify_title;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::error::Error;
use tokio::fs;
use tracing::{error, info, instrument};

#[derive(Serialize)]
struct RunDocument<'a> {
    #[serde(flatten)]
    run: &'a PipelineRun,
    status: String,
}

/// Pretty-printed JSON document for `run`.
pub fn run_to_json(run: &PipelineRun) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&RunDocument {
        run,
        status: run.status(),
    })
}

/// File stem label: the topic title, else `story` for deep dives and direct
/// links.
fn run_label(run: &PipelineRun) -> String {
    let label = run
        .topic
        .as_ref()
        .map(|t| slugify_title(&t.title))
        .unwrap_or_default();
    if label.is_empty() { "story".to_string() } else { label }
}

/// `{dir}/{YYYY-MM-DD}/{HHMMSS}_{label}.json`
pub fn run_output_path(json_output_dir: &str, run: &PipelineRun, now: DateTime<Local>) -> (String, String) {
    let dir = format!("{}/{}", json_output_dir.trim_end_matches('/'), now.format("%Y-%m-%d"));
    let file = format!("{}/{}_{}.json", dir, now.format("%H%M%S"), run_label(run));
    (dir, file)
}

/// Write `run` under `json_output_dir` and return the file path.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir))]
pub async fn write_run(run: &PipelineRun, json_output_dir: &str) -> Result<String, Box<dyn Error>> {
    let json = run_to_json(run)?;
    let (dir, path) = run_output_path(json_output_dir, run, Local::now());

    info!(%dir, "Ensuring JSON directory exists");
    if let Err(e) = fs::create_dir_all(&dir).await {
        error!(%dir, error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    fs::write(&path, json).await?;
    info!(%path, articles = run.articles.len(), "Wrote run JSON");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleRecord, TopicRef};
    use chrono::TimeZone;

    fn run() -> PipelineRun {
        PipelineRun {
            input_url: None,
            topic: Some(TopicRef {
                title: "Tecnologia".to_string(),
                url: "https://news.google.com/topics/TECH".to_string(),
            }),
            attempted: 2,
            dropped: 1,
            cancelled: false,
            articles: vec![ArticleRecord {
                title: "Nova lei de IA".to_string(),
                url: "https://www.folha.uol.com.br/tec/ia".to_string(),
                source_domain: "folha.uol.com.br".to_string(),
                content: vec!["Primeiro parágrafo suficientemente longo para passar.".to_string()],
            }],
            events: Vec::new(),
        }
    }

    #[test]
    fn test_document_carries_status_and_camel_case_fields() {
        let value: serde_json::Value = serde_json::from_str(&run_to_json(&run()).unwrap()).unwrap();
        assert_eq!(value["status"], "extracted 1 of 2 articles");
        assert_eq!(value["inputUrl"], serde_json::Value::Null);
        assert_eq!(value["topic"]["title"], "Tecnologia");
        assert_eq!(value["articles"][0]["sourceDomain"], "folha.uol.com.br");
    }

    #[test]
    fn test_output_path_is_dated() {
        let now = Local.with_ymd_and_hms(2025, 5, 6, 8, 15, 2).unwrap();
        let (dir, file) = run_output_path("/tmp/out/", &run(), now);
        assert_eq!(dir, "/tmp/out/2025-05-06");
        assert_eq!(file, "/tmp/out/2025-05-06/081502_tecnologia.json");

        let (_, file) = run_output_path("/tmp/out", &PipelineRun::default(), now);
        assert_eq!(file, "/tmp/out/2025-05-06/081502_story.json");
    }

    #[tokio::test]
    async fn test_write_run_creates_dated_file() {
        let base = std::env::temp_dir().join(format!("news_intel_json_{}", std::process::id()));
        let base = base.to_string_lossy().to_string();
        let path = write_run(&run(), &base).await.unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"status\""));
        let _ = std::fs::remove_dir_all(&base);
    }
}
