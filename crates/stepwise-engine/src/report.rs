//! `report.json` and a self-contained `report.html` for one run.

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use stepwise_common::{AssertionResult, RunRecord, StepResult};

pub const REPORT_JSON: &str = "report.json";
pub const REPORT_HTML: &str = "report.html";
pub const TRACE_FILE: &str = "trace.json";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Write both report files into `dir`. Returns the HTML path.
pub async fn write_report(dir: &Path, record: &RunRecord) -> Result<PathBuf, ReportError> {
    let json = serde_json::to_string_pretty(record)?;
    write(&dir.join(REPORT_JSON), json).await?;

    let html_path = dir.join(REPORT_HTML);
    write(&html_path, render_html(record)).await?;
    Ok(html_path)
}

pub async fn read_record(dir: &Path) -> Result<RunRecord, ReportError> {
    let path = dir.join(REPORT_JSON);
    let raw = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| ReportError::Io { path, source })?;
    Ok(serde_json::from_str(&raw)?)
}

async fn write(path: &Path, contents: String) -> Result<(), ReportError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })
}

const STYLE: &str = r#"
:root{--bg:#f6f7fb;--card:#fff;--text:#0f1222;--muted:#6b7280;--border:#e5e7eb;--pass:#10b981;--fail:#ef4444;--chip:#eef2ff}
*{box-sizing:border-box}
body{margin:0;font-family:ui-sans-serif,system-ui,-apple-system,Segoe UI,Roboto,Arial;background:var(--bg);color:var(--text)}
.container{max-width:1080px;margin:0 auto;padding:24px}
.header{background:linear-gradient(135deg,#6366f1 0%,#22c55e 100%);color:#fff;border-radius:16px;padding:20px 24px}
.header h1{margin:0 0 6px 0;font-size:28px}
.meta{display:flex;flex-wrap:wrap;gap:12px;color:#eef2ff}
.meta a{color:#eef2ff}
.summary{display:flex;gap:10px;margin-top:12px;flex-wrap:wrap}
.chip{padding:6px 10px;background:rgba(255,255,255,.15);border-radius:999px;font-weight:600}
.toolbar a{color:#fff;text-decoration:none;border:1px solid rgba(255,255,255,.35);padding:6px 10px;border-radius:8px}
.section{margin-top:22px}
.grid{display:grid;gap:12px}
.card{background:var(--card);border:1px solid var(--border);border-radius:14px;overflow:hidden}
.card-head{display:flex;justify-content:space-between;padding:14px 16px;border-bottom:1px solid var(--border)}
.card-title{font-weight:700}
.badge{padding:4px 9px;border-radius:999px;font-size:12px;background:var(--chip);color:#4338ca}
.card-body{padding:16px;display:grid;gap:12px}
.status{font-weight:700}
.status-pass{color:var(--pass)}
.status-fail{color:var(--fail)}
img.sshot{max-width:100%;border:1px solid var(--border);border-radius:10px}
pre{white-space:pre-wrap;background:#0b1220;color:#e5e7eb;padding:12px;border-radius:10px;overflow:auto}
.details{border:1px dashed var(--border);border-radius:10px;padding:8px}
.details summary{cursor:pointer;font-weight:600}
.small{color:var(--muted);font-size:13px}
"#;

fn status_span(passed: bool) -> &'static str {
    if passed {
        r#"<span class="status status-pass">PASS</span>"#
    } else {
        r#"<span class="status status-fail">FAIL</span>"#
    }
}

pub fn render_html(record: &RunRecord) -> String {
    let mut out = String::new();
    let name = text(&record.name);
    let _ = write!(
        out,
        r##"<!doctype html>
<html>
<head>
<meta charset="utf-8"/>
<title>{name} - Stepwise Report</title>
<style>{STYLE}</style>
<script>function toggleAll(open){{document.querySelectorAll('details').forEach(d=>{{d.open=open}});}}</script>
</head>
<body>
<div class="container">
<div class="header">
<h1>{name}</h1>
<div class="meta">
<span>URL: <a href="{url_attr}" target="_blank">{url}</a></span>
<span>Started: {started}</span>
<span>Duration: {duration:.2}s</span>
</div>
<div class="summary">
<div class="chip">Steps: {total}</div>
<div class="chip pass">Pass: {passed}</div>
<div class="chip fail">Fail: {failed}</div>
<div class="toolbar">
<a href="{TRACE_FILE}">Download {TRACE_FILE}</a>
<a href="#" onclick="toggleAll(true);return false;">Expand all</a>
<a href="#" onclick="toggleAll(false);return false;">Collapse all</a>
</div>
</div>
</div>
"##,
        url_attr = attr(&record.url),
        url = text(&record.url),
        started = text(&record.started_at),
        duration = record.duration_ms as f64 / 1000.0,
        total = record.steps.len(),
        passed = record.passed_steps(),
        failed = record.failed_steps(),
    );

    out.push_str("<div class=\"section\">\n<h2>Steps</h2>\n<div class=\"grid\">\n");
    for step in &record.steps {
        render_step(&mut out, step);
    }
    out.push_str("</div>\n</div>\n");

    out.push_str("<div class=\"section\">\n<h2>Assertions</h2>\n<div class=\"grid\">\n");
    for assertion in &record.assertions {
        render_assertion(&mut out, assertion);
    }
    out.push_str("</div>\n</div>\n");

    out.push_str("</div>\n</body>\n</html>\n");
    out
}

fn render_step(out: &mut String, step: &StepResult) {
    let _ = write!(
        out,
        r#"<div id="step-{index}" class="card">
<div class="card-head"><div class="card-title">{index}) {description}</div><div class="badge">{elapsed} ms</div></div>
<div class="card-body">
<div>Status: {status}</div>
"#,
        index = step.index,
        description = text(&step.description),
        elapsed = step.elapsed_ms,
        status = status_span(step.passed()),
    );
    if let Some(error) = &step.error {
        let _ = write!(
            out,
            "<details class=\"details\" open><summary>Error</summary><pre>{}</pre></details>\n",
            text(error)
        );
    }
    if let Some(notes) = &step.notes {
        let _ = write!(
            out,
            "<details class=\"details\"><summary>Plan &amp; Notes</summary><pre>{}</pre></details>\n",
            text(notes)
        );
    }
    if let Some(shot) = &step.screenshot {
        let _ = write!(
            out,
            r#"<div><a href="{src}" target="_blank"><img class="sshot" src="{src}" alt="Step {index} screenshot"/></a><div class="small">Click image to open full-size</div></div>
"#,
            src = attr(shot),
            index = step.index,
        );
    }
    out.push_str("</div>\n</div>\n");
}

fn render_assertion(out: &mut String, assertion: &AssertionResult) {
    let _ = write!(
        out,
        r#"<div class="card">
<div class="card-head"><div class="card-title">{index}) {claim}</div><div class="badge">{elapsed} ms</div></div>
<div class="card-body">
<div>Result: {status}</div>
"#,
        index = assertion.index,
        claim = text(&assertion.text),
        elapsed = assertion.elapsed_ms,
        status = status_span(assertion.passed),
    );
    if !assertion.explanation.is_empty() {
        let _ = write!(
            out,
            "<details class=\"details\" open><summary>Explanation</summary><pre>{}</pre></details>\n",
            text(&assertion.explanation)
        );
    }
    out.push_str("</div>\n</div>\n");
}
