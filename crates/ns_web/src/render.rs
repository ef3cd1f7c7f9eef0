//! HTML for the single summarizer page.

use std::fmt::Write;

use ns_core::types::{Slider, MAX_LENGTH, MIN_LENGTH, NUM_BEAMS};
use ns_core::{ModelChoice, Session, SummaryRequest, MAX_INPUT_TOKENS};
use ns_inference::SummarizeError;

/// Everything one render of the page depends on.
pub struct Page<'a> {
    /// Text to put back in the article box.
    pub article: &'a str,
    pub request: SummaryRequest,
    pub session: &'a Session,
    pub error: Option<&'a SummarizeError>,
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0; color: #262730; }
.layout { display: grid; grid-template-columns: 300px 1fr; min-height: 100vh; }
aside { background: #f0f2f6; padding: 1.5rem; }
main { padding: 2rem; }
.columns { display: grid; grid-template-columns: 1fr 1fr; gap: 2rem; }
textarea { width: 100%; height: 300px; font-family: 'Courier New', monospace; font-size: 14px; }
.summary-box { background: #f0f2f6; padding: 1.5rem; border-radius: 0.5rem; border-left: 4px solid #1f77b4; }
.info-box { background: #e7f3ff; padding: 1rem; border-radius: 0.5rem; border-left: 4px solid #0066cc; }
.error { background: #ffecec; padding: 1rem; border-radius: 0.5rem; border-left: 4px solid #d33; }
.metrics { display: flex; gap: 2rem; margin-top: 1rem; }
.metric .value { font-size: 1.6rem; }
.help { color: gray; font-size: 12px; }
.actions { display: flex; gap: 1rem; margin-top: 1.5rem; }
footer { text-align: center; color: gray; font-size: 12px; margin-top: 2rem; }
"#;

const SCRIPT: &str = r#"
document.getElementById('summarizer').addEventListener('submit', function (event) {
  var submitter = event.submitter;
  if (submitter && submitter.value === 'summarize') {
    document.getElementById('busy').hidden = false;
  }
  document.querySelectorAll('button').forEach(function (b) { b.disabled = true; });
});
"#;

fn slider(html: &mut String, field: &str, slider: &Slider, value: u32, unit: &str) {
    let _ = write!(
        html,
        r#"<p><label for="{field}">{label} ({unit}): <output id="{field}-value">{value}</output></label><br>
<input type="range" id="{field}" name="{field}" min="{min}" max="{max}" step="{step}" value="{value}"
 oninput="document.getElementById('{field}-value').value = this.value"></p>"#,
        field = field,
        label = slider.name,
        unit = unit,
        min = slider.range.start(),
        max = slider.range.end(),
        step = slider.step,
        value = value,
    );
}

fn sidebar(html: &mut String, request: &SummaryRequest) {
    html.push_str("<aside><h2>⚙️ Configuration</h2><p><strong>Select Summarization Model:</strong></p>");
    for choice in ModelChoice::ALL {
        let _ = write!(
            html,
            r#"<p><label><input type="radio" name="model" value="{id}"{checked}> {label}</label><br><span class="help">{description}</span></p>"#,
            id = escape(choice.id()),
            checked = if choice == request.model { " checked" } else { "" },
            label = escape(choice.label()),
            description = escape(choice.description()),
        );
    }

    html.push_str("<h3>📊 Summary Parameters</h3>");
    slider(html, "min_length", &MIN_LENGTH, request.params.min_length, "tokens");
    slider(html, "max_length", &MAX_LENGTH, request.params.max_length, "tokens");
    slider(html, "num_beams", &NUM_BEAMS, request.params.num_beams, "beams");
    html.push_str(
        r#"<p class="help">Lengths are counted in model tokens, which are often shorter than words. Wider beams give better summaries but run slower.</p>
<div class="info-box">💡 <strong>Tip:</strong> Paste a news article in the text area and click Summarize!</div></aside>"#,
    );
}

fn summary_panel(html: &mut String, session: &Session) {
    let Some(view) = session.view() else {
        return;
    };
    let _ = write!(
        html,
        r#"<div id="summary" class="summary-box"><p><strong>Summary:</strong></p><p>{}</p></div>"#,
        escape(&view.summary.text)
    );
    let _ = write!(
        html,
        r#"<div class="metrics">
<div class="metric"><div>Original Length</div><div class="value">{} words</div></div>
<div class="metric"><div>Summary Length</div><div class="value">{} words</div></div>
<div class="metric"><div>Compression</div><div class="value">{:.1}%</div></div>
</div>"#,
        view.metrics.original_words, view.metrics.summary_words, view.metrics.compression
    );
    let _ = write!(
        html,
        r#"<p class="help">{} · {:.1}s · {}</p>"#,
        escape(view.summary.request.model.label()),
        view.summary.elapsed.as_secs_f64(),
        view.summary.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if view.summary.truncated {
        let _ = write!(
            html,
            r#"<p class="info-box">Only the first {} tokens of the article were summarized.</p>"#,
            MAX_INPUT_TOKENS
        );
    }
}

fn error_banner(html: &mut String, error: &SummarizeError) {
    let _ = write!(html, r#"<div class="error">❌ {}</div>"#, escape(&error.to_string()));
    if let Some(hint) = error.hint() {
        let _ = write!(html, r#"<p class="info-box">{}</p>"#, escape(hint));
    }
}

pub fn render(page: &Page) -> String {
    let mut html = String::with_capacity(8 * 1024);
    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="en"><head><meta charset="utf-8"><title>News Summarizer</title>
<style>{}</style></head><body>
<form id="summarizer" method="post" action="/summarize"><div class="layout">"#,
        STYLE
    );

    sidebar(&mut html, &page.request);

    html.push_str(
        r#"<main><h1>📰 News Article Summarizer</h1><p><strong>Transform long articles into concise summaries instantly</strong></p><hr>"#,
    );
    if let Some(error) = page.error {
        error_banner(&mut html, error);
    }

    let _ = write!(
        html,
        r#"<div class="columns"><section><h3>📝 Input Article</h3>
<textarea name="article" placeholder="Paste a news article (min 50 words recommended)...">{}</textarea></section>
<section><h3>✨ Generated Summary</h3>"#,
        escape(page.article)
    );
    summary_panel(&mut html, page.session);
    html.push_str(
        r#"</section></div>
<div id="busy" class="info-box" hidden>🔄 Loading model and generating summary...</div>
<div class="actions">
<button type="submit" name="action" value="summarize" formaction="/summarize">🚀 Summarize Article</button>
<button type="submit" name="action" value="clear" formaction="/clear">🗑️ Clear All</button>
</div>
<footer><p>Built with Rust, axum and candle</p><p>Models: T5-small | BART-large-cnn</p></footer>
</main></div></form>"#,
    );
    let _ = write!(html, "<script>{}</script></body></html>", SCRIPT);
    html
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use ns_core::SummaryRecord;

    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_empty_page_has_controls_and_no_summary() {
        let session = Session::new();
        let html = render(&Page {
            article: "",
            request: SummaryRequest::default(),
            session: &session,
            error: None,
        });
        assert!(html.contains(r#"value="t5-small" checked"#));
        assert!(html.contains(r#"value="facebook/bart-large-cnn""#));
        assert!(html.contains(r#"name="min_length" min="10" max="50" step="5" value="30""#));
        assert!(html.contains(r#"name="num_beams" min="2" max="8" step="1" value="4""#));
        assert!(!html.contains(r#"id="summary""#));
    }

    #[test]
    fn test_summary_metrics_and_truncation_note() {
        let mut session = Session::new();
        session.record(
            "one two three four five six seven".to_string(),
            SummaryRecord {
                text: "one <two>".to_string(),
                request: SummaryRequest::default(),
                generated_at: Utc::now(),
                elapsed: Duration::from_millis(1500),
                truncated: true,
            },
        );
        let html = render(&Page {
            article: "one two three four five six seven",
            request: SummaryRequest::default(),
            session: &session,
            error: None,
        });
        assert!(html.contains("one &lt;two&gt;"));
        assert!(html.contains("7 words"));
        assert!(html.contains("2 words"));
        assert!(html.contains("71.4%"));
        assert!(html.contains("Only the first 512 tokens"));
    }

    #[test]
    fn test_execution_error_shows_hint() {
        let session = Session::new();
        let error = SummarizeError::Execution("out of memory".to_string());
        let html = render(&Page {
            article: "",
            request: SummaryRequest::default(),
            session: &session,
            error: Some(&error),
        });
        assert!(html.contains("Error during summarization: out of memory"));
        assert!(html.contains(ns_inference::EXECUTION_HINT));
    }
}
