use suggest_common::SortMode;
use suggest_engine::{PageView, RowView};
use uuid::Uuid;

/// Values echoed back into the submission form.
pub struct FormView {
    pub handle: String,
    pub error: Option<String>,
}

/// Render the full page: form, results area and the client script.
/// `document` is the token this copy of the page closes itself with.
pub fn render_index(form: &FormView, view: &PageView, document: Uuid) -> String {
    let error = form
        .error
        .as_deref()
        .map(|e| format!(r#"<div class="error">{}</div>"#, html_escape(e)))
        .unwrap_or_default();

    let content = format!(
        r#"<div class="container">
    <form method="post" action="/analyze" class="search" autocomplete="off">
        <input type="text" name="handle" placeholder="Enter a handle, e.g. alice.bsky.social" value="{handle}" required>
        <input type="password" name="secret" placeholder="App password (optional, enables following)">
        <button type="submit">Analyze</button>
    </form>
    {error}
    <label class="toggle"><input type="checkbox" id="weighted"> Weight by follower count</label>
    <div id="results" data-document="{document}">{results}</div>
</div>
<script>{script}</script>"#,
        handle = html_escape(&form.handle),
        results = render_results(view),
        script = CLIENT_SCRIPT,
        document = document,
    );

    build_page("Follow Suggestions", &content)
}

/// Render the results fragment polled by the client.
pub fn render_results(view: &PageView) -> String {
    let mut out = format!(
        r#"<div id="results-body" data-analyzing="{}">"#,
        u8::from(view.is_analyzing())
    );

    if view.handle.is_none() {
        out.push_str("</div>");
        return out;
    }

    if view.progress.total > 0 || view.is_analyzing() {
        let spinner = if view.progress.is_spinning() {
            r#"<span class="spinner"></span>"#
        } else {
            ""
        };
        out.push_str(&format!(
            r#"<div class="progress">{spinner}Processed {}/{} follows</div>"#,
            view.progress.processed, view.progress.total
        ));
    }

    if let Some(error) = view.error() {
        out.push_str(&format!(r#"<div class="error">{}</div>"#, html_escape(error)));
    }

    if let Some(notice) = &view.notice {
        out.push_str(&format!(r#"<div class="notice">{}</div>"#, html_escape(notice)));
    }

    if view.rows.is_empty() {
        if view.is_analyzing() {
            out.push_str(r#"<p class="empty">No results yet. Analysis in progress...</p>"#);
        }
    } else {
        out.push_str(r#"<ol class="suggestions">"#);
        for row in &view.rows {
            out.push_str(&render_row(row, view.sort));
        }
        out.push_str("</ol>");
    }

    out.push_str("</div>");
    out
}

pub fn render_no_session() -> String {
    r#"<div id="results-body" data-analyzing="0"><p class="empty">Session expired. Submit a handle to start again.</p></div>"#
        .to_string()
}

fn render_row(row: &RowView, sort: SortMode) -> String {
    let handle = row.handle();
    let suggestion = &row.ranked.suggestion;

    let avatar = match row.profile.as_ref().and_then(|p| p.avatar.as_deref()) {
        Some(url) => format!(
            r#"<img class="avatar" src="{}" alt="" loading="lazy">"#,
            html_escape(url)
        ),
        None => r#"<div class="avatar placeholder"></div>"#.to_string(),
    };

    let name = match &row.profile {
        Some(profile) => profile.label_or(handle.as_str()).to_string(),
        None => handle.to_string(),
    };

    let description = row
        .profile
        .as_ref()
        .and_then(|p| p.description.as_deref())
        .filter(|d| !d.trim().is_empty())
        .map(|d| format!(r#"<p class="description">{}</p>"#, html_escape(d)))
        .unwrap_or_default();

    let score = match (sort, row.ranked.score) {
        (SortMode::Weighted, Some(score)) => {
            format!(r#"<span class="score">score {score:.3}</span>"#)
        }
        _ => String::new(),
    };

    let follow = if row.follow.offered {
        format!(
            r#"<button class="follow-btn{active}" data-follow="{h}"{disabled}>{label}</button>"#,
            active = if row.follow.following { " following" } else { "" },
            h = html_escape(handle.as_str()),
            disabled = if row.follow.busy { " disabled" } else { "" },
            label = if row.follow.following { "Following" } else { "Follow" },
        )
    } else {
        String::new()
    };

    format!(
        r#"<li class="suggestion" data-handle="{h}">
    <span class="rank">{rank}</span>
    {avatar}
    <div class="body">
        <a class="name" href="{url}" target="_blank" rel="noopener">{name}</a>
        <span class="handle handle-full">@{h}</span><span class="handle handle-short">@{short}</span>
        {description}
    </div>
    <div class="meta"><span class="count">{count} follows</span>{score}{follow}</div>
</li>"#,
        h = html_escape(handle.as_str()),
        rank = row.ranked.rank,
        url = html_escape(&handle.profile_url()),
        name = html_escape(&name),
        short = html_escape(handle.short_name()),
        count = suggestion.count,
    )
}

const CLIENT_SCRIPT: &str = r#"
const results = document.getElementById('results');
const weighted = document.getElementById('weighted');
let pollTimer = null;

function analyzing() {
    const body = document.getElementById('results-body');
    return body && body.dataset.analyzing === '1';
}

function refresh() {
    return fetch('/results?weighted=' + (weighted.checked ? 1 : 0), { credentials: 'same-origin' })
        .then(r => r.text())
        .then(html => {
            results.innerHTML = html;
            reportViewport();
            schedule();
        });
}

function schedule() {
    clearTimeout(pollTimer);
    if (analyzing()) {
        pollTimer = setTimeout(refresh, 1000);
    }
}

function reportViewport() {
    const rows = Array.from(document.querySelectorAll('[data-handle]')).map(el => {
        const rect = el.getBoundingClientRect();
        return { key: el.dataset.handle, top: rect.top + window.scrollY, height: rect.height };
    });
    if (rows.length === 0) return;
    fetch('/viewport', {
        method: 'POST',
        credentials: 'same-origin',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify({ viewport: { top: window.scrollY, height: window.innerHeight }, rows }),
    })
        .then(r => r.ok ? r.json() : { fired: 0 })
        .then(data => {
            if (data.fired > 0 && !analyzing()) setTimeout(refresh, 500);
        });
}

let scrollTimer = null;
window.addEventListener('scroll', () => {
    clearTimeout(scrollTimer);
    scrollTimer = setTimeout(reportViewport, 100);
});
window.addEventListener('resize', reportViewport);
weighted.addEventListener('change', refresh);

results.addEventListener('click', ev => {
    const btn = ev.target.closest('[data-follow]');
    if (!btn) return;
    btn.disabled = true;
    fetch('/follow/' + encodeURIComponent(btn.dataset.follow), { method: 'POST', credentials: 'same-origin' })
        .finally(refresh);
});

window.addEventListener('pagehide', () =>
    navigator.sendBeacon('/close?document=' + encodeURIComponent(results.dataset.document)));

reportViewport();
schedule();
"#;

// --- Helpers ---

fn build_page(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>
*{{margin:0;padding:0;box-sizing:border-box;}}
body{{font-family:-apple-system,BlinkMacSystemFont,"Segoe UI",Roboto,sans-serif;color:#1a1a1a;background:#fafafa;}}
.header{{background:#0560ff;color:#fff;padding:12px 24px;}}
.header h1{{font-size:18px;font-weight:600;}}
.container{{max-width:760px;margin:0 auto;padding:24px;}}
.search{{display:flex;gap:8px;flex-wrap:wrap;margin-bottom:12px;}}
.search input{{flex:1;min-width:200px;padding:8px 12px;border:1px solid #ccc;border-radius:6px;font-size:14px;}}
.search button{{padding:8px 20px;background:#0560ff;color:#fff;border:none;border-radius:6px;font-size:14px;cursor:pointer;}}
.toggle{{display:block;font-size:13px;color:#555;margin-bottom:16px;}}
.progress{{font-size:13px;color:#555;margin-bottom:12px;display:flex;align-items:center;gap:8px;}}
.spinner{{width:14px;height:14px;border:2px solid #ccc;border-top-color:#0560ff;border-radius:50%;animation:spin 1s linear infinite;}}
@keyframes spin{{to{{transform:rotate(360deg);}}}}
.error{{background:#fdecea;border:1px solid #f5c6cb;color:#a12622;padding:8px 12px;border-radius:4px;font-size:13px;margin-bottom:12px;}}
.notice{{background:#fff8e1;border:1px solid #ffecb3;color:#795548;padding:8px 12px;border-radius:4px;font-size:13px;margin-bottom:12px;}}
.empty{{color:#888;text-align:center;padding:40px;}}
.suggestions{{list-style:none;}}
.suggestion{{display:flex;gap:12px;align-items:flex-start;background:#fff;border:1px solid #e0e0e0;border-radius:8px;padding:12px;margin-bottom:8px;}}
.rank{{font-size:13px;color:#888;min-width:24px;}}
.avatar{{width:48px;height:48px;border-radius:50%;flex-shrink:0;}}
.avatar.placeholder{{background:#e0e0e0;}}
.body{{flex:1;min-width:0;}}
.name{{font-weight:600;color:#1a1a1a;text-decoration:none;display:block;}}
.name:hover{{color:#0560ff;}}
.handle{{font-size:13px;color:#888;}}
.handle-short{{display:none;}}
.description{{font-size:13px;color:#555;margin-top:4px;}}
.meta{{display:flex;flex-direction:column;align-items:flex-end;gap:4px;font-size:12px;color:#555;}}
.follow-btn{{padding:4px 12px;border:1px solid #0560ff;background:#0560ff;color:#fff;border-radius:12px;font-size:12px;cursor:pointer;}}
.follow-btn.following{{background:#fff;color:#0560ff;}}
.follow-btn:disabled{{opacity:0.5;cursor:default;}}
@media (max-width:480px){{.handle-full{{display:none;}}.handle-short{{display:inline;}}.description{{display:none;}}}}
</style>
</head>
<body>
<div class="header"><h1>Follow Suggestions</h1></div>
{content}
</body>
</html>"#,
        title = html_escape(title),
    )
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
