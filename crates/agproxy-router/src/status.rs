use agproxy_transform::model_catalog::ModelCard;

const PAGE_HEAD: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>Antigravity Proxy</title>
<style>
body { background: #0d0e12; color: #eee; font-family: -apple-system, "Segoe UI", Roboto, sans-serif; display: flex; justify-content: center; padding: 24px; }
main { max-width: 520px; width: 100%; }
.status { background: #16171d; border: 1px solid #333; border-radius: 12px; padding: 16px 20px; margin-bottom: 20px; }
.ok { color: #00ff88; font-weight: bold; }
.card { background: #1a1b1e; border: 1px solid #333; border-radius: 10px; padding: 12px 16px; margin: 10px 0; }
.card .name { font-weight: bold; }
.card .desc { color: #888; font-size: 14px; }
code { color: #61afef; }
</style>
</head>
<body>
<main>
<h1>Antigravity Proxy</h1>
<div class="status">
<div class="ok">Proxy is running</div>
<div>Base URL: <code>/v1</code></div>
</div>
<h3>Available models</h3>
"#;

const PAGE_TAIL: &str = "</main>\n</body>\n</html>\n";

pub fn render_status_page(cards: &[ModelCard]) -> String {
    let mut page = String::from(PAGE_HEAD);
    for card in cards {
        page.push_str(&format!(
            "<div class=\"card\"><div class=\"name\">{}</div><div class=\"desc\">{}</div><code>ID: {}</code></div>\n",
            escape_html(card.name),
            escape_html(card.description),
            escape_html(card.id)
        ));
    }
    page.push_str(PAGE_TAIL);
    page
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
