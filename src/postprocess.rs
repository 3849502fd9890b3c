//! Rewrites the previewer's HTML so it stays legible inside a narrow,
//! embedded viewport.
//!
//! The rewrite is a fixed set of literal substitutions plus one regex pass
//! over `<img>` style attributes. It is NOT idempotent: running it twice
//! injects the stylesheet rules and the zoom control twice, so call it
//! exactly once per raw document.

use crate::config::Config;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

const CONTAINER: &str = r#"<div class="container">"#;
const ROW: &str = r#"<div class="row">"#;
const COLUMN: &str = r#"<div class="col-md-6">"#;
const PAGE: &str = r#"<div class="page">"#;
const STYLE_OPEN: &str = "<style>";
const BODY_CLOSE: &str = "</body>";

pub const IMG_SIZE_RULE: &str = "max-width: 100%; height: auto;";

static RE_IMG_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<img([^>]*)style="([^"]*)""#).unwrap());

/// How many times each substitution fired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreviewRewrite {
    pub containers: usize,
    pub stylesheets: usize,
    pub rows: usize,
    pub columns: usize,
    pub pages: usize,
    pub images: usize,
    pub zoom_controls: usize,
}

impl PreviewRewrite {
    pub fn is_noop(&self) -> bool {
        *self == PreviewRewrite::default()
    }
}

pub fn enhance_preview_html(cfg: &Config, html: &str) -> String {
    enhance_preview_html_with_stats(cfg, html).0
}

pub fn enhance_preview_html_with_stats(cfg: &Config, html: &str) -> (String, PreviewRewrite) {
    let mut stats = PreviewRewrite::default();
    if html.is_empty() {
        return (String::new(), stats);
    }
    let pp = &cfg.postprocess;

    let mut s = replace_counted(
        html,
        CONTAINER,
        r#"<div class="container" style="max-width: 100%; width: 100%;">"#,
        &mut stats.containers,
    );

    let rules = format!(
        "<style>\nbody {{font-size: {px}px;}}\n.text-content {{font-size: {px}px; line-height: {lh};}}\n",
        px = pp.font_size_px,
        lh = pp.line_height,
    );
    s = replace_counted(&s, STYLE_OPEN, &rules, &mut stats.stylesheets);

    s = replace_counted(
        &s,
        ROW,
        r#"<div class="row" style="display: flex; flex-wrap: wrap;">"#,
        &mut stats.rows,
    );
    s = replace_counted(
        &s,
        COLUMN,
        r#"<div class="col-md-6" style="flex: 0 0 50%; max-width: 50%; padding: 15px;">"#,
        &mut stats.columns,
    );
    s = replace_counted(
        &s,
        PAGE,
        r#"<div class="page" style="margin-bottom: 30px; border-bottom: 1px solid #ccc; padding-bottom: 20px;">"#,
        &mut stats.pages,
    );

    s = constrain_images(&s, &mut stats.images);

    let controls = zoom_controls(cfg);
    s = replace_counted(
        &s,
        BODY_CLOSE,
        &format!("{controls}{BODY_CLOSE}"),
        &mut stats.zoom_controls,
    );

    (s, stats)
}

fn replace_counted(s: &str, from: &str, to: &str, count: &mut usize) -> String {
    *count = s.matches(from).count();
    if *count == 0 {
        return s.to_string();
    }
    s.replace(from, to)
}

/// Prefixes every `<img ... style="X"` with the size rule, keeping `X`.
/// Tags without a style attribute are left alone.
fn constrain_images(s: &str, count: &mut usize) -> String {
    *count = RE_IMG_STYLE.find_iter(s).count();
    RE_IMG_STYLE
        .replace_all(s, format!(r#"<img${{1}}style="{IMG_SIZE_RULE} ${{2}}""#).as_str())
        .into_owned()
}

fn zoom_controls(cfg: &Config) -> String {
    let pp = &cfg.postprocess;
    let step = pp.zoom_step;
    format!(
        r#"
    <div style="position: fixed; bottom: 20px; right: 20px; background: #fff; padding: 10px; border-radius: 5px; box-shadow: 0 0 10px rgba(0,0,0,0.2); z-index: 1000;">
        <button onclick="document.body.style.zoom = parseFloat(document.body.style.zoom || 1) + {step};" style="margin-right: 5px;">{zoom_in}</button>
        <button onclick="document.body.style.zoom = parseFloat(document.body.style.zoom || 1) - {step};">{zoom_out}</button>
    </div>
    "#,
        zoom_in = escape_text(&pp.zoom_in_label),
        zoom_out = escape_text(&pp.zoom_out_label),
    )
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
