//! SVG charts for the analysis stage.

use crate::domain::metrics::StrategyReturns;
use chrono::NaiveDate;
use std::fmt::Write as _;

const CHART_WIDTH: f64 = 800.0;
const CHART_HEIGHT: f64 = 400.0;
const MARGIN_LEFT: f64 = 70.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 30.0;
const MARGIN_BOTTOM: f64 = 40.0;

const PALETTE: [&str; 6] = ["#2563eb", "#dc2626", "#16a34a", "#9333ea", "#ea580c", "#0891b2"];

fn svg_open(svg: &mut String, title: &str) {
    let _ = write!(
        svg,
        r##"<svg width="{w}" height="{h}" viewBox="0 0 {w} {h}" xmlns="http://www.w3.org/2000/svg">"##,
        w = CHART_WIDTH,
        h = CHART_HEIGHT
    );
    svg.push_str("\n  <rect width=\"100%\" height=\"100%\" fill=\"white\"/>\n");
    let _ = writeln!(
        svg,
        "  <text x=\"{}\" y=\"18\" text-anchor=\"middle\" font-size=\"14\" fill=\"#333\">{}</text>",
        CHART_WIDTH / 2.0,
        escape(title)
    );
    let _ = writeln!(
        svg,
        "  <line x1=\"{l}\" y1=\"{t}\" x2=\"{l}\" y2=\"{b}\" stroke=\"#ccc\" stroke-width=\"1\"/>",
        l = MARGIN_LEFT,
        t = MARGIN_TOP,
        b = CHART_HEIGHT - MARGIN_BOTTOM
    );
}

fn y_label(svg: &mut String, y: f64, text: &str) {
    let _ = writeln!(
        svg,
        "  <text x=\"{}\" y=\"{:.1}\" text-anchor=\"end\" font-size=\"10\" fill=\"#666\">{}</text>",
        MARGIN_LEFT - 5.0,
        y + 3.0,
        text
    );
}

fn x_label(svg: &mut String, x: f64, text: &str) {
    let _ = writeln!(
        svg,
        "  <text x=\"{:.1}\" y=\"{}\" text-anchor=\"middle\" font-size=\"10\" fill=\"#666\">{}</text>",
        x,
        CHART_HEIGHT - MARGIN_BOTTOM + 15.0,
        escape(text)
    );
}

fn hline(svg: &mut String, y: f64, stroke: &str) {
    let _ = writeln!(
        svg,
        "  <line x1=\"{}\" y1=\"{y:.1}\" x2=\"{}\" y2=\"{y:.1}\" stroke=\"{stroke}\" stroke-width=\"1\"/>",
        MARGIN_LEFT,
        CHART_WIDTH - MARGIN_RIGHT
    );
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Value range padded so a flat series still spans some height, always
/// including zero.
fn value_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if hi - lo < 1e-9 { (lo - 0.01, hi + 0.01) } else { (lo, hi) }
}

/// One line per strategy of cumulative return against date.
pub fn cumulative_returns_svg(strategies: &[StrategyReturns]) -> String {
    let curves: Vec<(&str, Vec<(NaiveDate, f64)>)> = strategies
        .iter()
        .map(|s| (s.name.as_str(), s.cumulative()))
        .filter(|(_, c)| !c.is_empty())
        .collect();

    let mut svg = String::new();
    svg_open(&mut svg, "Cumulative Return by Strategy");

    let Some(first) = curves.iter().flat_map(|(_, c)| c.iter().map(|(d, _)| *d)).min() else {
        x_label(&mut svg, CHART_WIDTH / 2.0, "No return data available.");
        svg.push_str("</svg>");
        return svg;
    };
    let last = curves
        .iter()
        .flat_map(|(_, c)| c.iter().map(|(d, _)| *d))
        .max()
        .unwrap_or(first);
    let span_days = (last - first).num_days().max(1) as f64;
    let (min_v, max_v) = value_range(curves.iter().flat_map(|(_, c)| c.iter().map(|(_, v)| *v)));

    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let x_scale = |d: NaiveDate| MARGIN_LEFT + (d - first).num_days() as f64 / span_days * plot_width;
    let y_scale = |v: f64| MARGIN_TOP + plot_height - (v - min_v) / (max_v - min_v) * plot_height;

    hline(&mut svg, CHART_HEIGHT - MARGIN_BOTTOM, "#ccc");
    hline(&mut svg, y_scale(0.0), "#999");
    y_label(&mut svg, y_scale(max_v), &format!("{:.1}%", max_v * 100.0));
    y_label(&mut svg, y_scale(0.0), "0%");
    y_label(&mut svg, y_scale(min_v), &format!("{:.1}%", min_v * 100.0));
    x_label(&mut svg, MARGIN_LEFT, &first.to_string());
    x_label(&mut svg, CHART_WIDTH - MARGIN_RIGHT, &last.to_string());

    for (i, (name, curve)) in curves.iter().enumerate() {
        let color = PALETTE[i % PALETTE.len()];
        let mut path_data = String::new();
        for (j, (date, value)) in curve.iter().enumerate() {
            let cmd = if j == 0 { "M" } else { " L" };
            let _ = write!(path_data, "{cmd} {:.1} {:.1}", x_scale(*date), y_scale(*value));
        }
        let _ = writeln!(
            svg,
            "  <path d=\"{path_data}\" fill=\"none\" stroke=\"{color}\" stroke-width=\"2\"/>"
        );

        let legend_y = MARGIN_TOP + 12.0 + i as f64 * 14.0;
        let _ = writeln!(
            svg,
            "  <rect x=\"{:.1}\" y=\"{:.1}\" width=\"10\" height=\"10\" fill=\"{color}\"/>",
            MARGIN_LEFT + 10.0,
            legend_y - 9.0
        );
        let _ = writeln!(
            svg,
            "  <text x=\"{:.1}\" y=\"{legend_y:.1}\" font-size=\"11\" fill=\"#333\">{}</text>",
            MARGIN_LEFT + 25.0,
            escape(name)
        );
    }

    svg.push_str("</svg>");
    svg
}

/// Vertical bars of Sharpe ratio per strategy around a zero baseline.
pub fn sharpe_bars_svg(sharpes: &[(String, f64)]) -> String {
    let mut svg = String::new();
    svg_open(&mut svg, "Sharpe Ratio by Strategy");
    if sharpes.is_empty() {
        x_label(&mut svg, CHART_WIDTH / 2.0, "No return data available.");
        svg.push_str("</svg>");
        return svg;
    }

    let (min_v, max_v) = value_range(sharpes.iter().map(|(_, s)| *s));
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
    let y_scale = |v: f64| MARGIN_TOP + plot_height - (v - min_v) / (max_v - min_v) * plot_height;
    let slot = plot_width / sharpes.len() as f64;
    let bar_width = slot * 0.6;
    let zero = y_scale(0.0);

    hline(&mut svg, zero, "#999");
    y_label(&mut svg, y_scale(max_v), &format!("{max_v:.2}"));
    y_label(&mut svg, zero, "0");
    y_label(&mut svg, y_scale(min_v), &format!("{min_v:.2}"));

    for (i, (name, sharpe)) in sharpes.iter().enumerate() {
        let center = MARGIN_LEFT + slot * (i as f64 + 0.5);
        let top = y_scale(sharpe.max(0.0));
        let height = (y_scale(sharpe.min(0.0)) - top).max(0.5);
        let color = if *sharpe >= 0.0 { "#2563eb" } else { "#dc2626" };
        let _ = writeln!(
            svg,
            "  <rect x=\"{:.1}\" y=\"{top:.1}\" width=\"{bar_width:.1}\" height=\"{height:.1}\" fill=\"{color}\"/>",
            center - bar_width / 2.0
        );
        let _ = writeln!(
            svg,
            "  <text x=\"{center:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"10\" fill=\"#333\">{sharpe:.2}</text>",
            top - 4.0
        );
        x_label(&mut svg, center, name);
    }

    svg.push_str("</svg>");
    svg
}
