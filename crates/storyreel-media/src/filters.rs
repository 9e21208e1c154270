//! Filter-graph text helpers.
//!
//! A value inside a filter graph is parsed twice by ffmpeg: once by the
//! graph parser (quoting with `'`, escaping with `\`) and once by the
//! filter's option parser (where `:` separates options). Values are
//! escaped for the option level first, then quoted for the graph level.

use std::path::Path;

/// Escape `\`, `'` and `:` for the option parser.
pub fn escape_option_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Wrap in single quotes for the graph parser. An embedded `'` closes the
/// quote, is emitted escaped, and reopens it.
pub fn quote_graph_value(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Both levels, for free text such as drawtext captions.
pub fn escape_filter_text(value: &str) -> String {
    quote_graph_value(&escape_option_value(value))
}

/// Path escaped for use as a filter option value.
pub fn escape_filter_path(path: &Path) -> String {
    escape_filter_text(&path.to_string_lossy())
}

/// One line of a concat demuxer list.
pub fn concat_list_line(path: &Path) -> String {
    format!("file '{}'", path.to_string_lossy().replace('\'', r"'\''"))
}

/// Half-open activity window `[start, end)` as an `enable` expression.
/// `end = None` leaves the window open to the end of the stream.
pub fn window_expr(start: f64, end: Option<f64>) -> String {
    match end {
        Some(end) => format!("gte(t,{:.3})*lt(t,{:.3})", start, end),
        None => format!("gte(t,{:.3})", start),
    }
}
