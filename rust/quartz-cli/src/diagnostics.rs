//! Terminal rendering for parse errors and runtime exceptions.

use quartz_compiler::ParseError;
use quartz_core::Exception;

fn cyan(text: &str) -> String {
    format!("\x1b[36m{}\x1b[0m", text)
}

fn red(text: &str) -> String {
    format!("\x1b[31m{}\x1b[0m", text)
}

fn gray(text: &str) -> String {
    format!("\x1b[90m{}\x1b[0m", text)
}

fn header(category: &str, location: &str) -> String {
    let width: usize = 72;
    let dashes = width.saturating_sub(category.len() + location.len() + 6);
    cyan(&format!(
        "── {} {} {} ──\n",
        category,
        "─".repeat(dashes),
        location
    ))
}

/// Render a parse error with its source line and a caret underline.
pub fn render_parse_error(err: &ParseError, source: &[u8], filename: &str) -> String {
    let mut out = header(
        "PARSE ERROR",
        &format!("{}:{}:{}", filename, err.line, err.offset),
    );
    out.push('\n');
    out.push_str(err.description());
    out.push_str("\n\n");
    if let Some(line_text) = source_line(source, err.line) {
        let line_label = err.line.to_string();
        out.push_str(&format!("  {} │ {}\n", gray(&line_label), line_text));
        let spaces = " ".repeat(line_label.len());
        let pad = " ".repeat(err.offset.min(line_text.len()));
        let carets = "^".repeat(err.length.max(1));
        out.push_str(&format!("  {} │ {}{}\n", spaces, pad, red(&carets)));
    }
    out
}

/// Render a runtime exception and its accumulated backtrace.
pub fn render_exception(exception: &Exception) -> String {
    let mut out = header("RUNTIME ERROR", "");
    out.push('\n');
    out.push_str(&exception.value().to_string());
    out.push('\n');
    if !exception.frames().is_empty() {
        out.push('\n');
        out.push_str("backtrace (innermost first):\n");
        for frame in exception.frames() {
            out.push_str(&format!(
                "  at {}:{} ({})\n",
                frame.file, frame.line, frame.func
            ));
        }
    }
    out
}

/// Machine-readable form of a parse error for `--json`.
pub fn parse_error_json(err: &ParseError, filename: &str) -> String {
    serde_json::json!({
        "file": filename,
        "line": err.line,
        "offset": err.offset,
        "length": err.length,
        "code": err.code,
        "description": err.description(),
    })
    .to_string()
}

fn source_line(source: &[u8], line: u32) -> Option<String> {
    let text = String::from_utf8_lossy(source);
    text.lines().nth(line.saturating_sub(1) as usize).map(str::to_string)
}
