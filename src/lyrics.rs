//! Timed-line (`.lrc`-style) lyrics parsing and `at(t)` query (C12).

use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct LrcLine {
    pub t: f64,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LrcDocument {
    pub lines: Vec<LrcLine>,
}

impl LrcDocument {
    /// `current_text` is the latest line with timestamp `<= t`; `next_text`
    /// is the line after it, or — if no line qualifies — the first line's
    /// text.
    pub fn at(&self, t: f64) -> (Option<&str>, Option<&str>) {
        if self.lines.is_empty() {
            return (None, None);
        }

        let mut idx: Option<usize> = None;
        for (i, line) in self.lines.iter().enumerate() {
            if line.t <= t {
                idx = Some(i);
            } else {
                break;
            }
        }

        match idx {
            None => (None, Some(self.lines[0].text.as_str())),
            Some(i) => {
                let current = self.lines[i].text.as_str();
                let next = self.lines.get(i + 1).map(|l| l.text.as_str());
                (Some(current), next)
            }
        }
    }
}

/// Parse a single `[mm:ss(.ff)]text` timestamp tag, returning the offset just
/// past the closing bracket along with the parsed seconds.
fn parse_tag(s: &str) -> Option<(f64, usize)> {
    if !s.starts_with('[') {
        return None;
    }
    let close = s.find(']')?;
    let inner = &s[1..close];
    let colon = inner.find(':')?;
    let mm: f64 = inner[..colon].parse().ok()?;
    let ss: f64 = inner[colon + 1..].parse().ok()?;
    Some((mm * 60.0 + ss, close + 1))
}

/// Parse the textual contents of an `.lrc`-style file. Lines with no
/// recognizable `[mm:ss]` tag are skipped.
pub fn parse_lrc(contents: &str) -> LrcDocument {
    let mut lines = Vec::new();

    for raw in contents.lines() {
        let mut times = Vec::new();
        let mut rest = raw;
        while let Some((t, consumed)) = parse_tag(rest) {
            times.push(t);
            rest = &rest[consumed..];
        }
        if times.is_empty() {
            continue;
        }
        let text = rest.trim().to_string();
        for t in times {
            lines.push(LrcLine {
                t,
                text: text.clone(),
            });
        }
    }

    lines.sort_by(|a, b| a.t.partial_cmp(&b.t).unwrap());
    LrcDocument { lines }
}

pub fn load_lrc_file(path: &Path) -> std::io::Result<LrcDocument> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_lrc(&contents))
}
