//! SQL embed generator
//!
//! Reads `<name>.sql` files and splices them into a runner artifact as
//! escaped string constants plus one registration entry each. Two literal
//! syntaxes are supported: Rust string literals and JavaScript template
//! literals (edge-function runners).
//!
//! Layout expected in the target:
//!
//! ```text
//! use ...;                                   <- last-resort anchor
//! // @phaseline:constants                    <- explicit anchor
//! const M001_INIT: &str = "...";             <- new constants go after the last one
//!
//! pub const UNITS: &[(&str, &str)] = &[
//!     ("001_init", M001_INIT),
//! ];                                         <- new entries go right before this
//! ```
//!
//! The generator is single-shot: running it twice with the same names fails
//! with [`Error::DuplicateUnit`] instead of inserting the units again. Any
//! fatal error leaves the target byte-for-byte untouched.

use std::collections::HashSet;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::domain::result::{Error, Result};
use crate::domain::unit::parse_sequence;

/// Explicit anchor line for targets without any embedded constant yet
pub const CONSTANTS_MARKER: &str = "// @phaseline:constants";

/// Literal syntax of the target artifact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedSyntax {
    /// `const M001_X: &str = "...";`
    #[default]
    Rust,
    /// `` const M001_X = `...`; ``
    Template,
}

impl FromStr for EmbedSyntax {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rust" | "rs" => Ok(Self::Rust),
            "template" | "ts" | "js" => Ok(Self::Template),
            other => Err(Error::validation(format!(
                "unknown embed syntax '{}' (expected rust or template)",
                other
            ))),
        }
    }
}

impl fmt::Display for EmbedSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rust => write!(f, "rust"),
            Self::Template => write!(f, "template"),
        }
    }
}

impl EmbedSyntax {
    fn delimiter(&self) -> char {
        match self {
            Self::Rust => '"',
            Self::Template => '`',
        }
    }

    /// Escape `text` so it can sit between this syntax's delimiters
    pub fn escape(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + text.len() / 16);
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match (self, c) {
                (_, '\\') => out.push_str("\\\\"),
                (Self::Rust, '"') => out.push_str("\\\""),
                (_, '\r') => out.push_str("\\r"),
                (Self::Template, '`') => out.push_str("\\`"),
                (Self::Template, '$') if chars.peek() == Some(&'{') => out.push_str("\\$"),
                _ => out.push(c),
            }
        }
        out
    }

    /// Exact inverse of [`EmbedSyntax::escape`]
    pub fn unescape(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match (self, chars.next()) {
                (_, Some('\\')) => out.push('\\'),
                (Self::Rust, Some('"')) => out.push('"'),
                (_, Some('r')) => out.push('\r'),
                (Self::Template, Some('`')) => out.push('`'),
                (Self::Template, Some('$')) => out.push('$'),
                (_, Some(other)) => {
                    out.push('\\');
                    out.push(other);
                }
                (_, None) => out.push('\\'),
            }
        }
        out
    }

    fn constant(&self, constant: &str, escaped: &str) -> String {
        match self {
            Self::Rust => format!("\nconst {}: &str = \"{}\";\n", constant, escaped),
            Self::Template => format!("\nconst {} = `{}`;\n", constant, escaped),
        }
    }

    fn entry(&self, name: &str, constant: &str) -> String {
        match self {
            Self::Rust => format!("    (\"{}\", {}),\n", name, constant),
            Self::Template => format!("  \"{}\": {},\n", name, constant),
        }
    }

    fn patterns(&self) -> Result<Patterns> {
        let (constant, registry, terminal, entry, import) = match self {
            Self::Rust => (
                r#"(?m)^[ \t]*(?:pub(?:\([^)]*\))?\s+)?const\s+(M[0-9A-Z_]+)\s*:\s*&(?:'static\s+)?str\s*=\s*""#,
                r"(?m)^[ \t]*(?:pub(?:\([^)]*\))?\s+)?(?:const|static)\s+UNITS\s*:[^=]*=\s*&\[[ \t]*$",
                r"(?m)^[ \t]*\];",
                r#"(?m)^[ \t]*\(\s*"([^"]+)"\s*,\s*([A-Za-z0-9_]+)\s*\)"#,
                r"(?m)^use\s[^;]*;[ \t]*$",
            ),
            Self::Template => (
                r"(?m)^[ \t]*(?:export\s+)?const\s+(M[0-9A-Z_]+)\s*(?::\s*string\s*)?=\s*`",
                r"(?m)^[ \t]*(?:export\s+)?const\s+MIGRATIONS\s*(?::[^=]*)?=\s*\{[ \t]*$",
                r"(?m)^[ \t]*\};",
                r#"(?m)^[ \t]*"([^"]+)"\s*:\s*([A-Za-z0-9_]+)"#,
                r"(?m)^import\s[^;]*;[ \t]*$",
            ),
        };

        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| Error::Other(format!("bad embed pattern: {}", e)))
        };

        Ok(Patterns {
            constant: compile(constant)?,
            registry: compile(registry)?,
            terminal: compile(terminal)?,
            entry: compile(entry)?,
            import: compile(import)?,
            marker: compile(&format!(r"(?m)^[ \t]*{}[ \t]*$", regex::escape(CONSTANTS_MARKER)))?,
        })
    }
}

struct Patterns {
    constant: Regex,
    registry: Regex,
    terminal: Regex,
    entry: Regex,
    import: Regex,
    marker: Regex,
}

/// Constant identifier for a unit name: `001_init-db` -> `M001_INIT_DB`
pub fn constant_name(unit_name: &str) -> String {
    let mut name = String::with_capacity(unit_name.len() + 1);
    name.push('M');
    name.extend(unit_name.chars().map(|c| {
        if c.is_ascii_alphanumeric() {
            c.to_ascii_uppercase()
        } else {
            '_'
        }
    }));
    name
}

/// What to embed and where
#[derive(Debug, Clone)]
pub struct EmbedRequest {
    /// Candidate unit names, in the order they should be registered
    pub names: Vec<String>,
    /// Directory holding `<name>.sql`
    pub source_dir: Option<PathBuf>,
    pub target: PathBuf,
    pub syntax: EmbedSyntax,
}

/// Outcome of a successful embed run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EmbedReport {
    pub embedded: Vec<String>,
    /// Candidates whose source file was missing
    pub skipped: Vec<String>,
}

/// What the target already contains
#[derive(Debug, Default)]
struct TargetLayout {
    constants: HashSet<String>,
    /// Byte offset just past the last embedded constant's line
    last_constant_end: Option<usize>,
    registered: HashSet<String>,
    max_sequence: Option<u32>,
    /// Byte offset of the line holding the registry's terminal marker
    terminal: usize,
}

/// Index just past the closing delimiter of a literal whose body starts at
/// `start`
fn literal_end(text: &str, start: usize, delimiter: char) -> Option<usize> {
    let mut chars = text[start..].char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '\\' {
            chars.next();
        } else if c == delimiter {
            return Some(start + i + c.len_utf8());
        }
    }
    None
}

/// Index just past the newline ending the line that contains `pos`
fn line_end(text: &str, pos: usize) -> usize {
    text[pos..].find('\n').map(|i| pos + i + 1).unwrap_or(text.len())
}

fn scan(text: &str, syntax: EmbedSyntax, patterns: &Patterns) -> Result<TargetLayout> {
    let mut layout = TargetLayout::default();
    let mut literals: Vec<(usize, usize)> = Vec::new();

    let mut pos = 0;
    while let Some(caps) = patterns.constant.captures_at(text, pos) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let close = literal_end(text, whole.end(), syntax.delimiter()).ok_or_else(|| {
            Error::validation(format!("unterminated literal for constant {}", name.as_str()))
        })?;
        if !text[close..].trim_start_matches([' ', '\t']).starts_with(';') {
            return Err(Error::validation(format!(
                "constant {} is not terminated by ';'",
                name.as_str()
            )));
        }

        literals.push((whole.end(), close));
        layout.constants.insert(name.as_str().to_string());
        if let Some(seq) = name.as_str()[1..]
            .split('_')
            .next()
            .and_then(|digits| digits.parse::<u32>().ok())
        {
            layout.max_sequence = layout.max_sequence.max(Some(seq));
        }

        pos = line_end(text, close);
        layout.last_constant_end = Some(pos);
    }

    let inside_literal = |at: usize| literals.iter().any(|&(s, e)| at >= s && at < e);

    let registry = patterns
        .registry
        .find_iter(text)
        .find(|m| !inside_literal(m.start()))
        .ok_or_else(|| Error::RegistryNotFound("no registration list in target".to_string()))?;
    let terminal = patterns
        .terminal
        .find_at(text, registry.end())
        .ok_or_else(|| {
            Error::RegistryNotFound("registration list has no terminal marker".to_string())
        })?;
    layout.terminal = terminal.start();

    for caps in patterns.entry.captures_iter(&text[registry.end()..terminal.start()]) {
        let name = &caps[1];
        if let Ok(seq) = parse_sequence(name) {
            layout.max_sequence = layout.max_sequence.max(Some(seq));
        }
        layout.registered.insert(name.to_string());
    }

    Ok(layout)
}

/// Where new constants go: after the last constant, else after the
/// explicit marker, else after the last import line
fn anchor(text: &str, layout: &TargetLayout, patterns: &Patterns) -> Result<usize> {
    if let Some(end) = layout.last_constant_end {
        return Ok(end);
    }
    if let Some(m) = patterns.marker.find(text) {
        return Ok(line_end(text, m.end()));
    }
    if let Some(m) = patterns.import.find_iter(text).last() {
        return Ok(line_end(text, m.end()));
    }
    Err(Error::AnchorNotFound(
        "no embedded constant, constants marker or import line in target".to_string(),
    ))
}

/// Check the candidate list on its own: valid names, no repeats,
/// strictly increasing sequences
fn check_candidates(names: &[String]) -> Result<Vec<u32>> {
    let mut seen = HashSet::new();
    let mut sequences = Vec::with_capacity(names.len());
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(Error::DuplicateUnit(format!("'{}' is listed twice", name)));
        }
        let seq = parse_sequence(name)?;
        if let Some(&prev) = sequences.last() {
            if seq <= prev {
                return Err(Error::validation(format!(
                    "'{}' breaks ascending order (sequence {} after {})",
                    name, seq, prev
                )));
            }
        }
        sequences.push(seq);
    }
    Ok(sequences)
}

/// Insert `text` pieces at byte offsets, highest offset first
fn splice(original: &str, mut inserts: Vec<(usize, String)>) -> String {
    inserts.sort_by(|a, b| b.0.cmp(&a.0));
    let mut out = original.to_string();
    for (at, piece) in inserts {
        out.insert_str(at, &piece);
    }
    out
}

fn write_atomically(target: &Path, content: &str) -> Result<()> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.persist(target).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Embed the requested units into the target artifact
pub fn embed(request: &EmbedRequest) -> Result<EmbedReport> {
    let source_dir = request
        .source_dir
        .as_deref()
        .ok_or_else(|| Error::config("no SQL source directory configured"))?;
    if !source_dir.is_dir() {
        return Err(Error::config(format!(
            "SQL source directory {} does not exist",
            source_dir.display()
        )));
    }
    if !request.target.is_file() {
        return Err(Error::config(format!(
            "target artifact {} does not exist",
            request.target.display()
        )));
    }
    if request.names.is_empty() {
        return Err(Error::validation("no unit names given"));
    }

    let syntax = request.syntax;
    let patterns = syntax.patterns()?;
    let sequences = check_candidates(&request.names)?;

    let original = std::fs::read_to_string(&request.target)?;
    let layout = scan(&original, syntax, &patterns)?;
    let anchor = anchor(&original, &layout, &patterns)?;

    for (name, seq) in request.names.iter().zip(&sequences) {
        let constant = constant_name(name);
        if layout.registered.contains(name) || layout.constants.contains(&constant) {
            return Err(Error::DuplicateUnit(format!(
                "'{}' is already embedded in {}",
                name,
                request.target.display()
            )));
        }
        if let Some(max) = layout.max_sequence {
            if *seq <= max {
                return Err(Error::validation(format!(
                    "'{}' must come after sequence {} already in the target",
                    name, max
                )));
            }
        }
    }

    let mut report = EmbedReport::default();
    let mut constants = String::new();
    let mut entries = String::new();

    for name in &request.names {
        let path = source_dir.join(format!("{}.sql", name));
        if !path.is_file() {
            warn!(unit = %name, path = %path.display(), "source file missing, skipping unit");
            report.skipped.push(name.clone());
            continue;
        }
        let sql = std::fs::read_to_string(&path)?;
        let constant = constant_name(name);
        constants.push_str(&syntax.constant(&constant, &syntax.escape(&sql)));
        entries.push_str(&syntax.entry(name, &constant));
        report.embedded.push(name.clone());
    }

    if report.embedded.is_empty() {
        warn!(artifact = %request.target.display(), "nothing to embed");
        return Ok(report);
    }

    // Make sure the anchor line ends with a newline before appending after it
    let mut inserts = Vec::with_capacity(2);
    if anchor == original.len() && !original.ends_with('\n') {
        constants.insert(0, '\n');
    }
    inserts.push((anchor, constants));
    inserts.push((layout.terminal, entries));
    let updated = splice(&original, inserts);

    // The registry must still close after the insertion
    let check = scan(&updated, syntax, &patterns)?;
    if let Some(missing) = report.embedded.iter().find(|n| !check.registered.contains(*n)) {
        return Err(Error::RegistryNotFound(format!(
            "entry for '{}' did not land inside the registration list",
            missing
        )));
    }

    write_atomically(&request.target, &updated)?;
    info!(
        artifact = %request.target.display(),
        embedded = report.embedded.len(),
        skipped = report.skipped.len(),
        "units embedded"
    );
    Ok(report)
}
