//! Line classifier.
//!
//! Control files are line oriented: `Command == Value ! comment`. A line is
//! classified once into a [`Line`], which carries the split text, the block
//! [`Directive`] it represents (if any) and the predicates the block tracker
//! needs.

use crate::ast::{ControlFileKind, StatementKind};
use crate::scope::ScopeKind;

/// Settings that influence how lines are split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningConfig {
    /// Characters that start a trailing comment.
    pub comment_chars: Vec<char>,
}

impl Default for RunningConfig {
    fn default() -> Self {
        RunningConfig {
            comment_chars: vec!['!', '#'],
        }
    }
}

/// Which close line ends a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    EndIf,
    EndDefine,
    EndDomain,
}

impl CloseKind {
    pub fn for_kind(kind: ScopeKind) -> Option<CloseKind> {
        match kind {
            ScopeKind::Scenario | ScopeKind::Event | ScopeKind::Variable => Some(CloseKind::EndIf),
            ScopeKind::EventVariable | ScopeKind::OutputZone | ScopeKind::ControlBlock => {
                Some(CloseKind::EndDefine)
            }
            ScopeKind::OneDimDomain => Some(CloseKind::EndDomain),
            ScopeKind::Global => None,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            CloseKind::EndIf => "End If",
            CloseKind::EndDefine => "End Define",
            CloseKind::EndDomain => "End 1D Domain",
        }
    }
}

/// Block structure carried by a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// An ordinary statement line.
    None,
    Open {
        kind: ScopeKind,
        names: String,
        qualifier: Option<String>,
    },
    ElseIf {
        kind: ScopeKind,
        names: String,
        qualifier: Option<String>,
    },
    Else,
    Close(CloseKind),
    /// Looks like a header but cannot be interpreted.
    Malformed(String),
}

/// One classified source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    /// The line without indentation or trailing whitespace.
    pub text: String,
    pub command: Option<String>,
    pub value: Option<String>,
    pub comment: Option<String>,
    directive: Directive,
}

/// Splits one line of text into a [`Line`].
pub trait LineParser {
    fn classify(&self, line: &str, config: &RunningConfig) -> Line;
}

/// The `Command == Value ! comment` classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultLineParser;

impl LineParser for DefaultLineParser {
    fn classify(&self, line: &str, config: &RunningConfig) -> Line {
        let text = line.trim().to_owned();
        let marker = text
            .char_indices()
            .find(|(_, c)| config.comment_chars.contains(c));
        let (body, comment) = match marker {
            Some((i, ch)) => {
                let c = text[i + ch.len_utf8()..].trim();
                (&text[..i], Some(c.to_owned()))
            }
            None => (text.as_str(), None),
        };
        let (command, value) = match body.find("==") {
            Some(i) => {
                let v = body[i + 2..].trim();
                (body[..i].trim(), (!v.is_empty()).then(|| v.to_owned()))
            }
            None => (body.trim(), None),
        };
        let command = (!command.is_empty()).then(|| command.to_owned());
        let directive = match &command {
            Some(c) => directive_for(c, value.as_deref()),
            None => Directive::None,
        };
        Line {
            text,
            command,
            value,
            comment,
            directive,
        }
    }
}

/// Lower-cased command with whitespace runs collapsed.
pub fn command_key(command: &str) -> String {
    command
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

/// Parse the kind part of `If ...` / `Else If ...`.
fn conditional(rest: &str, value: Option<&str>) -> Result<(ScopeKind, Option<String>), String> {
    let words: Vec<&str> = rest.split_whitespace().collect();
    let (kind, qualifier) = match words.as_slice() {
        [w] if w.eq_ignore_ascii_case("scenario") => (ScopeKind::Scenario, None),
        [w] if w.eq_ignore_ascii_case("event") => (ScopeKind::Event, None),
        [w, name] if w.eq_ignore_ascii_case("variable") => {
            (ScopeKind::Variable, Some((*name).to_owned()))
        }
        _ => return Err(format!("unknown conditional '{}'", rest.trim())),
    };
    if value.is_none() {
        return Err(format!("'{}' block has no names", kind));
    }
    Ok((kind, qualifier))
}

fn directive_for(command: &str, value: Option<&str>) -> Directive {
    let key = command_key(command);
    let words: Vec<&str> = command.split_whitespace().collect();
    let names = || value.unwrap_or("").to_owned();

    match key.as_str() {
        "else" => return Directive::Else,
        "end if" => return Directive::Close(CloseKind::EndIf),
        "end define" => return Directive::Close(CloseKind::EndDefine),
        "end 1d domain" => return Directive::Close(CloseKind::EndDomain),
        "start 1d domain" => {
            return Directive::Open {
                kind: ScopeKind::OneDimDomain,
                names: String::new(),
                qualifier: None,
            }
        }
        _ => {}
    }

    if key.starts_with("else if ") {
        let rest = words[2..].join(" ");
        return match conditional(&rest, value) {
            Ok((kind, qualifier)) => Directive::ElseIf {
                kind,
                names: names(),
                qualifier,
            },
            Err(msg) => Directive::Malformed(msg),
        };
    }
    if key.starts_with("if ") {
        let rest = words[1..].join(" ");
        return match conditional(&rest, value) {
            Ok((kind, qualifier)) => Directive::Open {
                kind,
                names: names(),
                qualifier,
            },
            Err(msg) => Directive::Malformed(msg),
        };
    }
    if key.starts_with("define ") {
        if value.is_none() {
            return Directive::Malformed(format!("'{}' block has no name", command.trim()));
        }
        let label = words[1..].join(" ");
        let (kind, qualifier) = match key.as_str() {
            "define event" => (ScopeKind::EventVariable, None),
            "define output zone" | "define map output zone" => (ScopeKind::OutputZone, None),
            _ => (ScopeKind::ControlBlock, Some(label)),
        };
        return Directive::Open {
            kind,
            names: names(),
            qualifier,
        };
    }
    Directive::None
}

const FOLDER_COMMANDS: &[&str] = &["output folder", "write check files", "log folder"];

impl Line {
    pub fn directive(&self) -> &Directive {
        &self.directive
    }

    pub fn opens_conditional(&self) -> bool {
        matches!(self.directive, Directive::Open { .. })
    }

    pub fn closes_conditional(&self) -> bool {
        matches!(self.directive, Directive::Close(_))
    }

    pub fn is_else(&self) -> bool {
        self.directive == Directive::Else
    }

    pub fn is_else_if(&self) -> bool {
        matches!(self.directive, Directive::ElseIf { .. })
    }

    /// True for every line that is part of block structure rather than content.
    pub fn is_header(&self) -> bool {
        self.directive != Directive::None
    }

    /// Kind of the block this line opens or branches.
    pub fn block_kind(&self) -> Option<ScopeKind> {
        match &self.directive {
            Directive::Open { kind, .. } | Directive::ElseIf { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.is_empty()
    }

    pub fn is_variable_assignment(&self) -> bool {
        self.parse_variable().is_some()
    }

    /// `Set Variable NAME == value` → `(NAME, value)`.
    pub fn parse_variable(&self) -> Option<(String, String)> {
        let command = self.command.as_deref()?;
        let words: Vec<&str> = command.split_whitespace().collect();
        match words.as_slice() {
            [set, variable, name]
                if set.eq_ignore_ascii_case("set") && variable.eq_ignore_ascii_case("variable") =>
            {
                Some(((*name).to_owned(), self.value.clone().unwrap_or_default()))
            }
            _ => None,
        }
    }

    /// The statement class of a non-header line.
    pub fn statement_kind(&self) -> StatementKind {
        let Some(command) = self.command.as_deref() else {
            return if self.comment.is_some() {
                StatementKind::Comment
            } else {
                StatementKind::Blank
            };
        };
        let key = command_key(command);
        let value = self.value.as_deref().unwrap_or("").trim().to_ascii_lowercase();

        if let Some(kind) = ControlFileKind::from_command(&key) {
            if kind != ControlFileKind::Trd || value.ends_with(".trd") {
                return StatementKind::ControlFileReference(kind);
            }
            return StatementKind::Setting;
        }
        if key.contains("database")
            || ((key == "read materials file" || key == "read soils file")
                && (value.ends_with(".csv") || value.ends_with(".tsoilf")))
        {
            return StatementKind::DatabaseReference;
        }
        if key.starts_with("read gis") || key.starts_with("read mi") {
            return StatementKind::GisReference;
        }
        if key.starts_with("read grid") || key.starts_with("read tin") {
            return StatementKind::GridReference;
        }
        if FOLDER_COMMANDS.contains(&key.as_str()) {
            return StatementKind::FolderReference;
        }
        StatementKind::Setting
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Line {
        DefaultLineParser.classify(text, &RunningConfig::default())
    }

    #[test]
    fn splits_command_value_comment() {
        let l = classify("  Cell Size  ==  5   ! metres ");
        assert_eq!(l.text, "Cell Size  ==  5   ! metres");
        assert_eq!(l.command.as_deref(), Some("Cell Size"));
        assert_eq!(l.value.as_deref(), Some("5"));
        assert_eq!(l.comment.as_deref(), Some("metres"));
        assert_eq!(l.statement_kind(), StatementKind::Setting);
    }

    #[test]
    fn hash_starts_comment_too() {
        let l = classify("# just a note");
        assert!(l.command.is_none());
        assert_eq!(l.statement_kind(), StatementKind::Comment);
        assert_eq!(classify("   ").statement_kind(), StatementKind::Blank);
    }

    #[test]
    fn multibyte_comment_marker() {
        let config = RunningConfig {
            comment_chars: vec!['§'],
        };
        let l = DefaultLineParser.classify("Timestep == 2 §note", &config);
        assert_eq!(l.value.as_deref(), Some("2"));
        assert_eq!(l.comment.as_deref(), Some("note"));
    }

    #[test]
    fn if_headers_are_case_insensitive() {
        let l = classify("if  SCENARIO == D01 | D02");
        assert!(l.opens_conditional());
        assert_eq!(l.block_kind(), Some(ScopeKind::Scenario));
        match l.directive() {
            Directive::Open { names, .. } => assert_eq!(names, "D01 | D02"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn else_if_and_else() {
        let l = classify("Else If Event == Q100");
        assert!(l.is_else_if());
        assert_eq!(l.block_kind(), Some(ScopeKind::Event));
        assert!(classify("ELSE ! fallback").is_else());
        assert!(classify("End If").closes_conditional());
    }

    #[test]
    fn variable_condition_keeps_name() {
        let l = classify("If Variable Cell_Size == 5");
        assert_eq!(
            l.directive(),
            &Directive::Open {
                kind: ScopeKind::Variable,
                names: "5".into(),
                qualifier: Some("Cell_Size".into()),
            }
        );
    }

    #[test]
    fn define_blocks() {
        assert_eq!(
            classify("Define Event == Q100").block_kind(),
            Some(ScopeKind::EventVariable)
        );
        assert_eq!(
            classify("Define Map Output Zone == Z1").block_kind(),
            Some(ScopeKind::OutputZone)
        );
        match classify("Define Pipe Network == Main").directive() {
            Directive::Open {
                kind: ScopeKind::ControlBlock,
                qualifier,
                ..
            } => assert_eq!(qualifier.as_deref(), Some("Pipe Network")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            classify("End Define").directive(),
            &Directive::Close(CloseKind::EndDefine)
        );
    }

    #[test]
    fn one_dim_domain() {
        let open = classify("Start 1D Domain");
        assert_eq!(open.block_kind(), Some(ScopeKind::OneDimDomain));
        assert_eq!(
            classify("end 1d domain").directive(),
            &Directive::Close(CloseKind::EndDomain)
        );
    }

    #[test]
    fn malformed_headers() {
        assert!(matches!(
            classify("If Weather == Rain").directive(),
            Directive::Malformed(_)
        ));
        assert!(matches!(
            classify("If Scenario ==").directive(),
            Directive::Malformed(_)
        ));
    }

    #[test]
    fn variable_assignment() {
        let l = classify("Set Variable EVT == 100yr");
        assert!(l.is_variable_assignment());
        assert_eq!(l.parse_variable(), Some(("EVT".into(), "100yr".into())));
        assert!(!classify("Set IWL == 0.5").is_variable_assignment());
    }

    #[test]
    fn statement_kinds() {
        assert_eq!(
            classify("Geometry Control File == ..\\model\\m.tgc").statement_kind(),
            StatementKind::ControlFileReference(ControlFileKind::Tgc)
        );
        assert_eq!(
            classify("Read File == common.trd").statement_kind(),
            StatementKind::ControlFileReference(ControlFileKind::Trd)
        );
        assert_eq!(
            classify("Read File == input.csv").statement_kind(),
            StatementKind::Setting
        );
        assert_eq!(
            classify("BC Database == bc_dbase.csv").statement_kind(),
            StatementKind::DatabaseReference
        );
        assert_eq!(
            classify("Read Materials File == materials.csv").statement_kind(),
            StatementKind::DatabaseReference
        );
        assert_eq!(
            classify("Read GIS Code == gis\\2d_code_R.shp").statement_kind(),
            StatementKind::GisReference
        );
        assert_eq!(
            classify("Read Grid Zpts == grid\\dem.tif").statement_kind(),
            StatementKind::GridReference
        );
        assert_eq!(
            classify("Output Folder == ..\\results\\").statement_kind(),
            StatementKind::FolderReference
        );
    }
}
