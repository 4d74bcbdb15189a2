//! Line classification.
//!
//! Each physical line becomes one [`Statement`]: comment, keyword statement
//! or end-of-file. The keyword table decides which block kinds a keyword may
//! appear in, whether it takes a domain qualifier, and which block kind it
//! defines.

use std::fmt;
use std::ops::BitOr;

use ctp_ir::diag::{Exception, ExceptionList, SourceLocation};
use ctp_ir::domain::{DomainBitmap, DomainKind, DomainTable};

// ── Block kinds ──────────────────────────────────────────────────────

/// Set of block kinds, one bit per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BlockKinds(u8);

impl BlockKinds {
    pub const NONE: BlockKinds = BlockKinds(0);
    pub const DIRECTIVE: BlockKinds = BlockKinds(1 << 0);
    pub const OFFSET: BlockKinds = BlockKinds(1 << 1);
    pub const SINE: BlockKinds = BlockKinds(1 << 2);
    pub const CURVE: BlockKinds = BlockKinds(1 << 3);
    pub const TRIAL: BlockKinds = BlockKinds(1 << 4);
    pub const DEFINITIONS: BlockKinds = BlockKinds(0b1_1110);

    pub fn contains(self, other: BlockKinds) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    fn names(self) -> Vec<&'static str> {
        [
            (BlockKinds::DIRECTIVE, "directive"),
            (BlockKinds::OFFSET, "offset"),
            (BlockKinds::SINE, "sine"),
            (BlockKinds::CURVE, "curve"),
            (BlockKinds::TRIAL, "trial"),
        ]
        .iter()
        .filter(|(kind, _)| self.contains(*kind))
        .map(|&(_, name)| name)
        .collect()
    }
}

impl BitOr for BlockKinds {
    type Output = BlockKinds;

    fn bitor(self, rhs: Self) -> Self {
        BlockKinds(self.0 | rhs.0)
    }
}

impl fmt::Display for BlockKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&self.names().join("|"))
    }
}

// ── Keyword table ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Include,
    DryRun,
    Name,
    Freq,
    Volt,
    Source,
    Flags,
    Alpha,
    Beta,
    Gamma,
    Omega,
    Iterations,
    Vflwrve,
    Test,
    RmApi,
    Tolerance,
    Order,
    Seed,
    Begin,
    End,
    Enable,
    Disable,
    RamType,
    Prune,
}

/// Which domains a qualifier may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainClass {
    /// Clock or link-speed domains.
    Clock,
    Voltage,
}

impl DomainClass {
    fn admits(self, kind: DomainKind) -> bool {
        match self {
            DomainClass::Clock => kind.is_clock(),
            DomainClass::Voltage => kind == DomainKind::Voltage,
        }
    }
}

impl fmt::Display for DomainClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainClass::Clock => f.write_str("clock"),
            DomainClass::Voltage => f.write_str("voltage"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainRule {
    Forbidden,
    Required(DomainClass),
    Optional(DomainClass),
}

#[derive(Debug, Clone, Copy)]
pub struct KeywordInfo {
    pub keyword: Keyword,
    pub name: &'static str,
    pub domain: DomainRule,
    /// Block kinds the keyword may appear in.
    pub valid_in: BlockKinds,
    /// Block kind the keyword pins down; empty for keywords shared by
    /// several kinds.
    pub defines: BlockKinds,
    /// Closes the running block and opens a new one.
    pub starts_block: bool,
}

impl KeywordInfo {
    pub fn is_directive(&self) -> bool {
        self.valid_in == BlockKinds::DIRECTIVE
    }
}

const fn kw(
    keyword: Keyword,
    name: &'static str,
    domain: DomainRule,
    valid_in: BlockKinds,
    defines: BlockKinds,
    starts_block: bool,
) -> KeywordInfo {
    KeywordInfo {
        keyword,
        name,
        domain,
        valid_in,
        defines,
        starts_block,
    }
}

const CLOCK: DomainRule = DomainRule::Required(DomainClass::Clock);
const NONE: DomainRule = DomainRule::Forbidden;
const SOURCES: BlockKinds = BlockKinds(0b0_1110);

pub const KEYWORDS: &[KeywordInfo] = &[
    kw(Keyword::Include, "include", NONE, BlockKinds::DIRECTIVE, BlockKinds::DIRECTIVE, true),
    kw(Keyword::DryRun, "dryrun", NONE, BlockKinds::DIRECTIVE, BlockKinds::DIRECTIVE, true),
    kw(Keyword::Name, "name", NONE, BlockKinds::DEFINITIONS, BlockKinds::NONE, true),
    kw(Keyword::Freq, "freq", CLOCK, BlockKinds::OFFSET, BlockKinds::OFFSET, false),
    kw(
        Keyword::Volt,
        "volt",
        DomainRule::Required(DomainClass::Voltage),
        BlockKinds::OFFSET,
        BlockKinds::OFFSET,
        false,
    ),
    kw(Keyword::Source, "source", CLOCK, SOURCES, BlockKinds::NONE, false),
    kw(Keyword::Flags, "flags", CLOCK, SOURCES, BlockKinds::NONE, false),
    kw(Keyword::Alpha, "alpha", CLOCK, BlockKinds::SINE, BlockKinds::SINE, false),
    kw(Keyword::Beta, "beta", CLOCK, BlockKinds::SINE, BlockKinds::SINE, false),
    kw(Keyword::Gamma, "gamma", CLOCK, BlockKinds::SINE, BlockKinds::SINE, false),
    kw(Keyword::Omega, "omega", CLOCK, BlockKinds::SINE, BlockKinds::SINE, false),
    kw(Keyword::Iterations, "iterations", NONE, BlockKinds::SINE, BlockKinds::SINE, false),
    kw(Keyword::Vflwrve, "vflwrve", CLOCK, BlockKinds::CURVE, BlockKinds::CURVE, false),
    kw(Keyword::Test, "test", NONE, BlockKinds::TRIAL, BlockKinds::TRIAL, false),
    kw(Keyword::RmApi, "rmapi", NONE, BlockKinds::TRIAL, BlockKinds::TRIAL, false),
    kw(
        Keyword::Tolerance,
        "tolerance",
        DomainRule::Optional(DomainClass::Clock),
        BlockKinds::TRIAL,
        BlockKinds::TRIAL,
        false,
    ),
    kw(Keyword::Order, "order", NONE, BlockKinds::TRIAL, BlockKinds::TRIAL, false),
    kw(Keyword::Seed, "seed", NONE, BlockKinds::TRIAL, BlockKinds::TRIAL, false),
    kw(Keyword::Begin, "begin", NONE, BlockKinds::TRIAL, BlockKinds::TRIAL, false),
    kw(Keyword::End, "end", NONE, BlockKinds::TRIAL, BlockKinds::TRIAL, false),
    kw(Keyword::Enable, "enable", NONE, BlockKinds::TRIAL, BlockKinds::TRIAL, false),
    kw(Keyword::Disable, "disable", NONE, BlockKinds::TRIAL, BlockKinds::TRIAL, false),
    kw(Keyword::RamType, "ramtype", NONE, BlockKinds::TRIAL, BlockKinds::TRIAL, false),
    kw(Keyword::Prune, "prune", NONE, BlockKinds::TRIAL, BlockKinds::TRIAL, false),
];

pub fn lookup_keyword(name: &str) -> Option<&'static KeywordInfo> {
    KEYWORDS.iter().find(|info| info.name == name)
}

pub fn keyword_info(keyword: Keyword) -> &'static KeywordInfo {
    // Every variant has a row.
    match KEYWORDS.iter().find(|info| info.keyword == keyword) {
        Some(info) => info,
        None => unreachable!("keyword {keyword:?} missing from table"),
    }
}

// ── Statements ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Comment,
    Keyword(Keyword),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub domains: DomainBitmap,
    pub value: String,
    pub location: SourceLocation,
}

impl Statement {
    fn bare(kind: StatementKind, location: SourceLocation) -> Self {
        Self {
            kind,
            domains: DomainBitmap::EMPTY,
            value: String::new(),
            location,
        }
    }

    pub fn info(&self) -> Option<&'static KeywordInfo> {
        match self.kind {
            StatementKind::Keyword(keyword) => Some(keyword_info(keyword)),
            _ => None,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == StatementKind::Eof
    }

    /// True for statements that close the running block.
    pub fn starts_block(&self) -> bool {
        match self.kind {
            StatementKind::Eof => true,
            StatementKind::Comment => false,
            StatementKind::Keyword(_) => self.info().is_some_and(|i| i.starts_block),
        }
    }
}

/// Turns lines into statements against a domain table.
#[derive(Debug, Clone, Copy)]
pub struct Classifier<'a> {
    domains: &'a DomainTable,
}

impl<'a> Classifier<'a> {
    pub fn new(domains: &'a DomainTable) -> Self {
        Self { domains }
    }

    pub fn classify(&self, line: &str, location: SourceLocation) -> Result<Statement, Exception> {
        let text = line.trim();
        if text.is_empty() || text.starts_with('#') {
            return Ok(Statement::bare(StatementKind::Comment, location));
        }
        let text = text.to_lowercase();

        let (lhs, value, has_equals) = match text.split_once('=') {
            Some((lhs, value)) => (lhs.trim(), value.trim(), true),
            None => match text.split_once(char::is_whitespace) {
                Some((lhs, value)) => (lhs.trim(), value.trim(), false),
                None => (text.as_str(), "", false),
            },
        };

        let (qualifier, keyword) = match lhs.rsplit_once('.') {
            Some((qualifier, keyword)) => (Some(qualifier.trim()), keyword.trim()),
            None => (None, lhs),
        };

        let syntax = |message: String| Exception::syntax(message).at(location.clone());

        let info = lookup_keyword(keyword)
            .ok_or_else(|| syntax(format!("unknown keyword '{keyword}'")))?;

        if !has_equals && !info.is_directive() {
            return Err(syntax(format!("missing '=' after '{}'", info.name)));
        }

        let domains = match (info.domain, qualifier) {
            (DomainRule::Forbidden, Some(q)) => {
                return Err(syntax(format!(
                    "'{}' does not take a domain qualifier ('{q}')",
                    info.name
                )));
            }
            (DomainRule::Required(class), None) => {
                return Err(syntax(format!(
                    "'{}' requires a {class} domain qualifier",
                    info.name
                )));
            }
            (DomainRule::Forbidden, None) | (DomainRule::Optional(_), None) => DomainBitmap::EMPTY,
            (DomainRule::Required(class), Some(q)) | (DomainRule::Optional(class), Some(q)) => {
                self.qualifier(q, class, info).map_err(syntax)?
            }
        };

        Ok(Statement {
            kind: StatementKind::Keyword(info.keyword),
            domains,
            value: value.to_string(),
            location,
        })
    }

    fn qualifier(
        &self,
        text: &str,
        class: DomainClass,
        info: &KeywordInfo,
    ) -> Result<DomainBitmap, String> {
        let domains = self.domains.parse_list(text)?;
        for domain in domains.iter() {
            let admitted = self
                .domains
                .kind(domain)
                .is_some_and(|kind| class.admits(kind));
            if !admitted {
                return Err(format!(
                    "'{}' requires a {class} domain, '{}' is not one",
                    info.name,
                    self.domains.name(domain)
                ));
            }
        }
        Ok(domains)
    }
}

/// Statement cursor over one file. Past the last line it yields `Eof`
/// forever.
pub struct StatementStream<'a> {
    classifier: Classifier<'a>,
    file: String,
    lines: std::vec::IntoIter<String>,
    line: u32,
}

impl<'a> StatementStream<'a> {
    pub fn new(classifier: Classifier<'a>, file: impl Into<String>, text: &str) -> Self {
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        Self {
            classifier,
            file: file.into(),
            lines: lines.into_iter(),
            line: 0,
        }
    }

    /// Next classified statement. Lines that fail classification are
    /// recorded in `diags` and skipped.
    pub fn next_statement(&mut self, diags: &mut ExceptionList) -> Statement {
        loop {
            let Some(line) = self.lines.next() else {
                return Statement::bare(
                    StatementKind::Eof,
                    SourceLocation::new(self.file.clone(), self.line + 1),
                );
            };
            self.line += 1;
            let location = SourceLocation::new(self.file.clone(), self.line);
            match self.classifier.classify(&line, location) {
                Ok(statement) if statement.kind == StatementKind::Comment => continue,
                Ok(statement) => return statement,
                Err(e) => {
                    e.emit();
                    diags.push(e);
                }
            }
        }
    }
}
