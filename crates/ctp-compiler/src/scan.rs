//! Group scanning.
//!
//! A scan reads one file, compiles its blocks into the [`Profile`] and
//! follows `include` directives depth-first. A group is scanned at most
//! once. Any fatal diagnostic stops the whole scan.

use std::collections::HashSet;

use ctp_ir::diag::{Exception, ExceptionList, ResultCode, SourceLocation};

use crate::block::BlockAssembler;
use crate::compile::{compile_block, Compiled, Directive, Profile};
use crate::discovery::{DiscoveryError, FileLocator};
use crate::field::ParseContext;
use crate::statement::{Classifier, StatementStream};

pub struct Scanner<'a> {
    ctx: ParseContext<'a>,
    locator: Option<&'a FileLocator>,
    scanned: HashSet<String>,
    profile: Profile,
}

impl<'a> Scanner<'a> {
    pub fn new(ctx: ParseContext<'a>) -> Self {
        Self {
            ctx,
            locator: None,
            scanned: HashSet::new(),
            profile: Profile::new(),
        }
    }

    /// Enable `include` resolution through `locator`.
    pub fn with_locator(mut self, locator: &'a FileLocator) -> Self {
        self.locator = Some(locator);
        self
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn into_profile(self) -> Profile {
        self.profile
    }

    /// Locate and scan a group. A missing group is fatal when `required`,
    /// otherwise it is skipped.
    pub fn scan_group(
        &mut self,
        group: &str,
        required: bool,
        diags: &mut ExceptionList,
    ) -> Result<(), Exception> {
        self.scan_group_from(group, required, None, diags)
    }

    fn scan_group_from(
        &mut self,
        group: &str,
        required: bool,
        origin: Option<&SourceLocation>,
        diags: &mut ExceptionList,
    ) -> Result<(), Exception> {
        let group = group.trim().to_lowercase();
        if self.scanned.contains(&group) {
            tracing::debug!(group = %group, "group already scanned");
            return Ok(());
        }

        let Some(locator) = self.locator else {
            let e = Exception::fatal(format!(
                "cannot resolve group '{group}': no file locator configured"
            ))
            .with_code(ResultCode::FileNotFound);
            return Err(fatal(diags, e, origin));
        };

        let path = match locator.locate(&group) {
            Ok(path) => path,
            Err(DiscoveryError::NotFound { .. }) if !required => {
                tracing::debug!(group = %group, "optional group not found");
                return Ok(());
            }
            Err(e) => {
                let e = Exception::fatal(e.to_string()).with_code(ResultCode::FileNotFound);
                return Err(fatal(diags, e, origin));
            }
        };

        let text = locator.read(&path).map_err(|e| {
            let e = Exception::fatal(e.to_string()).with_code(ResultCode::FileNotFound);
            fatal(diags, e, origin)
        })?;

        self.scanned.insert(group.clone());
        tracing::info!(group = %group, path = %path.display(), "scanning profile");
        self.scan_source(&path.display().to_string(), &text, diags)
    }

    /// Scan profile text. Includes are resolved depth-first as they are
    /// encountered.
    pub fn scan_source(
        &mut self,
        file: &str,
        text: &str,
        diags: &mut ExceptionList,
    ) -> Result<(), Exception> {
        let stream = StatementStream::new(Classifier::new(self.ctx.domains), file, text);
        let mut assembler = BlockAssembler::new(stream, self.ctx);

        while let Some(block) = assembler.next_block(diags) {
            if diags.is_fatal() {
                break;
            }
            match compile_block(&block, diags) {
                Some(Compiled::Definition(def)) => {
                    if let Err(e) = self.profile.insert(def) {
                        e.emit();
                        diags.push(e);
                    }
                }
                Some(Compiled::Directives(directives)) => {
                    for directive in directives {
                        match directive {
                            Directive::DryRun(on) => self.profile.dry_run = on,
                            Directive::Include {
                                group,
                                optional,
                                location,
                            } => {
                                self.scan_group_from(&group, !optional, Some(&location), diags)?;
                            }
                        }
                    }
                }
                None => {}
            }
        }

        match diags.iter().find(|e| e.severity.is_fatal()) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

fn fatal(diags: &mut ExceptionList, e: Exception, origin: Option<&SourceLocation>) -> Exception {
    let e = match origin {
        Some(location) => e.or_at(location),
        None => e,
    };
    e.emit();
    diags.push(e.clone());
    e
}
