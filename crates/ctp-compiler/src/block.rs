//! Block assembly.
//!
//! Consecutive fields are grouped until the next block-starting statement
//! (`name`, a directive, or end-of-file). The block kind is the OR of the
//! kinds its fields define.

use ctp_ir::diag::{Exception, ExceptionList, SourceLocation};

use crate::field::{Field, ParseContext};
use crate::statement::{BlockKinds, StatementStream};

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub fields: Vec<Field>,
    pub kinds: BlockKinds,
}

impl Block {
    fn new() -> Self {
        Self {
            fields: Vec::new(),
            kinds: BlockKinds::NONE,
        }
    }

    fn push(&mut self, field: Field) {
        self.kinds = self.kinds | field.defines();
        self.fields.push(field);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Location of the first field.
    pub fn location(&self) -> Option<&SourceLocation> {
        self.fields.first().map(|f| &f.statement.location)
    }
}

/// Pulls statements from a stream and hands out complete blocks.
pub struct BlockAssembler<'a> {
    stream: StatementStream<'a>,
    ctx: ParseContext<'a>,
    current: Block,
    /// Set after a block-starting line was rejected; fields are dropped
    /// until the next block start.
    orphaned: bool,
    done: bool,
}

impl<'a> BlockAssembler<'a> {
    pub fn new(stream: StatementStream<'a>, ctx: ParseContext<'a>) -> Self {
        Self {
            stream,
            ctx,
            current: Block::new(),
            orphaned: false,
            done: false,
        }
    }

    /// Next complete block, or `None` once the stream is exhausted.
    pub fn next_block(&mut self, diags: &mut ExceptionList) -> Option<Block> {
        if self.done {
            return None;
        }
        loop {
            let statement = self.stream.next_statement(diags);
            if statement.is_eof() {
                self.done = true;
                let block = std::mem::replace(&mut self.current, Block::new());
                return (!block.is_empty()).then_some(block);
            }

            let starts_block = statement.starts_block();
            let keyword = statement.info().map_or("statement", |info| info.name);
            let location = statement.location.clone();
            let field = match Field::parse(statement, &self.ctx) {
                Ok(field) => field,
                Err(e) => {
                    record(diags, e);
                    if starts_block {
                        self.orphaned = true;
                        if !self.current.is_empty() {
                            return Some(std::mem::replace(&mut self.current, Block::new()));
                        }
                    }
                    continue;
                }
            };

            if starts_block {
                self.orphaned = false;
                if !self.current.is_empty() {
                    let mut next = Block::new();
                    next.push(field);
                    return Some(std::mem::replace(&mut self.current, next));
                }
            } else if self.orphaned {
                record(
                    diags,
                    Exception::syntax(format!("'{keyword}' outside any block")).at(location),
                );
                continue;
            }
            self.current.push(field);
        }
    }
}

fn record(diags: &mut ExceptionList, e: Exception) {
    e.emit();
    diags.push(e);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::Classifier;
    use ctp_ir::domain::DomainTable;
    use ctp_ir::flags::FlagTable;
    use ctp_ir::provider::SourceTable;

    fn blocks(text: &str) -> (Vec<Block>, ExceptionList) {
        let domains = DomainTable::default();
        let flags = FlagTable::default();
        let sources = SourceTable::default();
        let ctx = ParseContext {
            domains: &domains,
            flags: &flags,
            sources: &sources,
        };
        let stream = StatementStream::new(Classifier::new(&domains), "t.ctp", text);
        let mut assembler = BlockAssembler::new(stream, ctx);
        let mut diags = ExceptionList::new();
        let mut out = Vec::new();
        while let Some(block) = assembler.next_block(&mut diags) {
            out.push(block);
        }
        assert!(assembler.next_block(&mut diags).is_none());
        (out, diags)
    }

    #[test]
    fn test_name_starts_new_block() {
        let (blocks, diags) = blocks(
            "name = a\ngpc.freq = +10%\n\nname = b\ntest = init:a\n",
        );
        assert!(diags.is_empty());
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kinds, BlockKinds::OFFSET);
        assert_eq!(blocks[1].kinds, BlockKinds::TRIAL);
    }

    #[test]
    fn test_directives_are_their_own_blocks() {
        let (blocks, _) = blocks("include = a\ninclude = b\nname = x\ngpc.alpha = 1GHz\n");
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].kinds, BlockKinds::DIRECTIVE);
        assert_eq!(blocks[2].kinds, BlockKinds::SINE);
    }

    #[test]
    fn test_bad_line_is_dropped() {
        let (blocks, diags) = blocks("name = a\ngpc.frq = 1\ngpc.freq = 1GHz\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].fields.len(), 2);
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn test_rejected_name_closes_block() {
        let (blocks, diags) = blocks(
            "name = a\ngpc.freq = 1GHz\nname = second table\ngpc.freq = 2GHz, 3GHz\nname = c\ngpc.freq = 1GHz\n",
        );
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].fields.len(), 2);
        assert_eq!(blocks[1].fields.len(), 2);
        assert_eq!(diags.len(), 2);
        let orphan = diags.iter().nth(1).unwrap();
        assert!(orphan.message.contains("outside any block"));
        assert_eq!(orphan.location.as_ref().map(|l| l.line), Some(4));
    }

    #[test]
    fn test_mixed_kinds_accumulate() {
        let (blocks, _) = blocks("gpc.freq = 1GHz\ntest = init:a\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kinds.count(), 2);
    }
}
