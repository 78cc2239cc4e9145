use loci_error::{LociResult, ensure, loci_err};
use loci_script::ast::{AstNode, optimize};
use loci_script::token::{TokenKind, tokenize};
use loci_script::{FunctionRegistry, Parser};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    Early,
    Late,
    Initialize,
    Fitness,
    MateChoice,
    ModifyChild,
    Recombination,
}

impl EventKind {
    pub fn from_name(name: &str) -> Option<EventKind> {
        match name {
            "early" => Some(EventKind::Early),
            "late" => Some(EventKind::Late),
            "initialize" => Some(EventKind::Initialize),
            "fitness" => Some(EventKind::Fitness),
            "mateChoice" => Some(EventKind::MateChoice),
            "modifyChild" => Some(EventKind::ModifyChild),
            "recombination" => Some(EventKind::Recombination),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Early => "early",
            EventKind::Late => "late",
            EventKind::Initialize => "initialize",
            EventKind::Fitness => "fitness",
            EventKind::MateChoice => "mateChoice",
            EventKind::ModifyChild => "modifyChild",
            EventKind::Recombination => "recombination",
        }
    }
}

/// A scripted action attached to a generation range and an event kind. The
/// body is shared so callbacks can execute while the registry is borrowed.
#[derive(Debug, Clone)]
pub struct ScriptBlock {
    pub id: i64,
    pub start: i64,
    pub end: i64,
    pub kind: EventKind,
    pub mutation_type_id: Option<i64>,
    pub subpop_id: Option<i64>,
    pub body: Rc<Vec<AstNode>>,
    pub active: bool,
}

impl ScriptBlock {
    pub fn applies(&self, generation: i64) -> bool {
        self.active && self.start <= generation && generation <= self.end
    }

    /// The upper bound this block contributes to the termination check;
    /// unbounded ranges contribute their start.
    pub fn termination_bound(&self) -> i64 {
        if self.end == i64::MAX { self.start } else { self.end }
    }
}

/// Parses a top-level script: a sequence of blocks
/// `<gen>[ : <gen2> ] [<event-kind>[(<target>)]]? { ... }`, where an absent
/// kind means "early", `initialize()` takes no generation prefix, `INF` as
/// `gen2` leaves the range unbounded, and callback kinds accept an optional
/// `m<id>` / `p<id>` target.
pub fn parse_script_blocks(
    source: &str,
    registry: &FunctionRegistry,
) -> LociResult<Vec<ScriptBlock>> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let mut blocks = Vec::new();

    while !parser.at_eof() {
        let id = blocks.len() as i64;
        blocks.push(parse_block(&mut parser, registry, id)?);
    }
    Ok(blocks)
}

fn parse_block(
    parser: &mut Parser,
    registry: &FunctionRegistry,
    id: i64,
) -> LociResult<ScriptBlock> {
    let header_pos = parser.peek().pos;

    let mut range: Option<(i64, i64)> = None;
    if let TokenKind::IntLit(start) = parser.peek().kind {
        parser.advance();
        let end = if parser.check(&TokenKind::Colon) {
            parser.advance();
            match parser.peek().kind.clone() {
                TokenKind::IntLit(end) => {
                    parser.advance();
                    end
                }
                TokenKind::Ident(ref name) if name == "INF" => {
                    parser.advance();
                    i64::MAX
                }
                other => {
                    return Err(loci_err!(
                        Parse: "expected a generation after ':' but found {}", other.describe()
                    )
                    .at(parser.peek().pos));
                }
            }
        } else {
            start
        };
        ensure!(
            start >= 1 && end >= start,
            Parse: "generation range {}:{} is not valid", start, end
        );
        range = Some((start, end));
    }

    let mut kind = EventKind::Early;
    let mut mutation_type_id = None;
    let mut subpop_id = None;

    if let TokenKind::Ident(name) = parser.peek().kind.clone() {
        let kind_pos = parser.peek().pos;
        kind = EventKind::from_name(&name)
            .ok_or_else(|| loci_err!(Parse: "unknown event kind '{}'", name).at(kind_pos))?;
        parser.advance();

        if parser.check(&TokenKind::LParen) {
            parser.advance();
            while !parser.check(&TokenKind::RParen) {
                let target_pos = parser.peek().pos;
                match parser.peek().kind.clone() {
                    TokenKind::Ident(target) => {
                        parser.advance();
                        match parse_target(&target) {
                            Some(('m', target_id)) => mutation_type_id = Some(target_id),
                            Some(('p', target_id)) => subpop_id = Some(target_id),
                            _ => {
                                return Err(loci_err!(
                                    Parse: "'{}' is not a mutation-type or subpopulation identifier",
                                    target
                                )
                                .at(target_pos));
                            }
                        }
                    }
                    other => {
                        return Err(loci_err!(
                            Parse: "expected an identifier but found {}", other.describe()
                        )
                        .at(target_pos));
                    }
                }
                if parser.check(&TokenKind::Comma) {
                    parser.advance();
                }
            }
            parser.expect(&TokenKind::RParen)?;
        }
    }

    let (start, end) = match kind {
        EventKind::Initialize => {
            ensure!(
                range.is_none(),
                Parse: "initialize() callbacks do not take a generation range"
            );
            (0, 0)
        }
        EventKind::Early | EventKind::Late => range.ok_or_else(|| {
            loci_err!(Parse: "an {} event requires a generation range", kind.name())
                .at(header_pos)
        })?,
        _ => range.unwrap_or((1, i64::MAX)),
    };

    if kind == EventKind::Fitness {
        ensure!(
            mutation_type_id.is_some(),
            Parse: "a fitness() callback requires a mutation-type target"
        );
    }

    let mut body = parser.parse_compound()?;
    optimize(&mut body, registry)?;

    Ok(ScriptBlock {
        id,
        start,
        end,
        kind,
        mutation_type_id,
        subpop_id,
        body: Rc::new(body.children),
        active: true,
    })
}

fn parse_target(name: &str) -> Option<(char, i64)> {
    let mut chars = name.chars();
    let prefix = chars.next()?;
    if prefix != 'm' && prefix != 'p' {
        return None;
    }
    chars.as_str().parse::<i64>().ok().map(|id| (prefix, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> LociResult<Vec<ScriptBlock>> {
        let registry = FunctionRegistry::base();
        parse_script_blocks(source, &registry)
    }

    #[test]
    fn test_default_kind_is_early() {
        let blocks = parse("1000 { x = 1; }").unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, EventKind::Early);
        assert_eq!((blocks[0].start, blocks[0].end), (1000, 1000));
    }

    #[test]
    fn test_ranges_and_kinds() {
        let blocks = parse("1:100 late { x = 1; } 50 early { x = 2; }").unwrap();
        assert_eq!(blocks[0].kind, EventKind::Late);
        assert_eq!((blocks[0].start, blocks[0].end), (1, 100));
        assert!(blocks[0].applies(100));
        assert!(!blocks[0].applies(101));
        assert_eq!(blocks[1].kind, EventKind::Early);
    }

    #[test]
    fn test_unbounded_range() {
        let blocks = parse("10:INF late { x = 1; }").unwrap();
        assert_eq!(blocks[0].end, i64::MAX);
        assert!(blocks[0].applies(1_000_000));
        assert_eq!(blocks[0].termination_bound(), 10);
    }

    #[test]
    fn test_initialize_block() {
        let blocks = parse("initialize() { x = 1; }").unwrap();
        assert_eq!(blocks[0].kind, EventKind::Initialize);
        assert!(parse("5 initialize() { x = 1; }").is_err());
    }

    #[test]
    fn test_callback_targets() {
        let blocks = parse("fitness(m2) { return relFitness; }").unwrap();
        assert_eq!(blocks[0].kind, EventKind::Fitness);
        assert_eq!(blocks[0].mutation_type_id, Some(2));
        assert_eq!((blocks[0].start, blocks[0].end), (1, i64::MAX));

        let blocks = parse("100:200 mateChoice(p1) { return weights; }").unwrap();
        assert_eq!(blocks[0].subpop_id, Some(1));

        assert!(parse("fitness { return 1.0; }").is_err());
        assert!(parse("fitness(q1) { return 1.0; }").is_err());
    }

    #[test]
    fn test_events_require_generations() {
        assert!(parse("early { x = 1; }").is_err());
        assert!(parse("{ x = 1; }").is_err());
    }

    #[test]
    fn test_registration_order_and_ids() {
        let blocks = parse("2 { x = 1; } 1 { x = 2; } 3 late { x = 3; }").unwrap();
        let ids: Vec<i64> = blocks.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
