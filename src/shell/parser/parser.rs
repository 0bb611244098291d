use super::ast::{
    AndOrNode, AndOrSegment, Ast, ChainOp, CommandNode, ListNode, PipelineElement, PipelineNode,
    RedirKind, RedirNode, SubshellNode,
};
use super::lexer::{Token, TokenKind, TokenStream};

/// Recursive-descent parser over a token stream, strict precedence:
/// list -> and-or (`;`) -> pipeline (`&&`/`||`) -> command-or-subshell (`|`).
///
/// Parsing is deliberately error tolerant: malformed constructs are dropped
/// without a diagnostic and yield a degraded, possibly empty, tree.
pub struct Parser<'a> {
    tokens: &'a [Token],
    index: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a TokenStream) -> Self {
        Self { tokens, index: 0 }
    }

    pub fn parse_line(mut self) -> Ast {
        Ast {
            list: self.parse_list(),
        }
    }

    fn peek(&self) -> &Token {
        // The stream is always Eof-terminated; clamp to the final token.
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.index.min(last)]
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn parse_list(&mut self) -> ListNode {
        let mut list = ListNode::default();
        loop {
            let Some(and_or) = self.parse_and_or() else {
                break;
            };
            list.entries.push(and_or);
            if self.peek().kind == TokenKind::Semi {
                self.bump();
                continue;
            }
            break;
        }
        list
    }

    fn parse_and_or(&mut self) -> Option<AndOrNode> {
        let first = self.parse_pipeline()?;
        let mut node = AndOrNode::default();
        node.segments.push(AndOrSegment {
            pipeline: first,
            op: None,
        });
        while matches!(self.peek().kind, TokenKind::AndIf | TokenKind::OrIf) {
            let op = if self.peek().kind == TokenKind::AndIf {
                ChainOp::AndIf
            } else {
                ChainOp::OrIf
            };
            self.bump();
            let Some(pipeline) = self.parse_pipeline() else {
                break; // tolerate a dangling operator
            };
            node.segments.push(AndOrSegment {
                pipeline,
                op: Some(op),
            });
        }
        Some(node)
    }

    fn parse_pipeline(&mut self) -> Option<PipelineNode> {
        let mut pipeline = PipelineNode::default();
        pipeline.elements.push(self.parse_command_or_subshell()?);
        while self.peek().kind == TokenKind::Pipe {
            self.bump();
            let Some(next) = self.parse_command_or_subshell() else {
                break; // tolerate a trailing `|`
            };
            pipeline.elements.push(next);
        }
        Some(pipeline)
    }

    fn parse_command_or_subshell(&mut self) -> Option<PipelineElement> {
        if self.peek().kind == TokenKind::LeftParen {
            return self.parse_subshell().map(PipelineElement::Subshell);
        }
        self.parse_command().map(PipelineElement::Command)
    }

    fn parse_subshell(&mut self) -> Option<SubshellNode> {
        if self.peek().kind != TokenKind::LeftParen {
            return None;
        }
        self.bump(); // '('
        let list = self.parse_list();
        if self.peek().kind != TokenKind::RightParen {
            // Missing ')': the whole subshell branch is dropped.
            return None;
        }
        self.bump(); // ')'
        let mut node = SubshellNode {
            list,
            background: false,
        };
        if self.peek().kind == TokenKind::Background {
            node.background = true;
            self.bump();
        }
        Some(node)
    }

    fn parse_command(&mut self) -> Option<CommandNode> {
        let mut cmd = CommandNode::default();
        while self.peek().kind == TokenKind::Assign {
            cmd.assigns.push(self.bump());
        }
        while self.peek().kind == TokenKind::Word {
            cmd.argv.push(self.bump().text);
        }
        loop {
            let kind = match self.peek().kind {
                TokenKind::RedirOut => RedirKind::Out,
                TokenKind::RedirOutAppend => RedirKind::OutAppend,
                TokenKind::RedirIn => RedirKind::In,
                TokenKind::RedirErr => RedirKind::Err,
                TokenKind::RedirErrToOut => RedirKind::ErrToOut,
                _ => break,
            };
            self.bump();
            if kind == RedirKind::ErrToOut {
                // `2>&1` is self-contained, no target word follows.
                cmd.redirs.push(RedirNode {
                    kind,
                    target: String::new(),
                });
                continue;
            }
            if !matches!(self.peek().kind, TokenKind::Word | TokenKind::Assign) {
                // Operator without a target: stop redirection parsing
                // for this command, no diagnostic.
                break;
            }
            let target = self.bump().text;
            cmd.redirs.push(RedirNode { kind, target });
        }
        if self.peek().kind == TokenKind::Background {
            cmd.background = true;
            self.bump();
        }
        if cmd.argv.is_empty() && cmd.assigns.is_empty() {
            return None;
        }
        Some(cmd)
    }
}

pub fn parse(tokens: &TokenStream) -> Ast {
    Parser::new(tokens).parse_line()
}
