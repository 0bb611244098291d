use super::lexer::Token;

/// Kind of a single redirection attached to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirKind {
    Out,       // >
    OutAppend, // >>
    In,        // <
    Err,       // 2>
    ErrToOut,  // 2>&1
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedirNode {
    pub kind: RedirKind,
    pub target: String,
}

/// A simple command: NAME=VALUE prefix assignments, argv words,
/// redirections in source order, and a trailing `&` marker.
#[derive(Debug, Clone, Default)]
pub struct CommandNode {
    pub assigns: Vec<Token>,
    pub argv: Vec<String>,
    pub redirs: Vec<RedirNode>,
    pub background: bool,
}

/// `( list )` optionally followed by `&`.
#[derive(Debug, Clone)]
pub struct SubshellNode {
    pub list: ListNode,
    pub background: bool,
}

/// One stage of a pipeline. Pipelines may freely mix external commands
/// and parenthesized subshells.
#[derive(Debug, Clone)]
pub enum PipelineElement {
    Command(CommandNode),
    Subshell(SubshellNode),
}

#[derive(Debug, Clone, Default)]
pub struct PipelineNode {
    pub elements: Vec<PipelineElement>,
}

/// Operator joining an and-or segment to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOp {
    AndIf, // &&
    OrIf,  // ||
}

/// One pipeline plus the operator that chained it to its predecessor;
/// the first segment of an and-or chain carries no operator.
#[derive(Debug, Clone)]
pub struct AndOrSegment {
    pub pipeline: PipelineNode,
    pub op: Option<ChainOp>,
}

#[derive(Debug, Clone, Default)]
pub struct AndOrNode {
    pub segments: Vec<AndOrSegment>,
}

/// And-or chains separated by `;`.
#[derive(Debug, Clone, Default)]
pub struct ListNode {
    pub entries: Vec<AndOrNode>,
}

/// Root of one parsed line. Built bottom-up, consumed top-down, and
/// discarded after a single execution.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    pub list: ListNode,
}
