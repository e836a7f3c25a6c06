//! Owned syntax trees produced by the clause sub-parsers.

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    /// Numeric literal kept in its source spelling so it is re-emitted verbatim.
    Number(String),
    Boolean(bool),
    Null,
    /// `$name` query parameter.
    Parameter(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodePattern {
    pub variable: Option<String>,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Literal)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `-[]->`
    Outgoing,
    /// `<-[]-`
    Incoming,
    /// `-[]-`
    Either,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipPattern {
    pub variable: Option<String>,
    pub rel_types: Vec<String>,
    pub properties: Vec<(String, Literal)>,
    pub direction: Direction,
    pub variable_length: bool,
}

/// `(a)-[:R]->(b)<-[:S]-(c)` as a start node plus a chain of hops.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPattern {
    pub start: NodePattern,
    pub hops: Vec<(RelationshipPattern, NodePattern)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseFold {
    Lower,
    Upper,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Property {
        variable: String,
        property: String,
        case_fold: Option<CaseFold>,
    },
    Variable(String),
    Literal(Literal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringMatchKind {
    Contains,
    StartsWith,
    EndsWith,
    /// `=~`
    Regex,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Comparison {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    StringMatch {
        subject: Operand,
        kind: StringMatchKind,
        pattern: Operand,
    },
    IsNull {
        operand: Operand,
        negated: bool,
    },
    In {
        operand: Operand,
        values: Vec<Literal>,
    },
    /// A path pattern used as an existence predicate.
    Pattern(PathPattern),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateArg {
    Star,
    Variable(String),
    Property { variable: String, property: String },
}

/// Token of an arithmetic item such as `m.revenue - m.budget`.
#[derive(Debug, Clone, PartialEq)]
pub enum ArithToken {
    Property { variable: String, property: String },
    Variable(String),
    Number(String),
    Operator(char),
    Open,
    Close,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemExpr {
    Property { variable: String, property: String },
    Variable(String),
    Aggregate {
        function: AggregateFn,
        distinct: bool,
        argument: AggregateArg,
    },
    Arithmetic(Vec<ArithToken>),
    /// Anything else; rejected by the translator with the original text.
    Other(String),
}

impl ItemExpr {
    pub fn is_aggregate(&self) -> bool {
        matches!(self, ItemExpr::Aggregate { .. })
    }
}

/// One item of a RETURN or WITH list.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionItem {
    pub expr: ItemExpr,
    pub alias: Option<String>,
    /// Source text of the expression, without the alias.
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionList {
    pub distinct: bool,
    pub items: Vec<ProjectionItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: ItemExpr,
    pub text: String,
    pub descending: bool,
}
