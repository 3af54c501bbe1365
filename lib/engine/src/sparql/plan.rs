//! The physical plan evaluated by the [`SimpleEvaluator`](super::eval::SimpleEvaluator).
//!
//! Variables are resolved to slots of a [`Tuple`] at compile time. Each sub-select gets its own
//! slot space and parameters always occupy the first slots of every space, which lets the
//! evaluator seed every fresh tuple with the parameter values.

use regex::Regex;
use sparqlite_model::{GraphName, NamedNode, NamedOrBlankNode, Term};
use std::sync::Arc;

/// A solution under construction. Missing trailing slots are unbound.
pub type Tuple = Vec<Option<Term>>;

#[derive(Debug, Clone)]
pub enum PatternValue {
    Constant(Term),
    Variable(usize),
}

/// The graph a quad pattern is matched against.
#[derive(Debug, Clone)]
pub enum PlanGraph {
    /// The default graph of the dataset.
    Default,
    /// A named graph, possibly given by a variable.
    Named(PatternValue),
}

#[derive(Debug)]
pub enum PlanNode {
    StaticBindings {
        tuples: Vec<Tuple>,
    },
    QuadPattern {
        subject: PatternValue,
        predicate: PatternValue,
        object: PatternValue,
        graph_name: PlanGraph,
    },
    Join {
        left: Arc<Self>,
        right: Arc<Self>,
    },
    LeftJoin {
        left: Arc<Self>,
        right: Arc<Self>,
        expression: Option<Arc<PlanExpression>>,
    },
    Filter {
        child: Arc<Self>,
        expression: Arc<PlanExpression>,
    },
    Union {
        children: Vec<Arc<Self>>,
    },
    Extend {
        child: Arc<Self>,
        position: usize,
        expression: Arc<PlanExpression>,
    },
    Minus {
        left: Arc<Self>,
        right: Arc<Self>,
    },
    Sort {
        child: Arc<Self>,
        by: Arc<[Comparator]>,
    },
    HashDeduplicate {
        child: Arc<Self>,
    },
    Skip {
        child: Arc<Self>,
        count: usize,
    },
    Limit {
        child: Arc<Self>,
        count: usize,
    },
    /// Evaluates `child` in a nested slot space. `mapping` holds `(inner, outer)` slot pairs.
    Project {
        child: Arc<Self>,
        mapping: Arc<[(usize, usize)]>,
    },
    Aggregate {
        child: Arc<Self>,
        key_mapping: Arc<[usize]>,
        aggregates: Arc<[(PlanAggregation, usize)]>,
    },
}

#[derive(Debug, Clone)]
pub enum Comparator {
    Asc(PlanExpression),
    Desc(PlanExpression),
}

#[derive(Debug, Clone)]
pub struct PlanAggregation {
    pub function: PlanAggregationFunction,
    /// `None` for `COUNT(*)`.
    pub parameter: Option<PlanExpression>,
    pub distinct: bool,
}

#[derive(Debug, Clone)]
pub enum PlanAggregationFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Sample,
    GroupConcat { separator: Arc<str> },
}

/// Target of an `xsd:*` constructor function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastTarget {
    String,
    Boolean,
    Integer,
    Decimal,
    Double,
    DateTime,
}

#[derive(Debug, Clone)]
pub enum PlanExpression {
    Constant(Term),
    Variable(usize),
    Exists(Arc<PlanNode>),
    Or(Box<Self>, Box<Self>),
    And(Box<Self>, Box<Self>),
    Equal(Box<Self>, Box<Self>),
    SameTerm(Box<Self>, Box<Self>),
    Greater(Box<Self>, Box<Self>),
    GreaterOrEqual(Box<Self>, Box<Self>),
    Less(Box<Self>, Box<Self>),
    LessOrEqual(Box<Self>, Box<Self>),
    In(Box<Self>, Vec<Self>),
    Add(Box<Self>, Box<Self>),
    Subtract(Box<Self>, Box<Self>),
    Multiply(Box<Self>, Box<Self>),
    Divide(Box<Self>, Box<Self>),
    UnaryPlus(Box<Self>),
    UnaryMinus(Box<Self>),
    Not(Box<Self>),
    Bound(usize),
    If(Box<Self>, Box<Self>, Box<Self>),
    Coalesce(Vec<Self>),
    Str(Box<Self>),
    Lang(Box<Self>),
    LangMatches(Box<Self>, Box<Self>),
    Datatype(Box<Self>),
    Iri(Box<Self>),
    BNode(Option<Box<Self>>),
    IsIri(Box<Self>),
    IsBlank(Box<Self>),
    IsLiteral(Box<Self>),
    IsNumeric(Box<Self>),
    StrLen(Box<Self>),
    UCase(Box<Self>),
    LCase(Box<Self>),
    Contains(Box<Self>, Box<Self>),
    StrStarts(Box<Self>, Box<Self>),
    StrEnds(Box<Self>, Box<Self>),
    StrBefore(Box<Self>, Box<Self>),
    StrAfter(Box<Self>, Box<Self>),
    Concat(Vec<Self>),
    SubStr(Box<Self>, Box<Self>, Option<Box<Self>>),
    EncodeForUri(Box<Self>),
    /// `REGEX` whose pattern and flags are constants, compiled once.
    StaticRegex(Box<Self>, Regex),
    Regex(Box<Self>, Box<Self>, Option<Box<Self>>),
    Replace(Box<Self>, Box<Self>, Box<Self>, Option<Box<Self>>),
    Abs(Box<Self>),
    Ceil(Box<Self>),
    Floor(Box<Self>),
    Round(Box<Self>),
    Now,
    Uuid,
    StrUuid,
    StrLang(Box<Self>, Box<Self>),
    StrDt(Box<Self>, Box<Self>),
    Year(Box<Self>),
    Month(Box<Self>),
    Day(Box<Self>),
    Hours(Box<Self>),
    Minutes(Box<Self>),
    Seconds(Box<Self>),
    Cast(Box<Self>, CastTarget),
}

/// The graphs a statement reads from, resolved from `FROM`, `FROM NAMED` and `USING`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetSpec {
    /// `None` means the store default graph.
    pub default: Option<Vec<GraphName>>,
    /// `None` means every named graph of the store.
    pub named: Option<Vec<NamedOrBlankNode>>,
}

impl DatasetSpec {
    pub fn from_iris(default: &[NamedNode], named: Option<&[NamedNode]>) -> Self {
        Self {
            default: Some(default.iter().cloned().map(GraphName::from).collect()),
            named: named.map(|named| named.iter().cloned().map(NamedOrBlankNode::from).collect()),
        }
    }
}
