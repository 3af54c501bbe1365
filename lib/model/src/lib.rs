mod error;
mod namespace;
mod resource;
mod typed_value;
pub mod vocab;

pub use error::*;
pub use namespace::*;
pub use resource::*;
pub use typed_value::*;

// Re-export some oxrdf types.
pub use oxrdf::{
    BlankNode, BlankNodeRef, GraphName, GraphNameRef, IriParseError, Literal, LiteralRef,
    NamedNode, NamedNodeRef, NamedOrBlankNode, NamedOrBlankNodeRef, Quad, QuadRef, Subject,
    SubjectRef, Term, TermParseError, TermRef, Triple, TripleRef, Variable,
    VariableNameParseError, VariableRef,
};
pub use oxsdatatypes::{DateTime, Decimal, ParseDateTimeError};
