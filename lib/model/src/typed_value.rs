use crate::vocab::xsd;
use crate::{ThinError, ThinResult};
use oxrdf::{BlankNode, Literal, LiteralRef, NamedNode, Term, TermRef};
use oxsdatatypes::{DateTime, Decimal, Double, Integer};
use std::cmp::Ordering;
use std::str::FromStr;

/// A numeric value of one of the supported XSD numeric types.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Numeric {
    Integer(i64),
    Decimal(Decimal),
    Double(f64),
}

impl Numeric {
    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Integer(value) => Double::from(Integer::from(value)).into(),
            Numeric::Decimal(value) => value.to_string().parse().unwrap_or(f64::NAN),
            Numeric::Double(value) => value,
        }
    }

    fn as_decimal(self) -> ThinResult<Decimal> {
        match self {
            Numeric::Integer(value) => Ok(Decimal::from(value)),
            Numeric::Decimal(value) => Ok(value),
            Numeric::Double(_) => ThinError::expected(),
        }
    }

    pub fn checked_add(self, rhs: Self) -> ThinResult<Self> {
        self.binary(rhs, i64::checked_add, |a, b| a.checked_add(b), |a, b| a + b)
    }

    pub fn checked_sub(self, rhs: Self) -> ThinResult<Self> {
        self.binary(rhs, i64::checked_sub, |a, b| a.checked_sub(b), |a, b| a - b)
    }

    pub fn checked_mul(self, rhs: Self) -> ThinResult<Self> {
        self.binary(rhs, i64::checked_mul, |a, b| a.checked_mul(b), |a, b| a * b)
    }

    /// Divides two numerics. As in XSD, dividing two integers yields a decimal.
    pub fn checked_div(self, rhs: Self) -> ThinResult<Self> {
        match (self, rhs) {
            (Numeric::Double(_), _) | (_, Numeric::Double(_)) => {
                Ok(Numeric::Double(self.as_f64() / rhs.as_f64()))
            }
            _ => self
                .as_decimal()?
                .checked_div(rhs.as_decimal()?)
                .map(Numeric::Decimal)
                .ok_or(ThinError::default()),
        }
    }

    pub fn checked_neg(self) -> ThinResult<Self> {
        Numeric::Integer(0).checked_sub(self)
    }

    pub fn abs(self) -> ThinResult<Self> {
        match self {
            Numeric::Integer(value) => value.checked_abs().map(Numeric::Integer).ok_or_default(),
            Numeric::Decimal(value) => {
                if value < Decimal::from(0) {
                    self.checked_neg()
                } else {
                    Ok(self)
                }
            }
            Numeric::Double(value) => Ok(Numeric::Double(value.abs())),
        }
    }

    /// Rounds the value with `op`; integers are returned unchanged.
    pub fn round_with(self, op: fn(f64) -> f64) -> Self {
        match self {
            Numeric::Integer(_) => self,
            Numeric::Decimal(_) => {
                let rounded = op(self.as_f64());
                Decimal::from_str(&format!("{rounded:.0}"))
                    .map_or(Numeric::Double(rounded), Numeric::Decimal)
            }
            Numeric::Double(value) => Numeric::Double(op(value)),
        }
    }

    fn binary(
        self,
        rhs: Self,
        integer: fn(i64, i64) -> Option<i64>,
        decimal: fn(Decimal, Decimal) -> Option<Decimal>,
        double: fn(f64, f64) -> f64,
    ) -> ThinResult<Self> {
        match (self, rhs) {
            (Numeric::Integer(a), Numeric::Integer(b)) => {
                integer(a, b).map(Numeric::Integer).ok_or_default()
            }
            (Numeric::Double(_), _) | (_, Numeric::Double(_)) => {
                Ok(Numeric::Double(double(self.as_f64(), rhs.as_f64())))
            }
            _ => decimal(self.as_decimal()?, rhs.as_decimal()?)
                .map(Numeric::Decimal)
                .ok_or_default(),
        }
    }

    pub fn partial_cmp_value(self, other: Self) -> Option<Ordering> {
        match (self, other) {
            (Numeric::Integer(a), Numeric::Integer(b)) => Some(a.cmp(&b)),
            (Numeric::Double(_), _) | (_, Numeric::Double(_)) => {
                self.as_f64().partial_cmp(&other.as_f64())
            }
            _ => Some(self.as_decimal().ok()?.cmp(&other.as_decimal().ok()?)),
        }
    }

    pub fn into_literal(self) -> Literal {
        match self {
            Numeric::Integer(value) => Literal::from(value),
            Numeric::Decimal(value) => Literal::new_typed_literal(value.to_string(), xsd::DECIMAL),
            Numeric::Double(value) => Literal::from(value),
        }
    }
}

trait OkOrDefault<T> {
    fn ok_or_default(self) -> ThinResult<T>;
}

impl<T> OkOrDefault<T> for Option<T> {
    fn ok_or_default(self) -> ThinResult<T> {
        self.ok_or(ThinError::default())
    }
}

/// An RDF term interpreted according to its datatype.
///
/// This is the value-level view used by comparisons, arithmetic and the typed cursor accessors.
/// Literals with an unsupported datatype or an ill-formed lexical value are kept as
/// [`TypedValue::OtherLiteral`].
#[derive(Clone, Debug, PartialEq)]
pub enum TypedValue {
    NamedNode(NamedNode),
    BlankNode(BlankNode),
    Boolean(bool),
    Numeric(Numeric),
    SimpleLiteral(String),
    LanguageString { value: String, language: String },
    DateTime(DateTime),
    OtherLiteral(Literal),
}

impl TypedValue {
    pub fn from_term(term: TermRef<'_>) -> Self {
        match term {
            TermRef::NamedNode(node) => TypedValue::NamedNode(node.into_owned()),
            TermRef::BlankNode(node) => TypedValue::BlankNode(node.into_owned()),
            TermRef::Literal(literal) => Self::from_literal(literal),
        }
    }

    pub fn from_literal(literal: LiteralRef<'_>) -> Self {
        let value = literal.value();
        if let Some(language) = literal.language() {
            return TypedValue::LanguageString {
                value: value.to_owned(),
                language: language.to_owned(),
            };
        }
        let datatype = literal.datatype();
        let parsed = if datatype == xsd::STRING {
            Some(TypedValue::SimpleLiteral(value.to_owned()))
        } else if datatype == xsd::BOOLEAN {
            match value {
                "true" | "1" => Some(TypedValue::Boolean(true)),
                "false" | "0" => Some(TypedValue::Boolean(false)),
                _ => None,
            }
        } else if is_integer_datatype(datatype.as_str()) {
            value
                .parse()
                .ok()
                .map(|v| TypedValue::Numeric(Numeric::Integer(v)))
        } else if datatype == xsd::DECIMAL {
            Decimal::from_str(value)
                .ok()
                .map(|v| TypedValue::Numeric(Numeric::Decimal(v)))
        } else if datatype == xsd::DOUBLE || datatype == xsd::FLOAT {
            parse_double(value).map(|v| TypedValue::Numeric(Numeric::Double(v)))
        } else if datatype == xsd::DATE_TIME {
            DateTime::from_str(value).ok().map(TypedValue::DateTime)
        } else {
            None
        };
        parsed.unwrap_or_else(|| TypedValue::OtherLiteral(literal.into_owned()))
    }

    pub fn into_term(self) -> Term {
        match self {
            TypedValue::NamedNode(node) => node.into(),
            TypedValue::BlankNode(node) => node.into(),
            TypedValue::Boolean(value) => Literal::from(value).into(),
            TypedValue::Numeric(value) => value.into_literal().into(),
            TypedValue::SimpleLiteral(value) => Literal::from(value).into(),
            TypedValue::LanguageString { value, language } => {
                Literal::new_language_tagged_literal_unchecked(value, language).into()
            }
            TypedValue::DateTime(value) => {
                Literal::new_typed_literal(value.to_string(), xsd::DATE_TIME).into()
            }
            TypedValue::OtherLiteral(literal) => literal.into(),
        }
    }

    pub fn is_literal(&self) -> bool {
        !matches!(self, TypedValue::NamedNode(_) | TypedValue::BlankNode(_))
    }

    /// Computes the effective boolean value.
    pub fn effective_boolean_value(&self) -> ThinResult<bool> {
        match self {
            TypedValue::Boolean(value) => Ok(*value),
            TypedValue::Numeric(Numeric::Integer(value)) => Ok(*value != 0),
            TypedValue::Numeric(Numeric::Decimal(value)) => Ok(*value != Decimal::from(0)),
            TypedValue::Numeric(Numeric::Double(value)) => Ok(*value != 0. && !value.is_nan()),
            TypedValue::SimpleLiteral(value) => Ok(!value.is_empty()),
            _ => ThinError::expected(),
        }
    }

    /// SPARQL `=`: value equality for comparable values, term equality otherwise.
    ///
    /// Fails for two literals of different, unrelated datatypes as their equality is unknown.
    pub fn sparql_eq(&self, other: &Self) -> ThinResult<bool> {
        match (self, other) {
            (TypedValue::Numeric(a), TypedValue::Numeric(b)) => {
                Ok(a.partial_cmp_value(*b) == Some(Ordering::Equal))
            }
            (TypedValue::OtherLiteral(a), TypedValue::OtherLiteral(b)) => {
                if a == b {
                    Ok(true)
                } else {
                    ThinError::expected()
                }
            }
            (TypedValue::OtherLiteral(_), b) if b.is_literal() => ThinError::expected(),
            (a, TypedValue::OtherLiteral(_)) if a.is_literal() => ThinError::expected(),
            (TypedValue::DateTime(a), TypedValue::DateTime(b)) => {
                Ok(a.partial_cmp(b) == Some(Ordering::Equal))
            }
            _ => Ok(self == other),
        }
    }

    /// Value ordering used by `<`, `>`, ... Only values of compatible types are comparable.
    pub fn partial_cmp_value(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (TypedValue::Numeric(a), TypedValue::Numeric(b)) => a.partial_cmp_value(*b),
            (TypedValue::SimpleLiteral(a), TypedValue::SimpleLiteral(b)) => Some(a.cmp(b)),
            (
                TypedValue::LanguageString {
                    value: a,
                    language: la,
                },
                TypedValue::LanguageString {
                    value: b,
                    language: lb,
                },
            ) if la == lb => Some(a.cmp(b)),
            (TypedValue::Boolean(a), TypedValue::Boolean(b)) => Some(a.cmp(b)),
            (TypedValue::DateTime(a), TypedValue::DateTime(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Total order used by `ORDER BY`: unbound < blank nodes < IRIs < literals.
///
/// Literals are ordered by value when comparable and by their lexical form otherwise.
pub fn order_terms(a: Option<&Term>, b: Option<&Term>) -> Ordering {
    fn rank(term: Option<&Term>) -> u8 {
        match term {
            None => 0,
            Some(Term::BlankNode(_)) => 1,
            Some(Term::NamedNode(_)) => 2,
            Some(Term::Literal(_)) => 3,
        }
    }

    match (a, b) {
        (Some(Term::BlankNode(a)), Some(Term::BlankNode(b))) => a.as_str().cmp(b.as_str()),
        (Some(Term::NamedNode(a)), Some(Term::NamedNode(b))) => a.as_str().cmp(b.as_str()),
        (Some(Term::Literal(a)), Some(Term::Literal(b))) => {
            let value_a = TypedValue::from_literal(a.as_ref());
            let value_b = TypedValue::from_literal(b.as_ref());
            value_a
                .partial_cmp_value(&value_b)
                .unwrap_or_else(|| a.value().cmp(b.value()))
        }
        _ => rank(a).cmp(&rank(b)),
    }
}

fn is_integer_datatype(datatype: &str) -> bool {
    matches!(
        datatype.strip_prefix("http://www.w3.org/2001/XMLSchema#"),
        Some(
            "integer"
                | "long"
                | "int"
                | "short"
                | "byte"
                | "nonNegativeInteger"
                | "nonPositiveInteger"
                | "negativeInteger"
                | "positiveInteger"
                | "unsignedLong"
                | "unsignedInt"
                | "unsignedShort"
                | "unsignedByte"
        )
    )
}

fn parse_double(value: &str) -> Option<f64> {
    match value {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => value.parse().ok(),
    }
}
