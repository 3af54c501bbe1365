use crate::sparql::error::QueryEvaluationError;
use crate::sparql::eval::build_regex;
use crate::sparql::plan::{CastTarget, PlanExpression};
use crate::sparql::rewriting::graph_pattern_rewriter::GraphPatternRewriter;
use crate::sparql::rewriting::VariableScope;
use sparqlite_model::vocab::xsd;
use sparqlite_model::NamedNode;
use spargebra::algebra::{Expression, Function};
use std::sync::Arc;

pub(super) struct ExpressionRewriter<'a> {
    graph_rewriter: &'a GraphPatternRewriter,
}

impl<'a> ExpressionRewriter<'a> {
    pub fn new(graph_rewriter: &'a GraphPatternRewriter) -> Self {
        Self { graph_rewriter }
    }

    pub fn rewrite(
        &self,
        expression: &Expression,
        scope: &mut VariableScope,
    ) -> Result<PlanExpression, QueryEvaluationError> {
        Ok(match expression {
            Expression::NamedNode(node) => PlanExpression::Constant(node.clone().into()),
            Expression::Literal(literal) => PlanExpression::Constant(literal.clone().into()),
            Expression::Variable(variable) => PlanExpression::Variable(scope.slot(variable)),
            Expression::Or(lhs, rhs) => {
                let (lhs, rhs) = self.rewrite_pair(lhs, rhs, scope)?;
                PlanExpression::Or(lhs, rhs)
            }
            Expression::And(lhs, rhs) => {
                let (lhs, rhs) = self.rewrite_pair(lhs, rhs, scope)?;
                PlanExpression::And(lhs, rhs)
            }
            Expression::Equal(lhs, rhs) => {
                let (lhs, rhs) = self.rewrite_pair(lhs, rhs, scope)?;
                PlanExpression::Equal(lhs, rhs)
            }
            Expression::SameTerm(lhs, rhs) => {
                let (lhs, rhs) = self.rewrite_pair(lhs, rhs, scope)?;
                PlanExpression::SameTerm(lhs, rhs)
            }
            Expression::Greater(lhs, rhs) => {
                let (lhs, rhs) = self.rewrite_pair(lhs, rhs, scope)?;
                PlanExpression::Greater(lhs, rhs)
            }
            Expression::GreaterOrEqual(lhs, rhs) => {
                let (lhs, rhs) = self.rewrite_pair(lhs, rhs, scope)?;
                PlanExpression::GreaterOrEqual(lhs, rhs)
            }
            Expression::Less(lhs, rhs) => {
                let (lhs, rhs) = self.rewrite_pair(lhs, rhs, scope)?;
                PlanExpression::Less(lhs, rhs)
            }
            Expression::LessOrEqual(lhs, rhs) => {
                let (lhs, rhs) = self.rewrite_pair(lhs, rhs, scope)?;
                PlanExpression::LessOrEqual(lhs, rhs)
            }
            Expression::In(lhs, rhs) => PlanExpression::In(
                self.rewrite_boxed(lhs, scope)?,
                self.rewrite_all(rhs, scope)?,
            ),
            Expression::Add(lhs, rhs) => {
                let (lhs, rhs) = self.rewrite_pair(lhs, rhs, scope)?;
                PlanExpression::Add(lhs, rhs)
            }
            Expression::Subtract(lhs, rhs) => {
                let (lhs, rhs) = self.rewrite_pair(lhs, rhs, scope)?;
                PlanExpression::Subtract(lhs, rhs)
            }
            Expression::Multiply(lhs, rhs) => {
                let (lhs, rhs) = self.rewrite_pair(lhs, rhs, scope)?;
                PlanExpression::Multiply(lhs, rhs)
            }
            Expression::Divide(lhs, rhs) => {
                let (lhs, rhs) = self.rewrite_pair(lhs, rhs, scope)?;
                PlanExpression::Divide(lhs, rhs)
            }
            Expression::UnaryPlus(inner) => {
                PlanExpression::UnaryPlus(self.rewrite_boxed(inner, scope)?)
            }
            Expression::UnaryMinus(inner) => {
                PlanExpression::UnaryMinus(self.rewrite_boxed(inner, scope)?)
            }
            Expression::Not(inner) => PlanExpression::Not(self.rewrite_boxed(inner, scope)?),
            Expression::Exists(pattern) => PlanExpression::Exists(Arc::new(
                self.graph_rewriter.rewrite_graph_pattern(pattern, scope)?,
            )),
            Expression::Bound(variable) => PlanExpression::Bound(scope.slot(variable)),
            Expression::If(test, then, otherwise) => PlanExpression::If(
                self.rewrite_boxed(test, scope)?,
                self.rewrite_boxed(then, scope)?,
                self.rewrite_boxed(otherwise, scope)?,
            ),
            Expression::Coalesce(inner) => PlanExpression::Coalesce(self.rewrite_all(inner, scope)?),
            Expression::FunctionCall(function, args) => {
                self.rewrite_function_call(function, args, scope)?
            }
        })
    }

    /// Rewrites a SPARQL function call.
    ///
    /// The parser guarantees the arity of the built-in functions.
    fn rewrite_function_call(
        &self,
        function: &Function,
        args: &[Expression],
        scope: &mut VariableScope,
    ) -> Result<PlanExpression, QueryEvaluationError> {
        if let (Function::Regex, [text, Expression::Literal(pattern), rest @ ..]) = (function, args)
        {
            let flags = match rest {
                [] => Some(None),
                [Expression::Literal(flags)] => Some(Some(flags.value())),
                _ => None,
            };
            if let Some(regex) = flags.and_then(|flags| build_regex(pattern.value(), flags)) {
                return Ok(PlanExpression::StaticRegex(
                    self.rewrite_boxed(text, scope)?,
                    regex,
                ));
            }
        }

        if let Function::Concat = function {
            return Ok(PlanExpression::Concat(self.rewrite_all(args, scope)?));
        }

        let mut args = self.rewrite_all(args, scope)?.into_iter();
        let mut next = || {
            args.next().map(Box::new).ok_or_else(|| {
                QueryEvaluationError::InternalError(format!(
                    "Missing argument for the function {function}"
                ))
            })
        };
        Ok(match function {
            Function::Str => PlanExpression::Str(next()?),
            Function::Lang => PlanExpression::Lang(next()?),
            Function::LangMatches => PlanExpression::LangMatches(next()?, next()?),
            Function::Datatype => PlanExpression::Datatype(next()?),
            Function::Iri => PlanExpression::Iri(next()?),
            Function::BNode => PlanExpression::BNode(next().ok()),
            Function::IsIri => PlanExpression::IsIri(next()?),
            Function::IsBlank => PlanExpression::IsBlank(next()?),
            Function::IsLiteral => PlanExpression::IsLiteral(next()?),
            Function::IsNumeric => PlanExpression::IsNumeric(next()?),
            Function::StrLen => PlanExpression::StrLen(next()?),
            Function::UCase => PlanExpression::UCase(next()?),
            Function::LCase => PlanExpression::LCase(next()?),
            Function::Contains => PlanExpression::Contains(next()?, next()?),
            Function::StrStarts => PlanExpression::StrStarts(next()?, next()?),
            Function::StrEnds => PlanExpression::StrEnds(next()?, next()?),
            Function::StrBefore => PlanExpression::StrBefore(next()?, next()?),
            Function::StrAfter => PlanExpression::StrAfter(next()?, next()?),
            Function::SubStr => PlanExpression::SubStr(next()?, next()?, next().ok()),
            Function::EncodeForUri => PlanExpression::EncodeForUri(next()?),
            Function::Regex => PlanExpression::Regex(next()?, next()?, next().ok()),
            Function::Replace => PlanExpression::Replace(next()?, next()?, next()?, next().ok()),
            Function::Abs => PlanExpression::Abs(next()?),
            Function::Ceil => PlanExpression::Ceil(next()?),
            Function::Floor => PlanExpression::Floor(next()?),
            Function::Round => PlanExpression::Round(next()?),
            Function::Now => PlanExpression::Now,
            Function::Uuid => PlanExpression::Uuid,
            Function::StrUuid => PlanExpression::StrUuid,
            Function::StrLang => PlanExpression::StrLang(next()?, next()?),
            Function::StrDt => PlanExpression::StrDt(next()?, next()?),
            Function::Year => PlanExpression::Year(next()?),
            Function::Month => PlanExpression::Month(next()?),
            Function::Day => PlanExpression::Day(next()?),
            Function::Hours => PlanExpression::Hours(next()?),
            Function::Minutes => PlanExpression::Minutes(next()?),
            Function::Seconds => PlanExpression::Seconds(next()?),
            Function::Custom(name) => PlanExpression::Cast(next()?, cast_target(name)?),
            _ => {
                return Err(QueryEvaluationError::NotImplemented(format!(
                    "the function {function}"
                )))
            }
        })
    }

    fn rewrite_boxed(
        &self,
        expression: &Expression,
        scope: &mut VariableScope,
    ) -> Result<Box<PlanExpression>, QueryEvaluationError> {
        self.rewrite(expression, scope).map(Box::new)
    }

    fn rewrite_pair(
        &self,
        lhs: &Expression,
        rhs: &Expression,
        scope: &mut VariableScope,
    ) -> Result<(Box<PlanExpression>, Box<PlanExpression>), QueryEvaluationError> {
        Ok((self.rewrite_boxed(lhs, scope)?, self.rewrite_boxed(rhs, scope)?))
    }

    fn rewrite_all(
        &self,
        expressions: &[Expression],
        scope: &mut VariableScope,
    ) -> Result<Vec<PlanExpression>, QueryEvaluationError> {
        expressions.iter().map(|e| self.rewrite(e, scope)).collect()
    }
}

/// Only the XSD constructor functions are supported as custom functions.
fn cast_target(name: &NamedNode) -> Result<CastTarget, QueryEvaluationError> {
    let name = name.as_ref();
    Ok(if name == xsd::STRING {
        CastTarget::String
    } else if name == xsd::BOOLEAN {
        CastTarget::Boolean
    } else if name == xsd::INTEGER {
        CastTarget::Integer
    } else if name == xsd::DECIMAL {
        CastTarget::Decimal
    } else if name == xsd::DOUBLE || name == xsd::FLOAT {
        CastTarget::Double
    } else if name == xsd::DATE_TIME {
        CastTarget::DateTime
    } else {
        return Err(QueryEvaluationError::NotImplemented(format!(
            "the custom function {name}"
        )));
    })
}
