use super::{build_regex, get_value, SimpleEvaluator};
use crate::sparql::plan::{CastTarget, PlanExpression, Tuple};
use rustc_hash::FxHasher;
use sparqlite_model::vocab::xsd;
use sparqlite_model::{
    BlankNode, DateTime, Decimal, Literal, NamedNode, Numeric, Term, ThinError, ThinResult,
    TypedValue,
};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

impl SimpleEvaluator {
    /// The effective boolean value of `expression`, errors being `false`.
    pub(super) fn eval_ebv(&self, expression: &PlanExpression, tuple: &Tuple) -> bool {
        self.eval_boolean(expression, tuple).unwrap_or(false)
    }

    fn eval_boolean(&self, expression: &PlanExpression, tuple: &Tuple) -> ThinResult<bool> {
        let value = self.eval_expression(expression, tuple)?;
        TypedValue::from_term(value.as_ref()).effective_boolean_value()
    }

    fn eval_numeric(&self, expression: &PlanExpression, tuple: &Tuple) -> ThinResult<Numeric> {
        to_numeric(&self.eval_expression(expression, tuple)?)
    }

    fn eval_string(
        &self,
        expression: &PlanExpression,
        tuple: &Tuple,
    ) -> ThinResult<(String, Option<String>)> {
        let value = self.eval_expression(expression, tuple)?;
        let (value, language) = string_literal(&value)?;
        Ok((value.to_owned(), language.map(ToOwned::to_owned)))
    }

    fn eval_date_time(&self, expression: &PlanExpression, tuple: &Tuple) -> ThinResult<DateTime> {
        match TypedValue::from_term(self.eval_expression(expression, tuple)?.as_ref()) {
            TypedValue::DateTime(value) => Ok(value),
            _ => ThinError::expected(),
        }
    }

    fn eval_comparison(
        &self,
        lhs: &PlanExpression,
        rhs: &PlanExpression,
        tuple: &Tuple,
    ) -> ThinResult<Ordering> {
        let lhs = self.eval_expression(lhs, tuple)?;
        let rhs = self.eval_expression(rhs, tuple)?;
        TypedValue::from_term(lhs.as_ref())
            .partial_cmp_value(&TypedValue::from_term(rhs.as_ref()))
            .ok_or(ThinError::default())
    }

    /// Evaluates the two string arguments of `CONTAINS` and friends.
    ///
    /// The second argument must be a simple literal or share the language of the first one.
    fn eval_compatible_strings(
        &self,
        lhs: &PlanExpression,
        rhs: &PlanExpression,
        tuple: &Tuple,
    ) -> ThinResult<(String, Option<String>, String)> {
        let (lhs, language) = self.eval_string(lhs, tuple)?;
        let (rhs, rhs_language) = self.eval_string(rhs, tuple)?;
        if rhs_language.is_some() && rhs_language != language {
            return ThinError::expected();
        }
        Ok((lhs, language, rhs))
    }

    pub(super) fn eval_expression(
        &self,
        expression: &PlanExpression,
        tuple: &Tuple,
    ) -> ThinResult<Term> {
        match expression {
            PlanExpression::Constant(term) => Ok(term.clone()),
            PlanExpression::Variable(position) => {
                get_value(*position, tuple).cloned().ok_or(ThinError::default())
            }
            PlanExpression::Exists(plan) => Ok(bool_term(matches!(
                self.eval_plan(plan, tuple.clone()).next(),
                Some(Ok(_))
            ))),
            PlanExpression::Or(lhs, rhs) => {
                let lhs = self.eval_boolean(lhs, tuple);
                if lhs == Ok(true) {
                    return Ok(bool_term(true));
                }
                match (lhs, self.eval_boolean(rhs, tuple)) {
                    (_, Ok(true)) => Ok(bool_term(true)),
                    (Ok(false), Ok(false)) => Ok(bool_term(false)),
                    _ => ThinError::expected(),
                }
            }
            PlanExpression::And(lhs, rhs) => {
                let lhs = self.eval_boolean(lhs, tuple);
                if lhs == Ok(false) {
                    return Ok(bool_term(false));
                }
                match (lhs, self.eval_boolean(rhs, tuple)) {
                    (_, Ok(false)) => Ok(bool_term(false)),
                    (Ok(true), Ok(true)) => Ok(bool_term(true)),
                    _ => ThinError::expected(),
                }
            }
            PlanExpression::Equal(lhs, rhs) => {
                let lhs = self.eval_expression(lhs, tuple)?;
                let rhs = self.eval_expression(rhs, tuple)?;
                TypedValue::from_term(lhs.as_ref())
                    .sparql_eq(&TypedValue::from_term(rhs.as_ref()))
                    .map(bool_term)
            }
            PlanExpression::SameTerm(lhs, rhs) => Ok(bool_term(
                self.eval_expression(lhs, tuple)? == self.eval_expression(rhs, tuple)?,
            )),
            PlanExpression::Greater(lhs, rhs) => Ok(bool_term(
                self.eval_comparison(lhs, rhs, tuple)? == Ordering::Greater,
            )),
            PlanExpression::GreaterOrEqual(lhs, rhs) => Ok(bool_term(
                self.eval_comparison(lhs, rhs, tuple)? != Ordering::Less,
            )),
            PlanExpression::Less(lhs, rhs) => Ok(bool_term(
                self.eval_comparison(lhs, rhs, tuple)? == Ordering::Less,
            )),
            PlanExpression::LessOrEqual(lhs, rhs) => Ok(bool_term(
                self.eval_comparison(lhs, rhs, tuple)? != Ordering::Greater,
            )),
            PlanExpression::In(needle, candidates) => {
                let needle = self.eval_expression(needle, tuple)?;
                let needle = TypedValue::from_term(needle.as_ref());
                let mut has_error = false;
                for candidate in candidates {
                    let equal = self.eval_expression(candidate, tuple).and_then(|candidate| {
                        needle.sparql_eq(&TypedValue::from_term(candidate.as_ref()))
                    });
                    match equal {
                        Ok(true) => return Ok(bool_term(true)),
                        Ok(false) => (),
                        Err(_) => has_error = true,
                    }
                }
                if has_error {
                    ThinError::expected()
                } else {
                    Ok(bool_term(false))
                }
            }
            PlanExpression::Add(lhs, rhs) => Ok(self
                .eval_numeric(lhs, tuple)?
                .checked_add(self.eval_numeric(rhs, tuple)?)?
                .into_literal()
                .into()),
            PlanExpression::Subtract(lhs, rhs) => Ok(self
                .eval_numeric(lhs, tuple)?
                .checked_sub(self.eval_numeric(rhs, tuple)?)?
                .into_literal()
                .into()),
            PlanExpression::Multiply(lhs, rhs) => Ok(self
                .eval_numeric(lhs, tuple)?
                .checked_mul(self.eval_numeric(rhs, tuple)?)?
                .into_literal()
                .into()),
            PlanExpression::Divide(lhs, rhs) => Ok(self
                .eval_numeric(lhs, tuple)?
                .checked_div(self.eval_numeric(rhs, tuple)?)?
                .into_literal()
                .into()),
            PlanExpression::UnaryPlus(inner) => {
                Ok(self.eval_numeric(inner, tuple)?.into_literal().into())
            }
            PlanExpression::UnaryMinus(inner) => Ok(self
                .eval_numeric(inner, tuple)?
                .checked_neg()?
                .into_literal()
                .into()),
            PlanExpression::Not(inner) => Ok(bool_term(!self.eval_boolean(inner, tuple)?)),
            PlanExpression::Bound(position) => Ok(bool_term(get_value(*position, tuple).is_some())),
            PlanExpression::If(test, then, otherwise) => {
                if self.eval_boolean(test, tuple)? {
                    self.eval_expression(then, tuple)
                } else {
                    self.eval_expression(otherwise, tuple)
                }
            }
            PlanExpression::Coalesce(inner) => inner
                .iter()
                .find_map(|e| self.eval_expression(e, tuple).ok())
                .ok_or(ThinError::default()),
            PlanExpression::Str(inner) => match self.eval_expression(inner, tuple)? {
                Term::NamedNode(node) => Ok(Literal::new_simple_literal(node.as_str()).into()),
                Term::Literal(literal) => Ok(Literal::new_simple_literal(literal.value()).into()),
                Term::BlankNode(_) => ThinError::expected(),
            },
            PlanExpression::Lang(inner) => match self.eval_expression(inner, tuple)? {
                Term::Literal(literal) => {
                    Ok(Literal::new_simple_literal(literal.language().unwrap_or_default()).into())
                }
                _ => ThinError::expected(),
            },
            PlanExpression::LangMatches(tag, range) => {
                let (tag, _) = self.eval_string(tag, tuple)?;
                let (range, _) = self.eval_string(range, tuple)?;
                Ok(bool_term(lang_matches(&tag, &range)))
            }
            PlanExpression::Datatype(inner) => match self.eval_expression(inner, tuple)? {
                Term::Literal(literal) => Ok(literal.datatype().into_owned().into()),
                _ => ThinError::expected(),
            },
            PlanExpression::Iri(inner) => match self.eval_expression(inner, tuple)? {
                Term::NamedNode(node) => Ok(node.into()),
                Term::Literal(literal) if literal.datatype() == xsd::STRING => {
                    Ok(NamedNode::new(literal.value())?.into())
                }
                _ => ThinError::expected(),
            },
            PlanExpression::BNode(inner) => match inner {
                None => Ok(BlankNode::default().into()),
                Some(inner) => {
                    let (label, _) = self.eval_string(inner, tuple)?;
                    let mut hasher = FxHasher::default();
                    self.blank_node_salt.hash(&mut hasher);
                    label.hash(&mut hasher);
                    Ok(BlankNode::new_from_unique_id(u128::from(hasher.finish())).into())
                }
            },
            PlanExpression::IsIri(inner) => Ok(bool_term(matches!(
                self.eval_expression(inner, tuple)?,
                Term::NamedNode(_)
            ))),
            PlanExpression::IsBlank(inner) => Ok(bool_term(matches!(
                self.eval_expression(inner, tuple)?,
                Term::BlankNode(_)
            ))),
            PlanExpression::IsLiteral(inner) => Ok(bool_term(matches!(
                self.eval_expression(inner, tuple)?,
                Term::Literal(_)
            ))),
            PlanExpression::IsNumeric(inner) => Ok(bool_term(
                to_numeric(&self.eval_expression(inner, tuple)?).is_ok(),
            )),
            PlanExpression::StrLen(inner) => {
                let (value, _) = self.eval_string(inner, tuple)?;
                let len = i64::try_from(value.chars().count()).map_err(|_| ThinError::default())?;
                Ok(Literal::from(len).into())
            }
            PlanExpression::UCase(inner) => {
                let (value, language) = self.eval_string(inner, tuple)?;
                Ok(build_string(value.to_uppercase(), language))
            }
            PlanExpression::LCase(inner) => {
                let (value, language) = self.eval_string(inner, tuple)?;
                Ok(build_string(value.to_lowercase(), language))
            }
            PlanExpression::Contains(lhs, rhs) => {
                let (lhs, _, rhs) = self.eval_compatible_strings(lhs, rhs, tuple)?;
                Ok(bool_term(lhs.contains(&rhs)))
            }
            PlanExpression::StrStarts(lhs, rhs) => {
                let (lhs, _, rhs) = self.eval_compatible_strings(lhs, rhs, tuple)?;
                Ok(bool_term(lhs.starts_with(&rhs)))
            }
            PlanExpression::StrEnds(lhs, rhs) => {
                let (lhs, _, rhs) = self.eval_compatible_strings(lhs, rhs, tuple)?;
                Ok(bool_term(lhs.ends_with(&rhs)))
            }
            PlanExpression::StrBefore(lhs, rhs) => {
                let (lhs, language, rhs) = self.eval_compatible_strings(lhs, rhs, tuple)?;
                Ok(match lhs.find(&rhs) {
                    Some(position) => build_string(lhs[..position].to_owned(), language),
                    None => Literal::new_simple_literal("").into(),
                })
            }
            PlanExpression::StrAfter(lhs, rhs) => {
                let (lhs, language, rhs) = self.eval_compatible_strings(lhs, rhs, tuple)?;
                Ok(match lhs.find(&rhs) {
                    Some(position) => {
                        build_string(lhs[position + rhs.len()..].to_owned(), language)
                    }
                    None => Literal::new_simple_literal("").into(),
                })
            }
            PlanExpression::Concat(inner) => {
                let mut result = String::new();
                let mut common_language: Option<Option<String>> = None;
                for e in inner {
                    let (value, language) = self.eval_string(e, tuple)?;
                    result.push_str(&value);
                    common_language = match common_language {
                        None => Some(language),
                        Some(common) if common == language => Some(common),
                        Some(_) => Some(None),
                    };
                }
                Ok(build_string(result, common_language.flatten()))
            }
            PlanExpression::SubStr(source, start, length) => {
                let (value, language) = self.eval_string(source, tuple)?;
                let start = self.eval_numeric(start, tuple)?.as_f64().round();
                let end = match length {
                    Some(length) => Some(start + self.eval_numeric(length, tuple)?.as_f64().round()),
                    None => None,
                };
                let result = value
                    .chars()
                    .zip(1_u32..)
                    .filter(|(_, position)| {
                        let position = f64::from(*position);
                        position >= start && end.map_or(true, |end| position < end)
                    })
                    .map(|(c, _)| c)
                    .collect::<String>();
                Ok(build_string(result, language))
            }
            PlanExpression::EncodeForUri(inner) => {
                let (value, _) = self.eval_string(inner, tuple)?;
                Ok(Literal::new_simple_literal(encode_for_uri(&value)).into())
            }
            PlanExpression::StaticRegex(text, regex) => {
                let (text, _) = self.eval_string(text, tuple)?;
                Ok(bool_term(regex.is_match(&text)))
            }
            PlanExpression::Regex(text, pattern, flags) => {
                let (text, _) = self.eval_string(text, tuple)?;
                let (pattern, _) = self.eval_string(pattern, tuple)?;
                let flags = match flags {
                    Some(flags) => Some(self.eval_string(flags, tuple)?.0),
                    None => None,
                };
                let regex = build_regex(&pattern, flags.as_deref()).ok_or(ThinError::default())?;
                Ok(bool_term(regex.is_match(&text)))
            }
            PlanExpression::Replace(text, pattern, replacement, flags) => {
                let (text, language) = self.eval_string(text, tuple)?;
                let (pattern, _) = self.eval_string(pattern, tuple)?;
                let (replacement, _) = self.eval_string(replacement, tuple)?;
                let flags = match flags {
                    Some(flags) => Some(self.eval_string(flags, tuple)?.0),
                    None => None,
                };
                let regex = build_regex(&pattern, flags.as_deref()).ok_or(ThinError::default())?;
                Ok(build_string(
                    regex.replace_all(&text, replacement.as_str()).into_owned(),
                    language,
                ))
            }
            PlanExpression::Abs(inner) => {
                Ok(self.eval_numeric(inner, tuple)?.abs()?.into_literal().into())
            }
            PlanExpression::Ceil(inner) => Ok(self
                .eval_numeric(inner, tuple)?
                .round_with(f64::ceil)
                .into_literal()
                .into()),
            PlanExpression::Floor(inner) => Ok(self
                .eval_numeric(inner, tuple)?
                .round_with(f64::floor)
                .into_literal()
                .into()),
            PlanExpression::Round(inner) => Ok(self
                .eval_numeric(inner, tuple)?
                .round_with(|v| (v + 0.5).floor())
                .into_literal()
                .into()),
            PlanExpression::Now => self
                .now
                .map(date_time_term)
                .ok_or(ThinError::default()),
            PlanExpression::Uuid => {
                Ok(NamedNode::new_unchecked(format!("urn:uuid:{}", Uuid::new_v4())).into())
            }
            PlanExpression::StrUuid => {
                Ok(Literal::new_simple_literal(Uuid::new_v4().to_string()).into())
            }
            PlanExpression::StrLang(value, language) => {
                let (value, None) = self.eval_string(value, tuple)? else {
                    return ThinError::expected();
                };
                let (language, _) = self.eval_string(language, tuple)?;
                Ok(Literal::new_language_tagged_literal(value, language)
                    .map_err(|_| ThinError::default())?
                    .into())
            }
            PlanExpression::StrDt(value, datatype) => {
                let (value, None) = self.eval_string(value, tuple)? else {
                    return ThinError::expected();
                };
                let Term::NamedNode(datatype) = self.eval_expression(datatype, tuple)? else {
                    return ThinError::expected();
                };
                Ok(Literal::new_typed_literal(value, datatype).into())
            }
            PlanExpression::Year(inner) => Ok(Literal::from(self.eval_date_time(inner, tuple)?.year()).into()),
            PlanExpression::Month(inner) => Ok(Literal::from(i64::from(
                self.eval_date_time(inner, tuple)?.month(),
            ))
            .into()),
            PlanExpression::Day(inner) => Ok(Literal::from(i64::from(
                self.eval_date_time(inner, tuple)?.day(),
            ))
            .into()),
            PlanExpression::Hours(inner) => Ok(Literal::from(i64::from(
                self.eval_date_time(inner, tuple)?.hour(),
            ))
            .into()),
            PlanExpression::Minutes(inner) => Ok(Literal::from(i64::from(
                self.eval_date_time(inner, tuple)?.minute(),
            ))
            .into()),
            PlanExpression::Seconds(inner) => Ok(Numeric::Decimal(
                self.eval_date_time(inner, tuple)?.second(),
            )
            .into_literal()
            .into()),
            PlanExpression::Cast(inner, target) => {
                cast(&self.eval_expression(inner, tuple)?, *target)
            }
        }
    }
}

/// The value and language of a simple or language-tagged string.
pub(crate) fn string_literal(term: &Term) -> ThinResult<(&str, Option<&str>)> {
    match term {
        Term::Literal(literal) => match literal.language() {
            Some(language) => Ok((literal.value(), Some(language))),
            None if literal.datatype() == xsd::STRING => Ok((literal.value(), None)),
            None => ThinError::expected(),
        },
        _ => ThinError::expected(),
    }
}

fn build_string(value: String, language: Option<String>) -> Term {
    match language {
        Some(language) => Literal::new_language_tagged_literal_unchecked(value, language).into(),
        None => Literal::new_simple_literal(value).into(),
    }
}

fn to_numeric(term: &Term) -> ThinResult<Numeric> {
    match TypedValue::from_term(term.as_ref()) {
        TypedValue::Numeric(value) => Ok(value),
        _ => ThinError::expected(),
    }
}

fn bool_term(value: bool) -> Term {
    Literal::from(value).into()
}

fn date_time_term(value: DateTime) -> Term {
    Literal::new_typed_literal(value.to_string(), xsd::DATE_TIME).into()
}

fn lang_matches(tag: &str, range: &str) -> bool {
    if range == "*" {
        return !tag.is_empty();
    }
    let tag = tag.to_ascii_lowercase();
    let range = range.to_ascii_lowercase();
    tag == range
        || tag
            .strip_prefix(&range)
            .is_some_and(|rest| rest.starts_with('-'))
}

fn encode_for_uri(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            result.push(char::from(byte));
        } else {
            result.push('%');
            result.push(char::from(b"0123456789ABCDEF"[usize::from(byte >> 4)]));
            result.push(char::from(b"0123456789ABCDEF"[usize::from(byte & 15)]));
        }
    }
    result
}

/// The XSD constructor functions.
fn cast(term: &Term, target: CastTarget) -> ThinResult<Term> {
    let value = TypedValue::from_term(term.as_ref());
    let lexical = match term {
        Term::NamedNode(node) => node.as_str(),
        Term::Literal(literal) => literal.value(),
        Term::BlankNode(_) => return ThinError::expected(),
    };
    Ok(match target {
        CastTarget::String => Literal::new_simple_literal(lexical).into(),
        CastTarget::Boolean => bool_term(match value {
            TypedValue::Boolean(value) => value,
            TypedValue::Numeric(value) => value.as_f64() != 0. && !value.as_f64().is_nan(),
            TypedValue::SimpleLiteral(value) => match value.as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return ThinError::expected(),
            },
            _ => return ThinError::expected(),
        }),
        CastTarget::Integer => Literal::from(match value {
            TypedValue::Numeric(Numeric::Integer(value)) => value,
            TypedValue::Numeric(value) => {
                let value = value.as_f64().trunc();
                if !value.is_finite() {
                    return ThinError::expected();
                }
                i64::from_str(&format!("{value:.0}"))?
            }
            TypedValue::Boolean(value) => i64::from(value),
            TypedValue::SimpleLiteral(value) => i64::from_str(value.trim())?,
            _ => return ThinError::expected(),
        })
        .into(),
        CastTarget::Decimal => Numeric::Decimal(match value {
            TypedValue::Numeric(Numeric::Integer(value)) => Decimal::from(value),
            TypedValue::Numeric(Numeric::Decimal(value)) => value,
            TypedValue::Numeric(Numeric::Double(value)) => Decimal::from_str(&value.to_string())?,
            TypedValue::Boolean(value) => Decimal::from(i64::from(value)),
            TypedValue::SimpleLiteral(value) => Decimal::from_str(value.trim())?,
            _ => return ThinError::expected(),
        })
        .into_literal()
        .into(),
        CastTarget::Double => Literal::from(match value {
            TypedValue::Numeric(value) => value.as_f64(),
            TypedValue::Boolean(value) => f64::from(u8::from(value)),
            TypedValue::SimpleLiteral(value) => f64::from_str(value.trim())?,
            _ => return ThinError::expected(),
        })
        .into(),
        CastTarget::DateTime => date_time_term(match value {
            TypedValue::DateTime(value) => value,
            TypedValue::SimpleLiteral(value) => DateTime::from_str(value.trim())?,
            _ => return ThinError::expected(),
        }),
    })
}

/// The current time as an `xsd:dateTime` in UTC.
pub fn current_date_time() -> Option<DateTime> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    let seconds = i64::try_from(elapsed.as_secs()).ok()?;
    let (year, month, day) = civil_from_days(seconds.div_euclid(86_400));
    let seconds_of_day = seconds.rem_euclid(86_400);
    DateTime::from_str(&format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{:03}Z",
        seconds_of_day / 3600,
        seconds_of_day % 3600 / 60,
        seconds_of_day % 60,
        elapsed.subsec_millis()
    ))
    .ok()
}

/// Converts days since 1970-01-01 into a proleptic Gregorian date.
fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let days = days + 719_468;
    let era = days.div_euclid(146_097);
    let day_of_era = days.rem_euclid(146_097);
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let shifted_month = (5 * day_of_year + 2) / 153;
    let day = day_of_year - (153 * shifted_month + 2) / 5 + 1;
    let month = if shifted_month < 10 {
        shifted_month + 3
    } else {
        shifted_month - 9
    };
    let year = year_of_era + era * 400;
    (if month <= 2 { year + 1 } else { year }, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(11_016), (2000, 2, 29));
        assert_eq!(civil_from_days(-1), (1969, 12, 31));
    }

    #[test]
    fn language_ranges() {
        assert!(lang_matches("en-US", "en"));
        assert!(lang_matches("EN", "en"));
        assert!(!lang_matches("eng", "en"));
        assert!(lang_matches("fr", "*"));
        assert!(!lang_matches("", "*"));
    }

    #[test]
    fn uri_encoding() {
        assert_eq!(encode_for_uri("Los Angeles"), "Los%20Angeles");
        assert_eq!(encode_for_uri("caf\u{e9}"), "caf%C3%A9");
    }

    #[test]
    fn casts() {
        let five = Term::from(Literal::new_simple_literal("5"));
        assert_eq!(
            cast(&five, CastTarget::Integer),
            Ok(Literal::from(5_i64).into())
        );
        let double = Term::from(Literal::from(2.7_f64));
        assert_eq!(
            cast(&double, CastTarget::Integer),
            Ok(Literal::from(2_i64).into())
        );
        assert!(cast(&Term::from(BlankNode::default()), CastTarget::String).is_err());
    }

    #[test]
    fn now_is_available() {
        assert!(current_date_time().is_some());
    }
}
