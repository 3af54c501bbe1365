use crate::cancellable::Cancellable;
use crate::sparql::error::QueryEvaluationError;
use crate::sparql::eval::{get_value, SimpleEvaluator, TupleIter};
use crate::sparql::parameters::{parameter_name, preprocess, PARAMETER_VARIABLE_PREFIX};
use crate::sparql::plan::{DatasetSpec, PatternValue, PlanGraph, PlanNode, Tuple};
use crate::sparql::results::{QuerySolution, QuerySolutionIter};
use crate::sparql::rewriting::{GraphPatternRewriter, BLANK_NODE_VARIABLE_PREFIX};
use crate::sparql::template::QuadTemplate;
use crate::sparql::update::UpdateOperation;
use rustc_hash::{FxHashMap, FxHashSet};
use sparqlite_model::{BlankNode, Literal, NamedOrBlankNode, NamespaceManager, Term, Triple, Variable};
use sparqlite_storage::MemoryStorageReader;
use spargebra::algebra::GraphPattern;
use spargebra::term::GraphName as UpdateGraphName;
use spargebra::{GraphUpdateOperation, Query, Update};
use std::iter::once;
use std::sync::Arc;
use tracing::debug;

/// The values of the parameters of one execution, keyed by parameter name.
pub type ParameterValues = FxHashMap<String, Term>;

/// Store-level settings that change how statements evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationOptions {
    /// The default graph of queries is the union of all graphs.
    pub union_default_graph: bool,
    /// Inserted blank nodes stay blank nodes instead of being turned into `urn:bnode:` IRIs.
    pub anonymous_blank_nodes: bool,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            union_default_graph: true,
            anonymous_blank_nodes: false,
        }
    }
}

/// Compiles statement texts into reusable [`CompiledQuery`] and [`CompiledUpdate`] values.
#[derive(Debug, Clone, Default)]
pub struct StatementCompiler {
    namespaces: Arc<NamespaceManager>,
}

impl StatementCompiler {
    pub fn new(namespaces: Arc<NamespaceManager>) -> Self {
        Self { namespaces }
    }

    pub fn namespaces(&self) -> &NamespaceManager {
        &self.namespaces
    }

    pub fn compile_query(&self, text: &str) -> Result<CompiledQuery, QueryEvaluationError> {
        let preprocessed = preprocess(text, &self.namespaces);
        let query = Query::parse(&preprocessed.text, None)?;
        let rewriter = GraphPatternRewriter::new(parameter_variables(&preprocessed.parameters));
        let mut scope = rewriter.new_scope();

        let (pattern, dataset) = match &query {
            Query::Select {
                pattern, dataset, ..
            }
            | Query::Construct {
                pattern, dataset, ..
            }
            | Query::Describe {
                pattern, dataset, ..
            }
            | Query::Ask {
                pattern, dataset, ..
            } => (pattern, dataset),
        };
        let plan = Arc::new(rewriter.rewrite(pattern, &mut scope)?);
        let dataset = dataset
            .as_ref()
            .map(|dataset| DatasetSpec::from_iris(&dataset.default, dataset.named.as_deref()))
            .unwrap_or_default();

        let (form, variables) = match &query {
            Query::Select { .. } => {
                let variables = output_variables(pattern);
                let slots = variables.iter().map(|v| scope.slot(v)).collect();
                (QueryForm::Select { slots }, variables)
            }
            Query::Describe { .. } => {
                let slots = output_variables(pattern)
                    .iter()
                    .map(|v| scope.slot(v))
                    .collect();
                (QueryForm::Describe { slots }, triple_variables())
            }
            Query::Ask { .. } => (QueryForm::Ask, vec![Variable::new_unchecked("result")]),
            Query::Construct { template, .. } => (
                QueryForm::Construct {
                    template: template
                        .iter()
                        .map(|t| QuadTemplate::from_triple_pattern(t, &mut scope))
                        .collect(),
                },
                triple_variables(),
            ),
        };

        debug!(
            parameters = preprocessed.parameters.len(),
            kind = ?form.kind(),
            "Compiled query"
        );
        Ok(CompiledQuery {
            text: text.to_owned(),
            parameters: preprocessed.parameters,
            form,
            plan,
            variables: variables.into(),
            dataset,
        })
    }

    pub fn compile_update(&self, text: &str) -> Result<CompiledUpdate, QueryEvaluationError> {
        let preprocessed = preprocess(text, &self.namespaces);
        let update = Update::parse(&preprocessed.text, None)?;
        let rewriter = GraphPatternRewriter::new(parameter_variables(&preprocessed.parameters));

        let operations = update
            .operations
            .iter()
            .map(|operation| compile_update_operation(operation, &rewriter))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            parameters = preprocessed.parameters.len(),
            operations = operations.len(),
            "Compiled update"
        );
        Ok(CompiledUpdate {
            text: text.to_owned(),
            parameters: preprocessed.parameters,
            operations,
        })
    }
}

fn compile_update_operation(
    operation: &GraphUpdateOperation,
    rewriter: &GraphPatternRewriter,
) -> Result<UpdateOperation, QueryEvaluationError> {
    Ok(match operation {
        GraphUpdateOperation::InsertData { data } => UpdateOperation::InsertData {
            data: data.iter().map(QuadTemplate::from_quad).collect(),
        },
        GraphUpdateOperation::DeleteData { data } => UpdateOperation::DeleteData {
            data: data.iter().map(QuadTemplate::from_ground_quad).collect(),
        },
        GraphUpdateOperation::DeleteInsert {
            delete,
            insert,
            using,
            pattern,
        } => {
            let mut scope = rewriter.new_scope();
            let plan = Arc::new(rewriter.rewrite(pattern, &mut scope)?);
            UpdateOperation::DeleteInsert {
                delete: delete
                    .iter()
                    .map(|p| QuadTemplate::from_ground_quad_pattern(p, &mut scope))
                    .collect(),
                insert: insert
                    .iter()
                    .map(|p| QuadTemplate::from_quad_pattern(p, &mut scope))
                    .collect(),
                plan,
                dataset: using
                    .as_ref()
                    .map(|using| DatasetSpec::from_iris(&using.default, using.named.as_deref())),
            }
        }
        GraphUpdateOperation::Load {
            silent,
            source,
            destination,
        } => UpdateOperation::Load {
            silent: *silent,
            source: source.clone(),
            destination: match destination {
                UpdateGraphName::NamedNode(node) => node.clone().into(),
                UpdateGraphName::DefaultGraph => sparqlite_model::GraphName::DefaultGraph,
            },
        },
        GraphUpdateOperation::Clear { silent, graph } => UpdateOperation::Clear {
            silent: *silent,
            target: graph.clone(),
        },
        GraphUpdateOperation::Create { silent, graph } => UpdateOperation::Create {
            silent: *silent,
            graph: graph.clone(),
        },
        GraphUpdateOperation::Drop { silent, graph } => UpdateOperation::Drop {
            silent: *silent,
            target: graph.clone(),
        },
    })
}

fn parameter_variables(parameters: &[String]) -> Vec<Variable> {
    parameters
        .iter()
        .map(|name| Variable::new_unchecked(format!("{PARAMETER_VARIABLE_PREFIX}{name}")))
        .collect()
}

/// The visible variables of a pattern, without the hidden parameter and blank node variables.
fn output_variables(pattern: &GraphPattern) -> Vec<Variable> {
    let mut variables = Vec::new();
    pattern.on_in_scope_variable(|variable| {
        let name = variable.as_str();
        if parameter_name(name).is_none()
            && !name.starts_with(BLANK_NODE_VARIABLE_PREFIX)
            && !variables.contains(variable)
        {
            variables.push(variable.clone());
        }
    });
    variables
}

fn triple_variables() -> Vec<Variable> {
    ["subject", "predicate", "object"]
        .into_iter()
        .map(Variable::new_unchecked)
        .collect()
}

/// Builds the seed tuple holding the parameter values in their reserved slots.
fn seed_tuple(
    parameters: &[String],
    values: &ParameterValues,
) -> Result<Tuple, QueryEvaluationError> {
    parameters
        .iter()
        .map(|name| {
            values
                .get(name)
                .cloned()
                .map(Some)
                .ok_or_else(|| QueryEvaluationError::UnboundParameter(name.clone()))
        })
        .collect()
}

/// The kind of a compiled query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Select,
    Ask,
    Construct,
    Describe,
}

#[derive(Debug, Clone)]
enum QueryForm {
    Select { slots: Vec<usize> },
    Ask,
    Construct { template: Vec<QuadTemplate> },
    Describe { slots: Vec<usize> },
}

impl QueryForm {
    fn kind(&self) -> QueryKind {
        match self {
            Self::Select { .. } => QueryKind::Select,
            Self::Ask => QueryKind::Ask,
            Self::Construct { .. } => QueryKind::Construct,
            Self::Describe { .. } => QueryKind::Describe,
        }
    }
}

/// A parsed and planned query. Immutable, executable any number of times.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    text: String,
    parameters: Vec<String>,
    form: QueryForm,
    plan: Arc<PlanNode>,
    variables: Arc<[Variable]>,
    dataset: DatasetSpec,
}

impl CompiledQuery {
    /// The statement text as given to the compiler.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The parameter names, in order of first appearance.
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn kind(&self) -> QueryKind {
        self.form.kind()
    }

    /// The names of the result columns.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Evaluates the query against a snapshot.
    ///
    /// Every parameter must have a value. The result is lazy; the snapshot stays pinned until the
    /// iterator is dropped.
    pub fn execute(
        &self,
        reader: MemoryStorageReader,
        values: &ParameterValues,
        options: &EvaluationOptions,
        cancellable: Option<Cancellable>,
    ) -> Result<QuerySolutionIter, QueryEvaluationError> {
        let seed = seed_tuple(&self.parameters, values)?;
        let evaluator = SimpleEvaluator::new(
            reader,
            self.dataset.clone(),
            options.union_default_graph,
            seed.clone(),
            cancellable,
        );
        let mut solutions = evaluator.eval_plan(&self.plan, seed);
        let variables = Arc::clone(&self.variables);
        Ok(match &self.form {
            QueryForm::Select { slots } => {
                let slots = slots.clone();
                QuerySolutionIter::new(
                    variables,
                    solutions.map(move |tuple| tuple.map(|tuple| project(&slots, &tuple))),
                )
            }
            QueryForm::Ask => {
                let result = match solutions.next() {
                    Some(Ok(_)) => true,
                    Some(Err(error)) => return Err(error),
                    None => false,
                };
                QuerySolutionIter::new(variables, once(Ok(vec![Some(Literal::from(result).into())])))
            }
            QueryForm::Construct { template } => {
                QuerySolutionIter::new(variables, construct(solutions, template.clone()))
            }
            QueryForm::Describe { slots } => {
                QuerySolutionIter::new(variables, describe(&evaluator, solutions, slots)?)
            }
        })
    }
}

fn project(slots: &[usize], tuple: &Tuple) -> QuerySolution {
    slots
        .iter()
        .map(|slot| get_value(*slot, tuple).cloned())
        .collect()
}

fn triple_row(triple: Triple) -> QuerySolution {
    vec![
        Some(triple.subject.into()),
        Some(triple.predicate.into()),
        Some(triple.object),
    ]
}

/// Instantiates the template for every solution. Blank nodes are fresh per solution and the
/// produced triples are deduplicated.
fn construct(
    solutions: TupleIter,
    template: Vec<QuadTemplate>,
) -> impl Iterator<Item = Result<QuerySolution, QueryEvaluationError>> + Send {
    let mut seen = FxHashSet::default();
    solutions.flat_map(move |tuple| -> Vec<Result<QuerySolution, QueryEvaluationError>> {
        let tuple = match tuple {
            Ok(tuple) => tuple,
            Err(error) => return vec![Err(error)],
        };
        let mut blank_nodes = FxHashMap::<String, BlankNode>::default();
        let mut blank_node = |label: &str| {
            NamedOrBlankNode::from(blank_nodes.entry(label.to_owned()).or_default().clone())
        };
        template
            .iter()
            .filter_map(|t| t.instantiate(&tuple, &mut blank_node))
            .map(|quad| Triple::new(quad.subject, quad.predicate, quad.object))
            .filter(|triple| seen.insert(triple.clone()))
            .map(|triple| Ok(triple_row(triple)))
            .collect()
    })
}

/// Returns the triples of every resource bound in the solutions.
fn describe(
    evaluator: &SimpleEvaluator,
    solutions: TupleIter,
    slots: &[usize],
) -> Result<impl Iterator<Item = Result<QuerySolution, QueryEvaluationError>> + Send, QueryEvaluationError>
{
    let mut resources = Vec::new();
    let mut seen = FxHashSet::default();
    for tuple in solutions {
        let tuple = tuple?;
        for slot in slots {
            if let Some(value @ (Term::NamedNode(_) | Term::BlankNode(_))) = get_value(*slot, &tuple)
            {
                if seen.insert(value.clone()) {
                    resources.push(value.clone());
                }
            }
        }
    }

    let evaluator = evaluator.clone();
    Ok(resources.into_iter().flat_map(move |resource| {
        let pattern = Arc::new(PlanNode::QuadPattern {
            subject: PatternValue::Constant(resource.clone()),
            predicate: PatternValue::Variable(0),
            object: PatternValue::Variable(1),
            graph_name: PlanGraph::Default,
        });
        evaluator
            .eval_plan(&pattern, Tuple::new())
            .map(move |tuple| -> Result<QuerySolution, QueryEvaluationError> {
                let tuple = tuple?;
                Ok(vec![
                    Some(resource.clone()),
                    get_value(0, &tuple).cloned(),
                    get_value(1, &tuple).cloned(),
                ])
            })
    }))
}

/// A parsed update. Immutable, executable any number of times.
#[derive(Debug, Clone)]
pub struct CompiledUpdate {
    text: String,
    parameters: Vec<String>,
    pub(crate) operations: Vec<UpdateOperation>,
}

impl CompiledUpdate {
    /// The statement text as given to the compiler.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The parameter names, in order of first appearance.
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub(crate) fn seed(&self, values: &ParameterValues) -> Result<Tuple, QueryEvaluationError> {
        seed_tuple(&self.parameters, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparqlite_model::{NamedNode, Quad, QuadRef};
    use sparqlite_storage::MemoryStorage;

    fn store() -> MemoryStorage {
        let storage = MemoryStorage::new();
        let mut writer = storage.begin();
        for (s, o) in [("urn:a", "urn:Thing"), ("urn:b", "urn:Thing"), ("urn:c", "urn:Other")] {
            writer.insert(QuadRef::new(
                NamedNode::new_unchecked(s).as_ref(),
                sparqlite_model::vocab::rdf::TYPE,
                NamedNode::new_unchecked(o).as_ref(),
                sparqlite_model::GraphNameRef::DefaultGraph,
            ));
        }
        writer.commit().unwrap();
        storage
    }

    fn rows(query: &CompiledQuery, storage: &MemoryStorage, values: &ParameterValues) -> Vec<QuerySolution> {
        query
            .execute(storage.snapshot(), values, &EvaluationOptions::default(), None)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn select_hides_parameter_variables() {
        let query = StatementCompiler::default()
            .compile_query("SELECT * WHERE { ?s a ~type }")
            .unwrap();
        assert_eq!(query.parameters(), ["type"]);
        assert_eq!(query.variables(), [Variable::new_unchecked("s")]);
        assert_eq!(query.kind(), QueryKind::Select);
    }

    #[test]
    fn parameters_are_bound_per_execution() {
        let storage = store();
        let query = StatementCompiler::default()
            .compile_query("SELECT ?s WHERE { ?s a ~type } ORDER BY ?s")
            .unwrap();

        let mut values = ParameterValues::default();
        values.insert("type".to_owned(), NamedNode::new_unchecked("urn:Thing").into());
        assert_eq!(rows(&query, &storage, &values).len(), 2);

        values.insert("type".to_owned(), NamedNode::new_unchecked("urn:Other").into());
        assert_eq!(
            rows(&query, &storage, &values),
            [vec![Some(NamedNode::new_unchecked("urn:c").into())]]
        );
    }

    #[test]
    fn missing_parameter_values_are_rejected() {
        let storage = store();
        let query = StatementCompiler::default()
            .compile_query("SELECT ?s WHERE { ?s a ~type }")
            .unwrap();
        let result = query.execute(
            storage.snapshot(),
            &ParameterValues::default(),
            &EvaluationOptions::default(),
            None,
        );
        assert!(matches!(
            result,
            Err(QueryEvaluationError::UnboundParameter(name)) if name == "type"
        ));
    }

    #[test]
    fn ask_yields_one_boolean() {
        let storage = store();
        let compiler = StatementCompiler::default();
        let yes = compiler.compile_query("ASK { <urn:a> a <urn:Thing> }").unwrap();
        let no = compiler.compile_query("ASK { <urn:c> a <urn:Thing> }").unwrap();
        assert_eq!(
            rows(&yes, &storage, &ParameterValues::default()),
            [vec![Some(Literal::from(true).into())]]
        );
        assert_eq!(
            rows(&no, &storage, &ParameterValues::default()),
            [vec![Some(Literal::from(false).into())]]
        );
    }

    #[test]
    fn construct_and_describe_yield_triples() {
        let storage = store();
        let compiler = StatementCompiler::default();
        let construct = compiler
            .compile_query("CONSTRUCT { ?s <urn:kind> ?t } WHERE { ?s a ?t }")
            .unwrap();
        assert_eq!(construct.variables(), triple_variables().as_slice());
        assert_eq!(rows(&construct, &storage, &ParameterValues::default()).len(), 3);

        let describe = compiler.compile_query("DESCRIBE <urn:a>").unwrap();
        assert_eq!(
            rows(&describe, &storage, &ParameterValues::default()),
            [vec![
                Some(NamedNode::new_unchecked("urn:a").into()),
                Some(sparqlite_model::vocab::rdf::TYPE.into_owned().into()),
                Some(NamedNode::new_unchecked("urn:Thing").into()),
            ]]
        );
    }

    #[test]
    fn prefixed_names_use_the_namespace_manager() {
        let compiler = StatementCompiler::default();
        let query = compiler
            .compile_query("SELECT ?u WHERE { ?u nfo:fileName ~name }")
            .unwrap();
        assert_eq!(query.parameters(), ["name"]);
        let storage = MemoryStorage::new();
        let mut writer = storage.begin();
        writer.insert(
            Quad::new(
                NamedNode::new_unchecked("urn:file"),
                NamedNode::new_unchecked(format!(
                    "{}fileName",
                    sparqlite_model::vocab::nfo::NAMESPACE
                )),
                Literal::new_simple_literal("photo.jpg"),
                sparqlite_model::GraphName::DefaultGraph,
            )
            .as_ref(),
        );
        writer.commit().unwrap();
        let mut values = ParameterValues::default();
        values.insert("name".to_owned(), Literal::new_simple_literal("photo.jpg").into());
        assert_eq!(rows(&query, &storage, &values).len(), 1);
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert!(matches!(
            StatementCompiler::default().compile_query("SELEC ?s WHERE {}"),
            Err(QueryEvaluationError::Parsing(_))
        ));
    }
}
