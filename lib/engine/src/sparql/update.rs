//! Evaluation of SPARQL updates inside a write transaction.

use crate::blank_nodes::{BlankNodeAllocator, BlankNodeLabels};
use crate::cancellable::Cancellable;
use crate::sparql::error::QueryEvaluationError;
use crate::sparql::eval::SimpleEvaluator;
use crate::sparql::plan::{DatasetSpec, PlanNode, Tuple};
use crate::sparql::statement::{CompiledUpdate, EvaluationOptions, ParameterValues};
use crate::sparql::template::QuadTemplate;
use oxrdfio::{RdfFormat, RdfParser};
use sparqlite_model::{GraphName, GraphNameRef, NamedNode, NamedOrBlankNodeRef, Quad};
use sparqlite_storage::MemoryStorageWriter;
use spargebra::algebra::GraphTarget;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub(crate) enum UpdateOperation {
    InsertData {
        data: Vec<QuadTemplate>,
    },
    DeleteData {
        data: Vec<QuadTemplate>,
    },
    DeleteInsert {
        delete: Vec<QuadTemplate>,
        insert: Vec<QuadTemplate>,
        plan: Arc<PlanNode>,
        /// From `USING`, `None` for the store dataset.
        dataset: Option<DatasetSpec>,
    },
    Load {
        silent: bool,
        source: NamedNode,
        destination: GraphName,
    },
    Clear {
        silent: bool,
        target: GraphTarget,
    },
    Create {
        silent: bool,
        graph: NamedNode,
    },
    Drop {
        silent: bool,
        target: GraphTarget,
    },
}

/// What an update did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Quads that were not in the store before.
    pub inserted: usize,
    /// Quads that were in the store before.
    pub removed: usize,
    /// Per blank node producing application (each `INSERT DATA`, each solution of an
    /// `INSERT ... WHERE`), the identifiers given to the blank node labels.
    pub blank_nodes: Vec<BlankNodeLabels>,
}

impl CompiledUpdate {
    /// Applies the update operations in order.
    ///
    /// Writes go to `writer` only; committing or rolling back is up to the caller.
    pub fn execute(
        &self,
        writer: &mut MemoryStorageWriter,
        values: &ParameterValues,
        options: &EvaluationOptions,
        cancellable: Option<Cancellable>,
    ) -> Result<UpdateOutcome, QueryEvaluationError> {
        let seed = self.seed(values)?;
        let mut evaluator = UpdateEvaluator {
            writer,
            seed,
            options,
            cancellable,
            outcome: UpdateOutcome::default(),
        };
        for operation in &self.operations {
            if let Some(cancellable) = &evaluator.cancellable {
                cancellable.check()?;
            }
            evaluator.eval(operation)?;
        }
        debug!(
            inserted = evaluator.outcome.inserted,
            removed = evaluator.outcome.removed,
            "Executed update"
        );
        Ok(evaluator.outcome)
    }
}

struct UpdateEvaluator<'a> {
    writer: &'a mut MemoryStorageWriter,
    seed: Tuple,
    options: &'a EvaluationOptions,
    cancellable: Option<Cancellable>,
    outcome: UpdateOutcome,
}

impl UpdateEvaluator<'_> {
    fn eval(&mut self, operation: &UpdateOperation) -> Result<(), QueryEvaluationError> {
        match operation {
            UpdateOperation::InsertData { data } => {
                let mut allocator = BlankNodeAllocator::new(self.options.anonymous_blank_nodes);
                let seed = self.seed.clone();
                for template in data {
                    if let Some(quad) =
                        template.instantiate(&seed, &mut |label| allocator.resolve(label))
                    {
                        self.insert(&quad);
                    }
                }
                self.outcome.blank_nodes.push(allocator.take_labels());
                Ok(())
            }
            UpdateOperation::DeleteData { data } => {
                let seed = self.seed.clone();
                for template in data {
                    if let Some(quad) = template.instantiate(&seed, &mut no_blank_nodes) {
                        self.remove(&quad);
                    }
                }
                Ok(())
            }
            UpdateOperation::DeleteInsert {
                delete,
                insert,
                plan,
                dataset,
            } => self.eval_delete_insert(delete, insert, plan, dataset.as_ref()),
            UpdateOperation::Load {
                silent,
                source,
                destination,
            } => match self.eval_load(source, destination) {
                Err(error) if *silent => {
                    debug!(source = source.as_str(), %error, "Ignored failing silent LOAD");
                    Ok(())
                }
                result => result,
            },
            UpdateOperation::Clear { silent, target } => self.eval_clear(target, *silent),
            UpdateOperation::Create { silent, graph } => {
                if self.writer.reader().contains_named_graph(graph.as_ref().into()) {
                    if *silent {
                        Ok(())
                    } else {
                        Err(QueryEvaluationError::GraphAlreadyExists(graph.clone()))
                    }
                } else {
                    self.writer.insert_named_graph(graph.as_ref().into());
                    Ok(())
                }
            }
            UpdateOperation::Drop { silent, target } => self.eval_drop(target, *silent),
        }
    }

    fn eval_delete_insert(
        &mut self,
        delete: &[QuadTemplate],
        insert: &[QuadTemplate],
        plan: &Arc<PlanNode>,
        dataset: Option<&DatasetSpec>,
    ) -> Result<(), QueryEvaluationError> {
        let evaluator = SimpleEvaluator::new(
            self.writer.reader(),
            dataset.cloned().unwrap_or_default(),
            self.options.union_default_graph,
            self.seed.clone(),
            self.cancellable.clone(),
        );
        // All solutions are computed before the first write so the writes cannot affect them.
        let solutions = evaluator
            .eval_plan(plan, self.seed.clone())
            .collect::<Result<Vec<_>, _>>()?;

        for solution in &solutions {
            for template in delete {
                if let Some(quad) = template.instantiate(solution, &mut no_blank_nodes) {
                    self.remove(&quad);
                }
            }
        }
        if insert.is_empty() {
            return Ok(());
        }
        let mut allocator = BlankNodeAllocator::new(self.options.anonymous_blank_nodes);
        for solution in &solutions {
            for template in insert {
                if let Some(quad) =
                    template.instantiate(solution, &mut |label| allocator.resolve(label))
                {
                    self.insert(&quad);
                }
            }
            self.outcome.blank_nodes.push(allocator.take_labels());
        }
        Ok(())
    }

    /// Loads a local RDF file. The whole document is parsed before the first insertion.
    fn eval_load(
        &mut self,
        source: &NamedNode,
        destination: &GraphName,
    ) -> Result<(), QueryEvaluationError> {
        let Some(path) = source.as_str().strip_prefix("file://") else {
            return Err(QueryEvaluationError::NotImplemented(format!(
                "LOAD from {source}, only file: IRIs are supported"
            )));
        };
        let path = Path::new(path);
        let format = path
            .extension()
            .and_then(|extension| extension.to_str())
            .and_then(RdfFormat::from_extension)
            .ok_or_else(|| {
                QueryEvaluationError::UnsupportedContentType(path.display().to_string())
            })?;
        let parser = RdfParser::from_format(format)
            .with_base_iri(source.as_str())
            .map_err(|error| QueryEvaluationError::InternalError(error.to_string()))?
            .with_default_graph(destination.clone());
        let mut allocator = BlankNodeAllocator::new(self.options.anonymous_blank_nodes);
        let quads = parser
            .for_reader(BufReader::new(File::open(path)?))
            .map(|quad| quad.map(|quad| allocator.relabel_quad(quad)))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(source = source.as_str(), quads = quads.len(), "Loaded RDF document");
        if let GraphName::NamedNode(graph) = destination {
            self.writer.insert_named_graph(graph.as_ref().into());
        }
        for quad in &quads {
            self.insert(quad);
        }
        Ok(())
    }

    fn eval_clear(&mut self, target: &GraphTarget, silent: bool) -> Result<(), QueryEvaluationError> {
        match target {
            GraphTarget::NamedNode(graph) => {
                if self.writer.reader().contains_named_graph(graph.as_ref().into()) {
                    self.writer.clear_graph(graph.as_ref().into());
                    Ok(())
                } else if silent {
                    Ok(())
                } else {
                    Err(QueryEvaluationError::GraphDoesNotExist(graph.clone()))
                }
            }
            GraphTarget::DefaultGraph => {
                self.writer.clear_graph(GraphNameRef::DefaultGraph);
                Ok(())
            }
            GraphTarget::NamedGraphs => {
                self.writer.clear_all_named_graphs();
                Ok(())
            }
            GraphTarget::AllGraphs => {
                self.writer.clear_all_graphs();
                Ok(())
            }
        }
    }

    fn eval_drop(&mut self, target: &GraphTarget, silent: bool) -> Result<(), QueryEvaluationError> {
        match target {
            GraphTarget::NamedNode(graph) => {
                if self.writer.remove_named_graph(NamedOrBlankNodeRef::from(graph.as_ref())) || silent {
                    Ok(())
                } else {
                    Err(QueryEvaluationError::GraphDoesNotExist(graph.clone()))
                }
            }
            GraphTarget::DefaultGraph => {
                self.writer.clear_graph(GraphNameRef::DefaultGraph);
                Ok(())
            }
            GraphTarget::NamedGraphs => {
                self.writer.remove_all_named_graphs();
                Ok(())
            }
            GraphTarget::AllGraphs => {
                self.writer.clear();
                Ok(())
            }
        }
    }

    fn insert(&mut self, quad: &Quad) {
        if self.writer.insert(quad.as_ref()) {
            self.outcome.inserted += 1;
        }
    }

    fn remove(&mut self, quad: &Quad) {
        if self.writer.remove(quad.as_ref()) {
            self.outcome.removed += 1;
        }
    }
}

/// Ground templates never contain blank nodes.
fn no_blank_nodes(label: &str) -> sparqlite_model::NamedOrBlankNode {
    sparqlite_model::BlankNode::new_unchecked(label).into()
}
