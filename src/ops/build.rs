//! Implementation of `toolforge build`.
//!
//! The build is an explicit graph of leaf steps. Edges only point from a
//! step to steps declared before it, so the graph is acyclic by
//! construction and a topological order always exists. The order is
//! deterministic: among ready steps, the earliest stage and then the
//! earliest declared step runs first, which reproduces the fixed sequence
//! frontend, runtime, stdlib, bindings, drivers, builder, support tools,
//! tools.
//!
//! Steps run through an [`Executor`]. The [`SequentialExecutor`] stops at
//! the first failing step; nothing built after that point is recorded.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;

use crate::core::Manifest;
use crate::error::{self, ForgeError};
use crate::ops::compiler::TargetCompiler;
use crate::ops::configure::{configure, Configured};
use crate::ops::steps::{
    BuilderStep, ExecutableStep, FrontendStep, LibraryStep, StdlibStep, ToolStep,
};
use crate::phase::Phases;
use crate::util::context::BuildContext;
use crate::util::shell::{format_duration, Status};

/// Build stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Frontend,
    Runtime,
    Stdlib,
    Binding,
    Driver,
    Builder,
    SupportTool,
    Tool,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Frontend => "frontend",
            Stage::Runtime => "runtime",
            Stage::Stdlib => "stdlib",
            Stage::Binding => "binding",
            Stage::Driver => "driver",
            Stage::Builder => "builder",
            Stage::SupportTool => "support-tool",
            Stage::Tool => "tool",
        }
    }
}

/// Identifies one leaf step, e.g. `runtime:judy`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StepId {
    pub stage: Stage,
    pub name: String,
}

impl StepId {
    pub fn new(stage: Stage, name: impl Into<String>) -> Self {
        StepId {
            stage,
            name: name.into(),
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.stage.as_str(), self.name)
    }
}

/// Output of a leaf step: one artifact for static linking and one for
/// shared linking. Steps with a single artifact use it for both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentResult {
    pub static_: PathBuf,
    pub shared: PathBuf,
}

impl ComponentResult {
    pub fn new(static_: PathBuf, shared: PathBuf) -> Self {
        ComponentResult { static_, shared }
    }

    pub fn single(path: PathBuf) -> Self {
        ComponentResult {
            static_: path.clone(),
            shared: path,
        }
    }
}

/// What a step sees when it runs: the context, the phases and the results
/// of the steps it declared.
pub struct StepInputs<'a> {
    pub ctx: &'a BuildContext,
    pub phases: &'a Phases,
    pub manifest: &'a Manifest,
    id: &'a StepId,
    results: BTreeMap<StepId, &'a ComponentResult>,
}

impl<'a> StepInputs<'a> {
    /// Result of a declared requirement.
    pub fn result(&self, id: &StepId) -> Result<&'a ComponentResult> {
        self.results
            .get(id)
            .copied()
            .ok_or_else(|| anyhow!("{} did not declare a dependency on {}", self.id, id))
    }

    /// Results of every declared requirement in `stage`, in declaration
    /// order.
    pub fn results_in(&self, stage: Stage) -> impl Iterator<Item = (&StepId, &'a ComponentResult)> {
        self.results
            .iter()
            .filter(move |(id, _)| id.stage == stage)
            .map(|(id, r)| (id, *r))
    }
}

/// A leaf unit of the build.
pub trait LeafStep: fmt::Debug + Send + Sync {
    fn id(&self) -> StepId;

    /// Steps whose results this step consumes.
    fn requires(&self) -> Vec<StepId> {
        Vec::new()
    }

    /// When `Some`, the step is skipped with this reason.
    fn skip_reason(&self, _inputs: &StepInputs<'_>) -> Option<String> {
        None
    }

    fn run(&self, inputs: &StepInputs<'_>) -> Result<ComponentResult>;
}

/// Leaf steps and their requirement edges.
#[derive(Debug, Default)]
pub struct BuildGraph {
    /// Edge `a -> b` means b consumes a's result.
    graph: DiGraph<Box<dyn LeafStep>, ()>,
    index: HashMap<StepId, NodeIndex>,
}

impl BuildGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step. Its requirements must already be in the graph.
    pub fn add(&mut self, step: impl LeafStep + 'static) -> Result<()> {
        let id = step.id();
        if self.index.contains_key(&id) {
            bail!("build step {} is defined more than once", id);
        }

        let mut deps = Vec::new();
        for req in step.requires() {
            match self.index.get(&req) {
                Some(&node) => deps.push(node),
                None => bail!("{} requires {}, which is not built before it", id, req),
            }
        }

        let node = self.graph.add_node(Box::new(step));
        for dep in deps {
            self.graph.add_edge(dep, node, ());
        }
        self.index.insert(id, node);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, id: &StepId) -> bool {
        self.index.contains_key(id)
    }

    /// Topological order, ties broken by stage and then declaration order.
    pub fn order(&self) -> Result<Vec<StepId>> {
        let mut indegree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|n| (n, self.graph.neighbors_directed(n, Direction::Incoming).count()))
            .collect();

        let mut ready = BinaryHeap::new();
        for (&node, &deg) in &indegree {
            if deg == 0 {
                ready.push(Reverse((self.graph[node].id().stage, node.index())));
            }
        }

        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse((_, idx))) = ready.pop() {
            let node = NodeIndex::new(idx);
            order.push(self.graph[node].id());
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(deg) = indegree.get_mut(&next) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(Reverse((self.graph[next].id().stage, next.index())));
                    }
                }
            }
        }

        if order.len() != self.len() {
            bail!("build graph has a cycle");
        }
        Ok(order)
    }

    fn step(&self, id: &StepId) -> Option<&dyn LeafStep> {
        self.index.get(id).map(|&n| self.graph[n].as_ref())
    }
}

/// Results of running a build graph.
#[derive(Debug, Default)]
pub struct BuildResults {
    pub results: BTreeMap<StepId, ComponentResult>,
    pub skipped: Vec<(StepId, String)>,
}

impl BuildResults {
    pub fn get(&self, id: &StepId) -> Option<&ComponentResult> {
        self.results.get(id)
    }

    pub fn is_skipped(&self, id: &StepId) -> bool {
        self.skipped.iter().any(|(s, _)| s == id)
    }
}

/// Strategy for running a [`BuildGraph`].
pub trait Executor {
    fn execute(
        &self,
        graph: &BuildGraph,
        ctx: &BuildContext,
        phases: &Phases,
        manifest: &Manifest,
    ) -> Result<BuildResults>;
}

/// Runs steps one at a time in [`BuildGraph::order`]. Each step may still
/// use the scheduler for its own compiles.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialExecutor;

impl Executor for SequentialExecutor {
    fn execute(
        &self,
        graph: &BuildGraph,
        ctx: &BuildContext,
        phases: &Phases,
        manifest: &Manifest,
    ) -> Result<BuildResults> {
        let mut out = BuildResults::default();

        for id in graph.order()? {
            let Some(step) = graph.step(&id) else { continue };

            let requires = step.requires();
            if let Some(dep) = requires.iter().find(|r| out.is_skipped(r)) {
                let reason = format!("{} was skipped", dep);
                ctx.shell().status(Status::Skipping, format!("{}: {}", id, reason));
                out.skipped.push((id, reason));
                continue;
            }

            let results = requires
                .iter()
                .filter_map(|r| out.results.get(r).map(|res| (r.clone(), res)))
                .collect();
            let inputs = StepInputs {
                ctx,
                phases,
                manifest,
                id: &id,
                results,
            };

            if let Some(reason) = step.skip_reason(&inputs) {
                ctx.shell().status(Status::Skipping, format!("{}: {}", id, reason));
                out.skipped.push((id, reason));
                continue;
            }

            ctx.shell().status(Status::Building, &id);
            let result = step.run(&inputs).map_err(|e| step_error(&id.to_string(), e))?;
            tracing::debug!("{} -> {}", id, result.static_.display());
            out.results.insert(id, result);
        }

        Ok(out)
    }
}

/// Wrap a step's failure as a [`ForgeError::BuildStepFailure`], once.
pub(crate) fn step_error(step: &str, err: anyhow::Error) -> anyhow::Error {
    if matches!(error::category(&err), Some(ForgeError::BuildStepFailure { .. })) {
        return err;
    }
    ForgeError::build_step(step, format!("{:#}", err)).into()
}

fn library_stage(manifest: &Manifest, name: &str) -> Option<Stage> {
    if manifest.runtime.iter().any(|l| l.name == name) {
        Some(Stage::Runtime)
    } else if manifest.stdlib.bindings.iter().any(|l| l.name == name) {
        Some(Stage::Binding)
    } else {
        None
    }
}

/// Step ids of the libraries named in `names`.
pub(crate) fn library_ids(manifest: &Manifest, names: &[String], user: &str) -> Result<Vec<StepId>> {
    names
        .iter()
        .map(|name| {
            library_stage(manifest, name)
                .map(|stage| StepId::new(stage, name.as_str()))
                .ok_or_else(|| anyhow!("{} links unknown library `{}`", user, name))
        })
        .collect()
}

/// The fixed build sequence for `manifest`.
pub fn standard_graph(manifest: &Manifest) -> Result<BuildGraph> {
    let mut graph = BuildGraph::new();

    let frontend = match &manifest.frontend {
        Some(spec) => {
            let step = FrontendStep::new(spec.clone());
            let id = step.id();
            graph.add(step)?;
            Some(id)
        }
        None => None,
    };

    for lib in &manifest.runtime {
        graph.add(LibraryStep::new(Stage::Runtime, lib.clone(), manifest)?)?;
    }

    let stdlib = StdlibStep::new(manifest.stdlib.copy.clone());
    let stdlib_id = stdlib.id();
    graph.add(stdlib)?;

    for lib in &manifest.stdlib.bindings {
        graph.add(LibraryStep::new(Stage::Binding, lib.clone(), manifest)?)?;
    }

    let mut drivers = Vec::new();
    for exe in &manifest.drivers {
        let step = ExecutableStep::new(Stage::Driver, exe.clone(), None, manifest)?;
        drivers.push(step.id());
        graph.add(step)?;
    }

    let builder = match &manifest.builder {
        Some(spec) => {
            let step = BuilderStep::new(spec.clone(), frontend, drivers, manifest)?;
            let id = step.id();
            graph.add(step)?;
            Some(id)
        }
        None => None,
    };

    for tool in &manifest.support_tools {
        graph.add(ExecutableStep::new(
            Stage::SupportTool,
            tool.exe.clone(),
            tool.requires.clone(),
            manifest,
        )?)?;
    }

    if !manifest.tools.is_empty() {
        let Some(builder) = builder.clone() else {
            bail!("[[tool]] entries need a [builder] to compile them");
        };
        for tool in &manifest.tools {
            graph.add(ToolStep::new(tool.clone(), builder.clone(), stdlib_id.clone()))?;
        }
    }

    Ok(graph)
}

/// Everything a finished build hands to later commands.
#[derive(Debug)]
pub struct BuildOutputs {
    pub phases: Phases,
    pub manifest: Manifest,
    pub results: BuildResults,
    /// The builder tool, when the manifest has one.
    pub compiler: Option<TargetCompiler>,
}

/// Configure, then run the build graph.
pub fn build(ctx: &BuildContext) -> Result<BuildOutputs> {
    build_with(ctx, &SequentialExecutor)
}

pub fn build_with(ctx: &BuildContext, executor: &dyn Executor) -> Result<BuildOutputs> {
    let start = Instant::now();
    let Configured {
        phases, manifest, ..
    } = configure(ctx)?;
    let manifest = manifest.ok_or_else(|| {
        anyhow!(
            "no {} found in {}",
            crate::core::MANIFEST_FILE,
            ctx.source_root().display()
        )
    })?;

    let graph = standard_graph(&manifest)?;
    let results = executor.execute(&graph, ctx, &phases, &manifest)?;

    let compiler = match manifest.builder.as_ref() {
        Some(spec) => {
            let id = StepId::new(Stage::Builder, spec.name.as_str());
            match results.get(&id) {
                Some(result) => Some(target_compiler(ctx, &phases, &results, &result.static_)?),
                None => None,
            }
        }
        None => None,
    };

    ctx.shell().status(
        Status::Finished,
        format!(
            "{} steps ({} skipped) in {}",
            results.results.len(),
            results.skipped.len(),
            format_duration(start.elapsed())
        ),
    );

    Ok(BuildOutputs {
        phases,
        manifest,
        results,
        compiler,
    })
}

pub(crate) fn target_compiler(
    ctx: &BuildContext,
    phases: &Phases,
    results: &BuildResults,
    exe: &Path,
) -> Result<TargetCompiler> {
    let stdlib = results
        .get(&StepId::new(Stage::Stdlib, "stdlib"))
        .map(|r| crate::ops::steps::stdlib_digest(&r.static_))
        .transpose()?
        .unwrap_or_default();
    TargetCompiler::new(
        exe,
        ctx.output_root(),
        ctx.options().debug,
        phases.target.platform(),
        &stdlib,
    )
}
