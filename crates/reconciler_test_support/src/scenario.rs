//! TOML-described reconciliation scenarios.
//!
//! A scenario is a list of steps run against one `WorkLoop`. Each step either
//! renders a new children description or re-renders the committed one after
//! enqueueing updates, then compares what happened with the step's `expect`
//! table.
//!
//! ```toml
//! name = "reorder"
//!
//! [[steps]]
//! render = [{ host = "li", key = "a" }, { host = "li", key = "b" }]
//!
//! [[steps]]
//! render = [{ host = "li", key = "b" }, { host = "li", key = "a" }]
//! expect = { effects = ["place a"] }
//! ```

use crate::diff_lines;
use reconciler::debug::structure;
use reconciler::test_harness::{MarkupDocument, WorkLoop};
use reconciler::{
    Child, ContainerId, Element, ElementType, HydrationConfig, Lanes, MarkupParent, Props,
    ReconcileError, ReconcilerConfig, Update,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

pub const CONTAINER: ContainerId = ContainerId(1);
const TREE_CAP: usize = 4096;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub name: String,
    /// Markup the first step hydrates instead of creating nodes.
    #[serde(default)]
    pub hydrate: Option<Vec<ChildSpec>>,
    #[serde(default)]
    pub strict: bool,
    /// Report unkeyed list items as diagnostics.
    #[serde(default)]
    pub missing_keys: bool,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_toml(text: &str) -> Result<Self, ScenarioError> {
        toml::from_str(text).map_err(|err| ScenarioError::Parse(err.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    /// New root children. Absent means "re-render what is committed".
    #[serde(default)]
    pub render: Option<Vec<ChildSpec>>,
    #[serde(default)]
    pub updates: Vec<UpdateSpec>,
    #[serde(default = "default_lanes")]
    pub lanes: Vec<String>,
    #[serde(default = "default_commit")]
    pub commit: bool,
    #[serde(default)]
    pub expect: Expect,
}

fn default_lanes() -> Vec<String> {
    vec!["default".to_string()]
}

fn default_commit() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Expect {
    pub effects: Option<Vec<String>>,
    /// Committed tree after the step, as `debug::structure` lines.
    pub tree: Option<Vec<String>>,
    pub diagnostics: Option<usize>,
    pub recoverable: Option<usize>,
    pub skipped: Option<Vec<String>>,
    #[serde(default)]
    pub state: Vec<StateExpect>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateExpect {
    /// Child indices from the root.
    pub path: Vec<usize>,
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateSpec {
    pub path: Vec<usize>,
    pub lane: String,
    #[serde(default)]
    pub set: Option<Value>,
    #[serde(default)]
    pub merge: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChildSpec {
    Text(String),
    Number(f64),
    Node(NodeSpec),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
    pub host: Option<String>,
    pub component: Option<String>,
    #[serde(default)]
    pub fragment: bool,
    pub key: Option<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, Value>,
    #[serde(default)]
    pub children: Vec<ChildSpec>,
}

#[derive(Debug)]
pub enum ScenarioError {
    Parse(String),
    UnknownLane(String),
    BadNode(String),
    Markup(String),
    MissingNode(Vec<usize>),
    Reconcile(ReconcileError),
}

impl fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioError::Parse(err) => write!(f, "invalid scenario: {err}"),
            ScenarioError::UnknownLane(lane) => write!(f, "unknown lane `{lane}`"),
            ScenarioError::BadNode(detail) => write!(f, "invalid node: {detail}"),
            ScenarioError::Markup(detail) => write!(f, "invalid markup: {detail}"),
            ScenarioError::MissingNode(path) => write!(f, "no committed node at path {path:?}"),
            ScenarioError::Reconcile(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ScenarioError {}

impl From<ReconcileError> for ScenarioError {
    fn from(value: ReconcileError) -> Self {
        ScenarioError::Reconcile(value)
    }
}

/// What one step produced.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub effects: Vec<String>,
    pub tree: Vec<String>,
    pub diagnostics: Vec<String>,
    pub recoverable: Vec<String>,
    pub skipped_lanes: Lanes,
    pub states: Vec<(Vec<usize>, Option<Value>)>,
}

pub fn load_scenario(path: &Path) -> Scenario {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read scenario {path:?}: {err}"));
    Scenario::from_toml(&content).unwrap_or_else(|err| panic!("{path:?}: {err}"))
}

pub fn parse_lane(name: &str) -> Result<Lanes, ScenarioError> {
    Ok(match name {
        "sync" => Lanes::SYNC,
        "input" => Lanes::INPUT_CONTINUOUS,
        "default" => Lanes::DEFAULT,
        "transition" => Lanes::TRANSITION,
        "retry" => Lanes::RETRY,
        "idle" => Lanes::IDLE,
        "offscreen" => Lanes::OFFSCREEN,
        other => return Err(ScenarioError::UnknownLane(other.to_string())),
    })
}

fn parse_lanes(names: &[String]) -> Result<Lanes, ScenarioError> {
    names
        .iter()
        .try_fold(Lanes::NONE, |lanes, name| Ok(lanes | parse_lane(name)?))
}

impl ChildSpec {
    pub fn to_child(&self) -> Result<Child, ScenarioError> {
        match self {
            ChildSpec::Text(text) => Ok(Child::text(text.as_str())),
            ChildSpec::Number(value) => Ok(Child::Number(*value)),
            ChildSpec::Node(node) => Ok(node.to_element()?.into()),
        }
    }
}

impl NodeSpec {
    pub fn to_element(&self) -> Result<Element, ScenarioError> {
        let mut element = match (&self.host, &self.component, self.fragment) {
            (Some(name), None, false) => Element::host(name.as_str()),
            (None, Some(name), false) => Element::component(name.as_str()),
            (None, None, true) => Element::new(ElementType::Fragment),
            _ => {
                return Err(ScenarioError::BadNode(
                    "exactly one of `host`, `component` or `fragment` is required".to_string(),
                ));
            }
        };
        if let Some(key) = &self.key {
            element = element.keyed(key.as_str());
        }
        for (name, value) in &self.attrs {
            element = element.attr(name.as_str(), value.clone());
        }
        if !self.children.is_empty() {
            element = element.with_children(children_of(&self.children)?);
        }
        Ok(element)
    }
}

/// A single entry renders as one child, several as a list.
pub fn children_of(specs: &[ChildSpec]) -> Result<Child, ScenarioError> {
    match specs {
        [] => Ok(Child::Empty),
        [single] => single.to_child(),
        many => Ok(Child::List(
            many.iter().map(ChildSpec::to_child).collect::<Result<_, _>>()?,
        )),
    }
}

pub fn build_markup(specs: &[ChildSpec]) -> Result<MarkupDocument, ScenarioError> {
    fn append(doc: &mut MarkupDocument, parent: MarkupParent, spec: &ChildSpec) -> Result<(), ScenarioError> {
        let handle = match spec {
            ChildSpec::Text(text) => doc.text(text),
            ChildSpec::Number(value) => doc.text(&value.to_string()),
            ChildSpec::Node(node) => {
                let Some(name) = node.host.as_deref() else {
                    return Err(ScenarioError::Markup("only host elements and text exist in markup".to_string()));
                };
                let handle = doc.element(name);
                for (attr, value) in &node.attrs {
                    let value = match value {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    };
                    doc.set_attr(handle, attr, &value)
                        .map_err(|err| ScenarioError::Markup(format!("{err:?}")))?;
                }
                handle
            }
        };
        doc.append_child(parent, handle)
            .map_err(|err| ScenarioError::Markup(format!("{err:?}")))?;
        if let ChildSpec::Node(node) = spec {
            for child in &node.children {
                append(doc, MarkupParent::Node(handle), child)?;
            }
        }
        Ok(())
    }

    let mut doc = MarkupDocument::new();
    for spec in specs {
        append(&mut doc, MarkupParent::Container(CONTAINER), spec)?;
    }
    Ok(doc)
}

/// Renders its state when it has one, otherwise its children.
fn echo(props: &Props, state: &Value) -> Child {
    match state {
        Value::Null => props.children().cloned().unwrap_or_default(),
        Value::String(text) => Child::text(text.as_str()),
        other => Child::text(other.to_string()),
    }
}

pub fn run_scenario(scenario: &Scenario) -> Result<Vec<StepReport>, ScenarioError> {
    let mut work = WorkLoop::new(CONTAINER);
    work.register("Echo", echo);
    work.set_config(ReconcilerConfig {
        warn_on_missing_keys: scenario.missing_keys,
        ..ReconcilerConfig::default()
    });
    let markup = scenario.hydrate.as_deref().map(build_markup).transpose()?;

    let mut reports = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let lanes = parse_lanes(&step.lanes)?;
        for update in &step.updates {
            let node = work
                .find(&update.path)
                .ok_or_else(|| ScenarioError::MissingNode(update.path.clone()))?;
            let lane = parse_lane(&update.lane)?;
            let record = match (&update.set, &update.merge) {
                (Some(value), _) => Update::<Value, Props>::replace(lane, value.clone()),
                (None, Some(partial)) => Update::merge(lane, partial.clone()),
                (None, None) => Update::force(lane),
            };
            work.enqueue(node, record)?;
        }

        let report = match (&step.render, markup.as_ref()) {
            (Some(render), Some(doc)) if index == 0 => {
                let config = HydrationConfig {
                    strict: scenario.strict,
                    ..HydrationConfig::default()
                };
                work.hydrate(children_of(render)?, doc, config, lanes)?.0
            }
            (Some(render), _) => work.render(children_of(render)?, lanes)?,
            (None, _) => work.rerender(lanes)?,
        };

        let effects = report.effects.iter().map(ToString::to_string).collect();
        let diagnostics = report.diagnostics.iter().map(ToString::to_string).collect();
        let recoverable = report.recoverable.iter().map(ToString::to_string).collect();
        let skipped_lanes = report.skipped_lanes;
        if step.commit {
            work.commit(&report)?;
        } else {
            work.abandon(report);
        }

        let root = work.current_root()?;
        let tree = structure(&work.tree, root, TREE_CAP);
        let states = step
            .expect
            .state
            .iter()
            .map(|expect| {
                let value = work.find(&expect.path).map(|id| work.tree[id].state().clone());
                (expect.path.clone(), value)
            })
            .collect();
        log::debug!(target: "reconciler.scenario", "{}: step {index} done", scenario.name);
        reports.push(StepReport {
            effects,
            tree,
            diagnostics,
            recoverable,
            skipped_lanes,
            states,
        });
    }
    Ok(reports)
}

/// Runs `scenario` and compares every step against its expectations.
pub fn check_scenario(scenario: &Scenario) -> Result<(), String> {
    let reports = run_scenario(scenario).map_err(|err| format!("{}: {err}", scenario.name))?;
    let mut failures = String::new();
    for (index, (step, report)) in scenario.steps.iter().zip(&reports).enumerate() {
        let expect = &step.expect;
        let mut fail = |what: &str, detail: String| {
            failures.push_str(&format!("{} step {index}: {what}\n{detail}\n", scenario.name));
        };
        if let Some(effects) = &expect.effects {
            if effects != &report.effects {
                fail("effects differ", diff_lines(effects, &report.effects));
            }
        }
        if let Some(tree) = &expect.tree {
            if tree != &report.tree {
                fail("tree differs", diff_lines(tree, &report.tree));
            }
        }
        if let Some(count) = expect.diagnostics {
            if count != report.diagnostics.len() {
                fail("diagnostics differ", report.diagnostics.join("\n"));
            }
        }
        if let Some(count) = expect.recoverable {
            if count != report.recoverable.len() {
                fail("recoverable errors differ", report.recoverable.join("\n"));
            }
        }
        if let Some(skipped) = &expect.skipped {
            match parse_lanes(skipped) {
                Ok(lanes) if lanes == report.skipped_lanes => {}
                Ok(lanes) => fail(
                    "skipped lanes differ",
                    format!("expected {lanes:?}, actual {:?}", report.skipped_lanes),
                ),
                Err(err) => fail("bad expectation", err.to_string()),
            }
        }
        for (expected, (path, actual)) in expect.state.iter().zip(&report.states) {
            if actual.as_ref() != Some(&expected.value) {
                fail(
                    "state differs",
                    format!("at {path:?}: expected {}, actual {actual:?}", expected.value),
                );
            }
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(failures)
    }
}
