//! Compiler: validates a parsed module and builds an evaluable policy
//!
//! Checks, in order: exactly one leading `package`, at most one definition
//! and one default per rule, no assignment to built-in names, every rule
//! reference resolves, and rule references form no cycle.

use crate::ast::{Expr, Module, Statement};
use crate::error::{PolicyError, PolicyResult};
use crate::eval::{Evaluator, Query};
use crate::parser::{parse, DENY_REASONS, INPUT};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A rule's optional default and optional conditional definition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleDef {
    pub default: Option<Expr>,
    pub body: Option<RuleBody>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleBody {
    pub value: Expr,
    pub condition: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DenyRule {
    pub reason: String,
    pub condition: Expr,
}

/// A validated policy, immutable and safe to share across evaluations
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPolicy {
    package: String,
    rules: BTreeMap<String, RuleDef>,
    denies: Vec<DenyRule>,
    required_inputs: BTreeSet<String>,
}

impl CompiledPolicy {
    /// Parse and compile policy source
    pub fn compile(source: &str) -> PolicyResult<Self> {
        let module = parse(source)?;
        compile_module(module)
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    /// Names of every user-defined rule, sorted
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.keys().map(String::as_str).collect()
    }

    /// Every `input.<id>` the policy reads, sorted
    pub fn required_inputs(&self) -> Vec<String> {
        self.required_inputs.iter().cloned().collect()
    }

    pub(crate) fn rule(&self, name: &str) -> Option<&RuleDef> {
        self.rules.get(name)
    }

    pub(crate) fn denies(&self) -> &[DenyRule] {
        &self.denies
    }

    /// Evaluate `query` against `input`
    ///
    /// `None` is the empty result set: the query names another package or
    /// an unknown rule, or the rule is undefined for this input.
    pub fn evaluate(&self, query: &Query, input: &Map<String, Value>) -> PolicyResult<Option<Value>> {
        if query.package() != self.package {
            return Ok(None);
        }

        let mut evaluator = Evaluator::new(self, input);
        if query.rule() == DENY_REASONS {
            return evaluator.deny_reasons().map(Some);
        }
        if !self.rules.contains_key(query.rule()) {
            return Ok(None);
        }
        evaluator.rule(query.rule())
    }
}

fn compile_module(module: Module) -> PolicyResult<CompiledPolicy> {
    let package = validate_package(&module)?;

    let mut rules: BTreeMap<String, RuleDef> = BTreeMap::new();
    let mut denies = Vec::new();

    for statement in module.statements {
        match statement {
            Statement::Package { .. } => {}
            Statement::Default { name, value, line } => {
                check_assignable(&name, line)?;
                let def = rules.entry(name.clone()).or_default();
                if def.default.is_some() {
                    return Err(compile_error(line, format!("duplicate default for rule `{}`", name)));
                }
                def.default = Some(value);
            }
            Statement::Rule {
                name,
                value,
                condition,
                line,
            } => {
                check_assignable(&name, line)?;
                let def = rules.entry(name.clone()).or_default();
                if def.body.is_some() {
                    return Err(compile_error(line, format!("duplicate definition of rule `{}`", name)));
                }
                def.body = Some(RuleBody { value, condition });
            }
            Statement::Deny {
                reason, condition, ..
            } => denies.push(DenyRule { reason, condition }),
        }
    }

    let graph = dependency_graph(&rules, &denies);
    validate_references(&graph, &rules)?;
    validate_acyclic(&graph)?;

    let mut required_inputs = BTreeSet::new();
    for_each_expr(&rules, &denies, |expr| {
        expr.walk(&mut |e| {
            if let Expr::Input(id) = e {
                required_inputs.insert(id.clone());
            }
        })
    });

    Ok(CompiledPolicy {
        package,
        rules,
        denies,
        required_inputs,
    })
}

fn validate_package(module: &Module) -> PolicyResult<String> {
    let mut package = None;
    for (index, statement) in module.statements.iter().enumerate() {
        if let Statement::Package { name, line } = statement {
            if package.is_some() {
                return Err(compile_error(*line, "duplicate package declaration"));
            }
            if index != 0 {
                return Err(compile_error(*line, "package declaration must come first"));
            }
            package = Some(name.clone());
        }
    }
    package.ok_or_else(|| PolicyError::Compile("missing package declaration".into()))
}

fn check_assignable(name: &str, line: usize) -> PolicyResult<()> {
    if name == INPUT || name == DENY_REASONS {
        return Err(compile_error(line, format!("cannot assign to built-in `{}`", name)));
    }
    Ok(())
}

fn for_each_expr<'a>(
    rules: &'a BTreeMap<String, RuleDef>,
    denies: &'a [DenyRule],
    mut visit: impl FnMut(&'a Expr),
) {
    for def in rules.values() {
        if let Some(default) = &def.default {
            visit(default);
        }
        if let Some(body) = &def.body {
            visit(&body.value);
            if let Some(condition) = &body.condition {
                visit(condition);
            }
        }
    }
    for deny in denies {
        visit(&deny.condition);
    }
}

/// Rule name (or `deny_reasons`) to the names it references
type Graph = BTreeMap<String, BTreeSet<String>>;

fn references(expr: &Expr, into: &mut BTreeSet<String>) {
    expr.walk(&mut |e| match e {
        Expr::Ref(name) => {
            into.insert(name.clone());
        }
        Expr::DenyReasons => {
            into.insert(DENY_REASONS.to_string());
        }
        _ => {}
    });
}

fn dependency_graph(rules: &BTreeMap<String, RuleDef>, denies: &[DenyRule]) -> Graph {
    let mut graph = Graph::new();

    for (name, def) in rules {
        let mut deps = BTreeSet::new();
        if let Some(default) = &def.default {
            references(default, &mut deps);
        }
        if let Some(body) = &def.body {
            references(&body.value, &mut deps);
            if let Some(condition) = &body.condition {
                references(condition, &mut deps);
            }
        }
        graph.insert(name.clone(), deps);
    }

    let mut deny_deps = BTreeSet::new();
    for deny in denies {
        references(&deny.condition, &mut deny_deps);
    }
    graph.insert(DENY_REASONS.to_string(), deny_deps);

    graph
}

fn validate_references(graph: &Graph, rules: &BTreeMap<String, RuleDef>) -> PolicyResult<()> {
    for (name, deps) in graph {
        for dep in deps {
            if dep != DENY_REASONS && !rules.contains_key(dep) {
                return Err(PolicyError::Compile(format!(
                    "`{}` references unknown rule `{}`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

fn validate_acyclic(graph: &Graph) -> PolicyResult<()> {
    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut path: Vec<&str> = Vec::new();

    for name in graph.keys() {
        visit(name, graph, &mut marks, &mut path)?;
    }
    Ok(())
}

fn visit<'a>(
    name: &'a str,
    graph: &'a Graph,
    marks: &mut HashMap<&'a str, Mark>,
    path: &mut Vec<&'a str>,
) -> PolicyResult<()> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = path.iter().position(|n| *n == name).unwrap_or(0);
            let mut cycle: Vec<&str> = path[start..].to_vec();
            cycle.push(name);
            return Err(PolicyError::Compile(format!(
                "cyclic rule reference: {}",
                cycle.join(" -> ")
            )));
        }
        None => {}
    }

    marks.insert(name, Mark::Visiting);
    path.push(name);
    if let Some(deps) = graph.get(name) {
        for dep in deps {
            visit(dep, graph, marks, path)?;
        }
    }
    path.pop();
    marks.insert(name, Mark::Done);
    Ok(())
}

fn compile_error(line: usize, message: impl std::fmt::Display) -> PolicyError {
    PolicyError::Compile(format!("line {}: {}", line, message))
}
