//! Declarative condition language.
//!
//! A [`ConditionGroup`] is an `all`/`any` tree of comparisons between
//! indicator outputs and constants. Evaluation is a pure function of a
//! [`Snapshot`]: same snapshot, same answer.
//!
//! Document shape (TOML):
//!
//! ```toml
//! [regimes.conditions]
//! all = [
//!     { left = { indicator = "adx" }, op = "gt", right = 25 },
//!     { left = { indicator = "macd", field = "histogram" }, op = "gt", right = 0 },
//!     { any = [
//!         { left = { indicator = "rsi" }, op = "between", right = { min = 40, max = 70 } },
//!     ] },
//! ]
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::IndicatorId;
use crate::frame::Snapshot;

/// Relative tolerance used by `eq`: `|a - b| <= EPSILON * max(1, |a|, |b|)`.
pub const EPSILON: f64 = 1e-9;

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Constant(f64),
    /// Inclusive bounds, only meaningful on the right of `between`.
    Range { min: f64, max: f64 },
    /// Output of a configured indicator; `field` defaults to its primary output.
    Indicator {
        indicator: IndicatorId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
}

impl Operand {
    pub fn indicator(id: impl Into<IndicatorId>) -> Self {
        Operand::Indicator {
            indicator: id.into(),
            field: None,
        }
    }

    pub fn field(id: impl Into<IndicatorId>, field: impl Into<String>) -> Self {
        Operand::Indicator {
            indicator: id.into(),
            field: Some(field.into()),
        }
    }

    /// Scalar value at the snapshot's bar. Ranges have no scalar value.
    fn resolve(&self, snapshot: &Snapshot<'_>) -> Option<f64> {
        match self {
            Operand::Constant(v) if v.is_finite() => Some(*v),
            Operand::Constant(_) | Operand::Range { .. } => None,
            Operand::Indicator { indicator, field } => {
                snapshot.value(indicator.as_str(), field.as_deref())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "==")]
    Eq,
    Between,
}

/// A single comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    pub left: Operand,
    pub op: Operator,
    pub right: Operand,
}

impl Condition {
    pub fn new(left: Operand, op: Operator, right: Operand) -> Self {
        Self { left, op, right }
    }

    /// True iff every operand is available and the comparison holds.
    pub fn evaluate(&self, snapshot: &Snapshot<'_>) -> bool {
        let Some(a) = self.left.resolve(snapshot) else {
            return false;
        };
        match self.op {
            Operator::Between => match self.right {
                Operand::Range { min, max } => min <= a && a <= max,
                _ => false,
            },
            op => {
                let Some(b) = self.right.resolve(snapshot) else {
                    return false;
                };
                match op {
                    Operator::Gt => a > b,
                    Operator::Lt => a < b,
                    _ => approx_eq(a, b),
                }
            }
        }
    }

    /// Reason this condition can never hold as written, if any.
    pub fn shape_error(&self) -> Option<&'static str> {
        if matches!(self.left, Operand::Range { .. }) {
            return Some("a range can only appear on the right of `between`");
        }
        match (&self.op, &self.right) {
            (Operator::Between, Operand::Range { min, max }) => {
                if !min.is_finite() || !max.is_finite() {
                    Some("range bounds must be finite")
                } else if min > max {
                    Some("range min must not exceed max")
                } else {
                    None
                }
            }
            (Operator::Between, _) => Some("`between` requires a { min, max } range"),
            (_, Operand::Range { .. }) => Some("a range can only appear on the right of `between`"),
            _ => None,
        }
    }

    fn operands(&self) -> [&Operand; 2] {
        [&self.left, &self.right]
    }
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= EPSILON * 1f64.max(a.abs()).max(b.abs())
}

/// A condition or a nested group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionNode {
    Group(ConditionGroup),
    Condition(Condition),
}

impl ConditionNode {
    pub fn evaluate(&self, snapshot: &Snapshot<'_>) -> bool {
        match self {
            ConditionNode::Group(g) => g.evaluate(snapshot),
            ConditionNode::Condition(c) => c.evaluate(snapshot),
        }
    }
}

impl From<Condition> for ConditionNode {
    fn from(c: Condition) -> Self {
        ConditionNode::Condition(c)
    }
}

impl From<ConditionGroup> for ConditionNode {
    fn from(g: ConditionGroup) -> Self {
        ConditionNode::Group(g)
    }
}

/// Conjunction or disjunction of nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionGroup {
    All(Vec<ConditionNode>),
    Any(Vec<ConditionNode>),
}

impl ConditionGroup {
    /// `all` stops at the first false child, `any` at the first true one.
    pub fn evaluate(&self, snapshot: &Snapshot<'_>) -> bool {
        match self {
            ConditionGroup::All(nodes) => nodes.iter().all(|n| n.evaluate(snapshot)),
            ConditionGroup::Any(nodes) => nodes.iter().any(|n| n.evaluate(snapshot)),
        }
    }

    pub fn nodes(&self) -> &[ConditionNode] {
        match self {
            ConditionGroup::All(nodes) | ConditionGroup::Any(nodes) => nodes,
        }
    }

    /// Depth-first visit of every leaf condition.
    pub fn for_each_condition<'a, F: FnMut(&'a Condition)>(&'a self, f: &mut F) {
        for node in self.nodes() {
            match node {
                ConditionNode::Group(g) => g.for_each_condition(f),
                ConditionNode::Condition(c) => f(c),
            }
        }
    }

    /// Depth-first visit of every group, this one included.
    pub fn for_each_group<'a, F: FnMut(&'a ConditionGroup)>(&'a self, f: &mut F) {
        f(self);
        for node in self.nodes() {
            if let ConditionNode::Group(g) = node {
                g.for_each_group(f);
            }
        }
    }

    /// Every `(indicator, field)` referenced anywhere in the tree.
    pub fn indicator_refs(&self) -> Vec<(&IndicatorId, Option<&str>)> {
        let mut refs = Vec::new();
        self.for_each_condition(&mut |c| {
            for operand in c.operands() {
                if let Operand::Indicator { indicator, field } = operand {
                    refs.push((indicator, field.as_deref()));
                }
            }
        });
        refs
    }
}

/// Evaluate `group` against one bar's snapshot.
pub fn evaluate(group: &ConditionGroup, snapshot: &Snapshot<'_>) -> bool {
    group.evaluate(snapshot)
}
