//! Breakpoint bookkeeping for a debug session.

use std::collections::BTreeMap;

use crate::protocol::BreakpointArgs;

/// A line breakpoint in the script under debug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    /// Line number (1-based).
    pub line: u32,
    pub enabled: bool,
    /// Optional condition expression.
    pub condition: Option<String>,
}

impl Breakpoint {
    /// Create an enabled, unconditional breakpoint.
    pub fn new(line: u32) -> Self {
        Self {
            line,
            enabled: true,
            condition: None,
        }
    }

    /// Create a conditional breakpoint.
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Mark the breakpoint as disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Wire form of this breakpoint.
    pub fn to_args(&self) -> BreakpointArgs {
        BreakpointArgs {
            line_number: self.line,
            enable: self.enabled,
            condition: self.condition.clone().unwrap_or_default(),
        }
    }
}

impl From<&BreakpointArgs> for Breakpoint {
    fn from(args: &BreakpointArgs) -> Self {
        Self {
            line: args.line_number,
            enabled: args.enable,
            condition: (!args.condition.is_empty()).then(|| args.condition.clone()),
        }
    }
}

/// Breakpoints sent to the debugger, keyed by line.
#[derive(Debug, Clone, Default)]
pub struct BreakpointManager {
    breakpoints: BTreeMap<u32, Breakpoint>,
}

impl BreakpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a breakpoint, returning the one it replaced on the same line.
    pub fn add(&mut self, bp: Breakpoint) -> Option<Breakpoint> {
        self.breakpoints.insert(bp.line, bp)
    }

    /// Remove the breakpoint on `line`.
    ///
    /// Returns `true` if a breakpoint was removed.
    pub fn remove(&mut self, line: u32) -> bool {
        self.breakpoints.remove(&line).is_some()
    }

    pub fn get(&self, line: u32) -> Option<&Breakpoint> {
        self.breakpoints.get(&line)
    }

    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }

    /// All breakpoints in line order.
    pub fn all(&self) -> impl Iterator<Item = &Breakpoint> {
        self.breakpoints.values()
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakpoint_builders() {
        let bp = Breakpoint::new(7).with_condition("i == 3").disabled();
        assert_eq!(bp.line, 7);
        assert!(!bp.enabled);
        assert_eq!(bp.condition.as_deref(), Some("i == 3"));
    }

    #[test]
    fn to_args_uses_empty_condition_when_unset() {
        let args = Breakpoint::new(3).to_args();
        assert_eq!(
            args,
            BreakpointArgs {
                line_number: 3,
                enable: true,
                condition: String::new(),
            }
        );
    }

    #[test]
    fn from_args_round_trip() {
        let bp = Breakpoint::new(9).with_condition("x");
        assert_eq!(Breakpoint::from(&bp.to_args()), bp);
        assert_eq!(Breakpoint::from(&Breakpoint::new(2).to_args()).condition, None);
    }

    #[test]
    fn manager_orders_by_line_and_replaces() {
        let mut mgr = BreakpointManager::new();
        mgr.add(Breakpoint::new(20));
        mgr.add(Breakpoint::new(5));
        let replaced = mgr.add(Breakpoint::new(20).with_condition("y"));
        assert_eq!(replaced, Some(Breakpoint::new(20)));

        let lines: Vec<_> = mgr.all().map(|bp| bp.line).collect();
        assert_eq!(lines, vec![5, 20]);
        assert_eq!(mgr.get(20).unwrap().condition.as_deref(), Some("y"));
        assert_eq!(mgr.len(), 2);
    }

    #[test]
    fn manager_remove_and_clear() {
        let mut mgr = BreakpointManager::new();
        mgr.add(Breakpoint::new(1));
        mgr.add(Breakpoint::new(2));
        assert!(mgr.remove(1));
        assert!(!mgr.remove(1));
        mgr.clear();
        assert!(mgr.is_empty());
    }
}
