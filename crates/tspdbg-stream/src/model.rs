//! Decoded debugger records.
//!
//! Snapshots are immutable once built; a new completed block replaces the
//! previous snapshot wholesale.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Declared type tag of a runtime value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarType {
    Number,
    String,
    Boolean,
    Function,
    Nil,
    Table,
    /// Any tag not in the list above (`userdata`, `thread`, ...).
    Other(String),
}

impl VarType {
    /// The type tag as it appears on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            VarType::Number => "number",
            VarType::String => "string",
            VarType::Boolean => "boolean",
            VarType::Function => "function",
            VarType::Nil => "nil",
            VarType::Table => "table",
            VarType::Other(tag) => tag,
        }
    }
}

impl From<&str> for VarType {
    fn from(tag: &str) -> Self {
        match tag {
            "number" => VarType::Number,
            "string" => VarType::String,
            "boolean" => VarType::Boolean,
            "function" => VarType::Function,
            "nil" => VarType::Nil,
            "table" => VarType::Table,
            other => VarType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variable scope within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Locals,
    Globals,
    Upvalues,
}

impl Scope {
    /// Parse a scope name, accepting singular and plural spellings.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "local" | "locals" => Some(Scope::Locals),
            "global" | "globals" => Some(Scope::Globals),
            "upvalue" | "upvalues" | "up" => Some(Scope::Upvalues),
            _ => None,
        }
    }

    /// Wire name of the scope.
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Locals => "locals",
            Scope::Globals => "globals",
            Scope::Upvalues => "upvalues",
        }
    }
}

/// Value held by a [`VariableNode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeValue {
    /// A leaf value rendered as text.
    Scalar(String),
    /// Ordered child entries of a nested table.
    Table(Vec<VariableNode>),
}

/// One node of a reconstructed table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableNode {
    /// Display name; string keys are quoted.
    pub name: String,
    /// Keys from the root variable down to this node.
    ///
    /// Replayed verbatim as the argument list of a set-variable request.
    pub path: Vec<String>,
    /// Set for internal pseudo-type keys that cannot be assigned.
    pub read_only: bool,
    /// Leaf value or children.
    pub value: NodeValue,
}

impl VariableNode {
    /// Children of a table node; empty for scalars.
    pub fn children(&self) -> &[VariableNode] {
        match &self.value {
            NodeValue::Table(children) => children,
            NodeValue::Scalar(_) => &[],
        }
    }

    /// Scalar text of a leaf; `None` for tables.
    pub fn scalar(&self) -> Option<&str> {
        match &self.value {
            NodeValue::Scalar(text) => Some(text),
            NodeValue::Table(_) => None,
        }
    }

    /// Follow display names from this node's children downward.
    pub fn find(&self, names: &[&str]) -> Option<&VariableNode> {
        let (first, rest) = names.split_first()?;
        let child = self.children().iter().find(|c| c.name == *first)?;
        if rest.is_empty() {
            Some(child)
        } else {
            child.find(rest)
        }
    }
}

/// A named variable in one scope of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    /// Raw textual value; for tables this is the JSON payload.
    pub value: String,
    pub var_type: VarType,
    /// Reconstructed tree, present only for table-typed variables.
    pub node: Option<VariableNode>,
}

/// A user-registered expression evaluated with every snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watchpoint {
    pub expression: String,
    /// Last evaluated value; may be an error message.
    pub value: String,
    pub var_type: VarType,
}

/// One call-stack level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 0 is the innermost, most recently executed frame.
    pub level: u32,
    pub current_line: u32,
    pub name: String,
    pub globals: Vec<Variable>,
    pub locals: Vec<Variable>,
    pub upvalues: Vec<Variable>,
    pub watchpoints: Vec<Watchpoint>,
}

impl Frame {
    /// Create an empty frame.
    pub fn new(level: u32, current_line: u32, name: impl Into<String>) -> Self {
        Self {
            level,
            current_line,
            name: name.into(),
            globals: Vec::new(),
            locals: Vec::new(),
            upvalues: Vec::new(),
            watchpoints: Vec::new(),
        }
    }

    /// Variables of the given scope.
    pub fn variables(&self, scope: Scope) -> &[Variable] {
        match scope {
            Scope::Locals => &self.locals,
            Scope::Globals => &self.globals,
            Scope::Upvalues => &self.upvalues,
        }
    }

    pub(crate) fn variables_mut(&mut self, scope: Scope) -> &mut Vec<Variable> {
        match scope {
            Scope::Locals => &mut self.locals,
            Scope::Globals => &mut self.globals,
            Scope::Upvalues => &mut self.upvalues,
        }
    }

    /// Find a watchpoint by its expression text.
    pub fn watchpoint(&self, expression: &str) -> Option<&Watchpoint> {
        self.watchpoints
            .iter()
            .find(|w| w.expression == expression)
    }
}

/// All frames reported by one completed stack block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackSnapshot {
    /// Frames ordered by ascending level.
    pub frames: Vec<Frame>,
}

impl StackSnapshot {
    /// Look up a frame by level.
    pub fn frame(&self, level: u32) -> Option<&Frame> {
        self.frames.iter().find(|f| f.level == level)
    }

    /// The innermost frame.
    pub fn top(&self) -> Option<&Frame> {
        self.frames.first()
    }
}

/// One level of a runtime exception traceback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub level: u32,
    pub line: u32,
    /// Call-site text starting at `in `, e.g. `in function 'foo'`.
    pub call_site: String,
}

/// A runtime exception reported by the interpreter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionRecord {
    pub description: String,
    pub trace: Vec<TraceEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, value: &str, path: &[&str]) -> VariableNode {
        VariableNode {
            name: name.into(),
            path: path.iter().map(|s| s.to_string()).collect(),
            read_only: false,
            value: NodeValue::Scalar(value.into()),
        }
    }

    #[test]
    fn var_type_round_trips_known_tags() {
        for tag in ["number", "string", "boolean", "function", "nil", "table"] {
            assert_eq!(VarType::from(tag).as_str(), tag);
        }
    }

    #[test]
    fn var_type_keeps_unknown_tags() {
        let ty = VarType::from("userdata");
        assert_eq!(ty, VarType::Other("userdata".into()));
        assert_eq!(ty.to_string(), "userdata");
    }

    #[test]
    fn scope_from_name_accepts_aliases() {
        assert_eq!(Scope::from_name("Local"), Some(Scope::Locals));
        assert_eq!(Scope::from_name("globals"), Some(Scope::Globals));
        assert_eq!(Scope::from_name("up"), Some(Scope::Upvalues));
        assert_eq!(Scope::from_name("heap"), None);
    }

    #[test]
    fn scope_serializes_lowercase() {
        let json = serde_json::to_string(&Scope::Upvalues).unwrap();
        assert_eq!(json, "\"upvalues\"");
    }

    #[test]
    fn node_find_walks_display_names() {
        let inner = VariableNode {
            name: "\"cfg\"".into(),
            path: vec!["t".into(), "\"cfg\"".into()],
            read_only: false,
            value: NodeValue::Table(vec![leaf("\"rate\"", "5", &["t", "\"cfg\"", "\"rate\""])]),
        };
        let root = VariableNode {
            name: "t".into(),
            path: vec!["t".into()],
            read_only: false,
            value: NodeValue::Table(vec![inner]),
        };
        let found = root.find(&["\"cfg\"", "\"rate\""]).unwrap();
        assert_eq!(found.scalar(), Some("5"));
        assert!(root.find(&["\"missing\""]).is_none());
    }

    #[test]
    fn frame_scope_lookup() {
        let mut frame = Frame::new(0, 3, "main chunk");
        frame.variables_mut(Scope::Locals).push(Variable {
            name: "x".into(),
            value: "1".into(),
            var_type: VarType::Number,
            node: None,
        });
        assert_eq!(frame.variables(Scope::Locals).len(), 1);
        assert!(frame.variables(Scope::Globals).is_empty());
    }

    #[test]
    fn snapshot_frame_lookup() {
        let snapshot = StackSnapshot {
            frames: vec![Frame::new(0, 7, "inner"), Frame::new(1, 20, "outer")],
        };
        assert_eq!(snapshot.top().unwrap().name, "inner");
        assert_eq!(snapshot.frame(1).unwrap().current_line, 20);
        assert!(snapshot.frame(5).is_none());
    }
}
