//! Line commands typed at the `(tspdbg)` prompt and the text shown back.

use std::fmt::Write as _;

use thiserror::Error;
use tspdbg_session::Breakpoint;
use tspdbg_stream::{ExceptionRecord, Scope, StackSnapshot, Variable, VariableNode};

pub const HELP: &str = "\
commands:
  c | continue            resume until the next breakpoint
  n | next                step over
  s | step                step into
  o | out                 step out
  b LINE [if COND]        set a breakpoint
  clear                   remove all breakpoints
  bt                      show the call stack
  vars SCOPE [LEVEL]      list locals, globals or upvalues
  set SCOPE LEVEL PATH VALUE
                          assign a variable; PATH is dotted, e.g. t.\"key\"
  watch EXPR [@LEVEL]     evaluate an expression
  restart                 run the script again
  q | quit                stop debugging";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Continue,
    StepOver,
    StepIn,
    StepOut,
    Break(Breakpoint),
    Clear,
    Backtrace,
    Vars {
        scope: Scope,
        level: u32,
    },
    Set {
        scope: Scope,
        level: u32,
        path: Vec<String>,
        value: String,
    },
    Watch {
        expression: String,
        level: u32,
    },
    Restart,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("`{0}` is not a number")]
    BadNumber(String),
    #[error("`{0}` is not a scope (locals, globals, upvalues)")]
    BadScope(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Result<Self, ReplError> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb {
            "" => Err(ReplError::Empty),
            "c" | "continue" => Ok(ReplCommand::Continue),
            "n" | "next" => Ok(ReplCommand::StepOver),
            "s" | "step" => Ok(ReplCommand::StepIn),
            "o" | "out" => Ok(ReplCommand::StepOut),
            "clear" => Ok(ReplCommand::Clear),
            "bt" | "backtrace" => Ok(ReplCommand::Backtrace),
            "restart" => Ok(ReplCommand::Restart),
            "h" | "help" | "?" => Ok(ReplCommand::Help),
            "q" | "quit" | "exit" => Ok(ReplCommand::Quit),
            "b" | "break" => parse_break(rest),
            "vars" => {
                let mut words = rest.split_whitespace();
                let scope = words
                    .next()
                    .ok_or(ReplError::Usage("vars SCOPE [LEVEL]"))
                    .and_then(parse_scope)?;
                let level = words.next().map(parse_number).transpose()?.unwrap_or(0);
                Ok(ReplCommand::Vars { scope, level })
            }
            "set" => {
                const USAGE: &str = "set SCOPE LEVEL PATH VALUE";
                let mut parts = rest.splitn(4, char::is_whitespace);
                let (Some(scope), Some(level), Some(path), Some(value)) =
                    (parts.next(), parts.next(), parts.next(), parts.next())
                else {
                    return Err(ReplError::Usage(USAGE));
                };
                let value = value.trim();
                if value.is_empty() {
                    return Err(ReplError::Usage(USAGE));
                }
                Ok(ReplCommand::Set {
                    scope: parse_scope(scope)?,
                    level: parse_number(level)?,
                    path: split_path(path),
                    value: value.to_string(),
                })
            }
            "watch" | "p" | "print" => {
                let (expression, level) = match rest.rsplit_once(" @") {
                    Some((expr, level)) => (expr.trim(), parse_number(level.trim())?),
                    None => (rest, 0),
                };
                if expression.is_empty() {
                    return Err(ReplError::Usage("watch EXPR [@LEVEL]"));
                }
                Ok(ReplCommand::Watch {
                    expression: expression.to_string(),
                    level,
                })
            }
            other => Err(ReplError::Unknown(other.to_string())),
        }
    }
}

fn parse_break(rest: &str) -> Result<ReplCommand, ReplError> {
    let (line, condition) = match rest.split_once(" if ") {
        Some((line, cond)) => (line.trim(), Some(cond.trim())),
        None => (rest, None),
    };
    if line.is_empty() {
        return Err(ReplError::Usage("b LINE [if COND]"));
    }
    let bp = Breakpoint::new(parse_number(line)?);
    Ok(ReplCommand::Break(match condition {
        Some(cond) if !cond.is_empty() => bp.with_condition(cond),
        _ => bp,
    }))
}

fn parse_number(text: &str) -> Result<u32, ReplError> {
    text.parse().map_err(|_| ReplError::BadNumber(text.to_string()))
}

fn parse_scope(text: &str) -> Result<Scope, ReplError> {
    Scope::from_name(text).ok_or_else(|| ReplError::BadScope(text.to_string()))
}

/// Split a dotted path, leaving dots inside double quotes alone.
fn split_path(path: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in path.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            '.' if !quoted => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

pub fn format_backtrace(stack: &StackSnapshot) -> String {
    let mut out = String::new();
    for frame in &stack.frames {
        let _ = writeln!(out, "#{:<2} {} at line {}", frame.level, frame.name, frame.current_line);
    }
    out
}

pub fn format_variables(vars: &[Variable]) -> String {
    let mut out = String::new();
    for var in vars {
        match &var.node {
            Some(node) => {
                let _ = writeln!(out, "{} ({})", var.name, var.var_type.as_str());
                write_children(&mut out, node, 1);
            }
            None => {
                let _ = writeln!(out, "{} = {} ({})", var.name, var.value, var.var_type.as_str());
            }
        }
    }
    out
}

/// Show what an assignment to `path` left behind.
pub fn format_assigned(vars: &[Variable], path: &[String]) -> String {
    let Some((root, members)) = path.split_first() else {
        return String::new();
    };
    let Some(var) = vars.iter().find(|v| &v.name == root) else {
        return format!("{root}: not in scope\n");
    };
    if members.is_empty() {
        return format_variables(std::slice::from_ref(var));
    }

    let shown = path.join(".");
    let names: Vec<&str> = members.iter().map(String::as_str).collect();
    match var.node.as_ref().and_then(|node| node.find(&names)) {
        Some(node) => match node.scalar() {
            Some(value) => format!("{shown} = {value}\n"),
            None => {
                let mut out = format!("{shown}\n");
                write_children(&mut out, node, 1);
                out
            }
        },
        None => format!("{shown}: not found\n"),
    }
}

fn write_children(out: &mut String, node: &VariableNode, depth: usize) {
    for child in node.children() {
        let indent = "  ".repeat(depth);
        let lock = if child.read_only { " [read-only]" } else { "" };
        match child.scalar() {
            Some(value) => {
                let _ = writeln!(out, "{indent}{} = {value}{lock}", child.name);
            }
            None => {
                let _ = writeln!(out, "{indent}{}{lock}", child.name);
                write_children(out, child, depth + 1);
            }
        }
    }
}

pub fn format_exception(record: &ExceptionRecord) -> String {
    let mut out = format!("error: {}\n", record.description);
    for entry in &record.trace {
        let _ = writeln!(out, "  [{}] line {} {}", entry.level, entry.line, entry.call_site);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tspdbg_stream::{Frame, NodeValue, TraceEntry, VarType};

    #[test]
    fn simple_verbs() {
        assert_eq!(ReplCommand::parse("c"), Ok(ReplCommand::Continue));
        assert_eq!(ReplCommand::parse(" next "), Ok(ReplCommand::StepOver));
        assert_eq!(ReplCommand::parse("s"), Ok(ReplCommand::StepIn));
        assert_eq!(ReplCommand::parse("out"), Ok(ReplCommand::StepOut));
        assert_eq!(ReplCommand::parse("q"), Ok(ReplCommand::Quit));
        assert_eq!(ReplCommand::parse(""), Err(ReplError::Empty));
        assert_eq!(
            ReplCommand::parse("jump 3"),
            Err(ReplError::Unknown("jump".into()))
        );
    }

    #[test]
    fn breakpoints() {
        assert_eq!(
            ReplCommand::parse("b 12"),
            Ok(ReplCommand::Break(Breakpoint::new(12)))
        );
        assert_eq!(
            ReplCommand::parse("b 12 if i == 3"),
            Ok(ReplCommand::Break(Breakpoint::new(12).with_condition("i == 3")))
        );
        assert_eq!(
            ReplCommand::parse("b twelve"),
            Err(ReplError::BadNumber("twelve".into()))
        );
        assert!(matches!(ReplCommand::parse("b"), Err(ReplError::Usage(_))));
    }

    #[test]
    fn vars_defaults_to_level_zero() {
        assert_eq!(
            ReplCommand::parse("vars locals"),
            Ok(ReplCommand::Vars {
                scope: Scope::Locals,
                level: 0
            })
        );
        assert_eq!(
            ReplCommand::parse("vars upvalues 2"),
            Ok(ReplCommand::Vars {
                scope: Scope::Upvalues,
                level: 2
            })
        );
        assert_eq!(
            ReplCommand::parse("vars statics"),
            Err(ReplError::BadScope("statics".into()))
        );
    }

    #[test]
    fn set_splits_path_and_keeps_value_spaces() {
        assert_eq!(
            ReplCommand::parse("set locals 0 mainTab.\"a.b\".1 \"hello world\""),
            Ok(ReplCommand::Set {
                scope: Scope::Locals,
                level: 0,
                path: vec!["mainTab".into(), "\"a.b\"".into(), "1".into()],
                value: "\"hello world\"".into(),
            })
        );
        assert!(matches!(
            ReplCommand::parse("set locals 0 x"),
            Err(ReplError::Usage(_))
        ));
    }

    #[test]
    fn watch_with_and_without_level() {
        assert_eq!(
            ReplCommand::parse("watch a + b"),
            Ok(ReplCommand::Watch {
                expression: "a + b".into(),
                level: 0
            })
        );
        assert_eq!(
            ReplCommand::parse("watch t[1] @2"),
            Ok(ReplCommand::Watch {
                expression: "t[1]".into(),
                level: 2
            })
        );
    }

    #[test]
    fn backtrace_lists_frames() {
        let stack = StackSnapshot {
            frames: vec![Frame::new(0, 14, "helper"), Frame::new(1, 30, "main chunk")],
        };
        let text = format_backtrace(&stack);
        assert_eq!(text, "#0  helper at line 14\n#1  main chunk at line 30\n");
    }

    #[test]
    fn variables_render_tables_as_trees() {
        let leaf = |name: &str, value: &str, read_only| VariableNode {
            name: name.into(),
            path: vec![],
            read_only,
            value: NodeValue::Scalar(value.into()),
        };
        let vars = vec![
            Variable {
                name: "n".into(),
                value: "3".into(),
                var_type: VarType::Number,
                node: None,
            },
            Variable {
                name: "t".into(),
                value: "{}".into(),
                var_type: VarType::Table,
                node: Some(VariableNode {
                    name: "t".into(),
                    path: vec!["t".into()],
                    read_only: false,
                    value: NodeValue::Table(vec![
                        leaf("\"k\"", "1", false),
                        leaf("<FUNCTION>", "f", true),
                    ]),
                }),
            },
        ];
        assert_eq!(
            format_variables(&vars),
            "n = 3 (number)\nt (table)\n  \"k\" = 1\n  <FUNCTION> = f [read-only]\n"
        );
    }

    #[test]
    fn assigned_member_is_looked_up_by_path() {
        let vars = vec![
            Variable {
                name: "n".into(),
                value: "4".into(),
                var_type: VarType::Number,
                node: None,
            },
            Variable {
                name: "t".into(),
                value: "{}".into(),
                var_type: VarType::Table,
                node: Some(VariableNode {
                    name: "t".into(),
                    path: vec!["t".into()],
                    read_only: false,
                    value: NodeValue::Table(vec![VariableNode {
                        name: "\"k\"".into(),
                        path: vec!["t".into(), "\"k\"".into()],
                        read_only: false,
                        value: NodeValue::Scalar("7".into()),
                    }]),
                }),
            },
        ];
        let path = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert_eq!(format_assigned(&vars, &path(&["n"])), "n = 4 (number)\n");
        assert_eq!(format_assigned(&vars, &path(&["t", "\"k\""])), "t.\"k\" = 7\n");
        assert_eq!(
            format_assigned(&vars, &path(&["t", "\"z\""])),
            "t.\"z\": not found\n"
        );
        assert_eq!(format_assigned(&vars, &path(&["q"])), "q: not in scope\n");
    }

    #[test]
    fn exception_lists_trace() {
        let record = ExceptionRecord {
            description: "attempt to call a nil value".into(),
            trace: vec![TraceEntry {
                level: 0,
                line: 7,
                call_site: "in main chunk".into(),
            }],
        };
        assert_eq!(
            format_exception(&record),
            "error: attempt to call a nil value\n  [0] line 7 in main chunk\n"
        );
    }
}
