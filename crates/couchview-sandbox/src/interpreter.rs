//! Tree-walking evaluator for resolved snippets.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value as Json;

use crate::builtins::Builtin;
use crate::error::Diagnostic;
use crate::host::LogSink;
use crate::ops;
use crate::profile::HostFunction;
use crate::resolve::{Annotation, Module};
use crate::syntax::Position;
use crate::syntax::ast::{
    AssignOp, BinaryOp, Block, Expr, ExprKind, FunctionDecl, LogicalOp, PathSegment, Place, Stmt,
    UnaryOp,
};
use crate::value::{FailureKind, Value};

/// Nesting limit for snippet function calls.
pub(crate) const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Side effects collected while a snippet runs.
pub(crate) struct Effects<'a> {
    pub(crate) emitted: Vec<(Json, Json)>,
    pub(crate) logs: &'a mut dyn LogSink,
}

impl<'a> Effects<'a> {
    pub(crate) fn new(logs: &'a mut dyn LogSink) -> Self {
        Self {
            emitted: Vec::new(),
            logs,
        }
    }
}

/// Runs the entry point of `module` with the positional `arguments`.
///
/// Arguments beyond the entry's declared parameters are dropped.
pub(crate) fn run(
    module: &Module,
    arguments: Vec<Value>,
    max_depth: usize,
    effects: &mut Effects<'_>,
) -> Result<Value, Diagnostic> {
    let entry = module
        .entry()
        .ok_or_else(|| Diagnostic::new("entry point is missing"))?;
    let mut interpreter = Interpreter {
        module,
        max_depth,
        depth: 0,
        effects,
    };
    interpreter.call(entry, arguments, entry.position)
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

#[derive(Default)]
struct Frame {
    scopes: Vec<HashMap<String, Value>>,
}

impl Frame {
    fn declare(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_owned(), value);
        }
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
    }
}

/// One step along an assignment path, with index expressions evaluated.
enum Key {
    Field(String),
    Index(Value),
}

struct Interpreter<'m, 'e, 'l> {
    module: &'m Module,
    max_depth: usize,
    depth: usize,
    effects: &'e mut Effects<'l>,
}

impl Interpreter<'_, '_, '_> {
    fn call(
        &mut self,
        decl: &FunctionDecl,
        arguments: Vec<Value>,
        call_site: Position,
    ) -> Result<Value, Diagnostic> {
        if self.depth >= self.max_depth {
            return Err(Diagnostic::at(
                format!("call depth limit of {} exceeded", self.max_depth),
                call_site,
            ));
        }
        let mut scope = HashMap::new();
        let mut supplied = arguments.into_iter();
        for param in &decl.params {
            let value = supplied.next().unwrap_or(Value::Null);
            if let Some(annotation) = &param.annotation {
                let accepted = Annotation::parse(&annotation.name)
                    .is_some_and(|resolved| resolved.accepts(&value));
                if !accepted {
                    return Err(Diagnostic::at(
                        format!(
                            "parameter `{}` expects {}, got a {}",
                            param.name,
                            annotation.name,
                            value.type_name()
                        ),
                        param.position,
                    ));
                }
            }
            scope.insert(param.name.clone(), value);
        }
        let mut frame = Frame {
            scopes: vec![scope],
        };

        self.depth += 1;
        let flow = self.exec_block(&mut frame, &decl.body);
        self.depth -= 1;
        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Normal | Flow::Break | Flow::Continue => Ok(Value::Null),
        }
    }

    fn exec_block(&mut self, frame: &mut Frame, block: &Block) -> Result<Flow, Diagnostic> {
        frame.scopes.push(HashMap::new());
        let mut outcome = Ok(Flow::Normal);
        for stmt in block {
            match self.exec_stmt(frame, stmt) {
                Ok(Flow::Normal) => {}
                other => {
                    outcome = other;
                    break;
                }
            }
        }
        frame.scopes.pop();
        outcome
    }

    fn exec_stmt(&mut self, frame: &mut Frame, stmt: &Stmt) -> Result<Flow, Diagnostic> {
        match stmt {
            Stmt::Let { name, value, .. } => {
                let evaluated = self.eval(frame, value)?;
                frame.declare(name, evaluated);
            }
            Stmt::Assign { target, op, value } => {
                self.assign(frame, target, *op, value)?;
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(frame, condition)?.is_truthy() {
                    return self.exec_block(frame, then_branch);
                }
                if let Some(branch) = else_branch {
                    return self.exec_block(frame, branch);
                }
            }
            Stmt::ForIn {
                first,
                second,
                iterable,
                body,
                position,
            } => {
                let collection = self.eval(frame, iterable)?;
                let pairs = iteration_pairs(collection, second.is_some())
                    .map_err(|message| Diagnostic::at(message, *position))?;
                for (key, item) in pairs {
                    let mut bindings = HashMap::new();
                    match second {
                        Some(name) => {
                            bindings.insert(first.clone(), key);
                            bindings.insert(name.clone(), item);
                        }
                        None => {
                            bindings.insert(first.clone(), item);
                        }
                    }
                    frame.scopes.push(bindings);
                    let flow = self.exec_block(frame, body);
                    frame.scopes.pop();
                    match flow? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        Flow::Return(result) => return Ok(Flow::Return(result)),
                    }
                }
            }
            Stmt::While { condition, body } => {
                while self.eval(frame, condition)?.is_truthy() {
                    match self.exec_block(frame, body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        Flow::Return(result) => return Ok(Flow::Return(result)),
                    }
                }
            }
            Stmt::Break(_) => return Ok(Flow::Break),
            Stmt::Continue(_) => return Ok(Flow::Continue),
            Stmt::Return { value } => {
                let result = match value {
                    Some(expr) => self.eval(frame, expr)?,
                    None => Value::Null,
                };
                return Ok(Flow::Return(result));
            }
            Stmt::Expr(expr) => {
                self.eval(frame, expr)?;
            }
        }
        Ok(Flow::Normal)
    }

    fn assign(
        &mut self,
        frame: &mut Frame,
        target: &Place,
        op: AssignOp,
        value: &Expr,
    ) -> Result<(), Diagnostic> {
        let mut keys = Vec::with_capacity(target.path.len());
        for segment in &target.path {
            keys.push(match segment {
                PathSegment::Field(name) => Key::Field(name.clone()),
                PathSegment::Index(index) => Key::Index(self.eval(frame, index)?),
            });
        }
        let rhs = self.eval(frame, value)?;
        let slot = frame.lookup_mut(&target.root).ok_or_else(|| {
            Diagnostic::at(
                format!("variable `{}` is not in scope", target.root),
                target.position,
            )
        })?;
        let new_value = match op {
            AssignOp::Set => rhs,
            AssignOp::Add | AssignOp::Subtract => {
                let current = read_path(slot, &keys);
                let operator = if op == AssignOp::Add {
                    BinaryOp::Add
                } else {
                    BinaryOp::Subtract
                };
                ops::binary(operator, &current, &rhs)
                    .map_err(|message| Diagnostic::at(message, target.position))?
            }
        };
        write_path(slot, &keys, new_value).map_err(|message| Diagnostic::at(message, target.position))
    }

    fn eval(&mut self, frame: &mut Frame, expr: &Expr) -> Result<Value, Diagnostic> {
        let at = |message: String| Diagnostic::at(message, expr.position);
        match &expr.kind {
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Bool(flag) => Ok(Value::Bool(*flag)),
            ExprKind::Int(number) => Ok(Value::Int(*number)),
            ExprKind::Float(number) => Ok(Value::Float(*number)),
            ExprKind::Str(text) => Ok(Value::String(text.clone())),
            ExprKind::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(frame, item)?);
                }
                Ok(Value::Array(values))
            }
            ExprKind::Object(entries) => {
                let mut object = BTreeMap::new();
                for (key, item) in entries {
                    object.insert(key.clone(), self.eval(frame, item)?);
                }
                Ok(Value::Object(object))
            }
            ExprKind::Variable(name) => frame
                .lookup(name)
                .cloned()
                .ok_or_else(|| at(format!("variable `{name}` is not in scope"))),
            ExprKind::Member { object, field } => {
                let receiver = self.eval(frame, object)?;
                member(&receiver, field).map_err(at)
            }
            ExprKind::Index { object, index } => {
                let receiver = self.eval(frame, object)?;
                let key = self.eval(frame, index)?;
                index_value(&receiver, &key).map_err(at)
            }
            ExprKind::Call { callee, arguments } => {
                let mut values = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(self.eval(frame, argument)?);
                }
                self.dispatch(callee, values, expr.position)
            }
            ExprKind::Unary { op, operand } => {
                let value = self.eval(frame, operand)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Negate => ops::negate(&value).map_err(at),
                }
            }
            ExprKind::Binary { op, left, right } => {
                let lhs = self.eval(frame, left)?;
                let rhs = self.eval(frame, right)?;
                ops::binary(*op, &lhs, &rhs).map_err(at)
            }
            ExprKind::Logical { op, left, right } => {
                let lhs = self.eval(frame, left)?;
                let short_circuits = match op {
                    LogicalOp::And => !lhs.is_truthy(),
                    LogicalOp::Or => lhs.is_truthy(),
                };
                if short_circuits {
                    Ok(lhs)
                } else {
                    self.eval(frame, right)
                }
            }
        }
    }

    fn dispatch(
        &mut self,
        callee: &str,
        arguments: Vec<Value>,
        position: Position,
    ) -> Result<Value, Diagnostic> {
        let module = self.module;
        if let Some(decl) = module.function(callee) {
            return self.call(decl, arguments, position);
        }
        match Builtin::lookup(callee) {
            Some(Builtin::Intrinsic(intrinsic)) => intrinsic
                .call(arguments)
                .map_err(|message| Diagnostic::at(message, position)),
            Some(Builtin::Host(function)) => Ok(self.host_call(function, arguments)),
            None => Err(Diagnostic::at(
                format!("undefined function `{callee}`"),
                position,
            )),
        }
    }

    fn host_call(&mut self, function: HostFunction, arguments: Vec<Value>) -> Value {
        let mut supplied = arguments.into_iter();
        let first = supplied.next().unwrap_or(Value::Null);
        match function {
            HostFunction::Emit => {
                let second = supplied.next().unwrap_or(Value::Null);
                self.effects.emitted.push((first.to_json(), second.to_json()));
                Value::Null
            }
            HostFunction::Log => {
                self.effects.logs.log(&first.render());
                Value::Null
            }
            HostFunction::Forbidden => Value::Failure {
                kind: FailureKind::Forbidden,
                message: first.render(),
            },
            HostFunction::Unauthorized => Value::Failure {
                kind: FailureKind::Unauthorized,
                message: first.render(),
            },
        }
    }
}

/// Reads `field` from an object; `null` receivers propagate.
fn member(receiver: &Value, field: &str) -> Result<Value, String> {
    match receiver {
        Value::Object(entries) => Ok(entries.get(field).cloned().unwrap_or(Value::Null)),
        Value::Null => Ok(Value::Null),
        other => Err(format!(
            "cannot read field `{field}` of a {}",
            other.type_name()
        )),
    }
}

/// Reads an element; missing keys and out-of-range indices yield `null`.
fn index_value(receiver: &Value, key: &Value) -> Result<Value, String> {
    match (receiver, key) {
        (Value::Array(items), Value::Int(index)) => Ok(usize::try_from(*index)
            .ok()
            .and_then(|position| items.get(position))
            .cloned()
            .unwrap_or(Value::Null)),
        (Value::Object(entries), Value::String(name)) => {
            Ok(entries.get(name).cloned().unwrap_or(Value::Null))
        }
        (Value::String(text), Value::Int(index)) => Ok(usize::try_from(*index)
            .ok()
            .and_then(|position| text.chars().nth(position))
            .map_or(Value::Null, |ch| Value::String(ch.to_string()))),
        (Value::Null, _) => Ok(Value::Null),
        (container, _) => Err(format!(
            "cannot index a {} with a {}",
            container.type_name(),
            key.type_name()
        )),
    }
}

fn read_path(root: &Value, keys: &[Key]) -> Value {
    keys.iter()
        .try_fold(root.clone(), |current, key| match key {
            Key::Field(name) => member(&current, name),
            Key::Index(index) => index_value(&current, index),
        })
        .unwrap_or(Value::Null)
}

/// Writes through `keys`, turning `null` intermediates into objects.
fn write_path(slot: &mut Value, keys: &[Key], value: Value) -> Result<(), String> {
    let Some((key, rest)) = keys.split_first() else {
        *slot = value;
        return Ok(());
    };
    if matches!(slot, Value::Null) {
        *slot = Value::Object(BTreeMap::new());
    }
    let child = match (slot, key) {
        (Value::Object(entries), Key::Field(name) | Key::Index(Value::String(name))) => {
            entries.entry(name.clone()).or_insert(Value::Null)
        }
        (Value::Array(items), Key::Index(Value::Int(index))) => {
            let length = items.len();
            usize::try_from(*index)
                .ok()
                .and_then(|position| items.get_mut(position))
                .ok_or_else(|| {
                    format!("index {index} is out of bounds for an array of length {length}")
                })?
        }
        (container, Key::Field(name)) => {
            return Err(format!(
                "cannot set field `{name}` on a {}",
                container.type_name()
            ));
        }
        (container, Key::Index(index)) => {
            return Err(format!(
                "cannot index a {} with a {}",
                container.type_name(),
                index.type_name()
            ));
        }
    };
    write_path(child, rest, value)
}

/// Expands a loop subject into `(key, item)` pairs.
///
/// With a single loop variable the item is the array element, the object
/// key, or the character; with two variables the pair is bound in order.
fn iteration_pairs(collection: Value, keyed: bool) -> Result<Vec<(Value, Value)>, String> {
    let position_of = |offset: usize| i64::try_from(offset).map_or(Value::Null, Value::Int);
    match collection {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .map(|(offset, item)| (position_of(offset), item))
            .collect()),
        Value::Object(entries) => Ok(entries
            .into_iter()
            .map(|(key, item)| {
                if keyed {
                    (Value::String(key), item)
                } else {
                    (Value::Null, Value::String(key))
                }
            })
            .collect()),
        Value::String(text) => Ok(text
            .chars()
            .enumerate()
            .map(|(offset, ch)| (position_of(offset), Value::String(ch.to_string())))
            .collect()),
        other => Err(format!("cannot iterate over a {}", other.type_name())),
    }
}
