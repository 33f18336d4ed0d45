// ABOUTME: Tree-walking evaluator for the core AST
// Owns the per-execution state: user namespace, side-effect channels,
// iteration budget, heap accounting and the sentinel short-circuit rules.

use crate::analyzer::{Expr, Pattern};
use crate::config::SandboxOptions;
use crate::env::Env;
use crate::error::LispError;
use crate::tools::{shape_args, ToolCallRecord, ToolExecutor, ToolSet};
use crate::value::{flex_lookup, BuiltinDef, BuiltinKind, Closure, Value};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Propagate `Return`/`Fail`/`Recur` out of the current form immediately.
macro_rules! short_circuit {
    ($v:expr) => {{
        let v = $v;
        if v.is_sentinel() {
            return Ok(v);
        }
        v
    }};
}

/// Per-execution interpreter state. One `Interp` evaluates exactly one
/// program; `pmap` workers get derived instances via [`Interp::worker`].
pub struct Interp<'a> {
    pub(crate) ctx: &'a IndexMap<String, Value>,
    pub(crate) memory: &'a IndexMap<String, Value>,
    pub(crate) history: &'a [Value],
    pub(crate) tools: Option<&'a dyn ToolExecutor>,
    pub(crate) toolset: &'a ToolSet,
    pub(crate) opts: &'a SandboxOptions,
    user_ns: IndexMap<String, Value>,
    /// closure namespace snapshots reinstated during invocation, top last
    overlays: Vec<Arc<IndexMap<String, Value>>>,
    pub(crate) prints: Vec<String>,
    pub(crate) tool_calls: Vec<ToolCallRecord>,
    iterations: u64,
    heap_used: usize,
    deadline: Option<Instant>,
}

impl<'a> Interp<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: &'a IndexMap<String, Value>,
        memory: &'a IndexMap<String, Value>,
        history: &'a [Value],
        tools: Option<&'a dyn ToolExecutor>,
        toolset: &'a ToolSet,
        opts: &'a SandboxOptions,
        deadline: Option<Instant>,
    ) -> Self {
        Interp {
            ctx,
            memory,
            history,
            tools,
            toolset,
            opts,
            user_ns: IndexMap::new(),
            overlays: Vec::new(),
            prints: Vec::new(),
            tool_calls: Vec::new(),
            iterations: 0,
            heap_used: 0,
            deadline,
        }
    }

    /// Derived interpreter for a `pmap` worker: same read-only inputs, own
    /// side-effect channels and heap budget, deadline capped per item.
    pub(crate) fn worker(&self, item_deadline: Instant) -> Interp<'a> {
        let deadline = match self.deadline {
            Some(d) => Some(d.min(item_deadline)),
            None => Some(item_deadline),
        };
        Interp {
            ctx: self.ctx,
            memory: self.memory,
            history: self.history,
            tools: self.tools,
            toolset: self.toolset,
            opts: self.opts,
            user_ns: self.user_ns.clone(),
            overlays: self.overlays.clone(),
            prints: Vec::new(),
            tool_calls: Vec::new(),
            iterations: self.iterations,
            heap_used: 0,
            deadline,
        }
    }

    pub(crate) fn take_prints(&mut self) -> Vec<String> {
        std::mem::take(&mut self.prints)
    }

    pub(crate) fn take_tool_calls(&mut self) -> Vec<ToolCallRecord> {
        std::mem::take(&mut self.tool_calls)
    }

    pub(crate) fn absorb_worker(&mut self, prints: Vec<String>, calls: Vec<ToolCallRecord>) {
        self.prints.extend(prints);
        self.tool_calls.extend(calls);
    }

    pub(crate) fn heap_used(&self) -> usize {
        self.heap_used
    }

    pub(crate) fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Append to the print channel, bounded per call by the format option.
    pub(crate) fn push_print(&mut self, text: String) {
        let cap = self.opts.print_limit;
        if text.chars().count() > cap {
            let mut cut: String = text.chars().take(cap).collect();
            cut.push('…');
            self.prints.push(cut);
        } else {
            self.prints.push(text);
        }
    }

    /// Account one call-site evaluation against the iteration ceiling and
    /// the wall-clock deadline.
    pub(crate) fn tick(&mut self) -> Result<(), LispError> {
        self.iterations += 1;
        if self.iterations > self.opts.effective_loop_limit() {
            return Err(LispError::LoopLimit {
                limit: self.opts.effective_loop_limit(),
            });
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(LispError::Timeout {
                    ms: self.opts.timeout.as_millis() as u64,
                });
            }
        }
        Ok(())
    }

    /// Charge cost units against the heap ceiling.
    pub(crate) fn charge(&mut self, cost: usize) -> Result<(), LispError> {
        self.heap_used += cost;
        if self.heap_used > self.opts.heap_limit {
            return Err(LispError::MemoryExceeded {
                bytes: self.heap_used,
            });
        }
        Ok(())
    }

    fn lookup_user(&self, name: &str) -> Option<Value> {
        for overlay in self.overlays.iter().rev() {
            if let Some(v) = overlay.get(name) {
                return Some(v.clone());
            }
        }
        self.user_ns.get(name).cloned()
    }

    /// The user namespace as seen from the current frame, for snapshots.
    fn effective_ns(&self) -> IndexMap<String, Value> {
        if self.overlays.is_empty() {
            return self.user_ns.clone();
        }
        let mut ns = self.user_ns.clone();
        for overlay in &self.overlays {
            for (k, v) in overlay.iter() {
                ns.insert(k.clone(), v.clone());
            }
        }
        ns
    }

    pub fn eval(&mut self, expr: &Expr, env: &Env) -> Result<Value, LispError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Quote(v) => Ok(v.clone()),
            Expr::Local(name) => env
                .get(name)
                .ok_or_else(|| LispError::UnboundVar(name.clone())),
            Expr::UserRef(name) => self
                .lookup_user(name)
                .ok_or_else(|| LispError::UnboundVar(name.clone())),
            Expr::Builtin(def) => Ok(Value::Builtin(def)),
            Expr::CtxRef(key) => Ok(self.ctx.get(key).cloned().unwrap_or(Value::Nil)),
            Expr::MemoryRef(key) => Ok(self.memory.get(key).cloned().unwrap_or(Value::Nil)),
            Expr::ToolRef(name) => Ok(Value::Var(format!("tool/{}", name))),
            Expr::TurnRef(n) => Ok(self
                .history
                .get((*n as usize) - 1)
                .cloned()
                .unwrap_or(Value::Nil)),
            Expr::VectorLit(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(short_circuit!(self.eval(item, env)?));
                }
                let v = Value::Vector(out);
                self.charge(v.heap_cost())?;
                Ok(v)
            }
            Expr::MapLit(pairs) => {
                let mut map = IndexMap::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let key = short_circuit!(self.eval(k, env)?);
                    let value = short_circuit!(self.eval(v, env)?);
                    map.insert(key, value);
                }
                let v = Value::Map(map);
                self.charge(v.heap_cost())?;
                Ok(v)
            }
            Expr::SetLit(items) => {
                let mut set = IndexSet::with_capacity(items.len());
                for item in items {
                    set.insert(short_circuit!(self.eval(item, env)?));
                }
                let v = Value::Set(set);
                self.charge(v.heap_cost())?;
                Ok(v)
            }
            Expr::If(cond, then, other) => {
                let c = short_circuit!(self.eval(cond, env)?);
                if c.is_truthy() {
                    self.eval(then, env)
                } else {
                    self.eval(other, env)
                }
            }
            Expr::Do(body) => {
                let mut last = Value::Nil;
                for item in body {
                    last = short_circuit!(self.eval(item, env)?);
                }
                Ok(last)
            }
            Expr::And(items) => {
                let mut last = Value::Bool(true);
                for item in items {
                    last = short_circuit!(self.eval(item, env)?);
                    if !last.is_truthy() {
                        return Ok(last);
                    }
                }
                Ok(last)
            }
            Expr::Or(items) => {
                let mut last = Value::Nil;
                for item in items {
                    last = short_circuit!(self.eval(item, env)?);
                    if last.is_truthy() {
                        return Ok(last);
                    }
                }
                Ok(last)
            }
            Expr::Let {
                pattern,
                value,
                body,
            } => {
                let v = short_circuit!(self.eval(value, env)?);
                let mut frame = HashMap::new();
                self.destructure(pattern, &v, env, &mut frame)?;
                let inner = env.with_frame(frame);
                self.eval(body, &inner)
            }
            Expr::Fn(def) => {
                let closure = Value::Closure(Arc::new(Closure {
                    def: def.clone(),
                    env: env.clone(),
                    ns_snapshot: Arc::new(self.effective_ns()),
                }));
                self.charge(closure.heap_cost())?;
                Ok(closure)
            }
            Expr::Call { callee, args } => {
                self.tick()?;
                let f = short_circuit!(self.eval(callee, env)?);
                let mut evaled = Vec::with_capacity(args.len());
                for arg in args {
                    evaled.push(short_circuit!(self.eval(arg, env)?));
                }
                self.apply(&f, &evaled)
            }
            Expr::Def { name, value } => {
                let v = short_circuit!(self.eval(value, env)?);
                self.user_ns.insert(name.clone(), v.clone());
                Ok(v)
            }
            Expr::Loop { bindings, body } => {
                let base = env.clone();
                let mut current = base.clone();
                for (pattern, init) in bindings {
                    let v = short_circuit!(self.eval(init, &current)?);
                    let mut frame = HashMap::new();
                    self.destructure(pattern, &v, &current, &mut frame)?;
                    current = current.with_frame(frame);
                }
                loop {
                    match self.eval(body, &current)? {
                        Value::Recur(vals) => {
                            self.tick()?;
                            if vals.len() != bindings.len() {
                                return Err(LispError::arity_error(
                                    "recur",
                                    bindings.len().to_string(),
                                    vals.len(),
                                ));
                            }
                            let mut rebound = base.clone();
                            for ((pattern, _), v) in bindings.iter().zip(vals.iter()) {
                                let mut frame = HashMap::new();
                                self.destructure(pattern, v, &rebound, &mut frame)?;
                                rebound = rebound.with_frame(frame);
                            }
                            current = rebound;
                        }
                        other => return Ok(other),
                    }
                }
            }
            Expr::Recur(args) => {
                let mut vals = Vec::with_capacity(args.len());
                for arg in args {
                    vals.push(short_circuit!(self.eval(arg, env)?));
                }
                Ok(Value::Recur(vals))
            }
        }
    }

    /// Call dispatch. Sentinels returned by the callee are passed through
    /// untouched so every caller's short-circuit check sees them.
    pub fn apply(&mut self, callee: &Value, args: &[Value]) -> Result<Value, LispError> {
        match callee {
            Value::Builtin(def) => {
                check_builtin_arity(def, args.len())?;
                (def.func)(self, args)
            }
            Value::Closure(closure) => self.apply_closure(callee, closure, args),
            Value::Keyword(k) => {
                if args.is_empty() || args.len() > 2 {
                    return Err(LispError::arity_error(
                        &format!(":{}", k),
                        crate::error::ARITY_ONE_OR_TWO,
                        args.len(),
                    ));
                }
                let default = args.get(1).cloned().unwrap_or(Value::Nil);
                let key = Value::Keyword(k.clone());
                Ok(match &args[0] {
                    Value::Map(m) => flex_lookup(m, &key).cloned().unwrap_or(default),
                    Value::Set(s) => {
                        if s.contains(&key) {
                            key
                        } else {
                            default
                        }
                    }
                    _ => default,
                })
            }
            Value::Map(m) => {
                if args.is_empty() || args.len() > 2 {
                    return Err(LispError::arity_error(
                        "map",
                        crate::error::ARITY_ONE_OR_TWO,
                        args.len(),
                    ));
                }
                let default = args.get(1).cloned().unwrap_or(Value::Nil);
                Ok(flex_lookup(m, &args[0]).cloned().unwrap_or(default))
            }
            Value::Set(s) => {
                if args.len() != 1 {
                    return Err(LispError::arity_error(
                        "set",
                        crate::error::ARITY_ONE,
                        args.len(),
                    ));
                }
                Ok(if s.contains(&args[0]) {
                    args[0].clone()
                } else {
                    Value::Nil
                })
            }
            Value::Var(name) => match name.strip_prefix("tool/") {
                Some(tool) => self.call_tool(tool, args),
                None => Err(LispError::UnboundVar(name.clone())),
            },
            other => Err(LispError::NotCallable {
                actual: other.type_name().to_string(),
            }),
        }
    }

    fn apply_closure(
        &mut self,
        callee: &Value,
        closure: &Closure,
        args: &[Value],
    ) -> Result<Value, LispError> {
        let def = &closure.def;
        let label = def.name.as_deref().unwrap_or("fn");
        if def.rest.is_none() && args.len() != def.params.len() {
            return Err(LispError::arity_error(
                label,
                def.params.len().to_string(),
                args.len(),
            ));
        }
        if def.rest.is_some() && args.len() < def.params.len() {
            return Err(LispError::arity_error(
                label,
                format!("at least {}", def.params.len()),
                args.len(),
            ));
        }

        self.overlays.push(closure.ns_snapshot.clone());
        let result = 'call: {
            let mut current: Vec<Value> = args.to_vec();
            loop {
                let mut frame = HashMap::new();
                for (pattern, value) in def.params.iter().zip(current.iter()) {
                    if let Err(e) = self.destructure(pattern, value, &closure.env, &mut frame) {
                        break 'call Err(e);
                    }
                }
                if let Some(rest) = &def.rest {
                    let remainder = Value::Vector(current[def.params.len()..].to_vec());
                    if let Err(e) = self.destructure(rest, &remainder, &closure.env, &mut frame) {
                        break 'call Err(e);
                    }
                }
                if let Some(name) = &def.name {
                    frame.insert(name.clone(), callee.clone());
                }
                let env = closure.env.with_frame(frame);
                match self.eval(&def.body, &env) {
                    Ok(Value::Recur(vals)) => {
                        if let Err(e) = self.tick() {
                            break 'call Err(e);
                        }
                        if vals.len() != def.params.len() {
                            break 'call Err(LispError::arity_error(
                                "recur",
                                def.params.len().to_string(),
                                vals.len(),
                            ));
                        }
                        current = vals;
                    }
                    other => break 'call other,
                }
            }
        };
        self.overlays.pop();
        result
    }

    /// Invoke a host tool, recording the call on the log either way.
    fn call_tool(&mut self, name: &str, args: &[Value]) -> Result<Value, LispError> {
        let shaped = shape_args(self.toolset.get(name), args);
        let executor = match self.tools {
            Some(e) => e,
            None => {
                return Err(LispError::Tool {
                    name: name.to_string(),
                    message: "no tool executor available".to_string(),
                })
            }
        };
        let start = Instant::now();
        let outcome = executor.execute(name, &shaped);
        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(value) => {
                self.charge(value.heap_cost())?;
                self.tool_calls.push(ToolCallRecord {
                    name: name.to_string(),
                    args: shaped,
                    result: Some(value.clone()),
                    error: None,
                    duration_ms,
                });
                Ok(value)
            }
            Err(message) => {
                tracing::warn!(tool = name, error = %message, "tool call failed");
                self.tool_calls.push(ToolCallRecord {
                    name: name.to_string(),
                    args: shaped,
                    result: None,
                    error: Some(message.clone()),
                    duration_ms,
                });
                Err(LispError::Tool {
                    name: name.to_string(),
                    message,
                })
            }
        }
    }

    /// Bind a pattern against a value, filling `frame`.
    fn destructure(
        &mut self,
        pattern: &Pattern,
        value: &Value,
        env: &Env,
        frame: &mut HashMap<String, Value>,
    ) -> Result<(), LispError> {
        match pattern {
            Pattern::Sym(name) => {
                frame.insert(name.clone(), value.clone());
                Ok(())
            }
            Pattern::Vector {
                items,
                rest,
                as_name,
            } => {
                let empty = Vec::new();
                let elements = match value {
                    Value::Vector(v) => v,
                    Value::Nil => &empty,
                    other => {
                        return Err(LispError::type_error("destructure", "vector", other, 1))
                    }
                };
                for (i, item) in items.iter().enumerate() {
                    let v = elements.get(i).cloned().unwrap_or(Value::Nil);
                    self.destructure(item, &v, env, frame)?;
                }
                if let Some(rest) = rest {
                    let tail = if elements.len() > items.len() {
                        Value::Vector(elements[items.len()..].to_vec())
                    } else {
                        Value::Vector(Vec::new())
                    };
                    self.destructure(rest, &tail, env, frame)?;
                }
                if let Some(name) = as_name {
                    frame.insert(name.clone(), value.clone());
                }
                Ok(())
            }
            Pattern::Map {
                bindings,
                defaults,
                as_name,
            } => {
                let empty = IndexMap::new();
                let map = match value {
                    Value::Map(m) => m,
                    Value::Nil => &empty,
                    other => return Err(LispError::type_error("destructure", "map", other, 1)),
                };
                for (name, key) in bindings {
                    let found = flex_lookup(map, key).cloned();
                    let bound = match found {
                        Some(v) => v,
                        None => match defaults.iter().find(|(n, _)| n == name) {
                            Some((_, default_expr)) => self.eval(default_expr, env)?,
                            None => Value::Nil,
                        },
                    };
                    frame.insert(name.clone(), bound);
                }
                if let Some(name) = as_name {
                    frame.insert(name.clone(), value.clone());
                }
                Ok(())
            }
        }
    }
}

fn check_builtin_arity(def: &BuiltinDef, actual: usize) -> Result<(), LispError> {
    let ok = match def.kind {
        BuiltinKind::Normal(n) => actual == n,
        BuiltinKind::Variadic => true,
        BuiltinKind::VariadicNonEmpty => actual >= 1,
        BuiltinKind::MultiArity(counts) => counts.contains(&actual),
    };
    if ok {
        return Ok(());
    }
    let expected = match def.kind {
        BuiltinKind::Normal(n) => n.to_string(),
        BuiltinKind::Variadic => "any".to_string(),
        BuiltinKind::VariadicNonEmpty => crate::error::ARITY_AT_LEAST_ONE.to_string(),
        BuiltinKind::MultiArity(counts) => {
            let parts: Vec<String> = counts.iter().map(|c| c.to_string()).collect();
            parts.join("-")
        }
    };
    Err(LispError::arity_error(def.name, expected, actual))
}
