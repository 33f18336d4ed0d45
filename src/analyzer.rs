// ABOUTME: Static analyzer turning raw forms into the core AST
// Handles macro desugaring, destructuring and compile-time name resolution.

use crate::builtins::{table, BuiltinTable};
use crate::error::LispError;
use crate::parser::Form;
use crate::value::{BuiltinDef, Value};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;
use std::sync::Arc;

/// A function definition shared between the AST and closures built from it.
#[derive(Debug)]
pub struct FnDef {
    pub params: Vec<Pattern>,
    pub rest: Option<Pattern>,
    pub body: Expr,
    pub name: Option<String>,
}

/// Binding pattern in `let`, `fn` params and `loop` bindings.
#[derive(Debug, Clone)]
pub enum Pattern {
    Sym(String),
    Vector {
        items: Vec<Pattern>,
        rest: Option<Box<Pattern>>,
        as_name: Option<String>,
    },
    Map {
        /// (local name, map key) pairs; covers both `:keys [a b]` and `{a :k}`
        bindings: Vec<(String, Value)>,
        /// defaults from `:or {a 0}`
        defaults: Vec<(String, Expr)>,
        as_name: Option<String>,
    },
}

impl Pattern {
    pub fn bound_names(&self, out: &mut Vec<String>) {
        match self {
            Pattern::Sym(name) => out.push(name.clone()),
            Pattern::Vector {
                items,
                rest,
                as_name,
            } => {
                for item in items {
                    item.bound_names(out);
                }
                if let Some(rest) = rest {
                    rest.bound_names(out);
                }
                if let Some(name) = as_name {
                    out.push(name.clone());
                }
            }
            Pattern::Map {
                bindings, as_name, ..
            } => {
                for (name, _) in bindings {
                    out.push(name.clone());
                }
                if let Some(name) = as_name {
                    out.push(name.clone());
                }
            }
        }
    }
}

/// Core AST evaluated by the interpreter. Side-effect free to construct.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Quote(Value),
    Local(String),
    UserRef(String),
    Builtin(&'static BuiltinDef),
    CtxRef(String),
    MemoryRef(String),
    ToolRef(String),
    TurnRef(u8),
    VectorLit(Vec<Expr>),
    MapLit(Vec<(Expr, Expr)>),
    SetLit(Vec<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    Do(Vec<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Let {
        pattern: Pattern,
        value: Box<Expr>,
        body: Box<Expr>,
    },
    Fn(Arc<FnDef>),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Def {
        name: String,
        value: Box<Expr>,
    },
    Loop {
        bindings: Vec<(Pattern, Expr)>,
        body: Box<Expr>,
    },
    Recur(Vec<Expr>),
}

/// Convert a quoted form into its data value. Lists and vectors both become
/// runtime vectors; ordering is preserved everywhere.
pub fn form_to_value(form: &Form) -> Value {
    match form {
        Form::Nil => Value::Nil,
        Form::Bool(b) => Value::Bool(*b),
        Form::Int(i) => Value::Int(*i),
        Form::Float(f) => Value::Float(*f),
        Form::String(s) => Value::String(s.clone()),
        Form::Keyword(k) => Value::Keyword(k.clone()),
        Form::Symbol(s) => Value::Symbol(s.clone()),
        Form::List(items) | Form::Vector(items) => {
            Value::Vector(items.iter().map(form_to_value).collect())
        }
        Form::Map(pairs) => {
            let mut map = IndexMap::new();
            for (k, v) in pairs {
                map.insert(form_to_value(k), form_to_value(v));
            }
            Value::Map(map)
        }
        Form::Set(items) => {
            let mut set = IndexSet::new();
            for item in items {
                set.insert(form_to_value(item));
            }
            Value::Set(set)
        }
        Form::Quote(inner) => Value::Vector(vec![
            Value::Symbol("quote".into()),
            form_to_value(inner),
        ]),
    }
}

struct Analyzer {
    builtins: &'static BuiltinTable,
    user: HashSet<String>,
    scopes: Vec<HashSet<String>>,
    /// recur target arities, innermost last; pushed by `loop` and `fn`
    recur_frames: Vec<usize>,
}

/// Analyze a whole program into a single `Do` expression.
pub fn analyze_program(forms: &[Form]) -> Result<Expr, LispError> {
    let mut analyzer = Analyzer {
        builtins: table(),
        user: HashSet::new(),
        scopes: Vec::new(),
        recur_frames: Vec::new(),
    };
    // Pre-scan definitions so sibling helpers resolve regardless of order.
    for form in forms {
        analyzer.scan_defs(form);
    }
    let body = forms
        .iter()
        .map(|f| analyzer.analyze(f))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(match body.len() {
        0 => Expr::Literal(Value::Nil),
        1 => body.into_iter().next().unwrap(),
        _ => Expr::Do(body),
    })
}

impl Analyzer {
    fn scan_defs(&mut self, form: &Form) {
        if let Form::List(items) = form {
            if let Some(Form::Symbol(head)) = items.first() {
                if (head == "def" || head == "defn") && items.len() >= 2 {
                    if let Form::Symbol(name) = &items[1] {
                        self.user.insert(name.clone());
                    }
                }
            }
            for item in items {
                self.scan_defs(item);
            }
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|s| s.contains(name))
    }

    fn push_scope(&mut self, names: Vec<String>) {
        self.scopes.push(names.into_iter().collect());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn analyze(&mut self, form: &Form) -> Result<Expr, LispError> {
        match form {
            Form::Nil => Ok(Expr::Literal(Value::Nil)),
            Form::Bool(b) => Ok(Expr::Literal(Value::Bool(*b))),
            Form::Int(i) => Ok(Expr::Literal(Value::Int(*i))),
            Form::Float(f) => Ok(Expr::Literal(Value::Float(*f))),
            Form::String(s) => Ok(Expr::Literal(Value::String(s.clone()))),
            Form::Keyword(k) => Ok(Expr::Literal(Value::Keyword(k.clone()))),
            Form::Quote(inner) => Ok(Expr::Quote(form_to_value(inner))),
            Form::Symbol(name) => self.resolve(name),
            Form::Vector(items) => Ok(Expr::VectorLit(
                items
                    .iter()
                    .map(|f| self.analyze(f))
                    .collect::<Result<_, _>>()?,
            )),
            Form::Set(items) => Ok(Expr::SetLit(
                items
                    .iter()
                    .map(|f| self.analyze(f))
                    .collect::<Result<_, _>>()?,
            )),
            Form::Map(pairs) => {
                let mut out = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    out.push((self.analyze(k)?, self.analyze(v)?));
                }
                Ok(Expr::MapLit(out))
            }
            Form::List(items) => self.analyze_list(items),
        }
    }

    fn resolve(&mut self, name: &str) -> Result<Expr, LispError> {
        match name {
            "*1" => return Ok(Expr::TurnRef(1)),
            "*2" => return Ok(Expr::TurnRef(2)),
            "*3" => return Ok(Expr::TurnRef(3)),
            _ => {}
        }

        // Namespace-qualified reads. A lone "/" is the division builtin.
        if name.len() > 1 {
            if let Some(idx) = name.find('/') {
                if idx > 0 && idx < name.len() - 1 {
                    let (ns, key) = (&name[..idx], &name[idx + 1..]);
                    return match ns {
                        "ctx" => Ok(Expr::CtxRef(key.to_string())),
                        "memory" => Ok(Expr::MemoryRef(key.to_string())),
                        "tool" => Ok(Expr::ToolRef(key.to_string())),
                        "user" => Ok(Expr::UserRef(key.to_string())),
                        _ => Err(LispError::UnboundVar(name.to_string())),
                    };
                }
            }
        }

        if self.is_local(name) {
            return Ok(Expr::Local(name.to_string()));
        }
        if self.user.contains(name) {
            return Ok(Expr::UserRef(name.to_string()));
        }
        if let Some(def) = self.builtins.get(name) {
            return Ok(Expr::Builtin(def));
        }
        Err(LispError::UnboundVar(name.to_string()))
    }

    fn analyze_list(&mut self, items: &[Form]) -> Result<Expr, LispError> {
        if items.is_empty() {
            return Ok(Expr::Literal(Value::Vector(Vec::new())));
        }

        if let Form::Symbol(head) = &items[0] {
            match head.as_str() {
                "if" => return self.analyze_if(&items[1..]),
                "when" => return self.analyze_when(&items[1..]),
                "cond" => return self.analyze_cond(&items[1..]),
                "do" => {
                    let body = items[1..]
                        .iter()
                        .map(|f| self.analyze(f))
                        .collect::<Result<Vec<_>, _>>()?;
                    return Ok(if body.is_empty() {
                        Expr::Literal(Value::Nil)
                    } else {
                        Expr::Do(body)
                    });
                }
                "and" => {
                    return Ok(Expr::And(
                        items[1..]
                            .iter()
                            .map(|f| self.analyze(f))
                            .collect::<Result<_, _>>()?,
                    ));
                }
                "or" => {
                    return Ok(Expr::Or(
                        items[1..]
                            .iter()
                            .map(|f| self.analyze(f))
                            .collect::<Result<_, _>>()?,
                    ));
                }
                "let" => return self.analyze_let(&items[1..]),
                "fn" => return self.analyze_fn(&items[1..], None),
                "defn" => return self.analyze_defn(&items[1..]),
                "def" => return self.analyze_def(&items[1..]),
                "quote" => {
                    if items.len() != 2 {
                        return Err(LispError::analysis_error("quote: expected 1 argument"));
                    }
                    return Ok(Expr::Quote(form_to_value(&items[1])));
                }
                "->" => return self.analyze_thread(&items[1..], true),
                "->>" => return self.analyze_thread(&items[1..], false),
                "loop" => return self.analyze_loop(&items[1..]),
                "recur" => return self.analyze_recur(&items[1..]),
                _ => {}
            }
        }

        let callee = self.analyze(&items[0])?;
        let args = items[1..]
            .iter()
            .map(|f| self.analyze(f))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Expr::Call {
            callee: Box::new(callee),
            args,
        })
    }

    fn analyze_if(&mut self, args: &[Form]) -> Result<Expr, LispError> {
        if args.len() < 2 || args.len() > 3 {
            return Err(LispError::analysis_error("if: expected 2 or 3 arguments"));
        }
        let cond = self.analyze(&args[0])?;
        let then = self.analyze(&args[1])?;
        let other = if args.len() == 3 {
            self.analyze(&args[2])?
        } else {
            Expr::Literal(Value::Nil)
        };
        Ok(Expr::If(Box::new(cond), Box::new(then), Box::new(other)))
    }

    fn analyze_when(&mut self, args: &[Form]) -> Result<Expr, LispError> {
        if args.is_empty() {
            return Err(LispError::analysis_error("when: expected a condition"));
        }
        let cond = self.analyze(&args[0])?;
        let body = args[1..]
            .iter()
            .map(|f| self.analyze(f))
            .collect::<Result<Vec<_>, _>>()?;
        let then = if body.is_empty() {
            Expr::Literal(Value::Nil)
        } else {
            Expr::Do(body)
        };
        Ok(Expr::If(
            Box::new(cond),
            Box::new(then),
            Box::new(Expr::Literal(Value::Nil)),
        ))
    }

    fn analyze_cond(&mut self, args: &[Form]) -> Result<Expr, LispError> {
        if args.len() % 2 != 0 {
            return Err(LispError::analysis_error(
                "cond: expected an even number of clause forms",
            ));
        }
        let mut clauses = Vec::with_capacity(args.len() / 2);
        for pair in args.chunks(2) {
            clauses.push((self.analyze(&pair[0])?, self.analyze(&pair[1])?));
        }
        let mut out = Expr::Literal(Value::Nil);
        for (cond, expr) in clauses.into_iter().rev() {
            out = Expr::If(Box::new(cond), Box::new(expr), Box::new(out));
        }
        Ok(out)
    }

    /// `(let [p1 e1 p2 e2] body…)` folds into nested single-binding lets.
    fn analyze_let(&mut self, args: &[Form]) -> Result<Expr, LispError> {
        let bindings = match args.first() {
            Some(Form::Vector(items)) => items,
            _ => {
                return Err(LispError::analysis_error(
                    "let: expected a binding vector as first argument",
                ))
            }
        };
        if bindings.len() % 2 != 0 {
            return Err(LispError::analysis_error(
                "let: binding vector must hold an even number of forms",
            ));
        }
        self.fold_let(bindings, &args[1..])
    }

    fn fold_let(&mut self, bindings: &[Form], body: &[Form]) -> Result<Expr, LispError> {
        if bindings.is_empty() {
            let exprs = body
                .iter()
                .map(|f| self.analyze(f))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(if exprs.is_empty() {
                Expr::Literal(Value::Nil)
            } else {
                Expr::Do(exprs)
            });
        }
        let value = self.analyze(&bindings[1])?;
        let pattern = self.parse_pattern(&bindings[0])?;
        let mut names = Vec::new();
        pattern.bound_names(&mut names);
        self.push_scope(names);
        let rest = self.fold_let(&bindings[2..], body);
        self.pop_scope();
        Ok(Expr::Let {
            pattern,
            value: Box::new(value),
            body: Box::new(rest?),
        })
    }

    fn analyze_fn(&mut self, args: &[Form], def_name: Option<String>) -> Result<Expr, LispError> {
        // optional inline name: (fn recall [x] …)
        let (name, args) = match args.first() {
            Some(Form::Symbol(n)) => (Some(n.clone()), &args[1..]),
            _ => (def_name, args),
        };
        let params_form = match args.first() {
            Some(Form::Vector(items)) => items,
            _ => {
                return Err(LispError::analysis_error(
                    "fn: expected a parameter vector",
                ))
            }
        };

        let mut params = Vec::new();
        let mut rest = None;
        let mut iter = params_form.iter().peekable();
        while let Some(item) = iter.next() {
            if matches!(item, Form::Symbol(s) if s == "&") {
                let rest_form = iter.next().ok_or_else(|| {
                    LispError::analysis_error("fn: & must be followed by a rest parameter")
                })?;
                rest = Some(self.parse_pattern(rest_form)?);
                if iter.next().is_some() {
                    return Err(LispError::analysis_error(
                        "fn: only one rest parameter is allowed",
                    ));
                }
                break;
            }
            params.push(self.parse_pattern(item)?);
        }

        let mut names = Vec::new();
        for p in &params {
            p.bound_names(&mut names);
        }
        if let Some(r) = &rest {
            r.bound_names(&mut names);
        }
        if let Some(n) = &name {
            names.push(n.clone());
        }

        self.push_scope(names);
        // recur inside a fixed-arity fn rebinds its parameters
        let recur_ok = rest.is_none();
        if recur_ok {
            self.recur_frames.push(params.len());
        }
        let body = args[1..]
            .iter()
            .map(|f| self.analyze(f))
            .collect::<Result<Vec<_>, _>>();
        if recur_ok {
            self.recur_frames.pop();
        }
        self.pop_scope();

        let body = body?;
        let body = if body.is_empty() {
            Expr::Literal(Value::Nil)
        } else {
            Expr::Do(body)
        };

        Ok(Expr::Fn(Arc::new(FnDef {
            params,
            rest,
            body,
            name,
        })))
    }

    fn analyze_defn(&mut self, args: &[Form]) -> Result<Expr, LispError> {
        let name = match args.first() {
            Some(Form::Symbol(n)) => n.clone(),
            _ => return Err(LispError::analysis_error("defn: expected a name symbol")),
        };
        self.user.insert(name.clone());
        let func = self.analyze_fn(&args[1..], Some(name.clone()))?;
        Ok(Expr::Def {
            name,
            value: Box::new(func),
        })
    }

    fn analyze_def(&mut self, args: &[Form]) -> Result<Expr, LispError> {
        if args.len() != 2 {
            return Err(LispError::analysis_error("def: expected a name and a value"));
        }
        let name = match &args[0] {
            Form::Symbol(n) if !n.contains('/') => n.clone(),
            _ => return Err(LispError::analysis_error("def: name must be a bare symbol")),
        };
        self.user.insert(name.clone());
        let value = self.analyze(&args[1])?;
        Ok(Expr::Def {
            name,
            value: Box::new(value),
        })
    }

    /// `->` threads as first argument, `->>` as last.
    fn analyze_thread(&mut self, args: &[Form], first: bool) -> Result<Expr, LispError> {
        let mut iter = args.iter();
        let mut acc = match iter.next() {
            Some(f) => f.clone(),
            None => {
                return Err(LispError::analysis_error(
                    "->: expected a value to thread",
                ))
            }
        };
        for step in iter {
            acc = match step {
                Form::List(items) if !items.is_empty() => {
                    let mut call = Vec::with_capacity(items.len() + 1);
                    call.push(items[0].clone());
                    if first {
                        call.push(acc);
                        call.extend(items[1..].iter().cloned());
                    } else {
                        call.extend(items[1..].iter().cloned());
                        call.push(acc);
                    }
                    Form::List(call)
                }
                other => Form::List(vec![other.clone(), acc]),
            };
        }
        self.analyze(&acc)
    }

    fn analyze_loop(&mut self, args: &[Form]) -> Result<Expr, LispError> {
        let binding_forms = match args.first() {
            Some(Form::Vector(items)) => items,
            _ => {
                return Err(LispError::analysis_error(
                    "loop: expected a binding vector",
                ))
            }
        };
        if binding_forms.len() % 2 != 0 {
            return Err(LispError::analysis_error(
                "loop: binding vector must hold an even number of forms",
            ));
        }

        let mut bindings = Vec::with_capacity(binding_forms.len() / 2);
        let mut names: Vec<String> = Vec::new();
        for pair in binding_forms.chunks(2) {
            // each init expression sees the bindings before it
            self.push_scope(names.clone());
            let value = self.analyze(&pair[1]);
            self.pop_scope();
            let pattern = self.parse_pattern(&pair[0])?;
            pattern.bound_names(&mut names);
            bindings.push((pattern, value?));
        }

        self.push_scope(names);
        self.recur_frames.push(bindings.len());
        let body = args[1..]
            .iter()
            .map(|f| self.analyze(f))
            .collect::<Result<Vec<_>, _>>();
        self.recur_frames.pop();
        self.pop_scope();

        let body = body?;
        let body = if body.is_empty() {
            Expr::Literal(Value::Nil)
        } else {
            Expr::Do(body)
        };
        Ok(Expr::Loop {
            bindings,
            body: Box::new(body),
        })
    }

    fn analyze_recur(&mut self, args: &[Form]) -> Result<Expr, LispError> {
        let arity = match self.recur_frames.last() {
            Some(a) => *a,
            None => {
                return Err(LispError::analysis_error(
                    "recur: only allowed inside loop or fn",
                ))
            }
        };
        if args.len() != arity {
            return Err(LispError::analysis_error(format!(
                "recur: expected {} argument(s), got {}",
                arity,
                args.len()
            )));
        }
        Ok(Expr::Recur(
            args.iter()
                .map(|f| self.analyze(f))
                .collect::<Result<_, _>>()?,
        ))
    }

    fn parse_pattern(&mut self, form: &Form) -> Result<Pattern, LispError> {
        match form {
            Form::Symbol(name) if name != "&" && !name.contains('/') => {
                Ok(Pattern::Sym(name.clone()))
            }
            Form::Vector(items) => {
                let mut out = Vec::new();
                let mut rest = None;
                let mut as_name = None;
                let mut iter = items.iter().peekable();
                while let Some(item) = iter.next() {
                    match item {
                        Form::Symbol(s) if s == "&" => {
                            let rest_form = iter.next().ok_or_else(|| LispError::BadDestructure {
                                message: "& must be followed by a pattern".into(),
                            })?;
                            rest = Some(Box::new(self.parse_pattern(rest_form)?));
                        }
                        Form::Keyword(k) if k == "as" => {
                            match iter.next() {
                                Some(Form::Symbol(name)) => as_name = Some(name.clone()),
                                _ => {
                                    return Err(LispError::BadDestructure {
                                        message: ":as must be followed by a symbol".into(),
                                    })
                                }
                            }
                        }
                        other => out.push(self.parse_pattern(other)?),
                    }
                }
                Ok(Pattern::Vector {
                    items: out,
                    rest,
                    as_name,
                })
            }
            Form::Map(pairs) => {
                let mut bindings = Vec::new();
                let mut defaults = Vec::new();
                let mut as_name = None;
                for (k, v) in pairs {
                    match k {
                        Form::Keyword(kw) if kw == "keys" => match v {
                            Form::Vector(syms) => {
                                for sym in syms {
                                    match sym {
                                        Form::Symbol(name) => bindings.push((
                                            name.clone(),
                                            Value::Keyword(name.clone()),
                                        )),
                                        _ => {
                                            return Err(LispError::BadDestructure {
                                                message: ":keys expects a vector of symbols"
                                                    .into(),
                                            })
                                        }
                                    }
                                }
                            }
                            _ => {
                                return Err(LispError::BadDestructure {
                                    message: ":keys expects a vector of symbols".into(),
                                })
                            }
                        },
                        Form::Keyword(kw) if kw == "or" => match v {
                            Form::Map(or_pairs) => {
                                for (name_form, default_form) in or_pairs {
                                    match name_form {
                                        Form::Symbol(name) => {
                                            let expr = self.analyze(default_form)?;
                                            defaults.push((name.clone(), expr));
                                        }
                                        _ => {
                                            return Err(LispError::BadDestructure {
                                                message: ":or keys must be symbols".into(),
                                            })
                                        }
                                    }
                                }
                            }
                            _ => {
                                return Err(LispError::BadDestructure {
                                    message: ":or expects a map of defaults".into(),
                                })
                            }
                        },
                        Form::Keyword(kw) if kw == "as" => match v {
                            Form::Symbol(name) => as_name = Some(name.clone()),
                            _ => {
                                return Err(LispError::BadDestructure {
                                    message: ":as must name a symbol".into(),
                                })
                            }
                        },
                        // `{total :amount}` binds total from key :amount
                        Form::Symbol(name) => {
                            bindings.push((name.clone(), form_to_value(v)));
                        }
                        _ => {
                            return Err(LispError::BadDestructure {
                                message: format!("unsupported map destructuring key {:?}", k),
                            })
                        }
                    }
                }
                Ok(Pattern::Map {
                    bindings,
                    defaults,
                    as_name,
                })
            }
            other => Err(LispError::BadDestructure {
                message: format!("unsupported binding form {:?}", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn analyze_src(src: &str) -> Result<Expr, LispError> {
        analyze_program(&parse(src).unwrap())
    }

    #[test]
    fn test_resolve_builtin() {
        assert!(matches!(analyze_src("count").unwrap(), Expr::Builtin(_)));
        assert!(matches!(analyze_src("+").unwrap(), Expr::Builtin(_)));
        assert!(matches!(analyze_src("/").unwrap(), Expr::Builtin(_)));
    }

    #[test]
    fn test_unbound_symbol() {
        let err = analyze_src("does-not-exist").unwrap_err();
        assert!(matches!(err, LispError::UnboundVar(_)));
    }

    #[test]
    fn test_namespace_resolution() {
        assert!(matches!(
            analyze_src("ctx/products").unwrap(),
            Expr::CtxRef(k) if k == "products"
        ));
        assert!(matches!(
            analyze_src("memory/seen").unwrap(),
            Expr::MemoryRef(k) if k == "seen"
        ));
        assert!(matches!(
            analyze_src("tool/search").unwrap(),
            Expr::ToolRef(k) if k == "search"
        ));
        assert!(matches!(
            analyze_src("bogus/thing").unwrap_err(),
            LispError::UnboundVar(_)
        ));
    }

    #[test]
    fn test_turn_history_refs() {
        assert!(matches!(analyze_src("*1").unwrap(), Expr::TurnRef(1)));
        assert!(matches!(analyze_src("*3").unwrap(), Expr::TurnRef(3)));
    }

    #[test]
    fn test_if_gets_nil_else() {
        match analyze_src("(if true 1)").unwrap() {
            Expr::If(_, _, other) => {
                assert!(matches!(*other, Expr::Literal(Value::Nil)))
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_let_folds_right() {
        let expr = analyze_src("(let [a 1 b a] b)").unwrap();
        match expr {
            Expr::Let { body, .. } => assert!(matches!(*body, Expr::Let { .. })),
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn test_let_scoping() {
        assert!(analyze_src("(let [a 1] a)").is_ok());
        assert!(analyze_src("(do (let [a 1] a) a)").is_err());
    }

    #[test]
    fn test_fn_variadic_params() {
        match analyze_src("(fn [a b & more] more)").unwrap() {
            Expr::Fn(def) => {
                assert_eq!(def.params.len(), 2);
                assert!(def.rest.is_some());
            }
            other => panic!("expected fn, got {:?}", other),
        }
    }

    #[test]
    fn test_defn_desugars_to_def() {
        match analyze_src("(defn add1 [x] (+ x 1))").unwrap() {
            Expr::Def { name, value } => {
                assert_eq!(name, "add1");
                match *value {
                    Expr::Fn(def) => assert_eq!(def.name.as_deref(), Some("add1")),
                    other => panic!("expected fn, got {:?}", other),
                }
            }
            other => panic!("expected def, got {:?}", other),
        }
    }

    #[test]
    fn test_sibling_helpers_resolve_out_of_order() {
        let src = "(do (defn recall [] (helper)) (defn helper [] 42))";
        assert!(analyze_src(src).is_ok());
    }

    #[test]
    fn test_thread_first_and_last() {
        // (-> 5 (- 2)) => (- 5 2)
        let first = analyze_src("(-> 5 (- 2))").unwrap();
        // (->> 5 (- 2)) => (- 2 5)
        let last = analyze_src("(->> 5 (- 2))").unwrap();
        match (first, last) {
            (Expr::Call { args: a, .. }, Expr::Call { args: b, .. }) => {
                assert!(matches!(a[0], Expr::Literal(Value::Int(5))));
                assert!(matches!(b[1], Expr::Literal(Value::Int(5))));
            }
            other => panic!("expected calls, got {:?}", other),
        }
    }

    #[test]
    fn test_cond_desugars_to_nested_ifs() {
        let expr = analyze_src("(cond (< 1 2) :a :else :b)").unwrap();
        assert!(matches!(expr, Expr::If(..)));
    }

    #[test]
    fn test_destructuring_patterns() {
        assert!(analyze_src("(let [[a b & rest] [1 2 3]] rest)").is_ok());
        assert!(analyze_src("(let [{:keys [x y] :or {x 0} :as m} {}] [x y m])").is_ok());
        assert!(analyze_src("(let [{total :amount} {}] total)").is_ok());
        assert!(analyze_src("(let [5 x] x)").is_err());
    }

    #[test]
    fn test_recur_outside_loop_is_error() {
        assert!(analyze_src("(recur 1)").is_err());
        assert!(analyze_src("(loop [i 0] (recur (+ i 1)))").is_ok());
        assert!(analyze_src("(fn [x] (recur (+ x 1)))").is_ok());
    }

    #[test]
    fn test_recur_arity_mismatch() {
        assert!(analyze_src("(loop [i 0 j 0] (recur i))").is_err());
    }

    #[test]
    fn test_user_shadowing_builtin() {
        let expr = analyze_src("(do (def count 5) count)").unwrap();
        match expr {
            Expr::Do(items) => assert!(matches!(items[1], Expr::UserRef(_))),
            other => panic!("expected do, got {:?}", other),
        }
    }
}
