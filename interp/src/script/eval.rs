//! Tree-walking evaluator.
//!
//! Values are copied on read, so containers never alias. Mutating methods
//! and item assignment write the updated container back to the place it
//! was loaded from.

use std::collections::{BTreeMap, HashMap};

use super::ast::{
    Arg, BinOp, BoolOp, Const, Expr, FPart, FunctionDef, Stmt, StmtKind, Subscript, Target,
};
use super::builtins::{self, Builtin};
use super::error::{ScriptError, ScriptResult};
use super::methods::{call_method, is_mutating};
use super::ops;
use super::value::Value;

/// Top-level names shared by every block of a session.
pub type Bindings = BTreeMap<String, Value>;

/// Capabilities the interpreter borrows from its embedder.
pub trait Host {
    fn scrape_web(&self, url: &str) -> anyhow::Result<Value>;
}

const MAX_CALL_DEPTH: usize = 64;
/// Nested expression evaluations across all active calls.
const MAX_EVAL_DEPTH: usize = 1_000;
const BLOCK_SCOPE: &str = "<block>";

struct Frame {
    scope: String,
    locals: HashMap<String, Value>,
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

pub struct Interpreter<'a> {
    globals: &'a mut Bindings,
    out: &'a mut String,
    host: &'a dyn Host,
    frames: Vec<Frame>,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(globals: &'a mut Bindings, out: &'a mut String, host: &'a dyn Host) -> Self {
        Self {
            globals,
            out,
            host,
            frames: Vec::new(),
            depth: 0,
        }
    }

    pub fn run(&mut self, program: &[Stmt]) -> ScriptResult<()> {
        self.exec_block(program)?;
        Ok(())
    }

    fn exec_block(&mut self, body: &[Stmt]) -> ScriptResult<Flow> {
        for stmt in body {
            let flow = self.exec_stmt(stmt).map_err(|err| {
                let scope = self
                    .frames
                    .last()
                    .map_or(BLOCK_SCOPE, |frame| frame.scope.as_str());
                err.at(stmt.line, scope, self.frames.len())
            })?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> ScriptResult<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone(), true)?;
                }
            }
            StmtKind::AugAssign(target, op, value) => {
                let current = self.load(target)?;
                let rhs = self.eval(value)?;
                let updated = match (current, op) {
                    (Value::List(mut items), BinOp::Add) => {
                        let more = ops::iterate(&rhs)?;
                        ops::check_len(items.len() + more.len())?;
                        items.extend(more);
                        Value::List(items)
                    }
                    (current, op) => ops::binary(*op, &current, &rhs)?,
                };
                self.assign(target, updated, true)?;
            }
            StmtKind::If { branches, orelse } => {
                for (cond, body) in branches {
                    if self.eval(cond)?.is_truthy() {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::While(cond, body) => {
                while self.eval(cond)?.is_truthy() {
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::For(target, iter, body) => {
                let items = ops::iterate(&self.eval(iter)?)?;
                for item in items {
                    self.assign(target, item, true)?;
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::Def(def) => self.store(&def.name, Value::Function(def.clone())),
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
        }
        Ok(Flow::Normal)
    }

    fn lookup(&self, name: &str) -> ScriptResult<Value> {
        if let Some(value) = self.frames.last().and_then(|frame| frame.locals.get(name)) {
            return Ok(value.clone());
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        Builtin::from_name(name)
            .map(Value::Builtin)
            .ok_or_else(|| ScriptError::name(format!("name '{name}' is not defined")))
    }

    /// Bind in the innermost scope.
    fn store(&mut self, name: &str, value: Value) {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.locals.insert(name.to_string(), value);
            }
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    /// Write back to whichever scope currently holds `name`.
    fn store_existing(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut()
            && let Some(slot) = frame.locals.get_mut(name)
        {
            *slot = value;
            return;
        }
        if let Some(slot) = self.globals.get_mut(name) {
            *slot = value;
            return;
        }
        self.store(name, value);
    }

    fn load(&mut self, target: &Target) -> ScriptResult<Value> {
        match target {
            Target::Name(name) => self.lookup(name),
            Target::Subscript(base, index) => {
                let container = self.load(base)?;
                let index = self.eval(index)?;
                ops::get_item(&container, &index)
            }
            Target::Tuple(_) => Err(ScriptError::type_error("cannot read a tuple target")),
        }
    }

    /// `rebind` is false when writing a modified container back in place.
    fn assign(&mut self, target: &Target, value: Value, rebind: bool) -> ScriptResult<()> {
        match target {
            Target::Name(name) if rebind => self.store(name, value.within_nesting()?),
            Target::Name(name) => self.store_existing(name, value.within_nesting()?),
            Target::Subscript(base, index) => {
                let index = self.eval(index)?;
                let mut container = self.load(base)?;
                ops::set_item(&mut container, &index, value)?;
                self.assign(base, container, false)?;
            }
            Target::Tuple(targets) => {
                let items = ops::iterate(&value)?;
                if items.len() < targets.len() {
                    return Err(ScriptError::value(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        items.len()
                    )));
                }
                if items.len() > targets.len() {
                    return Err(ScriptError::value(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, rebind)?;
                }
            }
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> ScriptResult<Value> {
        if self.depth >= MAX_EVAL_DEPTH {
            return Err(ScriptError::runtime("maximum recursion depth exceeded"));
        }
        self.depth += 1;
        let result = self.eval_inner(expr);
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, expr: &Expr) -> ScriptResult<Value> {
        match expr {
            Expr::Const(constant) => Ok(match constant {
                Const::None => Value::None,
                Const::Bool(b) => Value::Bool(*b),
                Const::Int(i) => Value::Int(*i),
                Const::Float(x) => Value::Float(*x),
                Const::Str(s) => Value::Str(s.clone()),
            }),
            Expr::FString(parts) => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        FPart::Lit(lit) => text.push_str(lit),
                        FPart::Expr { expr, spec } => {
                            let value = self.eval(expr)?;
                            text.push_str(&ops::format_spec(&value, spec.as_deref().unwrap_or(""))?);
                        }
                    }
                }
                Ok(Value::Str(text))
            }
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<ScriptResult<_>>()?,
            )),
            Expr::Dict(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let key = match self.eval(key)? {
                        Value::Str(s) => s,
                        other => {
                            return Err(ScriptError::type_error(format!(
                                "dict keys must be str, not {}",
                                other.type_name()
                            )));
                        }
                    };
                    map.insert(key, self.eval(value)?);
                }
                Ok(Value::Dict(map))
            }
            Expr::ListComp {
                element,
                target,
                iter,
                cond,
            } => self.comprehension(element, target, iter, cond.as_deref()),
            Expr::Unary(op, operand) => ops::unary(*op, &self.eval(operand)?),
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                ops::binary(*op, &left, &right)
            }
            Expr::Compare(first, rest) => {
                let mut left = self.eval(first)?;
                for (op, operand) in rest {
                    let right = self.eval(operand)?;
                    if !ops::compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::Bool(op, left, right) => {
                let left = self.eval(left)?;
                match (op, left.is_truthy()) {
                    (BoolOp::And, false) | (BoolOp::Or, true) => Ok(left),
                    _ => self.eval(right),
                }
            }
            Expr::IfElse { cond, then, orelse } => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::Call(callee, args) => {
                let callee = self.eval(callee)?;
                let (positional, keywords) = self.eval_args(args)?;
                self.call_value(callee, positional, keywords)
            }
            Expr::Method(receiver, name, args) => self.method_call(receiver, name, args),
            Expr::Subscript(base, subscript) => {
                let base = self.eval(base)?;
                match subscript {
                    Subscript::Index(index) => {
                        let index = self.eval(index)?;
                        ops::get_item(&base, &index)
                    }
                    Subscript::Slice(start, end) => {
                        let start = start.as_deref().map(|e| self.eval(e)).transpose()?;
                        let end = end.as_deref().map(|e| self.eval(e)).transpose()?;
                        ops::slice(&base, start.as_ref(), end.as_ref())
                    }
                }
            }
        }
    }

    fn comprehension(
        &mut self,
        element: &Expr,
        target: &Target,
        iter: &Expr,
        cond: Option<&Expr>,
    ) -> ScriptResult<Value> {
        let items = ops::iterate(&self.eval(iter)?)?;
        let locals = self
            .frames
            .last()
            .map(|frame| frame.locals.clone())
            .unwrap_or_default();
        let scope = self
            .frames
            .last()
            .map_or_else(|| BLOCK_SCOPE.to_string(), |frame| frame.scope.clone());
        self.frames.push(Frame { scope, locals });
        let result = self.comprehension_items(element, target, items, cond);
        self.frames.pop();
        result.map(Value::List)
    }

    fn comprehension_items(
        &mut self,
        element: &Expr,
        target: &Target,
        items: Vec<Value>,
        cond: Option<&Expr>,
    ) -> ScriptResult<Vec<Value>> {
        let mut out = Vec::new();
        for item in items {
            self.assign(target, item, true)?;
            if let Some(cond) = cond
                && !self.eval(cond)?.is_truthy()
            {
                continue;
            }
            out.push(self.eval(element)?);
        }
        Ok(out)
    }

    fn eval_args(&mut self, args: &[Arg]) -> ScriptResult<(Vec<Value>, Vec<(String, Value)>)> {
        let mut positional = Vec::new();
        let mut keywords = Vec::new();
        for arg in args {
            let value = self.eval(&arg.value)?;
            match &arg.name {
                Some(name) => keywords.push((name.clone(), value)),
                None => positional.push(value),
            }
        }
        Ok((positional, keywords))
    }

    fn method_call(&mut self, receiver: &Expr, name: &str, args: &[Arg]) -> ScriptResult<Value> {
        let (positional, keywords) = self.eval_args(args)?;
        if !keywords.is_empty() {
            return Err(ScriptError::type_error(format!(
                "{name}() takes no keyword arguments"
            )));
        }
        let place = Target::from_expr(receiver).filter(|t| !matches!(t, Target::Tuple(_)));
        if let Some(place) = place {
            let mut value = self.load(&place)?;
            if is_mutating(&value, name) {
                let result = call_method(&mut value, name, positional)?;
                self.assign(&place, value, false)?;
                return Ok(result);
            }
            return call_method(&mut value, name, positional);
        }
        let mut value = self.eval(receiver)?;
        call_method(&mut value, name, positional)
    }

    fn call_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        keywords: Vec<(String, Value)>,
    ) -> ScriptResult<Value> {
        match callee {
            Value::Builtin(builtin) => {
                builtins::call(builtin, args, keywords, &mut *self.out, self.host)
            }
            Value::Function(def) => self.call_function(&def, args, keywords),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(
        &mut self,
        def: &FunctionDef,
        args: Vec<Value>,
        keywords: Vec<(String, Value)>,
    ) -> ScriptResult<Value> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(ScriptError::runtime("maximum recursion depth exceeded"));
        }
        if args.len() > def.params.len() {
            return Err(ScriptError::type_error(format!(
                "{}() takes {} positional argument(s) but {} were given",
                def.name,
                def.params.len(),
                args.len()
            )));
        }
        let mut locals: HashMap<String, Value> = def
            .params
            .iter()
            .zip(args)
            .map(|(param, value)| (param.name.clone(), value))
            .collect();
        for (name, value) in keywords {
            if !def.params.iter().any(|param| param.name == name) {
                return Err(ScriptError::type_error(format!(
                    "{}() got an unexpected keyword argument '{name}'",
                    def.name
                )));
            }
            if locals.insert(name.clone(), value).is_some() {
                return Err(ScriptError::type_error(format!(
                    "{}() got multiple values for argument '{name}'",
                    def.name
                )));
            }
        }
        for param in &def.params {
            if locals.contains_key(&param.name) {
                continue;
            }
            let Some(default) = &param.default else {
                return Err(ScriptError::type_error(format!(
                    "{}() missing required argument: '{}'",
                    def.name, param.name
                )));
            };
            let value = self.eval(default)?;
            locals.insert(param.name.clone(), value);
        }

        self.frames.push(Frame {
            scope: def.name.clone(),
            locals,
        });
        let result = self.exec_block(&def.body);
        self.frames.pop();
        match result? {
            Flow::Return(value) => Ok(value),
            Flow::Normal | Flow::Break | Flow::Continue => Ok(Value::None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::run;

    struct StaticHost;

    impl Host for StaticHost {
        fn scrape_web(&self, url: &str) -> anyhow::Result<Value> {
            Ok(Value::from(format!("page at {url}")))
        }
    }

    fn exec(src: &str, bindings: &mut Bindings) -> ScriptResult<String> {
        let mut out = String::new();
        run(src, bindings, &mut out, &StaticHost)?;
        Ok(out)
    }

    fn output(src: &str) -> String {
        exec(src, &mut Bindings::new()).expect("script runs")
    }

    #[test]
    fn arithmetic_loops_and_functions() {
        let src = "def fact(n):\n    if n <= 1:\n        return 1\n    return n * fact(n - 1)\n\ntotal = 0\nfor i in range(1, 5):\n    total += fact(i)\nprint(total)\n";
        assert_eq!(output(src), "33\n");
    }

    #[test]
    fn globals_persist_across_runs_and_locals_do_not_leak() {
        let mut bindings = Bindings::new();
        exec("x = 10\ndef f(y):\n    z = y + x\n    return z", &mut bindings).expect("define");
        let out = exec("print(f(5))", &mut bindings).expect("call");
        assert_eq!(out, "15\n");
        assert!(bindings.contains_key("x"));
        assert!(!bindings.contains_key("z"));
        assert!(matches!(bindings.get("f"), Some(Value::Function(_))));
    }

    #[test]
    fn mutating_methods_write_back_through_subscripts_and_globals() {
        let src = "d = {'xs': [1]}\nd['xs'].append(2)\nitems = []\ndef add(v):\n    items.append(v)\nadd(3)\nprint(d, items)";
        assert_eq!(output(src), "{'xs': [1, 2]} [3]\n");
    }

    #[test]
    fn containers_are_copied_on_assignment() {
        assert_eq!(output("a = [1]\nb = a\nb.append(2)\nprint(a, b)"), "[1] [1, 2]\n");
    }

    #[test]
    fn comprehensions_fstrings_and_unpacking() {
        let src = "pairs = [(k, v * 2) for k, v in {'a': 1, 'b': 2}.items() if v]\nfor k, v in pairs:\n    print(f'{k}={v:>3}')\nprint(k)";
        assert_eq!(output(src), "a=  2\nb=  4\nb\n");
    }

    #[test]
    fn comprehension_target_does_not_leak() {
        let err = exec("[q for q in range(3)]\nprint(q)", &mut Bindings::new()).unwrap_err();
        assert_eq!(err.to_string(), "NameError: name 'q' is not defined");
        assert_eq!(err.trace[0].line, 2);
    }

    #[test]
    fn errors_carry_innermost_statement_and_call_frames() {
        let src = "def inner():\n    return 1 / 0\n\nif True:\n    inner()\n";
        let err = exec(src, &mut Bindings::new()).unwrap_err();
        assert_eq!(err.kind.as_str(), "ZeroDivisionError");
        let frames: Vec<(usize, &str)> = err
            .trace
            .iter()
            .map(|frame| (frame.line, frame.scope.as_str()))
            .collect();
        assert_eq!(frames, vec![(2, "inner"), (5, "<block>")]);
    }

    #[test]
    fn statements_before_an_error_keep_their_effects() {
        let mut bindings = Bindings::new();
        let err = exec("a = 1\nprint('before')\nb = missing", &mut bindings).unwrap_err();
        assert_eq!(err.kind.as_str(), "NameError");
        assert_eq!(bindings.get("a"), Some(&Value::Int(1)));
        assert!(!bindings.contains_key("b"));
    }

    #[test]
    fn runaway_recursion_is_reported() {
        let err = exec("def f():\n    return f()\nf()", &mut Bindings::new()).unwrap_err();
        assert_eq!(err.to_string(), "RuntimeError: maximum recursion depth exceeded");
    }

    #[test]
    fn keyword_and_default_arguments() {
        let src = "def greet(name, greeting='hi'):\n    return f'{greeting} {name}'\nprint(greet('a'), greet(greeting='yo', name='b'))";
        assert_eq!(output(src), "hi a yo b\n");
        let err = exec("def f(a):\n    pass\nf()", &mut Bindings::new()).unwrap_err();
        assert_eq!(err.kind.as_str(), "TypeError");
    }

    #[test]
    fn host_functions_are_called_through_bindings() {
        let mut bindings = Bindings::new();
        bindings.insert("scrape_web".into(), Value::Builtin(Builtin::ScrapeWeb));
        let out = exec("print(scrape_web('http://example.com'))", &mut bindings).expect("run");
        assert_eq!(out, "page at http://example.com\n");
    }

    #[test]
    fn runaway_container_nesting_is_an_error() {
        let mut bindings = Bindings::new();
        let err = exec("x = []\nfor i in range(100000):\n    x = [x]\n", &mut bindings)
            .unwrap_err();
        assert_eq!(err.kind.as_str(), "RuntimeError");
        assert!(err.message.contains("nest"), "{}", err.message);
        let kept = bindings.get("x").expect("x stays bound");
        assert_eq!(kept.nesting(), crate::script::value::MAX_NESTING);

        let err = exec("d = {}\nfor i in range(100):\n    d['k'] = {'k': d}\n", &mut bindings)
            .unwrap_err();
        assert_eq!(err.kind.as_str(), "RuntimeError");
    }

    #[test]
    fn while_with_break_and_continue() {
        let src = "n = 0\nseen = []\nwhile True:\n    n += 1\n    if n % 2 == 0:\n        continue\n    if n > 7:\n        break\n    seen.append(n)\nprint(seen)";
        assert_eq!(output(src), "[1, 3, 5, 7]\n");
    }
}
