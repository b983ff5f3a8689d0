use std::{collections::HashMap, rc::Rc, time::Duration};

use log::debug;
use rand::Rng;

use crate::{
    ast::{format_num, FuncSignature, Var},
    common::quote,
    types::Type,
};

use super::{
    error::{EvalError, InternalKind, PanicKind},
    runtime::FontValue,
    value::{ArrayVal, MapVal, Value},
    Evaluator,
};

/// Native implementation of a builtin, called with evaluated arguments.
pub type BuiltinFunc = fn(&mut Evaluator, Vec<Value>) -> Result<Value, EvalError>;

#[derive(Clone)]
pub struct Builtin {
    pub func: BuiltinFunc,
    pub decl: Rc<FuncSignature>,
}

fn builtin(func: BuiltinFunc, decl: Rc<FuncSignature>) -> Builtin {
    Builtin { func, decl }
}

fn decl(name: &str, params: &[(&str, Type)], return_type: Type) -> Rc<FuncSignature> {
    Rc::new(FuncSignature {
        name: name.into(),
        params: params.iter().map(|(n, t)| Var::builtin(n, t.clone())).collect(),
        variadic_param: None,
        return_type,
    })
}

fn variadic_decl(name: &str, param: (&str, Type), return_type: Type) -> Rc<FuncSignature> {
    Rc::new(FuncSignature {
        name: name.into(),
        params: Vec::new(),
        variadic_param: Some(Var::builtin(param.0, param.1)),
        return_type,
    })
}

fn num_fn(name: &str, f: BuiltinFunc) -> Builtin {
    builtin(f, decl(name, &[("n", Type::NUM)], Type::NUM))
}

fn xy_fn(name: &str, f: BuiltinFunc) -> Builtin {
    builtin(f, decl(name, &[("x", Type::NUM), ("y", Type::NUM)], Type::NUM))
}

fn xy_proc(name: &str, f: BuiltinFunc) -> Builtin {
    builtin(f, decl(name, &[("x", Type::NUM), ("y", Type::NUM)], Type::NONE))
}

fn num_proc(name: &str, f: BuiltinFunc) -> Builtin {
    builtin(f, decl(name, &[("n", Type::NUM)], Type::NONE))
}

fn string_proc(name: &str, f: BuiltinFunc) -> Builtin {
    builtin(f, decl(name, &[("s", Type::STRING)], Type::NONE))
}

fn string_fn(name: &str, params: &[&str], return_type: Type, f: BuiltinFunc) -> Builtin {
    let params: Vec<(&str, Type)> = params.iter().map(|p| (*p, Type::STRING)).collect();
    builtin(f, decl(name, &params, return_type))
}

/// Every builtin function by name.
pub fn registry() -> HashMap<String, Builtin> {
    let s = Type::STRING;
    let funcs = [
        ("read", builtin(read, decl("read", &[], s.clone()))),
        ("cls", builtin(cls, decl("cls", &[], Type::NONE))),
        ("print", builtin(print, variadic_decl("print", ("a", Type::ANY), Type::NONE))),
        (
            "printf",
            builtin(printf, variadic_decl("printf", ("a", Type::ANY), Type::NONE)),
        ),
        ("sprint", builtin(sprint, variadic_decl("sprint", ("a", Type::ANY), s.clone()))),
        (
            "sprintf",
            builtin(sprintf_fn, variadic_decl("sprintf", ("a", Type::ANY), s.clone())),
        ),
        (
            "join",
            builtin(
                join,
                decl("join", &[("arr", Type::GENERIC_ARRAY), ("sep", s.clone())], s.clone()),
            ),
        ),
        ("split", string_fn("split", &["s", "sep"], Type::array(Type::STRING), split)),
        ("upper", string_fn("upper", &["s"], s.clone(), |_, args| {
            Ok(Value::String(map_chars(str_arg(&args, 0)?, char::to_uppercase)))
        })),
        ("lower", string_fn("lower", &["s"], s.clone(), |_, args| {
            Ok(Value::String(map_chars(str_arg(&args, 0)?, char::to_lowercase)))
        })),
        ("index", string_fn("index", &["s", "substr"], Type::NUM, index)),
        ("startswith", string_fn("startswith", &["s", "prefix"], Type::BOOL, |_, args| {
            Ok(Value::Bool(str_arg(&args, 0)?.starts_with(str_arg(&args, 1)?)))
        })),
        ("endswith", string_fn("endswith", &["s", "suffix"], Type::BOOL, |_, args| {
            Ok(Value::Bool(str_arg(&args, 0)?.ends_with(str_arg(&args, 1)?)))
        })),
        ("trim", string_fn("trim", &["s", "cutset"], s.clone(), |_, args| {
            let cutset = str_arg(&args, 1)?;
            let trimmed = str_arg(&args, 0)?.trim_matches(|c: char| cutset.contains(c));
            Ok(Value::String(trimmed.to_string()))
        })),
        ("replace", string_fn("replace", &["s", "old", "new"], s.clone(), |_, args| {
            let replaced = str_arg(&args, 0)?.replace(str_arg(&args, 1)?, str_arg(&args, 2)?);
            Ok(Value::String(replaced))
        })),
        ("str2num", string_fn("str2num", &["s"], Type::NUM, str2num)),
        ("str2bool", string_fn("str2bool", &["s"], Type::BOOL, str2bool)),
        ("typeof", builtin(type_of, decl("typeof", &[("a", Type::ANY)], s.clone()))),
        ("len", builtin(len, decl("len", &[("a", Type::ANY)], Type::NUM))),
        (
            "has",
            builtin(has, decl("has", &[("m", Type::GENERIC_MAP), ("key", s.clone())], Type::BOOL)),
        ),
        (
            "del",
            builtin(del, decl("del", &[("m", Type::GENERIC_MAP), ("key", s.clone())], Type::NONE)),
        ),
        ("sleep", builtin(sleep, decl("sleep", &[("seconds", Type::NUM)], Type::NONE))),
        ("exit", num_proc("exit", |_, args| Err(EvalError::Exit(num_arg(&args, 0)? as i32)))),
        ("panic", string_proc("panic", |_, args| {
            Err(EvalError::UserPanic(str_arg(&args, 0)?.to_string()))
        })),
        ("rand", builtin(rand_fn, decl("rand", &[("upper", Type::NUM)], Type::NUM))),
        ("rand1", builtin(rand1, decl("rand1", &[], Type::NUM))),
        ("min", xy_fn("min", |_, args| xy(&args, f64::min))),
        ("max", xy_fn("max", |_, args| xy(&args, f64::max))),
        ("pow", xy_fn("pow", |_, args| xy(&args, f64::powf))),
        ("atan2", xy_fn("atan2", |_, args| xy(&args, f64::atan2))),
        ("floor", num_fn("floor", |_, args| unary(&args, f64::floor))),
        ("ceil", num_fn("ceil", |_, args| unary(&args, f64::ceil))),
        ("round", num_fn("round", |_, args| unary(&args, f64::round))),
        ("log", num_fn("log", |_, args| unary(&args, f64::ln))),
        ("sqrt", num_fn("sqrt", |_, args| unary(&args, f64::sqrt))),
        ("sin", num_fn("sin", |_, args| unary(&args, f64::sin))),
        ("cos", num_fn("cos", |_, args| unary(&args, f64::cos))),
        ("move", xy_proc("move", |ev, args| {
            ev.runtime.move_to(num_arg(&args, 0)?, num_arg(&args, 1)?);
            Ok(Value::None)
        })),
        ("line", xy_proc("line", |ev, args| {
            ev.runtime.line(num_arg(&args, 0)?, num_arg(&args, 1)?);
            Ok(Value::None)
        })),
        ("rect", xy_proc("rect", |ev, args| {
            ev.runtime.rect(num_arg(&args, 0)?, num_arg(&args, 1)?);
            Ok(Value::None)
        })),
        ("circle", num_proc("circle", |ev, args| {
            ev.runtime.circle(num_arg(&args, 0)?);
            Ok(Value::None)
        })),
        ("width", num_proc("width", |ev, args| {
            ev.runtime.width(num_arg(&args, 0)?);
            Ok(Value::None)
        })),
        ("color", string_proc("color", color)),
        ("colour", string_proc("colour", color)),
        ("stroke", string_proc("stroke", |ev, args| {
            ev.runtime.stroke(str_arg(&args, 0)?);
            Ok(Value::None)
        })),
        ("fill", string_proc("fill", |ev, args| {
            ev.runtime.fill(str_arg(&args, 0)?);
            Ok(Value::None)
        })),
        ("linecap", string_proc("linecap", |ev, args| {
            ev.runtime.linecap(str_arg(&args, 0)?);
            Ok(Value::None)
        })),
        ("text", string_proc("text", |ev, args| {
            ev.runtime.text(str_arg(&args, 0)?);
            Ok(Value::None)
        })),
        ("clear", builtin(clear, variadic_decl("clear", ("color", s.clone()), Type::NONE))),
        ("grid", builtin(|ev, _| {
            ev.runtime.gridn(10.0, "hsl(0deg 100% 0% / 50%)");
            Ok(Value::None)
        }, decl("grid", &[], Type::NONE))),
        (
            "gridn",
            builtin(gridn, decl("gridn", &[("unit", Type::NUM), ("color", s)], Type::NONE)),
        ),
        (
            "poly",
            builtin(
                poly,
                variadic_decl("poly", ("vertices", Type::array(Type::NUM)), Type::NONE),
            ),
        ),
        ("ellipse", builtin(ellipse, variadic_decl("ellipse", ("n", Type::NUM), Type::NONE))),
        ("dash", builtin(dash, variadic_decl("dash", ("segments", Type::NUM), Type::NONE))),
        ("font", builtin(font, decl("font", &[("props", Type::GENERIC_MAP)], Type::NONE))),
    ];
    funcs
        .into_iter()
        .map(|(name, b)| (name.to_string(), b))
        .collect()
}

/// Signatures of the events a host can deliver.
pub fn event_handler_decls() -> HashMap<String, Rc<FuncSignature>> {
    let xy = [("x", Type::NUM), ("y", Type::NUM)];
    [
        decl("down", &xy, Type::NONE),
        decl("up", &xy, Type::NONE),
        decl("move", &xy, Type::NONE),
        decl("key", &[("k", Type::STRING)], Type::NONE),
        decl("input", &[("id", Type::STRING), ("val", Type::STRING)], Type::NONE),
        decl("animate", &[("elapsed", Type::NUM)], Type::NONE),
    ]
    .into_iter()
    .map(|d| (d.name.clone(), d))
    .collect()
}

/// The globals set by builtins that can fail.
pub fn globals() -> HashMap<String, Var> {
    [
        Var::builtin("err", Type::BOOL),
        Var::builtin("errmsg", Type::STRING),
    ]
    .into_iter()
    .map(|v| (v.name.clone(), v))
    .collect()
}

fn arg(args: &[Value], i: usize) -> Result<&Value, EvalError> {
    args.get(i).map(Value::unwrap_any).ok_or_else(|| {
        EvalError::internal(InternalKind::Type, format!("missing argument {}", i + 1))
    })
}

fn type_error(expected: &str, found: &Value) -> EvalError {
    let message = format!("expected {} argument, found {}", expected, found.type_of());
    EvalError::internal(InternalKind::Type, message)
}

fn num_arg(args: &[Value], i: usize) -> Result<f64, EvalError> {
    match arg(args, i)? {
        Value::Num(n) => Ok(*n),
        v => Err(type_error("num", v)),
    }
}

fn str_arg(args: &[Value], i: usize) -> Result<&str, EvalError> {
    match arg(args, i)? {
        Value::String(s) => Ok(s),
        v => Err(type_error("string", v)),
    }
}

fn array_arg(args: &[Value], i: usize) -> Result<&ArrayVal, EvalError> {
    match arg(args, i)? {
        Value::Array(arr) => Ok(arr),
        v => Err(type_error("array", v)),
    }
}

fn map_arg(args: &[Value], i: usize) -> Result<&MapVal, EvalError> {
    match arg(args, i)? {
        Value::Map(m) => Ok(m),
        v => Err(type_error("map", v)),
    }
}

fn unary(args: &[Value], f: fn(f64) -> f64) -> Result<Value, EvalError> {
    Ok(Value::Num(f(num_arg(args, 0)?)))
}

fn xy(args: &[Value], f: fn(f64, f64) -> f64) -> Result<Value, EvalError> {
    Ok(Value::Num(f(num_arg(args, 0)?, num_arg(args, 1)?)))
}

fn join_values(values: &[Value], sep: &str) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

fn read(ev: &mut Evaluator, _: Vec<Value>) -> Result<Value, EvalError> {
    Ok(Value::String(ev.runtime.read()))
}

fn cls(ev: &mut Evaluator, _: Vec<Value>) -> Result<Value, EvalError> {
    ev.runtime.cls();
    Ok(Value::None)
}

fn print(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    let mut line = join_values(&args, " ");
    line.push('\n');
    ev.runtime.print(&line);
    Ok(Value::None)
}

fn format_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a str, EvalError> {
    if args.is_empty() {
        let message = format!("{} takes at least 1 argument", quote(name));
        return Err(EvalError::panic(PanicKind::BadArguments, message));
    }
    match args[0].unwrap_any() {
        Value::String(s) => Ok(s),
        _ => {
            let message = format!("first argument of {} must be a string", quote(name));
            Err(EvalError::panic(PanicKind::BadArguments, message))
        }
    }
}

fn printf(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    let format = format_arg("printf", &args)?;
    let s = sprintf(format, &args[1..]);
    ev.runtime.print(&s);
    Ok(Value::None)
}

fn sprint(_: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    Ok(Value::String(join_values(&args, " ")))
}

fn sprintf_fn(_: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    let format = format_arg("sprintf", &args)?;
    Ok(Value::String(sprintf(format, &args[1..])))
}

fn join(_: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    let arr = array_arg(&args, 0)?;
    let sep = str_arg(&args, 1)?;
    Ok(Value::String(join_values(&arr.elements.borrow(), sep)))
}

fn split(_: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    let s = str_arg(&args, 0)?;
    let sep = str_arg(&args, 1)?;
    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        s.split(sep).map(|p| Value::String(p.to_string())).collect()
    };
    Ok(Value::Array(ArrayVal::new(parts, Type::array(Type::STRING))))
}

/// Position of the first occurrence counted in characters, -1 if absent.
fn index(_: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    let s = str_arg(&args, 0)?;
    let idx = s
        .find(str_arg(&args, 1)?)
        .map_or(-1.0, |i| s[..i].chars().count() as f64);
    Ok(Value::Num(idx))
}

fn set_global_err(ev: &mut Evaluator, msg: Option<String>) {
    ev.scopes.insert_global("err", Value::Bool(msg.is_some()));
    ev.scopes
        .insert_global("errmsg", Value::String(msg.unwrap_or_default()));
}

fn str2num(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    let s = str_arg(&args, 0)?;
    match s.parse::<f64>() {
        Ok(n) => {
            set_global_err(ev, None);
            Ok(Value::Num(n))
        }
        Err(_) => {
            let msg = format!("str2num: cannot parse {}", quote(s));
            set_global_err(ev, Some(msg));
            Ok(Value::Num(0.0))
        }
    }
}

fn str2bool(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    let s = str_arg(&args, 0)?;
    let b = match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    };
    match b {
        Some(b) => {
            set_global_err(ev, None);
            Ok(Value::Bool(b))
        }
        None => {
            let msg = format!("str2bool: cannot parse {}", quote(s));
            set_global_err(ev, Some(msg));
            Ok(Value::Bool(false))
        }
    }
}

fn type_of(_: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    Ok(Value::String(arg(&args, 0)?.type_of().to_string()))
}

fn len(_: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    let n = match arg(&args, 0)? {
        Value::Map(m) => m.pairs.borrow().len(),
        Value::Array(arr) => arr.len(),
        Value::String(s) => s.chars().count(),
        v => {
            let message = format!(
                "\"len\" takes 1 argument of type \"string\", array \"[]\" or map \"{{}}\" not {}",
                v.type_of()
            );
            return Err(EvalError::panic(PanicKind::BadArguments, message));
        }
    };
    Ok(Value::Num(n as f64))
}

fn has(_: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    let m = map_arg(&args, 0)?;
    let key = str_arg(&args, 1)?;
    let found = m.pairs.borrow().contains(key);
    Ok(Value::Bool(found))
}

fn del(_: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    let m = map_arg(&args, 0)?;
    m.pairs.borrow_mut().remove(str_arg(&args, 1)?);
    Ok(Value::None)
}

fn sleep(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    let secs = num_arg(&args, 0)?;
    let dur = Duration::try_from_secs_f64(secs).unwrap_or_default();
    ev.runtime.sleep(dur);
    Ok(Value::None)
}

fn rand_fn(_: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    let upper = num_arg(&args, 0)?;
    if !(1.0..=2147483647.0).contains(&upper) {
        let message = format!("\"rand {}\" not in range 1 to 2147483647", format_num(upper));
        return Err(EvalError::panic(PanicKind::BadArguments, message));
    }
    let n = rand::thread_rng().gen_range(0..upper as i64);
    Ok(Value::Num(n as f64))
}

fn rand1(_: &mut Evaluator, _: Vec<Value>) -> Result<Value, EvalError> {
    Ok(Value::Num(rand::thread_rng().gen::<f64>()))
}

fn color(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    ev.runtime.color(str_arg(&args, 0)?);
    Ok(Value::None)
}

fn clear(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    if args.len() > 1 {
        let message = "\"clear\" takes 0 or 1 string arguments";
        return Err(EvalError::panic(PanicKind::BadArguments, message));
    }
    let color = if args.is_empty() { "" } else { str_arg(&args, 0)? };
    ev.runtime.clear(color);
    Ok(Value::None)
}

fn gridn(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    ev.runtime.gridn(num_arg(&args, 0)?, str_arg(&args, 1)?);
    Ok(Value::None)
}

fn poly(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    let mut vertices = Vec::with_capacity(args.len());
    for (i, vertex) in args.iter().enumerate() {
        let elements = match vertex {
            Value::Array(arr) => arr.elements.borrow().clone(),
            v => return Err(type_error("array", v)),
        };
        if elements.len() != 2 {
            let message = format!(
                "\"poly\" argument {} has {} elements, expected 2 (x, y)",
                i + 1,
                elements.len()
            );
            return Err(EvalError::panic(PanicKind::BadArguments, message));
        }
        vertices.push((num_arg(&elements, 0)?, num_arg(&elements, 1)?));
    }
    ev.runtime.poly(&vertices);
    Ok(Value::None)
}

fn ellipse(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    let n = args.len();
    if n < 3 || n == 6 || n > 7 {
        let message = format!("\"ellipse\" requires 3, 4, 5 or 7 arguments, found {}", n);
        return Err(EvalError::panic(PanicKind::BadArguments, message));
    }
    let nums = (0..n)
        .map(|i| num_arg(&args, i))
        .collect::<Result<Vec<f64>, EvalError>>()?;
    let radius_y = nums.get(3).copied().unwrap_or(nums[2]);
    let rotation = nums.get(4).copied().unwrap_or(0.0);
    let (start, end) = if n == 7 { (nums[5], nums[6]) } else { (0.0, 360.0) };
    ev.runtime
        .ellipse(nums[0], nums[1], nums[2], radius_y, rotation, start, end);
    Ok(Value::None)
}

fn dash(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    let segments = (0..args.len())
        .map(|i| num_arg(&args, i))
        .collect::<Result<Vec<f64>, EvalError>>()?;
    ev.runtime.dash(&segments);
    Ok(Value::None)
}

fn font_prop(key: &str, val: &Value) -> Result<FontValue, EvalError> {
    let expected = match key {
        "family" | "style" | "baseline" | "align" => "string",
        "size" | "weight" | "letterspacing" => "num",
        _ => {
            let message = format!("unknown property {}", quote(key));
            return Err(EvalError::panic(PanicKind::BadArguments, message));
        }
    };
    let bad_type = |found: &str| {
        let message = format!(
            "expected property {} of type {}, found {}",
            quote(key),
            expected,
            found
        );
        EvalError::panic(PanicKind::BadArguments, message)
    };
    match val.unwrap_any() {
        Value::String(s) => {
            if expected != "string" {
                return Err(bad_type("string"));
            }
            let allowed: &[&str] = match key {
                "align" => &["left", "center", "right"],
                "baseline" => &["top", "middle", "bottom", "alphabetic"],
                _ => &[],
            };
            if !allowed.is_empty() && !allowed.contains(&s.as_str()) {
                let options: Vec<String> = allowed.iter().map(|o| quote(o)).collect();
                let message = format!(
                    "expected property {} to be one of {}, found {}",
                    quote(key),
                    options.join(", "),
                    quote(s)
                );
                return Err(EvalError::panic(PanicKind::BadArguments, message));
            }
            Ok(FontValue::String(s.clone()))
        }
        Value::Num(n) => {
            if expected != "num" {
                return Err(bad_type("num"));
            }
            if (key == "size" || key == "weight") && *n <= 0.0 {
                let message = format!("expected property {} to be greater than 0", quote(key));
                return Err(EvalError::panic(PanicKind::BadArguments, message));
            }
            Ok(FontValue::Num(*n))
        }
        v => Err(bad_type(&v.type_of().to_string())),
    }
}

fn font(ev: &mut Evaluator, args: Vec<Value>) -> Result<Value, EvalError> {
    let m = map_arg(&args, 0)?;
    let props = m
        .pairs
        .borrow()
        .iter()
        .map(|(key, val)| font_prop(key, val).map(|prop| (key.clone(), prop)))
        .collect::<Result<Vec<_>, EvalError>>()?;
    debug!("font {:?}", props);
    ev.runtime.font(&props);
    Ok(Value::None)
}

#[derive(Debug, Default)]
struct Spec {
    minus: bool,
    plus: bool,
    zero: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

fn digits(chars: &mut std::iter::Peekable<std::str::Chars>) -> Option<usize> {
    let mut n = None;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        n = Some(n.unwrap_or(0) * 10 + d as usize);
        chars.next();
    }
    n
}

/// Formats `vals` with printf verbs `%v %s %d %f %q %t %%`, reporting
/// mismatches inline the way Go's fmt package does.
pub fn sprintf(format: &str, vals: &[Value]) -> String {
    let mut out = String::new();
    let mut chars = format.chars().peekable();
    let mut vals = vals.iter().map(Value::unwrap_any);
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut spec = Spec::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.minus = true,
                '+' => spec.plus = true,
                '0' => spec.zero = true,
                ' ' | '#' => {}
                _ => break,
            }
            chars.next();
        }
        spec.width = digits(&mut chars);
        if chars.peek() == Some(&'.') {
            chars.next();
            spec.precision = Some(digits(&mut chars).unwrap_or(0));
        }
        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        match vals.next() {
            Some(val) => out.push_str(&format_verb(verb, &spec, val)),
            None => out.push_str(&format!("%!{}(MISSING)", verb)),
        }
    }
    let extra: Vec<String> = vals.map(|v| format!("{}={}", v.type_of(), v)).collect();
    if !extra.is_empty() {
        out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    out
}

fn signed(n: f64, s: String, spec: &Spec) -> String {
    if spec.plus && n >= 0.0 {
        format!("+{}", s)
    } else {
        s
    }
}

fn format_verb(verb: char, spec: &Spec, val: &Value) -> String {
    let numeric = matches!(val, Value::Num(_));
    let s = match (verb, val) {
        ('v', Value::Num(n)) => signed(*n, format_num(*n), spec),
        ('v', v) => v.to_string(),
        ('d', Value::Num(n)) if n.fract() == 0.0 => signed(*n, format!("{}", *n as i64), spec),
        ('f' | 'F', Value::Num(n)) => {
            signed(*n, format!("{:.*}", spec.precision.unwrap_or(6), n), spec)
        }
        ('s', Value::String(s)) => match spec.precision {
            Some(p) => s.chars().take(p).collect(),
            None => s.clone(),
        },
        ('s', v @ (Value::Array(_) | Value::Map(_))) => v.to_string(),
        ('q', v @ (Value::String(_) | Value::Array(_) | Value::Map(_))) => v.repr(),
        ('t', Value::Bool(b)) => b.to_string(),
        (verb, v) => return format!("%!{}({}={})", verb, v.type_of(), v),
    };
    pad(s, spec, numeric)
}

/// Case mapping one char at a time. Chars without a single char mapping,
/// like `ß` in upper case, are kept.
fn map_chars<I: Iterator<Item = char>>(s: &str, f: impl Fn(char) -> I) -> String {
    s.chars()
        .map(|c| {
            let mut mapped = f(c);
            match (mapped.next(), mapped.next()) {
                (Some(m), None) => m,
                _ => c,
            }
        })
        .collect()
}

fn pad(s: String, spec: &Spec, numeric: bool) -> String {
    let Some(width) = spec.width else {
        return s;
    };
    let len = s.chars().count();
    if len >= width {
        return s;
    }
    let fill = width - len;
    if spec.minus {
        format!("{}{}", s, " ".repeat(fill))
    } else if spec.zero && numeric {
        let (sign, digits) = match s.strip_prefix(|c| c == '-' || c == '+') {
            Some(rest) => (&s[..1], rest),
            None => ("", s.as_str()),
        };
        format!("{}{}{}", sign, "0".repeat(fill), digits)
    } else {
        format!("{}{}", " ".repeat(fill), s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(ss: &[&str]) -> Vec<Value> {
        ss.iter().map(|s| Value::String(s.to_string())).collect()
    }

    #[test]
    fn printf_verbs() {
        let vals = vec![
            Value::any(Value::Num(3.0)),
            Value::any(Value::String("hi".into())),
            Value::any(Value::Bool(true)),
            Value::any(Value::Num(1.5)),
        ];
        assert_eq!(sprintf("%v %v %v %v", &vals), "3 hi true 1.5");
        assert_eq!(sprintf("%d|%5s|%t|%.2f", &vals), "3|   hi|true|1.50");
        assert_eq!(sprintf("%-4d|%q|100%%", &vals[..2]), "3   |\"hi\"|100%");
        assert_eq!(sprintf("%03v %+v", &[Value::Num(7.0), Value::Num(2.0)]), "007 +2");
        assert_eq!(sprintf("%06.1f", &[Value::Num(-2.5)]), "-002.5");
        // width counts chars, not grapheme clusters
        assert_eq!(sprintf("%3s|", &strings(&["e\u{301}"])), " e\u{301}|");
        assert_eq!(sprintf("%-3s|", &strings(&["é"])), "é  |");
    }

    #[test]
    fn case_mapping() {
        assert_eq!(map_chars("straße", char::to_uppercase), "STRAßE");
        assert_eq!(map_chars("ÀB", char::to_lowercase), "àb");
    }

    #[test]
    fn printf_mismatches() {
        assert_eq!(sprintf("%v %v", &[Value::Num(1.0)]), "1 %!v(MISSING)");
        assert_eq!(
            sprintf("%v", &[Value::Num(1.0), Value::String("x".into())]),
            "1%!(EXTRA string=x)"
        );
        assert_eq!(sprintf("%d", &[Value::Num(1.5)]), "%!d(num=1.5)");
        assert_eq!(sprintf("%s", &[Value::Bool(false)]), "%!s(bool=false)");
        assert_eq!(sprintf("100%", &[]), "100%!(NOVERB)");
    }

    #[test]
    fn declarations_cover_registry() {
        let funcs = registry();
        for name in ["print", "len", "str2num", "font", "colour", "rand1", "atan2"] {
            assert!(funcs.contains_key(name), "missing builtin {}", name);
        }
        let print = &funcs["print"].decl;
        assert_eq!(print.variadic_param.as_ref().map(|v| v.t.clone()), Some(Type::ANY));
        assert_eq!(funcs["split"].decl.return_type, Type::array(Type::STRING));
        let handlers = event_handler_decls();
        assert_eq!(handlers["down"].params.len(), 2);
        assert_eq!(handlers["key"].params[0].t, Type::STRING);
        assert_eq!(globals()["err"].t, Type::BOOL);
    }

    #[test]
    fn font_properties() {
        assert_eq!(
            font_prop("size", &Value::Num(3.0)).expect("size"),
            FontValue::Num(3.0)
        );
        let err = font_prop("size", &Value::String("big".into())).expect_err("type");
        assert_eq!(
            err.to_string(),
            "panic: bad arguments: expected property \"size\" of type num, found string"
        );
        let err = font_prop("color", &Value::Num(1.0)).expect_err("unknown");
        assert_eq!(err.panic_kind(), Some(PanicKind::BadArguments));
        assert!(font_prop("align", &Value::String("middle".into())).is_err());
        assert!(font_prop("baseline", &Value::any(Value::String("top".into()))).is_ok());
    }

    #[test]
    fn joined_values() {
        assert_eq!(join_values(&strings(&["a", "b", "c"]), ", "), "a, b, c");
        assert_eq!(join_values(&[], "-"), "");
    }
}
