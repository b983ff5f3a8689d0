use std::{
    cell::RefCell,
    collections::VecDeque,
    io::{self, BufRead, Write},
    rc::Rc,
    thread,
    time::{Duration, Instant},
};

use dyn_clone::DynClone;
use log::{debug, warn};
use unicode_segmentation::UnicodeSegmentation;

use crate::{ast::format_num, common::quote};

/// A value of a `font` property.
#[derive(Debug, Clone, PartialEq)]
pub enum FontValue {
    Num(f64),
    String(String),
}

/// Hands control back to a host event loop during long running
/// evaluation. Called before every statement.
pub trait Yielder: DynClone {
    fn yield_now(&mut self);
}

dyn_clone::clone_trait_object!(Yielder);

/// Sleeps briefly once more than 1000 statements have run and 100ms
/// have passed since the last pause.
#[derive(Debug, Clone)]
pub struct SleepingYielder {
    start: Instant,
    count: usize,
}

impl SleepingYielder {
    const SLICE: Duration = Duration::from_millis(100);
    const PAUSE: Duration = Duration::from_millis(1);

    pub fn new() -> Self {
        SleepingYielder {
            start: Instant::now(),
            count: 0,
        }
    }
}

impl Default for SleepingYielder {
    fn default() -> Self {
        Self::new()
    }
}

impl Yielder for SleepingYielder {
    fn yield_now(&mut self) {
        self.count += 1;
        if self.count > 1000 && self.start.elapsed() > Self::SLICE {
            thread::sleep(Self::PAUSE);
            self.start = Instant::now();
            self.count = 0;
        }
    }
}

/// The host capabilities used by builtins. Only `print` is required;
/// everything else reports itself as not implemented.
pub trait Runtime: DynClone {
    fn print(&self, s: &str);

    fn unimplemented(&self, name: &str) {
        warn!("runtime function {} is not implemented", name);
        self.print(&format!("{} not implemented\n", quote(name)));
    }

    fn read(&self) -> String {
        self.unimplemented("read");
        String::new()
    }

    fn cls(&self) {
        self.unimplemented("cls");
    }

    fn sleep(&self, _dur: Duration) {
        self.unimplemented("sleep");
    }

    fn yielder(&self) -> Option<Box<dyn Yielder>> {
        None
    }

    fn move_to(&self, _x: f64, _y: f64) {
        self.unimplemented("move");
    }

    fn line(&self, _x: f64, _y: f64) {
        self.unimplemented("line");
    }

    fn rect(&self, _dx: f64, _dy: f64) {
        self.unimplemented("rect");
    }

    fn circle(&self, _radius: f64) {
        self.unimplemented("circle");
    }

    fn width(&self, _w: f64) {
        self.unimplemented("width");
    }

    fn color(&self, _s: &str) {
        self.unimplemented("color");
    }

    fn clear(&self, _color: &str) {
        self.unimplemented("clear");
    }

    fn gridn(&self, _unit: f64, _color: &str) {
        self.unimplemented("gridn");
    }

    fn poly(&self, _vertices: &[(f64, f64)]) {
        self.unimplemented("poly");
    }

    #[allow(clippy::too_many_arguments)]
    fn ellipse(
        &self,
        _x: f64,
        _y: f64,
        _radius_x: f64,
        _radius_y: f64,
        _rotation: f64,
        _start_angle: f64,
        _end_angle: f64,
    ) {
        self.unimplemented("ellipse");
    }

    fn stroke(&self, _s: &str) {
        self.unimplemented("stroke");
    }

    fn fill(&self, _s: &str) {
        self.unimplemented("fill");
    }

    fn dash(&self, _segments: &[f64]) {
        self.unimplemented("dash");
    }

    fn linecap(&self, _s: &str) {
        self.unimplemented("linecap");
    }

    fn text(&self, _s: &str) {
        self.unimplemented("text");
    }

    fn font(&self, _props: &[(String, FontValue)]) {
        self.unimplemented("font");
    }
}

dyn_clone::clone_trait_object!(Runtime);

/// Terminal runtime reading from stdin and printing to stdout.
#[derive(Debug, Clone, Default)]
pub struct StdRuntime {
    pub skip_sleep: bool,
}

impl Runtime for StdRuntime {
    fn print(&self, s: &str) {
        let mut stdout = io::stdout().lock();
        if let Err(err) = stdout.write_all(s.as_bytes()).and_then(|_| stdout.flush()) {
            warn!("cannot write to stdout: {}", err);
        }
    }

    fn read(&self) -> String {
        let mut line = String::new();
        if let Err(err) = io::stdin().lock().read_line(&mut line) {
            warn!("cannot read from stdin: {}", err);
            return String::new();
        }
        trim_line_ending(&line).to_string()
    }

    fn cls(&self) {
        self.print("\x1b[2J\x1b[H");
    }

    fn sleep(&self, dur: Duration) {
        if !self.skip_sleep {
            thread::sleep(dur);
        }
    }
}

/// Strips one trailing line ending; `\r\n` is a single grapheme.
fn trim_line_ending(s: &str) -> &str {
    match s.grapheme_indices(true).next_back() {
        Some((i, "\n" | "\r\n")) => &s[..i],
        _ => s,
    }
}

/// Records output and graphics calls in memory, with scripted input.
#[derive(Debug, Clone, Default)]
pub struct BufferRuntime {
    pub output: Rc<RefCell<String>>,
    pub input: Rc<RefCell<VecDeque<String>>>,
    /// One line per graphics call, e.g. `move 10 20`.
    pub graphics: Rc<RefCell<Vec<String>>>,
}

impl BufferRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(lines: &[&str]) -> Self {
        let rt = Self::default();
        rt.input
            .borrow_mut()
            .extend(lines.iter().map(|s| s.to_string()));
        rt
    }

    pub fn output(&self) -> String {
        self.output.borrow().clone()
    }

    pub fn graphics(&self) -> Vec<String> {
        self.graphics.borrow().clone()
    }

    fn record(&self, name: &str, args: &[String]) {
        let mut line = name.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.graphics.borrow_mut().push(line);
    }
}

fn nums(ns: &[f64]) -> Vec<String> {
    ns.iter().map(|n| format_num(*n)).collect()
}

impl Runtime for BufferRuntime {
    fn print(&self, s: &str) {
        self.output.borrow_mut().push_str(s);
    }

    fn read(&self) -> String {
        self.input.borrow_mut().pop_front().unwrap_or_default()
    }

    fn cls(&self) {
        self.output.borrow_mut().clear();
    }

    fn sleep(&self, dur: Duration) {
        debug!("sleep {:?} skipped", dur);
    }

    fn move_to(&self, x: f64, y: f64) {
        self.record("move", &nums(&[x, y]));
    }

    fn line(&self, x: f64, y: f64) {
        self.record("line", &nums(&[x, y]));
    }

    fn rect(&self, dx: f64, dy: f64) {
        self.record("rect", &nums(&[dx, dy]));
    }

    fn circle(&self, radius: f64) {
        self.record("circle", &nums(&[radius]));
    }

    fn width(&self, w: f64) {
        self.record("width", &nums(&[w]));
    }

    fn color(&self, s: &str) {
        self.record("color", &[s.to_string()]);
    }

    fn clear(&self, color: &str) {
        self.record("clear", &[color.to_string()]);
    }

    fn gridn(&self, unit: f64, color: &str) {
        self.record("gridn", &[format_num(unit), color.to_string()]);
    }

    fn poly(&self, vertices: &[(f64, f64)]) {
        let points: Vec<String> = vertices
            .iter()
            .map(|(x, y)| format!("{},{}", format_num(*x), format_num(*y)))
            .collect();
        self.record("poly", &points);
    }

    fn ellipse(
        &self,
        x: f64,
        y: f64,
        radius_x: f64,
        radius_y: f64,
        rotation: f64,
        start_angle: f64,
        end_angle: f64,
    ) {
        let args = nums(&[x, y, radius_x, radius_y, rotation, start_angle, end_angle]);
        self.record("ellipse", &args);
    }

    fn stroke(&self, s: &str) {
        self.record("stroke", &[s.to_string()]);
    }

    fn fill(&self, s: &str) {
        self.record("fill", &[s.to_string()]);
    }

    fn dash(&self, segments: &[f64]) {
        self.record("dash", &nums(segments));
    }

    fn linecap(&self, s: &str) {
        self.record("linecap", &[s.to_string()]);
    }

    fn text(&self, s: &str) {
        self.record("text", &[quote(s)]);
    }

    fn font(&self, props: &[(String, FontValue)]) {
        let props: Vec<String> = props
            .iter()
            .map(|(key, val)| match val {
                FontValue::Num(n) => format!("{}:{}", key, format_num(*n)),
                FontValue::String(s) => format!("{}:{}", key, quote(s)),
            })
            .collect();
        self.record("font", &props);
    }
}
