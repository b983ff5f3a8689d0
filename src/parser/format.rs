use std::collections::{HashMap, HashSet};

use crate::{
    ast::{
        format_num, ArrayLiteral, Block, ConditionalBlock, Expr, ExprKind, ForRange, FuncCall,
        IfStmt, MapLiteral, NodeId, Program, Stmt, StmtKind, Var,
    },
    common::quote,
    types::Type,
};

/// A line element inside a multi-line array or map literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultilineItem {
    El,
    Nl,
    /// Comment text including its trailing newline.
    Comment(String),
    Key(String),
}

/// Source details the syntax tree drops but the formatter keeps: comments,
/// binary expressions written without spaces and the line layout of
/// composite literals. Keyed by node id.
#[derive(Debug, Clone, Default)]
pub struct Formatting {
    pub(super) comments: HashMap<NodeId, String>,
    pub(super) wss: HashSet<NodeId>,
    pub(super) multiline: HashMap<NodeId, Vec<MultilineItem>>,
}

const INDENT: &str = "    ";

impl Program {
    /// Returns the canonical source form of the program.
    pub fn format(&self) -> String {
        let mut printer = Printer {
            formatting: &self.formatting,
            out: String::new(),
            indent_level: 0,
        };
        printer.program(&self.statements);
        printer.out
    }
}

struct Printer<'a> {
    formatting: &'a Formatting,
    out: String,
    indent_level: usize,
}

impl<'a> Printer<'a> {
    fn write(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn indent(&mut self) {
        for _ in 0..self.indent_level {
            self.out.push_str(INDENT);
        }
    }

    fn comment(&mut self, id: NodeId) {
        if let Some(comment) = self.formatting.comments.get(&id) {
            self.out.push(' ');
            self.out.push_str(comment.trim());
        }
    }

    fn is_blank(&self, stmt: &Stmt) -> bool {
        stmt.is_empty() && !self.formatting.comments.contains_key(&stmt.id)
    }

    fn is_comment_line(&self, stmt: &Stmt) -> bool {
        stmt.is_empty() && self.formatting.comments.contains_key(&stmt.id)
    }

    /// Writes a blank line unless the previous statement was one already.
    /// Returns whether `stmt` is blank.
    fn blank_line(&mut self, stmt: &Stmt, prev_blank: bool) -> bool {
        if !self.is_blank(stmt) {
            return false;
        }
        if !prev_blank {
            self.write("\n");
        }
        true
    }

    fn program(&mut self, stmts: &[Stmt]) {
        if stmts.is_empty() {
            self.write("\n");
            return;
        }
        let nl_after = self.nl_after(stmts);
        let mut blank = false;
        for (i, stmt) in stmts.iter().enumerate() {
            blank = self.blank_line(stmt, blank);
            if blank {
                continue;
            }
            self.stmt(stmt);
            self.write("\n");
            if nl_after[i] {
                self.write("\n");
            }
        }
    }

    /// Marks the statements that need a blank line after them so that
    /// function and event handler declarations, together with the comment
    /// lines right above them, stand apart.
    fn nl_after(&self, stmts: &[Stmt]) -> Vec<bool> {
        let mut nl_after = vec![false; stmts.len()];
        for (i, stmt) in stmts.iter().enumerate() {
            if !matches!(stmt.kind, StmtKind::FuncDecl(_) | StmtKind::EventHandler(_)) {
                continue;
            }
            if stmts.get(i + 1).map_or(false, |next| !self.is_blank(next)) {
                nl_after[i] = true;
            }
            let mut j = i;
            while j > 0 && self.is_comment_line(&stmts[j - 1]) {
                j -= 1;
            }
            if j > 0 && !self.is_blank(&stmts[j - 1]) {
                nl_after[j - 1] = true;
            }
        }
        nl_after
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        self.indent_level += 1;
        let mut blank = false;
        for stmt in stmts {
            blank = self.blank_line(stmt, blank);
            if blank {
                continue;
            }
            self.indent();
            self.stmt(stmt);
            self.write("\n");
        }
        self.indent_level -= 1;
    }

    fn block(&mut self, block: &Block) {
        self.stmts(&block.statements);
        self.indent();
        self.write("end");
        self.comment(block.id);
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Empty(_) => {
                if let Some(comment) = self.formatting.comments.get(&stmt.id) {
                    self.out.push_str(comment.trim());
                }
                return;
            }
            StmtKind::TypedDecl(s) => self.typed_var(&s.decl.var),
            StmtKind::InferredDecl(s) => {
                self.write(&s.decl.var.name);
                self.write(" := ");
                self.expr(&s.decl.value);
            }
            StmtKind::Assignment(s) => {
                self.expr(&s.target);
                self.write(" = ");
                self.expr(&s.value);
            }
            StmtKind::FuncCall(s) => self.call(&s.call),
            StmtKind::Return(s) => {
                self.write("return");
                if let Some(value) = &s.value {
                    self.write(" ");
                    self.expr(value);
                }
            }
            StmtKind::Break(_) => self.write("break"),
            StmtKind::If(s) => return self.if_stmt(s, stmt.id),
            StmtKind::While(s) => {
                self.write("while ");
                return self.conditional_block(&s.cond_block);
            }
            StmtKind::For(s) => {
                self.write("for ");
                if let Some(var) = &s.loop_var {
                    self.write(&var.name);
                    self.write(" := ");
                }
                self.write("range ");
                self.range(&s.range);
                self.comment(stmt.id);
                self.write("\n");
                return self.block(&s.block);
            }
            StmtKind::FuncDecl(s) => {
                let sig = &s.signature;
                self.write("func ");
                self.write(&sig.name);
                if sig.return_type != Type::NONE {
                    self.write(":");
                    self.write(&sig.return_type.to_string());
                }
                for param in &sig.params {
                    self.write(" ");
                    self.typed_var(param);
                }
                if let Some(variadic) = &sig.variadic_param {
                    self.write(" ");
                    self.typed_var(variadic);
                    self.write("...");
                }
                self.comment(stmt.id);
                self.write("\n");
                return self.block(&s.body);
            }
            StmtKind::EventHandler(s) => {
                self.write("on ");
                self.write(&s.name);
                for param in &s.params {
                    self.write(" ");
                    self.typed_var(param);
                }
                self.comment(stmt.id);
                self.write("\n");
                return self.block(&s.body);
            }
        }
        self.comment(stmt.id);
    }

    fn typed_var(&mut self, var: &Var) {
        self.write(&var.name);
        self.write(":");
        self.write(&var.t.to_string());
    }

    fn conditional_block(&mut self, cb: &ConditionalBlock) {
        self.expr(&cb.condition);
        self.comment(cb.id);
        self.write("\n");
        self.block(&cb.block);
    }

    fn if_stmt(&mut self, s: &IfStmt, id: NodeId) {
        self.write("if ");
        self.expr(&s.if_block.condition);
        self.comment(s.if_block.id);
        self.write("\n");
        self.stmts(&s.if_block.block.statements);
        for else_if in &s.else_ifs {
            self.indent();
            self.write("else if ");
            self.expr(&else_if.condition);
            self.comment(else_if.id);
            self.write("\n");
            self.stmts(&else_if.block.statements);
        }
        if let Some(else_block) = &s.else_block {
            self.indent();
            self.write("else");
            self.comment(else_block.id);
            self.write("\n");
            self.stmts(&else_block.statements);
        }
        self.indent();
        self.write("end");
        self.comment(id);
    }

    fn range(&mut self, range: &ForRange) {
        match range {
            ForRange::Step(r) => {
                let bounds = [r.start.as_ref(), Some(&r.stop), r.step.as_ref()];
                let mut first = true;
                for bound in bounds.into_iter().flatten() {
                    if !first {
                        self.write(" ");
                    }
                    first = false;
                    self.expr(bound);
                }
            }
            ForRange::Expr(expr) => self.expr(expr),
        }
    }

    fn call(&mut self, call: &FuncCall) {
        self.write(&call.name);
        for arg in &call.args {
            self.write(" ");
            self.expr(arg);
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Var(var) => self.write(&var.name),
            ExprKind::Num(n) => self.write(&format_num(n.value)),
            ExprKind::String(s) => self.write(&quote(&s.value)),
            ExprKind::Bool(b) => self.write(if b.value { "true" } else { "false" }),
            ExprKind::Array(arr) => self.array_literal(arr),
            ExprKind::Map(map) => self.map_literal(map),
            ExprKind::Call(call) => self.call(call),
            ExprKind::Unary(unary) => {
                self.write(unary.op.as_str());
                self.expr(&unary.right);
            }
            ExprKind::Binary(binary) => {
                let sep = if self.formatting.wss.contains(&binary.id) {
                    ""
                } else {
                    " "
                };
                self.expr(&binary.left);
                self.write(sep);
                self.write(binary.op.as_str());
                self.write(sep);
                self.expr(&binary.right);
            }
            ExprKind::Index(index) => {
                self.expr(&index.left);
                self.write("[");
                self.expr(&index.index);
                self.write("]");
            }
            ExprKind::Slice(slice) => {
                self.expr(&slice.left);
                self.write("[");
                if let Some(start) = &slice.start {
                    self.expr(start);
                }
                self.write(":");
                if let Some(end) = &slice.end {
                    self.expr(end);
                }
                self.write("]");
            }
            ExprKind::Dot(dot) => {
                self.expr(&dot.left);
                self.write(".");
                self.write(&dot.key);
            }
            ExprKind::Group(group) => {
                self.write("(");
                self.expr(&group.expr);
                self.write(")");
            }
            ExprKind::TypeAssertion(ta) => {
                self.expr(&ta.left);
                self.write(".(");
                self.write(&expr.t.to_string());
                self.write(")");
            }
            ExprKind::Any(any) => self.expr(&any.value),
        }
    }

    fn multiline(&self, id: NodeId) -> Vec<MultilineItem> {
        self.formatting
            .multiline
            .get(&id)
            .map(|items| format_multiline(items))
            .unwrap_or_default()
    }

    fn array_literal(&mut self, arr: &ArrayLiteral) {
        let multiline = self.multiline(arr.id);
        let mut elements = arr.elements.iter();
        self.composite_literal("[", "]", &multiline, |printer, _| {
            if let Some(el) = elements.next() {
                printer.expr(el);
            }
        });
    }

    fn map_literal(&mut self, map: &MapLiteral) {
        let multiline = self.multiline(map.id);
        let mut pairs = map.pairs.iter();
        self.composite_literal("{", "}", &multiline, |printer, _| {
            if let Some((key, value)) = pairs.next() {
                printer.write(key);
                printer.write(":");
                printer.expr(value);
            }
        });
    }

    fn composite_literal(
        &mut self,
        open: &str,
        close: &str,
        multiline: &[MultilineItem],
        mut element: impl FnMut(&mut Self, &MultilineItem),
    ) {
        if multiline.is_empty() {
            self.write(open);
            self.write(close);
            return;
        }
        self.write(open);
        self.indent_level += 1;
        if matches!(multiline.first(), Some(MultilineItem::Comment(_))) {
            self.write(" ");
        }
        for (i, item) in multiline.iter().enumerate() {
            let next = multiline.get(i + 1);
            let next_on_line = next.map_or(false, |n| *n != MultilineItem::Nl);
            match item {
                MultilineItem::El | MultilineItem::Key(_) => {
                    element(self, item);
                    if next_on_line {
                        self.write(" ");
                    }
                }
                MultilineItem::Nl => {
                    self.write("\n");
                    if next_on_line {
                        self.indent();
                    }
                }
                MultilineItem::Comment(comment) => {
                    self.write(comment);
                    if next_on_line {
                        self.indent();
                    }
                }
            }
        }
        self.indent_level -= 1;
        if multiline.last() == Some(&MultilineItem::Nl) {
            self.indent();
        }
        self.write(close);
    }
}

/// Collapses runs of blank lines inside a composite literal to at most
/// one.
fn format_multiline(items: &[MultilineItem]) -> Vec<MultilineItem> {
    let mut result = Vec::with_capacity(items.len());
    let mut nl_count = 0;
    for item in items {
        match item {
            MultilineItem::Nl => {
                nl_count += 1;
                if nl_count > 2 {
                    continue;
                }
            }
            MultilineItem::Comment(_) => nl_count = 1,
            MultilineItem::El | MultilineItem::Key(_) => nl_count = 0,
        }
        result.push(item.clone());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, tests::test_builtins};

    fn format(input: &str) -> String {
        let builtins = test_builtins();
        match parse(input, &builtins) {
            Ok(program) => program.format(),
            Err(errs) => panic!("unexpected parse errors for {:?}:\n{}", input, errs),
        }
    }

    #[test]
    fn canonical_spacing() {
        let tests = [
            ("", "\n"),
            ("\n\n", "\n"),
            ("\n\n\n//asdf\n\n\n", "\n//asdf\n\n"),
            ("print  1   2", "print 1 2\n"),
            ("x:=1+2*3\nprint x", "x := 1 + 2 * 3\nprint x\n"),
            ("print 1+2 (3 * 4)", "print 1+2 (3 * 4)\n"),
            ("x := [ 1 2 ]\nprint x", "x := [1 2]\nprint x\n"),
            ("x := { a:1   b : 2 }\nprint x", "x := {a:1 b:2}\nprint x\n"),
            ("x:[]num\nprint x", "x:[]num\nprint x\n"),
            ("print \"a\\nb\"", "print \"a\\nb\"\n"),
            ("x := [1 2 3]\nprint x[ 1 : ] x[:2]", "x := [1 2 3]\nprint x[1:] x[:2]\n"),
            ("x := !(true)\nprint -1 x", "x := !(true)\nprint -1 x\n"),
        ];
        for (input, want) in tests {
            assert_eq!(format(input), want, "input: {:?}", input);
        }
    }

    #[test]
    fn blocks_and_comments() {
        let input = "
x := 1 // x
if x > 1 // cond
print \"big\"
else if x < 0
  print \"neg\"
else // otherwise


print \"small\"
end // if
while x < 3
x = x + 1
end // loop
for i := range 0 10 2 // step
print i
end
";
        let want = "
x := 1 // x
if x > 1 // cond
    print \"big\"
else if x < 0
    print \"neg\"
else // otherwise

    print \"small\"
end // if
while x < 3
    x = x + 1
end // loop
for i := range 0 10 2 // step
    print i
end
";
        assert_eq!(format(input), want);
    }

    #[test]
    fn declarations_stand_apart() {
        let input = "
// f1 comment
func f1 // f1 signature
  print 1
end // f1 end
print 1
// f2 comment
// f2 comment continued
on down x:num y:num
  print x y
end
";
        let want = "
// f1 comment
func f1 // f1 signature
    print 1
end // f1 end

print 1

// f2 comment
// f2 comment continued
on down x:num y:num
    print x y
end
";
        assert_eq!(format(input), want);

        let input = "a := 1\nfunc fn:num nums:num...\n    return a + (len nums)\nend\n";
        let want = "a := 1\n\nfunc fn:num nums:num...\n    return a + (len nums)\nend\n";
        assert_eq!(format(input), want);
    }

    #[test]
    fn multiline_literals() {
        let input = "x := [ // comment
// line comment 1
1 // comment 1

// line comment 2


2 // comment 2
// line comment 3
 ]
print x";
        let want = "x := [ // comment
    // line comment 1
    1 // comment 1

    // line comment 2

    2 // comment 2
    // line comment 3
]
print x
";
        assert_eq!(format(input), want);

        let input = "m := {\na:1\n  b:2\n}\nprint m";
        let want = "m := {\n    a:1\n    b:2\n}\nprint m\n";
        assert_eq!(format(input), want);
    }

    #[test]
    fn formatting_is_idempotent() {
        let inputs = [
            "x := [ 1 2\n3 ]\nprint x",
            "func add:num a:num b:num\nreturn a+b\nend\nprint (add 1 2)",
            "m := {a:[1 2] b:[]}\nfor k := range m\nprint k m[k]\nend",
        ];
        for input in inputs {
            let once = format(input);
            assert_eq!(format(&once), once, "input: {:?}", input);
        }
    }

    #[test]
    fn collapse_blank_lines() {
        use MultilineItem::*;
        let items = [Comment("//a\n".into()), Nl, Nl, El, Nl, Nl, Nl, El];
        assert_eq!(
            format_multiline(&items),
            vec![Comment("//a\n".into()), Nl, El, Nl, Nl, El]
        );
    }
}
